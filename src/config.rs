//! Textual model descriptions.
//!
//! ```text
//! comp 1 2 0 0 2      (hh hm ph pm n)
//!   0 icm 16
//!   1 isse 19 0
//! hcomp
//!   *b=a a=0 d=0 hash b-- hash *d=a
//!   d++ b-- hash b-- hash *d=a halt
//! post 0 end
//! ```
//!
//! Tokens are separated by whitespace and are case insensitive.
//! Parenthesised text, nested or spanning lines, is a comment.
//! Instructions are written the way [`Program::disassemble`] prints them,
//! so a listing compiles back to the same bytes.

use std::{collections::HashMap, fmt::Write as _, str::FromStr, sync::OnceLock};

use crate::{
    error::Result,
    model::{ComponentSpec, Model, COMPONENT_SIZE},
    vm::{
        decode,
        opcode::{insn_len, OP_CALL, OP_JF, OP_JMP, OP_JT, OP_LJ},
        Listed, Program,
    },
    Error,
};

#[derive(Debug, Clone)]
struct Token {
    text: String,
    line: usize,
}

fn tokenize(src: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let (mut line, mut depth, mut opened) = (1, 0usize, 1);

    for ch in src.chars() {
        match ch {
            '(' => {
                if depth == 0 {
                    opened = line;
                }
                depth += 1;
            }
            ')' if depth == 0 => return Err(Error::Config { line, reason: "unbalanced ')'".into() }),
            ')' => depth -= 1,
            _ if depth > 0 => {}
            c if c.is_whitespace() => {}
            c => {
                word.extend(c.to_lowercase());
                continue;
            }
        }
        if !word.is_empty() {
            tokens.push(Token { text: std::mem::take(&mut word), line });
        }
        if ch == '\n' {
            line += 1;
        }
    }
    if depth > 0 {
        return Err(Error::Config { line: opened, reason: "unclosed comment".into() });
    }
    if !word.is_empty() {
        tokens.push(Token { text: word, line });
    }
    Ok(tokens)
}

/// Instruction names mapped to opcodes. Names are the listing's text up
/// to the first space, e.g. `a=` for "a= 5", `jt` for "jt -3".
fn mnemonics() -> &'static HashMap<String, u8> {
    static MNEMONICS: OnceLock<HashMap<String, u8>> = OnceLock::new();
    MNEMONICS.get_or_init(|| {
        (0..=255u8)
            .filter_map(|op| {
                let (insn, next) = decode(&[op, 0, 0], 0).ok()?;
                let text = Listed { pc: 0, next, insn }.to_string();
                let name = text.split(' ').next()?.to_owned();
                Some((name, op))
            })
            .collect()
    })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn line(&self) -> usize {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .map_or(1, |token| token.line)
    }

    fn error(&self, reason: impl Into<String>) -> Error {
        Error::Config { line: self.line(), reason: reason.into() }
    }

    fn peek(&self) -> Option<&str> { self.tokens.get(self.pos).map(|t| t.text.as_str()) }

    fn next(&mut self) -> Result<String> {
        let token = self.tokens.get(self.pos).ok_or_else(|| self.error("unexpected end of config"))?;
        self.pos += 1;
        Ok(token.text.clone())
    }

    fn expect(&mut self, word: &str) -> Result<()> {
        let token = self.next()?;
        if token != word {
            return Err(self.error(format!("expected '{word}', found '{token}'")));
        }
        Ok(())
    }

    fn number<T: FromStr>(&mut self, what: &str) -> Result<T> {
        let token = self.next()?;
        token
            .parse()
            .map_err(|_| self.error(format!("expected {what}, found '{token}'")))
    }

    fn component(&mut self, index: usize) -> Result<ComponentSpec> {
        let i: usize = self.number("component index")?;
        if i != index {
            return Err(self.error(format!("component {i} listed where {index} was expected")));
        }
        let name = self.next()?;
        let kind = ComponentSpec::NAMES
            .iter()
            .skip(1)
            .position(|&n| n == name)
            .ok_or_else(|| self.error(format!("unknown component '{name}'")))?
            + 1;
        let args = (1..COMPONENT_SIZE[kind])
            .map(|_| self.number(&format!("{name} argument")))
            .collect::<Result<Vec<u8>>>()?;
        ComponentSpec::from_parts(kind as u8, &args).ok_or_else(|| self.error("bad component"))
    }

    /// Assembles code up to one of `ends`, returning the program and the
    /// word that ended it.
    fn program(&mut self, ends: &[&str]) -> Result<(Program, String)> {
        let mut asm = Assembler::default();
        loop {
            let word = self.next()?;
            if ends.contains(&word.as_str()) {
                let code = asm.finish().map_err(|reason| self.error(reason))?;
                let program = Program::new(code).map_err(|err| self.error(err.to_string()))?;
                return Ok((program, word));
            }
            asm.word(&word, self).map_err(|reason| self.error(reason))?;
        }
    }
}

enum Block {
    If { at: usize, long: bool },
    Else { at: usize, long: bool },
    Do { start: usize },
}

#[derive(Default)]
struct Assembler {
    code: Vec<u8>,
    blocks: Vec<Block>,
    labels: HashMap<String, usize>,
    /// Operand positions waiting for a label's address
    fixups: Vec<(usize, String)>,
}

type Asm<T> = std::result::Result<T, String>;

impl Assembler {
    fn word(&mut self, word: &str, p: &mut Parser) -> Asm<()> {
        match word {
            "if" => self.open_if(OP_JF, false),
            "ifnot" => self.open_if(OP_JT, false),
            "ifl" => self.open_if(OP_JT, true),
            "ifnotl" => self.open_if(OP_JF, true),
            "else" | "elsel" => {
                let Some(Block::If { at, long }) = self.blocks.pop() else {
                    return Err(format!("'{word}' without 'if'"));
                };
                let else_long = word == "elsel";
                let else_at = self.placeholder(if else_long { OP_LJ } else { OP_JMP });
                self.patch(at, long, self.code.len())?;
                self.blocks.push(Block::Else { at: else_at, long: else_long });
                Ok(())
            }
            "endif" => match self.blocks.pop() {
                Some(Block::If { at, long } | Block::Else { at, long }) => self.patch(at, long, self.code.len()),
                _ => Err("'endif' without 'if'".into()),
            },
            "do" => {
                self.blocks.push(Block::Do { start: self.code.len() });
                Ok(())
            }
            "while" => self.close_do(Some(OP_JT), false),
            "until" => self.close_do(Some(OP_JF), false),
            "forever" => self.close_do(None, false),
            "whilel" => self.close_do(Some(OP_JF), true),
            "untill" => self.close_do(Some(OP_JT), true),
            "foreverl" => self.close_do(None, true),
            "call" | "lj" => {
                self.code.push(if word == "call" { OP_CALL } else { OP_LJ });
                let target = p.next().map_err(|err| err.to_string())?;
                match target.parse::<u16>() {
                    Ok(addr) => self.code.extend_from_slice(&addr.to_le_bytes()),
                    Err(_) => {
                        self.fixups.push((self.code.len(), target));
                        self.code.extend([0, 0]);
                    }
                }
                Ok(())
            }
            "jt" | "jf" | "jmp" => {
                let op = match word {
                    "jt" => OP_JT,
                    "jf" => OP_JF,
                    _ => OP_JMP,
                };
                let offset: i8 = p.number("jump offset").map_err(|err| err.to_string())?;
                self.code.extend([op, offset as u8]);
                Ok(())
            }
            label if label.len() > 1 && label.ends_with(':') => {
                let name = label.trim_end_matches(':').to_owned();
                if self.labels.insert(name, self.code.len()).is_some() {
                    return Err(format!("label '{label}' defined twice"));
                }
                Ok(())
            }
            _ => {
                let &op = mnemonics().get(word).ok_or_else(|| format!("unknown instruction '{word}'"))?;
                self.code.push(op);
                if insn_len(op) == 2 {
                    let n: u8 = p.number(&format!("operand of '{word}'")).map_err(|err| err.to_string())?;
                    self.code.push(n);
                }
                Ok(())
            }
        }
    }

    /// Emits a jump with an unknown target, returning its operand position
    fn placeholder(&mut self, op: u8) -> usize {
        self.code.push(op);
        let at = self.code.len();
        self.code.push(0);
        if op == OP_LJ {
            self.code.push(0);
        }
        at
    }

    fn open_if(&mut self, op: u8, long: bool) -> Asm<()> {
        let at = if long {
            // skip the long jump when the condition holds
            self.code.extend([op, 3]);
            self.placeholder(OP_LJ)
        } else {
            self.placeholder(op)
        };
        self.blocks.push(Block::If { at, long });
        Ok(())
    }

    fn close_do(&mut self, op: Option<u8>, long: bool) -> Asm<()> {
        let Some(Block::Do { start }) = self.blocks.pop() else {
            return Err("loop end without 'do'".into());
        };
        if long {
            if let Some(op) = op {
                self.code.extend([op, 3]);
            }
            let at = self.placeholder(OP_LJ);
            self.patch(at, true, start)
        } else {
            let at = self.placeholder(op.unwrap_or(OP_JMP));
            self.patch(at, false, start)
        }
    }

    fn patch(&mut self, at: usize, long: bool, target: usize) -> Asm<()> {
        if long {
            let addr = u16::try_from(target).map_err(|_| "long jump target beyond 65535".to_owned())?;
            self.code[at..at + 2].copy_from_slice(&addr.to_le_bytes());
        } else {
            let offset = target as isize - (at as isize + 1);
            let offset = i8::try_from(offset)
                .map_err(|_| format!("jump of {offset} bytes is too far, use the long form"))?;
            self.code[at] = offset as u8;
        }
        Ok(())
    }

    fn finish(mut self) -> Asm<Vec<u8>> {
        if !self.blocks.is_empty() {
            return Err("unclosed 'if' or 'do'".into());
        }
        for (at, label) in std::mem::take(&mut self.fixups) {
            let &target = self.labels.get(&label).ok_or_else(|| format!("undefined label '{label}'"))?;
            self.patch(at, true, target)?;
        }
        self.code.push(0);
        Ok(self.code)
    }
}

/// Compiles a textual model
pub fn compile(src: &str) -> Result<Model> {
    let mut p = Parser { tokens: tokenize(src)?, pos: 0 };
    p.expect("comp")?;
    let hh = p.number("hh")?;
    let hm = p.number("hm")?;
    let ph = p.number("ph")?;
    let pm = p.number("pm")?;
    let n: usize = p.number("component count")?;
    let components = (0..n).map(|i| p.component(i)).collect::<Result<Vec<_>>>()?;

    p.expect("hcomp")?;
    let (hcomp, end) = p.program(&["post", "pcomp", "end"])?;
    let pcomp = match end.as_str() {
        "post" => {
            if p.peek() == Some("0") {
                p.pos += 1;
            }
            p.expect("end")?;
            None
        }
        "pcomp" => {
            // an external preprocessor command may precede ';', it is not run
            while p.next()? != ";" {}
            Some(p.program(&["end"])?.0)
        }
        _ => None,
    };

    let model = Model { hh, hm, ph, pm, components, hcomp, pcomp };
    model.validate().map_err(|err| p.error(err.to_string()))?;
    Ok(model)
}

impl Model {
    /// Text that [`compile`] turns back into this model
    pub fn to_config(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "comp {} {} {} {} {}", self.hh, self.hm, self.ph, self.pm, self.components.len());
        for (i, spec) in self.components.iter().enumerate() {
            let args: Vec<String> = spec.args().iter().map(u8::to_string).collect();
            let _ = writeln!(out, "  {i} {} {}", spec.name(), args.join(" "));
        }
        let listing = |out: &mut String, program: &Program| {
            for line in program.disassemble().lines() {
                let _ = writeln!(out, "  {line}");
            }
        };
        out.push_str("hcomp\n");
        listing(&mut out, &self.hcomp);
        match &self.pcomp {
            None => out.push_str("post\n  0\nend\n"),
            Some(pcomp) => {
                out.push_str("pcomp ;\n");
                listing(&mut out, pcomp);
                out.push_str("end\n");
            }
        }
        out
    }
}
