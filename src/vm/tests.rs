use rand::{rngs::StdRng, Rng, SeedableRng};
use rstest::rstest;

use super::*;
use crate::model::Level;

fn vm(code: &[u8], mode: ExecMode) -> Vm {
    let program = Program::new(code.to_vec()).unwrap();
    Vm::new(ProgramKind::Context, &program, 4, 4, mode).unwrap()
}

fn output(vm: &mut Vm) -> Vec<u8> {
    let mut out = Vec::new();
    vm.flush_output(&mut out).unwrap();
    out
}

#[rstest]
fn arithmetic(#[values(ExecMode::Interpret, ExecMode::Translate)] mode: ExecMode) {
    // a=5 a*=7 a-=1 out, a=9 a/=0 out, a=9 a%=0 out, a=1 a<<=33 out, halt
    let code = [
        71, 5, 151, 7, 143, 1, 57, 71, 9, 159, 0, 57, 71, 9, 167, 0, 57, 71, 1, 207, 33, 57, 56, 0,
    ];
    let mut vm = vm(&code, mode);
    vm.run(0).unwrap();
    assert_eq!(output(&mut vm), [34, 0, 0, 2]);
}

#[rstest]
fn swap_with_byte_cell_keeps_high_bits(#[values(ExecMode::Interpret, ExecMode::Translate)] mode: ExecMode) {
    // *b=0xab a=0x12 a<<=8 a|=0x34 *b<>a halt
    let code = [103, 0xab, 71, 0x12, 207, 8, 191, 0x34, 32, 56, 0];
    let mut vm = vm(&code, mode);
    vm.run(0).unwrap();
    assert_eq!(vm.machine().a, 0x12ab);
    assert_eq!(vm.machine().m[0], 0x34);
}

#[rstest]
fn hashes(#[values(ExecMode::Interpret, ExecMode::Translate)] mode: ExecMode) {
    // hash hashd halt
    let mut vm = vm(&[59, 60, 56, 0], mode);
    vm.run(0).unwrap();
    let a = 512 * 773;
    assert_eq!(vm.machine().a, a);
    assert_eq!(vm.machine().h[0], (a + 512) * 773);
}

#[rstest]
fn compare_and_branch(#[values(ExecMode::Interpret, ExecMode::Translate)] mode: ExecMode) {
    // a>10 jt 2 a=0 out halt: prints inputs above 10, zero otherwise
    let code = [239, 10, 39, 2, 71, 0, 57, 56, 0];
    let mut vm = vm(&code, mode);
    vm.run(11).unwrap();
    vm.run(4).unwrap();
    assert_eq!(output(&mut vm), [11, 0]);
}

#[rstest]
fn registers_persist_between_runs(#[values(ExecMode::Interpret, ExecMode::Translate)] mode: ExecMode) {
    // *d++ b=r 7 b++ a=b r=a 7 halt
    let code = [49, 15, 7, 9, 65, 55, 7, 56, 0];
    let mut vm = vm(&code, mode);
    for x in 0..3 {
        vm.run(x).unwrap();
    }
    assert_eq!(vm.h(0), 3);
    assert_eq!(vm.machine().r[7], 3);
}

#[rstest]
fn call_and_return(#[values(ExecMode::Interpret, ExecMode::Translate)] mode: ExecMode) {
    // 0: call 5, 3: out, 4: halt, 5: a=65, 7: ret
    let code = [253, 5, 0, 57, 56, 71, 65, 62, 0];
    let mut vm = vm(&code, mode);
    vm.run(0).unwrap();
    vm.run(0).unwrap();
    assert_eq!(output(&mut vm), b"AA");
}

#[rstest]
fn stack_overflow(#[values(ExecMode::Interpret, ExecMode::Translate)] mode: ExecMode) {
    let mut vm = vm(&[253, 0, 0, 0], mode);
    let err = vm.run(0).unwrap_err();
    assert!(matches!(err, Error::Vm { pc: 0, fault: Fault::StackOverflow, .. }), "{err}");
}

#[rstest]
fn faults(#[values(ExecMode::Interpret, ExecMode::Translate)] mode: ExecMode) {
    let err = vm(&[62, 0], mode).run(0).unwrap_err();
    assert!(matches!(err, Error::Vm { pc: 0, fault: Fault::StackUnderflow, .. }), "{err}");

    // out, then falls onto the terminator
    let err = vm(&[57, 0], mode).run(0).unwrap_err();
    assert!(matches!(err, Error::Vm { pc: 1, fault: Fault::ErrorInstruction, .. }), "{err}");
}

#[test]
fn empty_program_is_a_no_op() {
    let mut vm = vm(&[0], ExecMode::Translate);
    vm.run(42).unwrap();
    assert_eq!(vm.machine().a, 0);
}

#[rstest]
#[case::no_terminator(&[56])]
#[case::undefined_opcode(&[58, 56, 0])]
#[case::undefined_opcode_in_group(&[5, 56, 0])]
#[case::jump_outside(&[63, 10, 0])]
#[case::long_jump_outside(&[255, 200, 0, 0])]
#[case::terminator_is_operand(&[71, 0])]
fn rejects_malformed(#[case] code: &[u8]) {
    assert!(matches!(Program::new(code.to_vec()), Err(Error::InvalidModel { .. })));
}

#[test]
fn jump_into_instruction_falls_back_to_interpreter() {
    // 0: jmp 1 (to byte 3), 2: a=57, 4: halt. Byte 3 alone is `out`.
    let code = [63, 1, 71, 57, 56, 0];
    let mut translated = vm(&code, ExecMode::Translate);
    assert!(!translated.is_translated());
    translated.run(7).unwrap();
    assert_eq!(output(&mut translated), [7]);
}

#[test]
fn builtin_programs_translate() {
    for level in Level::ALL {
        let model = level.model();
        let vm = Vm::new(ProgramKind::Context, &model.hcomp, model.hh, model.hm, ExecMode::Translate).unwrap();
        assert!(vm.is_translated(), "{level}");
    }
}

#[test]
fn disassembly() {
    let program = Program::new(vec![71, 5, 129, 39, 253, 56, 0]).unwrap();
    assert_eq!(program.disassemble(), "(   0) a= 5\n(   2) a+=b\n(   3) jt -3\n(   5) halt");
}

/// Builds a program whose jumps and calls only go forward, so that it
/// always terminates. Calls are few to keep nested re-execution short.
fn random_program(rng: &mut StdRng) -> Vec<u8> {
    let plain: Vec<u8> = (1..=255u8)
        .filter(|&op| match decode(&[op, 0, 0, 0], 0) {
            Ok((insn, _)) => insn.target().is_none() && !matches!(insn, Insn::Halt | Insn::Ret),
            Err(_) => false,
        })
        .collect();

    enum Slot {
        Plain(u8, u8),
        Short(u8),
        Long(u8),
        Ret,
    }

    let n = rng.gen_range(10..60);
    let mut calls = 0;
    let slots: Vec<Slot> = (0..n)
        .map(|_| match rng.gen_range(0..100) {
            0..=69 => Slot::Plain(plain[rng.gen_range(0..plain.len())], rng.gen()),
            70..=84 => Slot::Short([opcode::OP_JT, opcode::OP_JF, opcode::OP_JMP][rng.gen_range(0..3)]),
            85..=89 => Slot::Long(opcode::OP_LJ),
            90..=94 if calls < 3 => {
                calls += 1;
                Slot::Long(opcode::OP_CALL)
            }
            _ => Slot::Ret,
        })
        .collect();

    let len = |slot: &Slot| match slot {
        Slot::Plain(op, _) => opcode::insn_len(*op),
        Slot::Short(_) => 2,
        Slot::Long(_) => 3,
        Slot::Ret => 1,
    };
    let mut addrs = vec![0];
    for slot in &slots {
        addrs.push(addrs[addrs.len() - 1] + len(slot));
    }
    // addrs[n] is the final halt

    let mut code = Vec::new();
    for (i, slot) in slots.iter().enumerate() {
        let next = addrs[i + 1];
        let reach = match slot {
            Slot::Short(_) => (i + 1..=n).take_while(|&j| addrs[j] - next <= 127).last().unwrap_or(i + 1),
            _ => n,
        };
        let target = addrs[rng.gen_range(i + 1..=reach)];
        match *slot {
            Slot::Plain(op, arg) => {
                code.push(op);
                if opcode::insn_len(op) == 2 {
                    code.push(arg);
                }
            }
            Slot::Short(op) => code.extend([op, (target - next) as u8]),
            Slot::Long(op) => {
                code.push(op);
                code.extend_from_slice(&(target as u16).to_le_bytes());
            }
            Slot::Ret => code.push(opcode::OP_RET),
        }
    }
    code.extend([opcode::OP_HALT, 0]);
    code
}

#[test]
fn interpreter_and_translation_agree() {
    let mut rng = StdRng::seed_from_u64(0x2a);
    for _ in 0..300 {
        let code = random_program(&mut rng);
        let program = Program::new(code.clone()).unwrap();
        let mut interpreted = Vm::new(ProgramKind::Context, &program, 3, 3, ExecMode::Interpret).unwrap();
        let mut translated = Vm::new(ProgramKind::Context, &program, 3, 3, ExecMode::Translate).unwrap();

        for _ in 0..8 {
            let input = rng.gen_range(0..=256);
            let left = interpreted.run(input).map_err(|e| e.to_string());
            let right = translated.run(input).map_err(|e| e.to_string());
            assert_eq!(left, right, "{code:?}");

            let (l, r) = (interpreted.machine(), translated.machine());
            assert_eq!((l.a, l.b, l.c, l.d, l.f), (r.a, r.b, r.c, r.d, r.f), "{code:?}");
            assert_eq!(l.r, r.r);
            assert_eq!(l.m, r.m);
            assert_eq!(l.h, r.h);
            assert_eq!(l.output(), r.output());
        }
    }
}
