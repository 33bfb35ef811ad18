// (c) 2022 Dimitar Rusev <mitikodev@gmail.com> licensed under GPL-3.0

use std::{
    fs,
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use zpaqlite::{
    codec::{self, CompressOptions, ExecMode, Method},
    config, Filter, Level, Model,
};

#[derive(Parser, Debug)]
#[command(about = "Context mixing compressor with self-describing models", long_about = None)]
struct Args {
    #[command(subcommand)]
    action: Action,

    /// Log more, repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Compress a file, or every file of a directory, to <name>.zpaq
    #[command(name = "c")]
    Compress {
        path: PathBuf,
        #[command(flatten)]
        args: CompressArgs,
    },
    /// Decompress an archive to <name>.orig
    #[command(name = "d")]
    Decompress {
        path: PathBuf,
        /// Run model programs with the interpreter
        #[arg(long)]
        interpret: bool,
        /// Print the segments instead of extracting
        #[arg(long)]
        list: bool,
    },
    /// Compress then decompress and compare
    #[command(name = "t")]
    Test {
        path: PathBuf,
        #[command(flatten)]
        args: CompressArgs,
    },
}

#[derive(clap::Args, Debug)]
struct CompressArgs {
    /// Builtin model: fast, mid, max (or 1-3)
    #[arg(short, long, default_value_t = Level::Mid)]
    method: Level,

    /// Model description file, replaces --method
    #[arg(long, conflicts_with = "method")]
    config: Option<PathBuf>,

    /// Preprocessing: none, delta
    #[arg(long, default_value_t = Filter::None)]
    filter: Filter,

    /// Run model programs with the interpreter
    #[arg(long)]
    interpret: bool,

    /// Skip decoding each block again after compressing it
    #[arg(long)]
    no_verify: bool,

    /// Worker threads, each compressing its own block
    #[arg(short = 'j', long, default_value_t = 1)]
    threads: usize,

    /// Input bytes per block
    #[arg(long, default_value_t = 1 << 24)]
    block_size: usize,

    /// Print the model as text and exit
    #[arg(long)]
    disassemble: bool,
}

impl CompressArgs {
    fn model(&self) -> Result<Model> {
        match &self.config {
            Some(path) => {
                let src = fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
                Ok(config::compile(&src).with_context(|| format!("in {}", path.display()))?)
            }
            None => Ok(self.method.model()),
        }
    }

    fn options(&self, name: &[u8]) -> Result<CompressOptions> {
        Ok(CompressOptions::default()
            .with_method(Method::Custom(self.model()?))
            .with_filter(self.filter)
            .with_mode(exec_mode(self.interpret))
            .with_verify(!self.no_verify)
            .with_name(name)
            .with_block_size(self.block_size))
    }
}

fn exec_mode(interpret: bool) -> ExecMode {
    if interpret {
        ExecMode::Interpret
    } else {
        ExecMode::Translate
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    stderrlog::new()
        .verbosity(1 + usize::from(args.verbose))
        .timestamp(stderrlog::Timestamp::Second)
        .init()?;

    if let Action::Compress { args, .. } | Action::Test { args, .. } = &args.action {
        if args.disassemble {
            print!("{}", args.options(b"")?.model().to_config());
            return Ok(());
        }
    }

    let path = match &args.action {
        Action::Compress { path, .. } | Action::Decompress { path, .. } | Action::Test { path, .. } => path,
    };
    if path.is_dir() {
        for file in fs::read_dir(path)? {
            let file_path = file?.path();
            if file_path.is_file() {
                run(&file_path, &args.action)?;
            }
        }
    } else if path.is_file() {
        run(path, &args.action)?;
    } else {
        bail!("{} is not a file or a directory", path.display());
    }
    Ok(())
}

fn run(file_path: &Path, action: &Action) -> Result<()> {
    let file_name = file_path.file_name().context("invalid file name")?;
    let out_path = std::env::current_dir()?.join(file_name);

    match action {
        Action::Compress { args, .. } => {
            compress(file_path, &out_path.with_extension("zpaq"), args)?;
        }
        Action::Decompress { list: true, .. } => list(file_path)?,
        Action::Decompress { interpret, .. } => {
            decompress(file_path, &out_path.with_extension("orig"), exec_mode(*interpret))?;
        }
        Action::Test { args, .. } => {
            let compress_path = out_path.with_extension("zpaq");
            let decompress_path = out_path.with_extension("orig");
            compress(file_path, &compress_path, args)?;
            decompress(&compress_path, &decompress_path, exec_mode(args.interpret))?;
            if fs::read(file_path)? != fs::read(&decompress_path)? {
                bail!("{} did not survive the round trip", file_path.display());
            }
            println!("[{}] ok", file_path.display());
        }
    }
    Ok(())
}

fn compress(input: &Path, output: &Path, args: &CompressArgs) -> Result<()> {
    let data = fs::read(input).with_context(|| format!("cannot read {}", input.display()))?;
    let name = input.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let options = args.options(name.as_bytes())?;

    let timer = Instant::now();
    let pool = rayon::ThreadPoolBuilder::new().num_threads(args.threads.max(1)).build()?;
    let archive = pool.install(|| codec::compress_parallel(&data, &options))?;
    fs::write(output, &archive).with_context(|| format!("cannot write {}", output.display()))?;

    println!(
        "[{}] csize: {} (ratio: {:.3}), ctime: {:?}",
        input.display(),
        archive.len(),
        archive.len() as f64 / data.len().max(1) as f64,
        timer.elapsed()
    );
    Ok(())
}

fn decompress(input: &Path, output: &Path, mode: ExecMode) -> Result<()> {
    let archive = fs::read(input).with_context(|| format!("cannot read {}", input.display()))?;

    let timer = Instant::now();
    let data = codec::decompress(&archive, mode).with_context(|| format!("cannot decompress {}", input.display()))?;
    fs::write(output, &data).with_context(|| format!("cannot write {}", output.display()))?;

    println!("[{}] dsize: {}, dtime: {:?}", input.display(), data.len(), timer.elapsed());
    Ok(())
}

fn list(input: &Path) -> Result<()> {
    let archive = fs::read(input).with_context(|| format!("cannot read {}", input.display()))?;
    for segment in codec::list(&archive)? {
        println!(
            "block {:>3}  {:<24} {:<12} {:?}",
            segment.block,
            String::from_utf8_lossy(&segment.name),
            String::from_utf8_lossy(&segment.comment),
            segment.check
        );
    }
    Ok(())
}
