use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use tac_compiler::{compile_tac_to_mips, CodegenOptions};

#[derive(Parser)]
#[command(name = "tacc")]
#[command(about = "Compiles three-address IR to MIPS assembly")]
struct Args {
    /// Path to the IR file to compile
    file: PathBuf,

    /// Skip the peephole optimization passes
    #[arg(long)]
    no_opt: bool,

    /// Compile the runtime prelude itself (no entry-point check, no splice)
    #[arg(long)]
    runtime: bool,

    /// Runtime prelude to splice into the text segment
    #[arg(long)]
    prelude: Option<PathBuf>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(e) = run(&args) {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let src = fs::read_to_string(&args.file)
        .with_context(|| format!("reading IR file `{}`", args.file.display()))?;
    let prelude = match &args.prelude {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("reading prelude `{}`", path.display()))?,
        ),
        None => None,
    };

    let opts = CodegenOptions { optimize: !args.no_opt, runtime: args.runtime };
    let asm = compile_tac_to_mips(&src, prelude.as_deref(), &opts)
        .with_context(|| format!("compiling `{}`", args.file.display()))?;
    print!("{asm}");
    Ok(())
}
