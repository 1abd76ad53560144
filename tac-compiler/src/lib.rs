pub mod backend;
pub mod tac;

pub use backend::CodegenOptions;

use thiserror::Error;

/// Everything that can stop a compilation.
///
/// All variants are fatal: the tool is a single-shot batch transform with
/// no partial-compilation mode, so nothing is retried or recovered.
#[derive(Error, Debug)]
pub enum CompileError {
    /// Unparseable record, unknown opcode, or unresolved label reference.
    #[error("malformed input at line {line}: {message}")]
    MalformedInput { line: u32, message: String },

    /// The program defines no `main` function (and this is not a runtime
    /// build).
    #[error("no entry function `main` in program")]
    MissingEntryPoint,

    /// A bug in the allocator or optimizer itself; aborting beats emitting
    /// possibly-incorrect assembly.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

/// Parse IR text into a statement stream.
pub fn parse_tac(src: &str) -> Result<Vec<tac::Statement>, CompileError> {
    tac::parse(src)
}

/// Compile IR text directly to MIPS assembly.
///
/// `prelude` is the externally supplied runtime text, spliced verbatim at
/// the top of the text segment for non-runtime builds.
pub fn compile_tac_to_mips(
    src: &str,
    prelude: Option<&str>,
    opts: &CodegenOptions,
) -> Result<String, CompileError> {
    let stmts = parse_tac(src)?;
    backend::compile(stmts, prelude, opts)
}
