//! The IR-to-MIPS backend pipeline.
//!
//! Stages run strictly in sequence over one whole program: block
//! construction, flow-graph linking, the optional peephole passes, the
//! informational data-flow fixpoint, and per-function code generation.

pub mod block;
pub mod cfg;
pub mod codegen;
pub mod dataflow;
pub mod mips;
pub mod nextuse;
pub mod peephole;
pub mod regalloc;

use crate::tac::Statement;
use crate::CompileError;

#[derive(Debug, Clone, Copy)]
pub struct CodegenOptions {
    /// Run the two peephole passes before code generation.
    pub optimize: bool,
    /// Compiling the runtime prelude itself: no entry-point requirement
    /// and no prelude splice.
    pub runtime: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self { optimize: true, runtime: false }
    }
}

/// Run the full pipeline over a parsed statement stream.
pub fn compile(
    stmts: Vec<Statement>,
    prelude: Option<&str>,
    opts: &CodegenOptions,
) -> Result<String, CompileError> {
    let mut program = cfg::Program::from_statements(stmts)?;
    if opts.optimize {
        peephole::fold_jump_over_jump(&mut program)?;
        peephole::simplify_control_flow(&mut program)?;
    }
    dataflow::analyze(&mut program.blocks);
    codegen::generate(&program, prelude, opts)
}
