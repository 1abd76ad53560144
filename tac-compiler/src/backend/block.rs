//! Basic-block construction.
//!
//! Partitions the flat statement stream into maximal straight-line runs:
//! a block starts at a `label` or `func` statement (or immediately after a
//! jump/branch) and ends at its own terminating jump/branch or just before
//! the next label.

use crate::tac::{Opcode, Statement};
use std::collections::HashSet;

/// Per-block definition-propagation sets (see the data-flow analyzer).
#[derive(Debug, Clone, Default)]
pub struct Dataflow {
    pub gen: HashSet<String>,
    pub kill: HashSet<String>,
    pub in_set: HashSet<String>,
    pub out_set: HashSet<String>,
}

/// An ordered, contiguous slice of statements with its CFG links.
///
/// Blocks are addressed by index into the program's block list; successor
/// and predecessor links are indices, never references, so the peephole
/// optimizer can remove and retarget blocks with simple index updates.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub stmts: Vec<Statement>,
    pub predecessors: HashSet<usize>,
    /// Next block in program order, or the jump target when the block ends
    /// in an unconditional `jmp` (the fallthrough override).
    pub fallthrough: Option<usize>,
    /// Resolved target of a terminating conditional branch.
    pub branch_target: Option<usize>,
    pub dataflow: Dataflow,
}

impl BasicBlock {
    fn new(stmts: Vec<Statement>) -> Self {
        Self {
            stmts,
            predecessors: HashSet::new(),
            fallthrough: None,
            branch_target: None,
            dataflow: Dataflow::default(),
        }
    }

    /// The label this block starts with, if any.
    pub fn label(&self) -> Option<&str> {
        match self.stmts.first() {
            Some(s) if s.op == Opcode::Label || s.op == Opcode::Func => Some(&s.dst),
            _ => None,
        }
    }

    /// The terminating jump/branch statement, if the block ends in one.
    pub fn terminator(&self) -> Option<&Statement> {
        self.stmts.last().filter(|s| s.op.is_terminator())
    }

    /// True if the block consists of a single unconditional jump,
    /// optionally preceded by its own label. These are the drop candidates
    /// of the control-flow simplification pass; a conditional branch never
    /// qualifies, because dropping one would discard its fallthrough path.
    pub fn is_single_jump(&self) -> bool {
        match self.stmts.len() {
            1 => self.stmts[0].op == Opcode::Jmp,
            2 => self.stmts[0].op == Opcode::Label && self.stmts[1].op == Opcode::Jmp,
            _ => false,
        }
    }
}

/// Partition a statement stream into basic blocks.
///
/// A pending empty block (opened by a jump immediately followed by a label)
/// is reused rather than duplicated, so concatenating every block's
/// statements in order reproduces the input stream exactly.
pub fn partition(stmts: Vec<Statement>) -> Vec<BasicBlock> {
    let mut blocks = Vec::new();
    let mut cur: Vec<Statement> = Vec::new();

    for stmt in stmts {
        let starts_block = stmt.op == Opcode::Label || stmt.op == Opcode::Func;
        if starts_block && !cur.is_empty() {
            blocks.push(BasicBlock::new(std::mem::take(&mut cur)));
        }
        let ends_block = stmt.op.is_terminator();
        cur.push(stmt);
        if ends_block {
            blocks.push(BasicBlock::new(std::mem::take(&mut cur)));
        }
    }
    if !cur.is_empty() {
        blocks.push(BasicBlock::new(cur));
    }
    blocks
}

/// Flatten blocks back into one statement stream.
pub fn flatten(blocks: Vec<BasicBlock>) -> Vec<Statement> {
    blocks.into_iter().flat_map(|b| b.stmts).collect()
}
