//! Flow-graph assembly: label resolution and successor/predecessor links.
//!
//! The CFG is an index-addressed block list plus a label-name-to-index
//! table. Labels also carry the drop state used by the control-flow
//! simplification pass.

use super::block::{self, BasicBlock};
use crate::tac::{Opcode, Statement};
use crate::CompileError;
use std::collections::HashMap;

/// Eligibility of a labelled block for removal.
///
/// Transitions are monotonic: `Unknown → {CannotDrop, MaybeDrop} → WillDrop`.
/// Once a label is `CannotDrop` it stays that way; `MaybeDrop` can only be
/// confirmed to `WillDrop` or left unresolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropState {
    Unknown,
    CannotDrop,
    MaybeDrop,
    WillDrop,
}

impl DropState {
    /// Apply a transition, ignoring any that would move backward.
    pub fn promote(&mut self, next: DropState) {
        let legal = matches!(
            (*self, next),
            (DropState::Unknown, DropState::CannotDrop)
                | (DropState::Unknown, DropState::MaybeDrop)
                | (DropState::MaybeDrop, DropState::WillDrop)
        );
        if legal {
            *self = next;
        }
    }
}

#[derive(Debug, Clone)]
pub struct LabelInfo {
    /// Index of the block that defines this label.
    pub block: usize,
    /// Blocks whose terminator references this label.
    pub inbound: Vec<usize>,
    pub drop_state: DropState,
}

pub type LabelTable = HashMap<String, LabelInfo>;

/// A program: the ordered block list plus the label table.
#[derive(Debug, Clone)]
pub struct Program {
    pub blocks: Vec<BasicBlock>,
    pub labels: LabelTable,
}

impl Program {
    /// Build a program from a statement stream: partition into blocks,
    /// resolve labels, and link the flow graph.
    pub fn from_statements(mut stmts: Vec<Statement>) -> Result<Program, CompileError> {
        crate::tac::renumber(&mut stmts);
        let mut blocks = block::partition(stmts);
        let labels = link(&mut blocks)?;
        Ok(Program { blocks, labels })
    }

    /// Tear the program back down into its statement stream.
    pub fn into_statements(self) -> Vec<Statement> {
        block::flatten(self.blocks)
    }
}

/// Resolve every label reference and compute successor/predecessor links.
fn link(blocks: &mut [BasicBlock]) -> Result<LabelTable, CompileError> {
    let mut labels: LabelTable = HashMap::new();
    for (i, b) in blocks.iter().enumerate() {
        if let Some(name) = b.label() {
            labels.insert(
                name.to_string(),
                LabelInfo { block: i, inbound: Vec::new(), drop_state: DropState::Unknown },
            );
        }
    }

    // Successor edges; predecessors filled symmetrically below.
    let mut edges: Vec<(usize, usize)> = Vec::new();
    for i in 0..blocks.len() {
        let (fallthrough, branch_target) = match blocks[i].terminator() {
            Some(term) if term.op == Opcode::Jmp => {
                let target = resolve(&mut labels, &term.dst, i, term.line)?;
                (Some(target), None)
            }
            Some(term) => {
                let target = resolve(&mut labels, &term.dst, i, term.line)?;
                let next = (i + 1 < blocks.len()).then_some(i + 1);
                (next, Some(target))
            }
            None => ((i + 1 < blocks.len()).then_some(i + 1), None),
        };
        blocks[i].fallthrough = fallthrough;
        blocks[i].branch_target = branch_target;
        if let Some(t) = fallthrough {
            edges.push((i, t));
        }
        if let Some(t) = branch_target {
            edges.push((i, t));
        }
    }
    for (from, to) in edges {
        blocks[to].predecessors.insert(from);
    }
    Ok(labels)
}

fn resolve(
    labels: &mut LabelTable,
    name: &str,
    from: usize,
    line: u32,
) -> Result<usize, CompileError> {
    match labels.get_mut(name) {
        Some(info) => {
            info.inbound.push(from);
            Ok(info.block)
        }
        None => Err(CompileError::MalformedInput {
            line,
            message: format!("jump to undefined label `{name}`"),
        }),
    }
}
