//! Peephole optimization over the block list.
//!
//! Two independent rewrites, each run once per program, in this order:
//!
//! 1. **Jump-over-jump folding** — `if C goto L1 / jmp L2 / L1: ...` becomes
//!    `if !C goto L2 / ...` by negating the branch and retargeting it.
//! 2. **Control-flow simplification** — blocks consisting of a single
//!    unconditional jump are dropped when reachable only through jumps;
//!    every jump into a dropped block is retargeted along the drop chain.
//!
//! Both passes rebuild the block list and renumber statement lines, so the
//! flow graph stays consistent for the code generator.

use super::cfg::{DropState, Program};
use crate::tac::{Opcode, Statement};
use crate::CompileError;
use log::debug;

/// Fold conditional-branch-over-jump patterns in the statement stream.
///
/// The pattern spans block boundaries, so the program is flattened, folded,
/// and rebuilt.
pub fn fold_jump_over_jump(program: &mut Program) -> Result<(), CompileError> {
    let mut stmts = std::mem::replace(program, Program::empty()).into_statements();
    let mut folded = 0usize;

    let mut i = 0;
    while i + 2 < stmts.len() {
        let is_pattern = stmts[i].op.is_cond_branch()
            && stmts[i + 1].op == Opcode::Jmp
            && stmts[i + 2].op == Opcode::Label
            && stmts[i + 2].dst == stmts[i].dst;
        if is_pattern {
            let negated = stmts[i].op.negate().ok_or_else(|| {
                CompileError::Internal(format!(
                    "branch opcode {:?} has no negation",
                    stmts[i].op
                ))
            })?;
            stmts[i].op = negated;
            stmts[i].dst = stmts[i + 1].dst.clone();
            // Remove the jump and the now-unreferenced intermediate label;
            // the statements that followed it fall into place.
            stmts.drain(i + 1..i + 3);
            folded += 1;
        } else {
            i += 1;
        }
    }

    if folded > 0 {
        debug!("folded {folded} jump-over-jump patterns");
    }
    *program = Program::from_statements(stmts)?;
    Ok(())
}

/// Drop jump-only blocks reachable only through jumps and retarget every
/// reference along the chain of dropped blocks.
pub fn simplify_control_flow(program: &mut Program) -> Result<(), CompileError> {
    mark_drop_candidates(program);
    promote_candidates(program);

    let dropped: Vec<usize> = program
        .labels
        .values()
        .filter(|info| info.drop_state == DropState::WillDrop)
        .map(|info| info.block)
        .collect();
    if dropped.is_empty() {
        return Ok(());
    }
    debug!("dropping {} single-jump blocks", dropped.len());

    retarget_jumps(program);

    // Remove WillDrop blocks in ascending index order, then rebuild.
    let drop_set: std::collections::HashSet<usize> = dropped.into_iter().collect();
    let blocks = std::mem::take(&mut program.blocks);
    let kept: Vec<Statement> = blocks
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !drop_set.contains(i))
        .flat_map(|(_, b)| b.stmts)
        .collect();
    *program = Program::from_statements(kept)?;
    Ok(())
}

/// First pass: a labelled block whose only real statement is an
/// unconditional jump is `MaybeDrop`, unless the preceding block can fall
/// into it (its last statement is not a jump, branch, or comment), which
/// pins it `CannotDrop`.
fn mark_drop_candidates(program: &mut Program) {
    for i in 0..program.blocks.len() {
        let block = &program.blocks[i];
        let Some(name) = block.label().map(str::to_string) else {
            continue;
        };
        if block.stmts.first().map(|s| s.op) == Some(Opcode::Func) {
            continue;
        }
        if !block.is_single_jump() {
            continue;
        }
        let fallthrough_target = match i.checked_sub(1).and_then(|p| program.blocks[p].stmts.last())
        {
            Some(prev) => !(prev.op.is_terminator() || prev.op == Opcode::Comment),
            // The entry block is always reachable from above.
            None => true,
        };
        let next = if fallthrough_target {
            DropState::CannotDrop
        } else {
            DropState::MaybeDrop
        };
        if let Some(info) = program.labels.get_mut(&name) {
            info.drop_state.promote(next);
        }
    }
}

/// Second pass over all jump/branch statements: a `MaybeDrop` target
/// referenced by at least one jump is confirmed `WillDrop`; so is a
/// `MaybeDrop` label nothing references at all (unreachable).
fn promote_candidates(program: &mut Program) {
    for block in &program.blocks {
        if let Some(term) = block.terminator() {
            if let Some(info) = program.labels.get_mut(&term.dst) {
                if info.drop_state == DropState::MaybeDrop {
                    info.drop_state.promote(DropState::WillDrop);
                }
            }
        }
    }
    for info in program.labels.values_mut() {
        if info.drop_state == DropState::MaybeDrop && info.inbound.is_empty() {
            info.drop_state.promote(DropState::WillDrop);
        }
    }
}

/// Retarget every jump/branch whose destination is dropped to the first
/// surviving block along the drop chain. A chain may end at a block that is
/// only reached by fallthrough; the retargeted label is still valid because
/// drop candidates always carry a label.
fn retarget_jumps(program: &mut Program) {
    let labels = &program.labels;
    let blocks = &program.blocks;

    let resolve = |start: &str| -> String {
        let mut cur = start.to_string();
        let mut hops = 0;
        while let Some(info) = labels.get(&cur) {
            if info.drop_state != DropState::WillDrop || hops > blocks.len() {
                break;
            }
            // Dropped blocks are jump-only, so the chain never crosses a
            // conditional branch.
            match blocks[info.block].terminator() {
                Some(term) if term.op == Opcode::Jmp => cur = term.dst.clone(),
                _ => break,
            }
            hops += 1;
        }
        cur
    };

    let mut rewrites: Vec<(usize, String)> = Vec::new();
    for (i, block) in program.blocks.iter().enumerate() {
        if let Some(term) = block.terminator() {
            let is_dropped = labels
                .get(&term.dst)
                .is_some_and(|info| info.drop_state == DropState::WillDrop);
            if is_dropped {
                rewrites.push((i, resolve(&term.dst)));
            }
        }
    }
    for (i, new_target) in rewrites {
        if let Some(term) = program.blocks[i].stmts.last_mut() {
            term.dst = new_target;
        }
    }
}

impl Program {
    fn empty() -> Program {
        Program { blocks: Vec::new(), labels: Default::default() }
    }
}
