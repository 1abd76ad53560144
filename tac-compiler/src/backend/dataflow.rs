//! Block-level data-flow fixpoint analysis.
//!
//! A definition-propagation analysis: GEN is the set of variables declared
//! in a block, KILL the set of plain-assignment destinations. The transfer
//! equations are
//!
//! ```text
//! IN[n]  = ⋃ OUT[p]  for p in pred(n)
//! OUT[n] = GEN[n] ∪ (IN[n] − KILL[n])
//! ```
//!
//! iterated over the whole CFG until no IN set changes. Termination is
//! guaranteed because the sets only grow and are bounded by the variable
//! universe. The result is informational; no later stage consumes it.

use super::block::BasicBlock;
use crate::tac::Opcode;
use log::debug;
use std::collections::HashSet;

/// Compute GEN/KILL and iterate IN/OUT to a fixpoint over all blocks.
/// Returns the number of passes the iteration took.
pub fn analyze(blocks: &mut [BasicBlock]) -> usize {
    for b in blocks.iter_mut() {
        let mut gen = HashSet::new();
        let mut kill = HashSet::new();
        for s in &b.stmts {
            if s.op.is_declaration() {
                gen.insert(s.dst.clone());
            } else if s.op == Opcode::Assign {
                kill.insert(s.dst.clone());
            }
        }
        b.dataflow.out_set = gen.clone();
        b.dataflow.in_set = HashSet::new();
        b.dataflow.gen = gen;
        b.dataflow.kill = kill;
    }

    let mut passes = 0;
    loop {
        passes += 1;
        let mut changed = false;
        for i in 0..blocks.len() {
            let mut new_in = HashSet::new();
            for &p in &blocks[i].predecessors {
                new_in.extend(blocks[p].dataflow.out_set.iter().cloned());
            }
            let df = &blocks[i].dataflow;
            let mut new_out = df.gen.clone();
            new_out.extend(new_in.difference(&df.kill).cloned());

            if new_in != df.in_set {
                changed = true;
            }
            let df = &mut blocks[i].dataflow;
            df.in_set = new_in;
            df.out_set = new_out;
        }
        if !changed {
            break;
        }
    }
    debug!("dataflow converged after {passes} passes over {} blocks", blocks.len());
    passes
}
