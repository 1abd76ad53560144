//! Per-block next-use analysis.
//!
//! A backward scan over one block computing, for every statement, the line
//! at which each referenced variable is next used. The register allocator
//! ranks eviction candidates by these distances.

use super::block::BasicBlock;
use crate::tac::Opcode;
use std::collections::HashMap;

/// Sentinel for "no further use in this block".
pub const NEVER: u32 = u32::MAX;

/// Recorded next-use entries, one row per statement of the block.
#[derive(Debug, Clone)]
pub struct NextUseTable {
    base: u32,
    rows: Vec<Vec<(String, u32)>>,
}

impl NextUseTable {
    /// Scan `block` from last statement to first. At each statement the
    /// *current* entries for its destination and sources are recorded
    /// (before this statement's own effect), then the destination is reset
    /// to the sentinel (it is about to be overwritten) and each source is
    /// marked as used here.
    pub fn build(block: &BasicBlock) -> NextUseTable {
        let base = block.stmts.first().map_or(0, |s| s.line);
        let mut rows = vec![Vec::new(); block.stmts.len()];
        let mut next_use: HashMap<String, u32> = HashMap::new();

        for (i, stmt) in block.stmts.iter().enumerate().rev() {
            if matches!(stmt.op, Opcode::Label | Opcode::Func | Opcode::Comment) {
                continue;
            }
            let mut row = Vec::new();
            let mut record = |name: &str, next_use: &HashMap<String, u32>| {
                let entry = next_use.get(name).copied().unwrap_or(NEVER);
                row.push((name.to_string(), entry));
            };
            if let Some(d) = stmt.def() {
                record(d, &next_use);
            }
            for u in stmt.uses() {
                record(u, &next_use);
            }
            rows[i] = row;

            if let Some(d) = stmt.def() {
                next_use.insert(d.to_string(), NEVER);
            }
            for u in stmt.uses() {
                next_use.insert(u.to_string(), stmt.line);
            }
        }
        NextUseTable { base, rows }
    }

    /// The recorded next use of `name` at `line`, or [`NEVER`].
    pub fn find(&self, line: u32, name: &str) -> u32 {
        let idx = line.checked_sub(self.base).map(|i| i as usize);
        idx.and_then(|i| self.rows.get(i))
            .and_then(|row| row.iter().find(|(n, _)| n == name))
            .map_or(NEVER, |(_, v)| *v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::cfg::Program;
    use crate::tac;

    fn block_of(src: &str) -> BasicBlock {
        let stmts = tac::parse(src).expect("parse");
        let prog = Program::from_statements(stmts).expect("link");
        assert_eq!(prog.blocks.len(), 1, "test input must form one block");
        prog.blocks.into_iter().next().unwrap()
    }

    #[test]
    fn source_next_use_points_at_reading_line() {
        let b = block_of("1, =, a, 5\n2, +, b, a, 1\n3, +, c, a, b\n");
        let t = NextUseTable::build(&b);
        // At line 2, `a` is read again at line 3.
        assert_eq!(t.find(2, "a"), 3);
        // At line 2, `b` is defined and next read at line 3.
        assert_eq!(t.find(2, "b"), 3);
    }

    #[test]
    fn unused_variable_reports_sentinel() {
        let b = block_of("1, =, a, 5\n2, =, b, 2\n3, +, c, b, 1\n");
        let t = NextUseTable::build(&b);
        assert_eq!(t.find(1, "a"), NEVER);
        assert_eq!(t.find(3, "c"), NEVER);
    }

    #[test]
    fn overwritten_destination_forgets_later_uses() {
        // The value written at line 1 is overwritten at line 2 without a
        // read in between, so at line 1 it has no next use; the value
        // written at line 2 is read at line 3.
        let b = block_of("1, =, a, 1\n2, =, a, 2\n3, printint, a\n");
        let t = NextUseTable::build(&b);
        assert_eq!(t.find(2, "a"), 3);
        assert_eq!(t.find(1, "a"), NEVER);
    }
}
