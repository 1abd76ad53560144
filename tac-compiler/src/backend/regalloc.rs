//! Local (per-block) register allocation with spilling.
//!
//! Every variable has a memory home in the data segment; the allocator
//! keeps two inverse-consistent descriptor maps (variable → location,
//! register → occupant) and a free queue ranked by next-use distance.
//! Popping the queue yields the register whose current value is needed
//! furthest in the future — free registers rank as infinite and win ties —
//! so eviction follows the classic furthest-next-use policy.
//!
//! Registers popped or touched while allocating one statement's operands
//! are held in a pending set, invisible to further pops until the statement
//! is finished and they re-enter the queue with refreshed priorities.

use super::mips::{Addr, AsmLine, MipsInstr, Reg};
use super::nextuse::{NextUseTable, NEVER};
use crate::CompileError;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Location(s) of a variable's current value.
#[derive(Debug, Clone, Default)]
pub struct AddressDesc {
    pub reg: Option<Reg>,
    /// True when the memory home holds the current value.
    pub in_memory: bool,
}

/// Current occupant of a register.
#[derive(Debug, Clone, Default)]
pub struct RegisterDesc {
    pub owner: Option<String>,
    /// Set the instant the register's value diverges from memory; cleared
    /// by the store that re-synchronizes them.
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueueEntry {
    next_use: u32,
    /// Free registers outrank occupied ones at equal distance.
    free: bool,
    /// Position in the pool; earlier registers pop first among equals.
    pref: usize,
    reg: Reg,
    stamp: u64,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.next_use
            .cmp(&other.next_use)
            .then(self.free.cmp(&other.free))
            .then(other.pref.cmp(&self.pref))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct Allocator {
    pool: Vec<Reg>,
    addr: HashMap<String, AddressDesc>,
    regs: HashMap<Reg, RegisterDesc>,
    queue: BinaryHeap<QueueEntry>,
    /// Current stamp per register; queue entries with an older stamp are
    /// stale and discarded on pop.
    stamps: HashMap<Reg, u64>,
    counter: u64,
    /// Registers taken or touched during the current statement.
    pending: HashSet<Reg>,
    /// Array names bind base addresses; they are never stored back.
    arrays: HashSet<String>,
}

impl Allocator {
    pub fn new(pool: &[Reg], arrays: HashSet<String>) -> Allocator {
        let mut a = Allocator {
            pool: pool.to_vec(),
            addr: HashMap::new(),
            regs: HashMap::new(),
            queue: BinaryHeap::new(),
            stamps: HashMap::new(),
            counter: 0,
            pending: HashSet::new(),
            arrays,
        };
        a.reset();
        a
    }

    /// Rebuild all per-block state: every pool register free, no bindings.
    pub fn reset(&mut self) {
        self.addr.clear();
        self.regs.clear();
        self.queue.clear();
        self.stamps.clear();
        self.pending.clear();
        let pool = self.pool.clone();
        for &r in &pool {
            self.regs.insert(r, RegisterDesc::default());
            self.push_entry(r, NEVER, true);
        }
    }

    fn push_entry(&mut self, reg: Reg, next_use: u32, free: bool) {
        let pref = self.pool.iter().position(|&r| r == reg).unwrap_or(usize::MAX);
        self.counter += 1;
        self.stamps.insert(reg, self.counter);
        self.queue.push(QueueEntry { next_use, free, pref, reg, stamp: self.counter });
    }

    /// Invalidate a register's queue entry without reinserting it.
    fn withdraw(&mut self, reg: Reg) {
        self.counter += 1;
        self.stamps.insert(reg, self.counter);
        self.pending.insert(reg);
    }

    // ── Core allocation ─────────────────────────────────────────────────

    /// Pop the best eviction candidate, spilling its occupant if needed.
    /// The returned register is pending until `finish_statement`.
    fn take_free(&mut self, out: &mut Vec<AsmLine>) -> Result<Reg, CompileError> {
        loop {
            let entry = self.queue.pop().ok_or_else(|| {
                CompileError::Internal(
                    "register pool exhausted after eviction".to_string(),
                )
            })?;
            if self.stamps.get(&entry.reg) != Some(&entry.stamp) {
                continue; // stale
            }
            let reg = entry.reg;
            self.withdraw(reg);
            self.evict(reg, out);
            return Ok(reg);
        }
    }

    /// Detach the current occupant of `reg`, storing it first when its
    /// register value is newer than memory. Array aliases hold addresses,
    /// not values, and are never stored.
    fn evict(&mut self, reg: Reg, out: &mut Vec<AsmLine>) {
        let desc = self.regs.get_mut(&reg).expect("pool register");
        let Some(owner) = desc.owner.take() else {
            return;
        };
        let dirty = std::mem::take(&mut desc.dirty);
        let loc = self.addr.entry(owner.clone()).or_default();
        loc.reg = None;
        if dirty && !self.arrays.contains(&owner) {
            loc.in_memory = true;
            out.push(AsmLine::Instr(MipsInstr::Sw { s: reg, addr: Addr::Label(owner) }));
        }
    }

    fn bind(&mut self, name: &str, reg: Reg) {
        let desc = self.regs.get_mut(&reg).expect("pool register");
        desc.owner = Some(name.to_string());
        desc.dirty = false;
        self.addr.entry(name.to_string()).or_default().reg = Some(reg);
    }

    /// Register currently holding `name`, if any.
    pub fn reg_of(&self, name: &str) -> Option<Reg> {
        self.addr.get(name).and_then(|l| l.reg)
    }

    /// Ensure a source variable is in a register, loading it from its
    /// memory home (or its base address, for arrays) when it is not.
    pub fn ensure_source(
        &mut self,
        name: &str,
        out: &mut Vec<AsmLine>,
    ) -> Result<Reg, CompileError> {
        if let Some(reg) = self.reg_of(name) {
            self.withdraw(reg);
            return Ok(reg);
        }
        let reg = self.take_free(out)?;
        if self.arrays.contains(name) {
            out.push(AsmLine::Instr(MipsInstr::La {
                d: reg,
                addr: Addr::Label(name.to_string()),
            }));
        } else {
            out.push(AsmLine::Instr(MipsInstr::Lw {
                d: reg,
                addr: Addr::Label(name.to_string()),
            }));
        }
        self.bind(name, reg);
        if let Some(loc) = self.addr.get_mut(name) {
            // The register was just filled from the memory home.
            loc.in_memory = true;
        }
        Ok(reg)
    }

    /// Ensure a destination variable has a register without loading its old
    /// value; the caller emits the defining instruction and marks it dirty.
    pub fn ensure_dest(
        &mut self,
        name: &str,
        out: &mut Vec<AsmLine>,
    ) -> Result<Reg, CompileError> {
        if let Some(reg) = self.reg_of(name) {
            self.withdraw(reg);
            return Ok(reg);
        }
        let reg = self.take_free(out)?;
        self.bind(name, reg);
        Ok(reg)
    }

    /// A scratch register owned by no variable (literals, address math).
    pub fn take_temp(&mut self, out: &mut Vec<AsmLine>) -> Result<Reg, CompileError> {
        self.take_free(out)
    }

    /// Note a read that bypasses allocation (syscall argument moves), so
    /// the register's queue priority refreshes at the end of the statement.
    pub fn touch(&mut self, name: &str) {
        if let Some(reg) = self.reg_of(name) {
            self.withdraw(reg);
        }
    }

    /// The register's value now differs from the variable's memory home.
    pub fn mark_dirty(&mut self, name: &str) {
        if let Some(reg) = self.reg_of(name) {
            if let Some(desc) = self.regs.get_mut(&reg) {
                desc.dirty = true;
            }
        }
        if let Some(loc) = self.addr.get_mut(name) {
            loc.in_memory = false;
        }
    }

    /// Evict the occupant of one specific register (syscall argument
    /// registers are clobbered through this).
    pub fn clobber(&mut self, reg: Reg, out: &mut Vec<AsmLine>) {
        if !self.regs.contains_key(&reg) {
            return;
        }
        self.withdraw(reg);
        self.evict(reg, out);
    }

    /// Reinsert every pending register with a refreshed priority: the
    /// occupant's next use after `line`, or infinite for a free register.
    pub fn finish_statement(&mut self, line: u32, table: &NextUseTable) {
        let mut pending: Vec<Reg> = self.pending.drain().collect();
        pending.sort();
        for reg in pending {
            let (next_use, free) = match &self.regs[&reg].owner {
                Some(owner) => (table.find(line, owner), false),
                None => (NEVER, true),
            };
            self.push_entry(reg, next_use, free);
        }
    }

    // ── Flushing ────────────────────────────────────────────────────────

    /// Store every dirty register to its memory home, in register order.
    /// Bindings survive; dirty bits clear.
    pub fn flush_dirty(&mut self, out: &mut Vec<AsmLine>) {
        let mut dirty: Vec<Reg> = self
            .regs
            .iter()
            .filter(|(_, d)| d.dirty)
            .map(|(&r, _)| r)
            .collect();
        dirty.sort();
        for reg in dirty {
            let desc = self.regs.get_mut(&reg).expect("pool register");
            let owner = desc.owner.clone().expect("dirty register has an owner");
            desc.dirty = false;
            if !self.arrays.contains(&owner) {
                self.addr.entry(owner.clone()).or_default().in_memory = true;
                out.push(AsmLine::Instr(MipsInstr::Sw { s: reg, addr: Addr::Label(owner) }));
            }
        }
    }

    /// Caller-saves discipline around a `call`: store every dirty value,
    /// then release all bindings — the callee may clobber anything.
    pub fn flush_for_call(&mut self, out: &mut Vec<AsmLine>) {
        self.flush_dirty(out);
        let mut held: Vec<Reg> = self
            .regs
            .iter()
            .filter(|(_, d)| d.owner.is_some())
            .map(|(&r, _)| r)
            .collect();
        held.sort();
        for reg in held {
            self.evict(reg, out);
            self.withdraw(reg);
        }
    }

    /// Descriptor inverse-consistency: at most one register per variable
    /// and one variable per register. An inconsistent pair is an allocator
    /// bug, reported as an internal error.
    pub fn check_consistency(&self) -> Result<(), CompileError> {
        for (name, loc) in &self.addr {
            if let Some(reg) = loc.reg {
                let owner = self.regs.get(&reg).and_then(|d| d.owner.as_deref());
                if owner != Some(name.as_str()) {
                    return Err(CompileError::Internal(format!(
                        "descriptor mismatch: `{name}` claims {reg} owned by {owner:?}"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::cfg::Program;
    use crate::tac;

    fn table_for(src: &str) -> NextUseTable {
        let stmts = tac::parse(src).expect("parse");
        let prog = Program::from_statements(stmts).expect("link");
        NextUseTable::build(&prog.blocks[0])
    }

    fn stores_in(out: &[AsmLine]) -> Vec<String> {
        out.iter()
            .filter_map(|l| match l {
                AsmLine::Instr(MipsInstr::Sw { addr: Addr::Label(n), .. }) => Some(n.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn eviction_prefers_furthest_next_use() {
        // a is next used at line 4, b at line 6; with two registers the
        // allocation for c at line 3 must evict b, never a.
        let src = "1, =, a, 1\n2, =, b, 2\n3, =, c, 3\n4, printint, a\n5, printint, c\n6, printint, b\n";
        let table = table_for(src);
        let pool = [Reg::T0, Reg::T1];
        let mut alloc = Allocator::new(&pool, HashSet::new());
        let mut out = Vec::new();

        let ra = alloc.ensure_dest("a", &mut out).unwrap();
        alloc.mark_dirty("a");
        alloc.finish_statement(1, &table);
        let rb = alloc.ensure_dest("b", &mut out).unwrap();
        alloc.mark_dirty("b");
        alloc.finish_statement(2, &table);
        assert_ne!(ra, rb);

        out.clear();
        alloc.ensure_dest("c", &mut out).unwrap();
        alloc.mark_dirty("c");
        alloc.finish_statement(3, &table);
        assert_eq!(stores_in(&out), vec!["b".to_string()]);
        assert_eq!(alloc.reg_of("b"), None);
        assert_eq!(alloc.reg_of("a"), Some(ra));
    }

    #[test]
    fn operands_of_one_statement_never_evict_each_other() {
        // Pool of two: allocating both sources of `c = a + b` must not let
        // the second pop reuse the first operand's register.
        let src = "1, =, a, 1\n2, =, b, 2\n3, +, c, a, b\n";
        let table = table_for(src);
        let pool = [Reg::T0, Reg::T1];
        let mut alloc = Allocator::new(&pool, HashSet::new());
        let mut out = Vec::new();

        let ra = alloc.ensure_source("a", &mut out).unwrap();
        let rb = alloc.ensure_source("b", &mut out).unwrap();
        assert_ne!(ra, rb);
        alloc.finish_statement(3, &table);
        alloc.check_consistency().unwrap();
    }

    #[test]
    fn exhausted_pool_is_an_internal_error() {
        let pool = [Reg::T0, Reg::T1];
        let mut alloc = Allocator::new(&pool, HashSet::new());
        let mut out = Vec::new();
        alloc.ensure_source("a", &mut out).unwrap();
        alloc.ensure_source("b", &mut out).unwrap();
        // Both registers are pending within this statement; a third
        // request has nothing left to evict.
        let err = alloc.take_temp(&mut out).unwrap_err();
        assert!(matches!(err, CompileError::Internal(_)));
    }

    #[test]
    fn descriptors_stay_inverse_consistent() {
        let src = "1, =, a, 1\n2, +, b, a, 1\n3, +, a, b, 1\n4, printint, a\n";
        let table = table_for(src);
        let pool = [Reg::T0, Reg::T1];
        let mut alloc = Allocator::new(&pool, HashSet::new());
        let mut out = Vec::new();

        alloc.ensure_dest("a", &mut out).unwrap();
        alloc.mark_dirty("a");
        alloc.finish_statement(1, &table);
        alloc.check_consistency().unwrap();

        alloc.ensure_source("a", &mut out).unwrap();
        alloc.ensure_dest("b", &mut out).unwrap();
        alloc.mark_dirty("b");
        alloc.finish_statement(2, &table);
        alloc.check_consistency().unwrap();

        alloc.ensure_source("b", &mut out).unwrap();
        alloc.ensure_dest("a", &mut out).unwrap();
        alloc.mark_dirty("a");
        alloc.finish_statement(3, &table);
        alloc.check_consistency().unwrap();
    }

    #[test]
    fn arrays_are_never_stored_back() {
        let src = "1, =, p, arr\n2, printint, p\n";
        let table = table_for(src);
        let pool = [Reg::T0];
        let arrays: HashSet<String> = ["arr".to_string()].into_iter().collect();
        let mut alloc = Allocator::new(&pool, arrays);
        let mut out = Vec::new();

        alloc.ensure_source("arr", &mut out).unwrap();
        alloc.finish_statement(1, &table);
        // The single register must be reclaimable without a store even
        // after the array base was touched.
        out.clear();
        alloc.ensure_dest("p", &mut out).unwrap();
        assert!(stores_in(&out).is_empty());
    }
}
