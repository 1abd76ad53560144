//! Final code generation: IR statements → MIPS assembly text.
//!
//! Two linear passes over the block list. The first collects every declared
//! variable into the data segment and checks for the program entry point.
//! The second walks each block, driving the register allocator statement by
//! statement and emitting instruction templates per opcode. Block-ending
//! jumps and branches are emitted only after every dirty register has been
//! flushed in sorted register order, so control never leaves a block with
//! stale memory.

use super::cfg::Program;
use super::mips::{Addr, AsmLine, BinOp, BranchArg, BranchOp, DataDirective, MipsInstr, Reg, ShiftOp};
use super::nextuse::NextUseTable;
use super::regalloc::Allocator;
use super::CodegenOptions;
use crate::tac::{is_int_literal, Opcode, Operand, Statement};
use crate::CompileError;
use std::collections::HashSet;
use std::fmt::Write as _;

/// Name of the program entry function.
pub const ENTRY_FUNC: &str = "main";

pub fn generate(
    program: &Program,
    prelude: Option<&str>,
    opts: &CodegenOptions,
) -> Result<String, CompileError> {
    let mut g = Codegen {
        runtime: opts.runtime,
        data: Vec::new(),
        seen: HashSet::new(),
        arrays: HashSet::new(),
        global_init: Vec::new(),
        text: Vec::new(),
    };
    g.collect_data(program)?;
    g.emit_text(program)?;
    Ok(g.render(prelude))
}

struct Codegen {
    runtime: bool,
    data: Vec<(String, DataDirective)>,
    /// Guards against declaring a data label twice.
    seen: HashSet<String>,
    arrays: HashSet<String>,
    /// Code of blocks outside any function, inlined at the top of `main`.
    global_init: Vec<AsmLine>,
    text: Vec<AsmLine>,
}

impl Codegen {
    // ── Pass 1: data segment and entry check ────────────────────────────

    fn collect_data(&mut self, program: &Program) -> Result<(), CompileError> {
        let mut has_entry = false;
        for stmt in program.blocks.iter().flat_map(|b| &b.stmts) {
            match stmt.op {
                Opcode::Func if stmt.dst == ENTRY_FUNC => has_entry = true,
                Opcode::Decl => {
                    let len = match stmt.src.first() {
                        Some(Operand::Imm(n)) if *n >= 0 => *n as usize,
                        _ => {
                            return Err(CompileError::MalformedInput {
                                line: stmt.line,
                                message: format!("decl `{}` needs a length", stmt.dst),
                            })
                        }
                    };
                    if self.seen.insert(stmt.dst.clone()) {
                        self.arrays.insert(stmt.dst.clone());
                        self.data.push((stmt.dst.clone(), DataDirective::Space(len * 4)));
                    }
                }
                Opcode::DeclInt => {
                    if self.seen.insert(stmt.dst.clone()) {
                        self.data.push((stmt.dst.clone(), DataDirective::Word(0)));
                    }
                }
                Opcode::DeclStr => {
                    let payload = match stmt.src.first() {
                        Some(Operand::Sym(s)) => s.clone(),
                        _ => String::new(),
                    };
                    if self.seen.insert(stmt.dst.clone()) {
                        self.data.push((stmt.dst.clone(), DataDirective::Asciiz(payload)));
                    }
                }
                _ => {}
            }
        }
        if !has_entry && !self.runtime {
            return Err(CompileError::MissingEntryPoint);
        }
        Ok(())
    }

    // ── Pass 2: text segment ────────────────────────────────────────────

    fn emit_text(&mut self, program: &Program) -> Result<(), CompileError> {
        let first_func = program
            .blocks
            .iter()
            .position(|b| b.stmts.first().map(|s| s.op) == Some(Opcode::Func));
        let split = if self.runtime { 0 } else { first_func.unwrap_or(program.blocks.len()) };

        let mut alloc = Allocator::new(&Reg::ALLOCATABLE, self.arrays.clone());

        // Blocks outside any function: buffered, spliced at the top of main.
        let mut buf = Vec::new();
        for b in &program.blocks[..split] {
            self.emit_block(b, &mut alloc, &mut buf)?;
        }
        self.global_init = buf;

        let mut text = Vec::new();
        let mut current_func: Option<String> = None;
        for b in &program.blocks[split..] {
            if let Some(first) = b.stmts.first() {
                if first.op == Opcode::Func {
                    if let Some(prev) = current_func.take() {
                        text.push(AsmLine::Directive(format!(".end {prev}")));
                        text.push(AsmLine::Blank);
                    }
                    current_func = Some(first.dst.clone());
                }
            }
            self.emit_block(b, &mut alloc, &mut text)?;
        }
        if let Some(prev) = current_func.take() {
            text.push(AsmLine::Directive(format!(".end {prev}")));
        }
        self.text = text;
        Ok(())
    }

    fn emit_block(
        &mut self,
        block: &super::block::BasicBlock,
        alloc: &mut Allocator,
        out: &mut Vec<AsmLine>,
    ) -> Result<(), CompileError> {
        alloc.reset();
        let table = NextUseTable::build(block);

        for stmt in &block.stmts {
            self.emit_stmt(stmt, alloc, out)?;
            alloc.finish_statement(stmt.line, &table);
        }
        // Fallthrough exit: terminator-ended blocks flushed before the
        // branch was appended.
        if block.terminator().is_none() {
            alloc.flush_dirty(out);
        }
        Ok(())
    }

    fn emit_stmt(
        &mut self,
        stmt: &Statement,
        alloc: &mut Allocator,
        out: &mut Vec<AsmLine>,
    ) -> Result<(), CompileError> {
        match stmt.op {
            Opcode::Label => out.push(AsmLine::Label(stmt.dst.clone())),
            Opcode::Func => {
                out.push(AsmLine::Label(stmt.dst.clone()));
                if stmt.dst == ENTRY_FUNC && !self.runtime {
                    out.append(&mut self.global_init);
                }
            }
            Opcode::Comment => out.push(AsmLine::Comment(stmt.dst.clone())),
            Opcode::Decl | Opcode::DeclInt | Opcode::DeclStr => {
                // Data segment only; no code.
            }

            Opcode::Assign => {
                match src_at(stmt, 0)? {
                    Operand::Imm(v) => {
                        let rd = alloc.ensure_dest(&stmt.dst, out)?;
                        out.push(AsmLine::Instr(MipsInstr::Li { d: rd, imm: *v }));
                    }
                    Operand::Sym(name) => {
                        let rs = alloc.ensure_source(name, out)?;
                        let rd = alloc.ensure_dest(&stmt.dst, out)?;
                        if rd != rs {
                            out.push(AsmLine::Instr(MipsInstr::Move { d: rd, s: rs }));
                        }
                    }
                }
                alloc.mark_dirty(&stmt.dst);
            }

            Opcode::Add => {
                // `addi` for a literal addend, the three-register form otherwise.
                if let Operand::Imm(v) = src_at(stmt, 1)? {
                    let imm = *v;
                    let ra = operand_reg(alloc, src_at(stmt, 0)?, out)?;
                    let rd = alloc.ensure_dest(&stmt.dst, out)?;
                    out.push(AsmLine::Instr(MipsInstr::Addi { d: rd, a: ra, imm }));
                } else {
                    self.emit_bin(BinOp::Add, stmt, alloc, out)?;
                }
                alloc.mark_dirty(&stmt.dst);
            }
            Opcode::Sub => self.emit_bin_dirty(BinOp::Sub, stmt, alloc, out)?,
            Opcode::Mul => self.emit_bin_dirty(BinOp::Mul, stmt, alloc, out)?,
            Opcode::Div => self.emit_bin_dirty(BinOp::Div, stmt, alloc, out)?,
            Opcode::Mod => self.emit_bin_dirty(BinOp::Rem, stmt, alloc, out)?,
            Opcode::And => self.emit_bin_dirty(BinOp::And, stmt, alloc, out)?,
            Opcode::Or => self.emit_bin_dirty(BinOp::Or, stmt, alloc, out)?,
            Opcode::Nor => self.emit_bin_dirty(BinOp::Nor, stmt, alloc, out)?,
            Opcode::Xor => self.emit_bin_dirty(BinOp::Xor, stmt, alloc, out)?,

            Opcode::Not => {
                let rs = operand_reg(alloc, src_at(stmt, 0)?, out)?;
                let rd = alloc.ensure_dest(&stmt.dst, out)?;
                out.push(AsmLine::Instr(MipsInstr::Not { d: rd, s: rs }));
                alloc.mark_dirty(&stmt.dst);
            }

            Opcode::ShiftL | Opcode::ShiftR => {
                let op = if stmt.op == Opcode::ShiftL { ShiftOp::Sll } else { ShiftOp::Srl };
                let ra = operand_reg(alloc, src_at(stmt, 0)?, out)?;
                match src_at(stmt, 1)? {
                    Operand::Imm(amt) => {
                        let amt = *amt;
                        let rd = alloc.ensure_dest(&stmt.dst, out)?;
                        out.push(AsmLine::Instr(MipsInstr::ShiftImm { op, d: rd, a: ra, amt }));
                    }
                    Operand::Sym(name) => {
                        let rb = alloc.ensure_source(name, out)?;
                        let rd = alloc.ensure_dest(&stmt.dst, out)?;
                        out.push(AsmLine::Instr(MipsInstr::ShiftReg { op, d: rd, a: ra, b: rb }));
                    }
                }
                alloc.mark_dirty(&stmt.dst);
            }

            Opcode::From => {
                let base = sym_at(stmt, 0)?.to_string();
                let addr = self.element_addr(&base, src_at(stmt, 1)?, alloc, out)?;
                let rd = alloc.ensure_dest(&stmt.dst, out)?;
                out.push(AsmLine::Instr(MipsInstr::Lw { d: rd, addr }));
                alloc.mark_dirty(&stmt.dst);
            }
            Opcode::Into => {
                let rv = operand_reg(alloc, src_at(stmt, 1)?, out)?;
                let addr = self.element_addr(&stmt.dst, src_at(stmt, 0)?, alloc, out)?;
                out.push(AsmLine::Instr(MipsInstr::Sw { s: rv, addr }));
            }

            Opcode::ScanInt => {
                out.push(AsmLine::Instr(MipsInstr::Li { d: Reg::RETVAL, imm: 5 }));
                out.push(AsmLine::Instr(MipsInstr::Syscall));
                let rd = alloc.ensure_dest(&stmt.dst, out)?;
                out.push(AsmLine::Instr(MipsInstr::Move { d: rd, s: Reg::RETVAL }));
                alloc.mark_dirty(&stmt.dst);
            }
            Opcode::PrintInt => {
                alloc.clobber(Reg::SYSARG, out);
                if is_int_literal(&stmt.dst) {
                    let imm = dst_imm(stmt)?;
                    out.push(AsmLine::Instr(MipsInstr::Li { d: Reg::SYSARG, imm }));
                } else if let Some(r) = alloc.reg_of(&stmt.dst) {
                    alloc.touch(&stmt.dst);
                    out.push(AsmLine::Instr(MipsInstr::Move { d: Reg::SYSARG, s: r }));
                } else {
                    out.push(AsmLine::Instr(MipsInstr::Lw {
                        d: Reg::SYSARG,
                        addr: Addr::Label(stmt.dst.clone()),
                    }));
                }
                out.push(AsmLine::Instr(MipsInstr::Li { d: Reg::RETVAL, imm: 1 }));
                out.push(AsmLine::Instr(MipsInstr::Syscall));
            }
            Opcode::PrintStr => {
                alloc.clobber(Reg::SYSARG, out);
                out.push(AsmLine::Instr(MipsInstr::La {
                    d: Reg::SYSARG,
                    addr: Addr::Label(stmt.dst.clone()),
                }));
                out.push(AsmLine::Instr(MipsInstr::Li { d: Reg::RETVAL, imm: 4 }));
                out.push(AsmLine::Instr(MipsInstr::Syscall));
            }

            Opcode::Call => {
                // Caller saves: every dirty value reaches memory and all
                // bindings drop before control transfers.
                alloc.flush_for_call(out);
                out.push(AsmLine::Instr(MipsInstr::Addi { d: Reg::STACK_PTR, a: Reg::STACK_PTR, imm: -4 }));
                out.push(AsmLine::Instr(MipsInstr::Sw {
                    s: Reg::RET_ADDR,
                    addr: Addr::Offset(0, Reg::STACK_PTR),
                }));
                out.push(AsmLine::Instr(MipsInstr::Jal(stmt.dst.clone())));
                out.push(AsmLine::Instr(MipsInstr::Lw {
                    d: Reg::RET_ADDR,
                    addr: Addr::Offset(0, Reg::STACK_PTR),
                }));
                out.push(AsmLine::Instr(MipsInstr::Addi { d: Reg::STACK_PTR, a: Reg::STACK_PTR, imm: 4 }));
            }
            Opcode::Store => {
                let rd = alloc.ensure_dest(&stmt.dst, out)?;
                out.push(AsmLine::Instr(MipsInstr::Move { d: rd, s: Reg::RETVAL }));
                alloc.mark_dirty(&stmt.dst);
            }
            Opcode::Ret => {
                if !stmt.dst.is_empty() {
                    if is_int_literal(&stmt.dst) {
                        let imm = dst_imm(stmt)?;
                        out.push(AsmLine::Instr(MipsInstr::Li { d: Reg::RETVAL, imm }));
                    } else if let Some(r) = alloc.reg_of(&stmt.dst) {
                        alloc.touch(&stmt.dst);
                        out.push(AsmLine::Instr(MipsInstr::Move { d: Reg::RETVAL, s: r }));
                    } else {
                        out.push(AsmLine::Instr(MipsInstr::Lw {
                            d: Reg::RETVAL,
                            addr: Addr::Label(stmt.dst.clone()),
                        }));
                    }
                }
                alloc.flush_dirty(out);
                out.push(AsmLine::Instr(MipsInstr::Jr(Reg::RET_ADDR)));
            }

            Opcode::Jmp => {
                alloc.flush_dirty(out);
                out.push(AsmLine::Instr(MipsInstr::J(stmt.dst.clone())));
            }
            Opcode::Bgt | Opcode::Bge | Opcode::Blt | Opcode::Ble | Opcode::Beq | Opcode::Bne => {
                let op = match stmt.op {
                    Opcode::Bgt => BranchOp::Bgt,
                    Opcode::Bge => BranchOp::Bge,
                    Opcode::Blt => BranchOp::Blt,
                    Opcode::Ble => BranchOp::Ble,
                    Opcode::Beq => BranchOp::Beq,
                    _ => BranchOp::Bne,
                };
                let ra = operand_reg(alloc, src_at(stmt, 0)?, out)?;
                let rb = match src_at(stmt, 1)? {
                    Operand::Imm(v) => BranchArg::Imm(*v),
                    Operand::Sym(name) => BranchArg::Reg(alloc.ensure_source(name, out)?),
                };
                // The branch leaves the block: flush first, branch last.
                alloc.flush_dirty(out);
                out.push(AsmLine::Instr(MipsInstr::Branch {
                    op,
                    a: ra,
                    b: rb,
                    target: stmt.dst.clone(),
                }));
            }
        }
        Ok(())
    }

    fn emit_bin(
        &mut self,
        op: BinOp,
        stmt: &Statement,
        alloc: &mut Allocator,
        out: &mut Vec<AsmLine>,
    ) -> Result<(), CompileError> {
        let ra = operand_reg(alloc, src_at(stmt, 0)?, out)?;
        let rb = operand_reg(alloc, src_at(stmt, 1)?, out)?;
        let rd = alloc.ensure_dest(&stmt.dst, out)?;
        out.push(AsmLine::Instr(MipsInstr::Bin { op, d: rd, a: ra, b: rb }));
        Ok(())
    }

    fn emit_bin_dirty(
        &mut self,
        op: BinOp,
        stmt: &Statement,
        alloc: &mut Allocator,
        out: &mut Vec<AsmLine>,
    ) -> Result<(), CompileError> {
        self.emit_bin(op, stmt, alloc, out)?;
        alloc.mark_dirty(&stmt.dst);
        Ok(())
    }

    /// Address of `base[index]`: constant indices fold into the label,
    /// variable indices scale through a scratch register.
    fn element_addr(
        &mut self,
        base: &str,
        index: &Operand,
        alloc: &mut Allocator,
        out: &mut Vec<AsmLine>,
    ) -> Result<Addr, CompileError> {
        match index {
            Operand::Imm(i) => Ok(Addr::LabelOffset(base.to_string(), i * 4)),
            Operand::Sym(name) => {
                let ri = alloc.ensure_source(name, out)?;
                let t = alloc.take_temp(out)?;
                out.push(AsmLine::Instr(MipsInstr::ShiftImm {
                    op: ShiftOp::Sll,
                    d: t,
                    a: ri,
                    amt: 2,
                }));
                Ok(Addr::Indexed(base.to_string(), t))
            }
        }
    }

    // ── Final text ──────────────────────────────────────────────────────

    fn render(&self, prelude: Option<&str>) -> String {
        let mut out = String::new();
        out.push_str(".data\n");
        for (label, dir) in &self.data {
            let _ = writeln!(out, "{:<12}{}", format!("{label}:"), dir);
        }
        out.push_str("\n.text\n");
        if !self.runtime {
            if let Some(p) = prelude {
                out.push_str(p.trim_end());
                out.push('\n');
            }
        }
        for line in &self.text {
            let _ = writeln!(out, "{line}");
        }
        out
    }
}

// ── Statement field access ──────────────────────────────────────────────

fn src_at<'a>(stmt: &'a Statement, i: usize) -> Result<&'a Operand, CompileError> {
    stmt.src.get(i).ok_or_else(|| CompileError::MalformedInput {
        line: stmt.line,
        message: format!("statement `{:?}` is missing operand {}", stmt.op, i + 1),
    })
}

/// Integer literal in the destination field (`printint 5`, `ret 0`).
/// The parser only classifies source fields, so range checking happens here.
fn dst_imm(stmt: &Statement) -> Result<i64, CompileError> {
    stmt.dst.parse::<i64>().map_err(|_| CompileError::MalformedInput {
        line: stmt.line,
        message: format!("integer literal `{}` out of range", stmt.dst),
    })
}

fn sym_at<'a>(stmt: &'a Statement, i: usize) -> Result<&'a str, CompileError> {
    match src_at(stmt, i)? {
        Operand::Sym(s) => Ok(s),
        Operand::Imm(_) => Err(CompileError::MalformedInput {
            line: stmt.line,
            message: format!("statement `{:?}` expects a symbol operand", stmt.op),
        }),
    }
}

/// Register for any operand: literals load into a scratch register,
/// symbols go through the address descriptor.
fn operand_reg(
    alloc: &mut Allocator,
    op: &Operand,
    out: &mut Vec<AsmLine>,
) -> Result<Reg, CompileError> {
    match op {
        Operand::Imm(v) => {
            let r = alloc.take_temp(out)?;
            out.push(AsmLine::Instr(MipsInstr::Li { d: r, imm: *v }));
            Ok(r)
        }
        Operand::Sym(name) => alloc.ensure_source(name, out),
    }
}
