//! MIPS machine model: registers, typed instructions, and output items.
//!
//! This module defines the register file (`Reg`), the typed instruction set
//! (`MipsInstr`) with its `Display` lowering to assembly text, memory
//! addressing forms (`Addr`), and the structured output line type
//! (`AsmLine`) that the code generator accumulates before final emission.

use std::fmt;

// ============================================================================
// Registers
// ============================================================================

/// The 32 MIPS general registers, declared in hardware numbering order so
/// that the derived `Ord` sorts by register number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reg {
    Zero, At, V0, V1,
    A0, A1, A2, A3,
    T0, T1, T2, T3, T4, T5, T6, T7,
    S0, S1, S2, S3, S4, S5, S6, S7,
    T8, T9, K0, K1,
    Gp, Sp, Fp, Ra,
}

impl Reg {
    /// Registers handed out by the allocator's free queue, in preference
    /// order: temporaries first, then saved registers, then the remaining
    /// scratch. The reserved set ($zero, $at, $v0, $sp, $ra) never enters
    /// the queue; $k0/$k1/$gp/$fp are left to the kernel and assembler by
    /// convention.
    pub const ALLOCATABLE: [Reg; 23] = [
        Reg::T0, Reg::T1, Reg::T2, Reg::T3, Reg::T4,
        Reg::T5, Reg::T6, Reg::T7, Reg::T8, Reg::T9,
        Reg::S0, Reg::S1, Reg::S2, Reg::S3, Reg::S4,
        Reg::S5, Reg::S6, Reg::S7,
        Reg::V1,
        Reg::A0, Reg::A1, Reg::A2, Reg::A3,
    ];

    pub const ZERO: Reg = Reg::Zero;
    /// Assembler scratch; immediate-operand branches expand through it.
    pub const SCRATCH: Reg = Reg::At;
    /// Return value and syscall selector.
    pub const RETVAL: Reg = Reg::V0;
    /// First syscall argument.
    pub const SYSARG: Reg = Reg::A0;
    pub const STACK_PTR: Reg = Reg::Sp;
    pub const RET_ADDR: Reg = Reg::Ra;

    pub fn name(self) -> &'static str {
        match self {
            Reg::Zero => "$zero",
            Reg::At => "$at",
            Reg::V0 => "$v0",
            Reg::V1 => "$v1",
            Reg::A0 => "$a0",
            Reg::A1 => "$a1",
            Reg::A2 => "$a2",
            Reg::A3 => "$a3",
            Reg::T0 => "$t0",
            Reg::T1 => "$t1",
            Reg::T2 => "$t2",
            Reg::T3 => "$t3",
            Reg::T4 => "$t4",
            Reg::T5 => "$t5",
            Reg::T6 => "$t6",
            Reg::T7 => "$t7",
            Reg::S0 => "$s0",
            Reg::S1 => "$s1",
            Reg::S2 => "$s2",
            Reg::S3 => "$s3",
            Reg::S4 => "$s4",
            Reg::S5 => "$s5",
            Reg::S6 => "$s6",
            Reg::S7 => "$s7",
            Reg::T8 => "$t8",
            Reg::T9 => "$t9",
            Reg::K0 => "$k0",
            Reg::K1 => "$k1",
            Reg::Gp => "$gp",
            Reg::Sp => "$sp",
            Reg::Fp => "$fp",
            Reg::Ra => "$ra",
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// Addressing forms
// ============================================================================

/// A memory operand for `lw`/`sw`/`la`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Addr {
    /// `x` — a labelled word in the data segment.
    Label(String),
    /// `arr+8` — label plus constant byte offset.
    LabelOffset(String, i64),
    /// `arr($t1)` — label indexed by a register.
    Indexed(String, Reg),
    /// `0($sp)` — register base plus constant byte offset.
    Offset(i64, Reg),
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Addr::Label(l) => write!(f, "{l}"),
            Addr::LabelOffset(l, 0) => write!(f, "{l}"),
            Addr::LabelOffset(l, off) => write!(f, "{l}+{off}"),
            Addr::Indexed(l, r) => write!(f, "{l}({r})"),
            Addr::Offset(off, r) => write!(f, "{off}({r})"),
        }
    }
}

// ============================================================================
// Typed instructions
// ============================================================================

/// Three-register ALU operations sharing the `op $d, $a, $b` format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Nor,
    Xor,
}

impl BinOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Rem => "rem",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Nor => "nor",
            BinOp::Xor => "xor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Sll,
    Srl,
}

impl ShiftOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            ShiftOp::Sll => "sll",
            ShiftOp::Srl => "srl",
        }
    }
}

/// Conditional branch mnemonics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchOp {
    Beq,
    Bne,
    Bgt,
    Bge,
    Blt,
    Ble,
}

impl BranchOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            BranchOp::Beq => "beq",
            BranchOp::Bne => "bne",
            BranchOp::Bgt => "bgt",
            BranchOp::Bge => "bge",
            BranchOp::Blt => "blt",
            BranchOp::Ble => "ble",
        }
    }
}

/// Second comparison operand of a branch; immediates expand through `$at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchArg {
    Reg(Reg),
    Imm(i64),
}

impl fmt::Display for BranchArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchArg::Reg(r) => write!(f, "{r}"),
            BranchArg::Imm(i) => write!(f, "{i}"),
        }
    }
}

/// A typed MIPS instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MipsInstr {
    /// `li $d, imm`
    Li { d: Reg, imm: i64 },
    /// `la $d, addr`
    La { d: Reg, addr: Addr },
    /// `lw $d, addr`
    Lw { d: Reg, addr: Addr },
    /// `sw $s, addr`
    Sw { s: Reg, addr: Addr },
    /// `move $d, $s`
    Move { d: Reg, s: Reg },
    /// `op $d, $a, $b`
    Bin { op: BinOp, d: Reg, a: Reg, b: Reg },
    /// `addi $d, $a, imm`
    Addi { d: Reg, a: Reg, imm: i64 },
    /// `not $d, $s`
    Not { d: Reg, s: Reg },
    /// `sll/srl $d, $a, amt`
    ShiftImm { op: ShiftOp, d: Reg, a: Reg, amt: i64 },
    /// `sll/srl $d, $a, $b` — register-count form, resolved by the assembler.
    ShiftReg { op: ShiftOp, d: Reg, a: Reg, b: Reg },
    /// `beq $a, b, target` and friends
    Branch { op: BranchOp, a: Reg, b: BranchArg, target: String },
    /// `j target`
    J(String),
    /// `jal target`
    Jal(String),
    /// `jr $r`
    Jr(Reg),
    Syscall,
}

impl fmt::Display for MipsInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MipsInstr::Li { d, imm } => write!(f, "  li {d}, {imm}"),
            MipsInstr::La { d, addr } => write!(f, "  la {d}, {addr}"),
            MipsInstr::Lw { d, addr } => write!(f, "  lw {d}, {addr}"),
            MipsInstr::Sw { s, addr } => write!(f, "  sw {s}, {addr}"),
            MipsInstr::Move { d, s } => write!(f, "  move {d}, {s}"),
            MipsInstr::Bin { op, d, a, b } => write!(f, "  {} {d}, {a}, {b}", op.mnemonic()),
            MipsInstr::Addi { d, a, imm } => write!(f, "  addi {d}, {a}, {imm}"),
            MipsInstr::Not { d, s } => write!(f, "  not {d}, {s}"),
            MipsInstr::ShiftImm { op, d, a, amt } => {
                write!(f, "  {} {d}, {a}, {amt}", op.mnemonic())
            }
            MipsInstr::ShiftReg { op, d, a, b } => write!(f, "  {} {d}, {a}, {b}", op.mnemonic()),
            MipsInstr::Branch { op, a, b, target } => {
                write!(f, "  {} {a}, {b}, {target}", op.mnemonic())
            }
            MipsInstr::J(t) => write!(f, "  j {t}"),
            MipsInstr::Jal(t) => write!(f, "  jal {t}"),
            MipsInstr::Jr(r) => write!(f, "  jr {r}"),
            MipsInstr::Syscall => write!(f, "  syscall"),
        }
    }
}

// ============================================================================
// Output items
// ============================================================================

/// A data-segment directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataDirective {
    Word(i64),
    Space(usize),
    Asciiz(String),
}

impl fmt::Display for DataDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataDirective::Word(v) => write!(f, ".word {v}"),
            DataDirective::Space(n) => write!(f, ".space {n}"),
            DataDirective::Asciiz(s) if s.starts_with('"') => write!(f, ".asciiz {s}"),
            DataDirective::Asciiz(s) => write!(f, ".asciiz \"{s}\""),
        }
    }
}

/// A line of the text segment.
#[derive(Debug, Clone)]
pub enum AsmLine {
    Label(String),
    Instr(MipsInstr),
    Comment(String),
    /// `.end name` and section markers.
    Directive(String),
    /// Verbatim text (the runtime prelude).
    Raw(String),
    Blank,
}

impl fmt::Display for AsmLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmLine::Label(l) => write!(f, "{l}:"),
            AsmLine::Instr(i) => write!(f, "{i}"),
            AsmLine::Comment(c) => write!(f, "  # {c}"),
            AsmLine::Directive(d) => write!(f, "{d}"),
            AsmLine::Raw(r) => write!(f, "{r}"),
            AsmLine::Blank => Ok(()),
        }
    }
}
