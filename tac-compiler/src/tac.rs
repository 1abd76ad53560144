// A tiny, linear three-address IR with labels, jumps, and declarations.
//
// The front end produces one record per line: `line, opcode, dst, src...`
// with fields separated by commas. This module holds the statement model
// and the record parser; everything downstream consumes `Statement`s.

use crate::CompileError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ── Arithmetic ──────────────────────────────────────────────────────
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    /// `=, dst, src` — plain assignment.
    Assign,

    // ── Conditional branches (dst is the target label) ──────────────────
    Bgt,
    Bge,
    Blt,
    Ble,
    Beq,
    Bne,

    /// `jmp, label` — unconditional jump.
    Jmp,

    // ── Array access ────────────────────────────────────────────────────
    /// `from, dst, arr, index` — dst = arr[index]
    From,
    /// `into, arr, index, src` — arr[index] = src
    Into,

    // ── Bitwise / shifts ────────────────────────────────────────────────
    Or,
    And,
    Nor,
    Xor,
    Not,
    ShiftR,
    ShiftL,

    // ── Structure ───────────────────────────────────────────────────────
    Func,
    Label,
    Ret,
    Call,
    /// `store, dst` — capture the call return value into dst.
    Store,

    // ── Declarations ────────────────────────────────────────────────────
    /// `decl, name, len` — array of `len` words.
    Decl,
    DeclInt,
    DeclStr,

    // ── I/O ─────────────────────────────────────────────────────────────
    ScanInt,
    PrintInt,
    PrintStr,

    /// `#, text` — comment, passed through to the assembly.
    Comment,
}

impl Opcode {
    pub fn parse(tok: &str) -> Option<Opcode> {
        Some(match tok {
            "+" => Opcode::Add,
            "-" => Opcode::Sub,
            "*" => Opcode::Mul,
            "/" => Opcode::Div,
            "%" => Opcode::Mod,
            "=" => Opcode::Assign,
            "bgt" => Opcode::Bgt,
            "bge" => Opcode::Bge,
            "blt" => Opcode::Blt,
            "ble" => Opcode::Ble,
            "beq" => Opcode::Beq,
            "bne" => Opcode::Bne,
            "jmp" => Opcode::Jmp,
            "from" => Opcode::From,
            "into" => Opcode::Into,
            "or" => Opcode::Or,
            "and" => Opcode::And,
            "nor" => Opcode::Nor,
            "xor" => Opcode::Xor,
            "not" => Opcode::Not,
            ">>" => Opcode::ShiftR,
            "<<" => Opcode::ShiftL,
            "func" => Opcode::Func,
            "label" => Opcode::Label,
            "ret" => Opcode::Ret,
            "call" => Opcode::Call,
            "store" => Opcode::Store,
            "decl" => Opcode::Decl,
            "declInt" => Opcode::DeclInt,
            "declStr" => Opcode::DeclStr,
            "scanint" => Opcode::ScanInt,
            "printint" => Opcode::PrintInt,
            "printstr" => Opcode::PrintStr,
            "#" => Opcode::Comment,
            _ => return None,
        })
    }

    /// True for the six conditional branch opcodes.
    pub fn is_cond_branch(self) -> bool {
        matches!(
            self,
            Opcode::Bgt | Opcode::Bge | Opcode::Blt | Opcode::Ble | Opcode::Beq | Opcode::Bne
        )
    }

    /// True for statements that transfer control (and therefore end a block).
    pub fn is_terminator(self) -> bool {
        self == Opcode::Jmp || self.is_cond_branch()
    }

    pub fn is_declaration(self) -> bool {
        matches!(self, Opcode::Decl | Opcode::DeclInt | Opcode::DeclStr)
    }

    /// The opposite branch condition, used when folding jump-over-jump
    /// patterns (`beq`↔`bne`, `bgt`↔`ble`, `bge`↔`blt`).
    pub fn negate(self) -> Option<Opcode> {
        Some(match self {
            Opcode::Beq => Opcode::Bne,
            Opcode::Bne => Opcode::Beq,
            Opcode::Bgt => Opcode::Ble,
            Opcode::Ble => Opcode::Bgt,
            Opcode::Bge => Opcode::Blt,
            Opcode::Blt => Opcode::Bge,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Imm(i64),
    Sym(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Imm(i) => write!(f, "{i}"),
            Operand::Sym(s) => write!(f, "{s}"),
        }
    }
}

/// A single three-address statement.
///
/// Immutable after parsing, except that the peephole optimizer may negate
/// a branch opcode and retarget its destination label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub line: u32,
    pub op: Opcode,
    pub dst: String,
    pub src: Vec<Operand>,
}

impl Statement {
    /// The variable this statement writes, if any. Branch and jump targets
    /// are labels, not variables, and do not count.
    pub fn def(&self) -> Option<&str> {
        match self.op {
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Mod
            | Opcode::Assign
            | Opcode::Or
            | Opcode::And
            | Opcode::Nor
            | Opcode::Xor
            | Opcode::Not
            | Opcode::ShiftR
            | Opcode::ShiftL
            | Opcode::From
            | Opcode::ScanInt
            | Opcode::Store
            | Opcode::Decl
            | Opcode::DeclInt
            | Opcode::DeclStr => Some(&self.dst),
            _ => None,
        }
    }

    /// Every variable this statement reads, in operand order. Includes
    /// destination-position reads (`printint x`, the array base of `into`,
    /// a `ret` value).
    pub fn uses(&self) -> Vec<&str> {
        let mut out = Vec::new();
        match self.op {
            Opcode::PrintInt => {
                if !is_int_literal(&self.dst) {
                    out.push(self.dst.as_str());
                }
            }
            Opcode::Into => out.push(self.dst.as_str()),
            Opcode::Ret => {
                if !self.dst.is_empty() && !is_int_literal(&self.dst) {
                    out.push(self.dst.as_str());
                }
            }
            _ => {}
        }
        for s in &self.src {
            if let Operand::Sym(name) = s {
                out.push(name.as_str());
            }
        }
        out
    }
}

/// Classify a source field: integer literal (`^-?[0-9]+$`) or symbol.
pub fn is_int_literal(field: &str) -> bool {
    let digits = field.strip_prefix('-').unwrap_or(field);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn parse_operand(field: &str, line: u32) -> Result<Operand, CompileError> {
    if is_int_literal(field) {
        let value = field.parse::<i64>().map_err(|_| CompileError::MalformedInput {
            line,
            message: format!("integer literal `{field}` out of range"),
        })?;
        Ok(Operand::Imm(value))
    } else {
        Ok(Operand::Sym(field.to_string()))
    }
}

/// Parse a complete IR file into a statement stream.
///
/// Blank lines are skipped. `#` and `declStr` records keep their remaining
/// text verbatim (it may contain commas); every other record is split on
/// commas with the fields trimmed.
pub fn parse(src: &str) -> Result<Vec<Statement>, CompileError> {
    let mut stmts = Vec::new();
    for raw in src.lines() {
        if raw.trim().is_empty() {
            continue;
        }
        let mut head = raw.splitn(3, ',');
        let line_field = head.next().unwrap_or("").trim();
        let op_field = head.next().map(str::trim).ok_or_else(|| CompileError::MalformedInput {
            line: stmts.len() as u32 + 1,
            message: format!("record has no opcode field: `{raw}`"),
        })?;
        let rest = head.next().unwrap_or("");

        let line = line_field.parse::<u32>().map_err(|_| CompileError::MalformedInput {
            line: stmts.len() as u32 + 1,
            message: format!("bad line number `{line_field}`"),
        })?;
        let op = Opcode::parse(op_field).ok_or_else(|| CompileError::MalformedInput {
            line,
            message: format!("unknown opcode `{op_field}`"),
        })?;

        let (dst, src_ops) = match op {
            // Comment body is the rest of the record, commas included.
            Opcode::Comment => (rest.trim().to_string(), Vec::new()),
            // `declStr, name, "..."` — the string payload may contain commas.
            Opcode::DeclStr => {
                let mut it = rest.splitn(2, ',');
                let name = it.next().unwrap_or("").trim().to_string();
                let payload = it.next().unwrap_or("").trim().to_string();
                (name, vec![Operand::Sym(payload)])
            }
            _ => {
                let mut fields = rest.split(',').map(str::trim).filter(|f| !f.is_empty());
                let dst = fields.next().unwrap_or("").to_string();
                let mut src_ops = Vec::new();
                for f in fields {
                    src_ops.push(parse_operand(f, line)?);
                }
                (dst, src_ops)
            }
        };

        stmts.push(Statement { line, op, dst, src: src_ops });
    }

    renumber(&mut stmts);
    Ok(stmts)
}

/// Renumber statements sequentially from 1. The input line numbers are only
/// trusted for error reporting; every downstream table indexes by the
/// normalized numbering, and the peephole passes renumber again after
/// removing statements.
pub fn renumber(stmts: &mut [Statement]) {
    for (i, s) in stmts.iter_mut().enumerate() {
        s.line = i as u32 + 1;
    }
}
