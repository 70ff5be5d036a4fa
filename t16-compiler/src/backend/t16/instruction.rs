//! T16 machine-instruction types.
//!
//! The machine is two-address: ALU instructions read and overwrite their
//! destination register. Only ALU instructions (`add sub and or xor asl
//! lsr`) set the Z and N flags; moves, stack traffic and branches leave
//! them alone.

use super::abi::{Register, FRAME_FIELD_MASK};
use std::fmt;

// ============================================================================
// Operands
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Reg(Register),
    /// `#n` immediate, 8 or 16 bits.
    Imm(i32),
    /// `#name` immediate resolved by the assembler (label or equate).
    Symbol(String),
    /// `[n]` zero-page absolute cell.
    ZeroPage(u16),
    /// `[bp+d]`, `d` held in a 5-bit field.
    FrameUp(u8),
    /// `[bp-d]`, `d` held in a 5-bit field.
    FrameDown(u8),
    /// `[rN]` register indirect.
    Indirect(Register),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "{r}"),
            Operand::Imm(v) => write!(f, "#{v}"),
            Operand::Symbol(s) => write!(f, "#{s}"),
            Operand::ZeroPage(a) => write!(f, "[{a}]"),
            Operand::FrameUp(field) => write!(f, "[bp+{}]", frame_field(*field)),
            Operand::FrameDown(field) => write!(f, "[bp-{}]", frame_field(*field)),
            Operand::Indirect(r) => write!(f, "[{r}]"),
        }
    }
}

/// Bits of a frame field the machine actually decodes.
pub fn frame_field(field: u8) -> u16 {
    u16::from(field) & FRAME_FIELD_MASK as u16
}

// ============================================================================
// ALU operations and branch conditions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
}

impl AluOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            AluOp::Add => "add",
            AluOp::Sub => "sub",
            AluOp::And => "and",
            AluOp::Or => "or",
            AluOp::Xor => "xor",
        }
    }

    pub fn apply(&self, a: u16, b: u16) -> u16 {
        match self {
            AluOp::Add => a.wrapping_add(b),
            AluOp::Sub => a.wrapping_sub(b),
            AluOp::And => a & b,
            AluOp::Or => a | b,
            AluOp::Xor => a ^ b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    /// Arithmetic (and logical) shift left by one.
    Asl,
    /// Logical shift right by one.
    Lsr,
}

impl ShiftOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            ShiftOp::Asl => "asl",
            ShiftOp::Lsr => "lsr",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Always,
    Zero,
    NotZero,
    Plus,
    Minus,
}

impl Cond {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Cond::Always => "bra",
            Cond::Zero => "bz",
            Cond::NotZero => "bnz",
            Cond::Plus => "bpl",
            Cond::Minus => "bmi",
        }
    }

    pub fn holds(&self, zero: bool, negative: bool) -> bool {
        match self {
            Cond::Always => true,
            Cond::Zero => zero,
            Cond::NotZero => !zero,
            Cond::Plus => !negative,
            Cond::Minus => negative,
        }
    }
}

// ============================================================================
// Instructions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    /// `mov dst, src`: at most one side is memory.
    Mov { dst: Operand, src: Operand },
    /// `op d, src`
    Alu {
        op: AluOp,
        d: Register,
        src: Operand,
    },
    /// `asl d` / `lsr d`
    Shift { op: ShiftOp, d: Register },
    Push(Register),
    Pop(Register),
    /// `jsr label` pushes the return address.
    Jsr(String),
    Rts,
    Branch { cond: Cond, target: String },
}

// ── Convenience constructors ────────────────────────────────────────────

impl Instr {
    /// `mov d, #imm`
    pub fn load_imm(d: Register, imm: i32) -> Self {
        Instr::Mov {
            dst: Operand::Reg(d),
            src: Operand::Imm(imm),
        }
    }

    /// `mov d, src`
    pub fn load(d: Register, src: Operand) -> Self {
        Instr::Mov {
            dst: Operand::Reg(d),
            src,
        }
    }

    /// `mov dst, s`
    pub fn store(dst: Operand, s: Register) -> Self {
        Instr::Mov {
            dst,
            src: Operand::Reg(s),
        }
    }

    /// `mov d, s`
    pub fn mov(d: Register, s: Register) -> Self {
        Instr::Mov {
            dst: Operand::Reg(d),
            src: Operand::Reg(s),
        }
    }

    pub fn alu(op: AluOp, d: Register, src: Operand) -> Self {
        Instr::Alu { op, d, src }
    }

    pub fn alu_rr(op: AluOp, d: Register, s: Register) -> Self {
        Instr::Alu {
            op,
            d,
            src: Operand::Reg(s),
        }
    }

    pub fn alu_imm(op: AluOp, d: Register, imm: i32) -> Self {
        Instr::Alu {
            op,
            d,
            src: Operand::Imm(imm),
        }
    }

    /// `or d, #0` sets flags from `d` without changing it.
    pub fn test(d: Register) -> Self {
        Instr::alu_imm(AluOp::Or, d, 0)
    }

    pub fn branch(cond: Cond, target: impl Into<String>) -> Self {
        Instr::Branch {
            cond,
            target: target.into(),
        }
    }

    pub fn bra(target: impl Into<String>) -> Self {
        Instr::branch(Cond::Always, target)
    }

    pub fn jsr(target: impl Into<String>) -> Self {
        Instr::Jsr(target.into())
    }

    /// Branch or call target, if symbolic.
    pub fn target(&self) -> Option<&str> {
        match self {
            Instr::Branch { target, .. } | Instr::Jsr(target) => Some(target.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Mov { dst, src } => write!(f, "  mov {dst}, {src}"),
            Instr::Alu { op, d, src } => write!(f, "  {} {d}, {src}", op.mnemonic()),
            Instr::Shift { op, d } => write!(f, "  {} {d}", op.mnemonic()),
            Instr::Push(r) => write!(f, "  push {r}"),
            Instr::Pop(r) => write!(f, "  pop {r}"),
            Instr::Jsr(t) => write!(f, "  jsr {t}"),
            Instr::Rts => write!(f, "  rts"),
            Instr::Branch { cond, target } => write!(f, "  {} {target}", cond.mnemonic()),
        }
    }
}
