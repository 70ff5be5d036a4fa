//! T16 registers, memory layout and frame addressing.
//!
//! Stack discipline: `push` stores at `sp` and then decrements it, so `sp`
//! always names the next free cell. After the prologue
//! (`push bp; mov bp, sp; sub sp, #frame`) the frame looks like:
//!
//! ```text
//! bp + 3 + (n-1) .. bp + 3   arguments, first argument deepest
//! bp + 2                     return address
//! bp + 1                     caller's bp
//! bp - 0 .. bp - (frame-1)   locals
//! ```
//!
//! Frame operands carry a 5-bit unsigned field and a direction: `[bp+d]`
//! for parameters, `[bp-d]` for locals.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    R0,
    R1,
    R2,
    Sp,
    Bp,
}

impl Register {
    /// Primary value register.
    pub const VALUE: Register = Register::R0;
    /// Address and secondary-operand register.
    pub const ADDR: Register = Register::R1;
    /// Boolean result scratch register.
    pub const FLAG: Register = Register::R2;

    pub fn as_str(&self) -> &'static str {
        match self {
            Register::R0 => "r0",
            Register::R1 => "r1",
            Register::R2 => "r2",
            Register::Sp => "sp",
            Register::Bp => "bp",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Register::R0 => 0,
            Register::R1 => 1,
            Register::R2 => 2,
            Register::Sp => 3,
            Register::Bp => 4,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Initial stack pointer: the top data cell.
pub const STACK_TOP: i32 = 0xFFFF;

/// Cells reachable by zero-page absolute addressing.
pub const ZERO_PAGE_CELLS: usize = 256;

/// Saved bp and return address sit between bp and the arguments.
pub const PARAM_BIAS: usize = 3;

pub const FRAME_FIELD_BITS: u32 = 5;
pub const FRAME_FIELD_MASK: usize = (1 << FRAME_FIELD_BITS) - 1;

/// Label every program starts executing at.
pub const ENTRY_POINT: &str = "main";
/// Terminal self-loop; the machine has no halt instruction.
pub const EXIT_LABEL: &str = "__exit";

pub const MUL_ROUTINE: &str = "__mul";
pub const DIV_ROUTINE: &str = "__div";
pub const MOD_ROUTINE: &str = "__mod";

/// Keep the low five bits of a frame offset. The field is unsigned and the
/// addressing mode says which side of bp it counts from, so offsets 32
/// apart share a field and nothing else does.
pub fn encode_frame_field(offset: usize) -> u8 {
    (offset & FRAME_FIELD_MASK) as u8
}

/// Unmasked distance above bp of parameter `offset` in an `arity`-parameter
/// frame.
///
/// Arguments are pushed left to right, so the last one is nearest bp.
pub fn param_displacement(offset: usize, arity: usize) -> usize {
    arity.saturating_sub(offset + 1) + PARAM_BIAS
}

pub fn param_field(offset: usize, arity: usize) -> u8 {
    encode_frame_field(param_displacement(offset, arity))
}

/// Locals count down from bp: local `offset` is `bp - offset`.
pub fn local_field(offset: usize) -> u8 {
    encode_frame_field(offset)
}
