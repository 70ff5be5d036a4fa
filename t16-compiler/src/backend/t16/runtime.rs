//! Library routines for the operators the ALU lacks.
//!
//! Each routine is called with both operands pushed (left first) and
//! returns its result in `r0`. Labels are fixed names so the routines can
//! be emitted once per program without touching the label allocator.

use super::abi::{local_field, param_field, Register, DIV_ROUTINE, MOD_ROUTINE, MUL_ROUTINE};
use super::instruction::{AluOp, Cond, Instr, Operand, ShiftOp};
use crate::backend::AsmItem;

const R0: Register = Register::R0;
const R1: Register = Register::R1;
const R2: Register = Register::R2;

/// Small builder so the routines read like assembly.
#[derive(Default)]
struct Routine {
    items: Vec<AsmItem>,
}

impl Routine {
    fn label(&mut self, name: &str) -> &mut Self {
        self.items.push(AsmItem::Label(name.to_string()));
        self
    }

    fn ins(&mut self, instr: Instr) -> &mut Self {
        self.items.push(AsmItem::Instr {
            instr,
            comment: None,
        });
        self
    }

    fn note(&mut self, instr: Instr, comment: &str) -> &mut Self {
        self.items.push(AsmItem::Instr {
            instr,
            comment: Some(comment.to_string()),
        });
        self
    }

    fn prologue(&mut self, name: &str, locals: i32) -> &mut Self {
        self.label(name)
            .ins(Instr::Push(Register::Bp))
            .ins(Instr::mov(Register::Bp, Register::Sp));
        if locals > 0 {
            self.ins(Instr::alu_imm(AluOp::Sub, Register::Sp, locals));
        }
        self
    }

    fn epilogue(&mut self) -> &mut Self {
        self.ins(Instr::mov(Register::Sp, Register::Bp))
            .ins(Instr::Pop(Register::Bp))
            .ins(Instr::Rts)
    }

    /// Two's-complement negate in place.
    fn negate(&mut self, r: Register) -> &mut Self {
        self.ins(Instr::alu_imm(AluOp::Xor, r, -1))
            .ins(Instr::alu_imm(AluOp::Add, r, 1))
    }
}

fn left_operand() -> Operand {
    Operand::FrameUp(param_field(0, 2))
}

fn right_operand() -> Operand {
    Operand::FrameUp(param_field(1, 2))
}

fn sign_cell() -> Operand {
    Operand::FrameDown(local_field(0))
}

/// Shift-and-add multiply; the product wraps to 16 bits.
pub fn multiply() -> Vec<AsmItem> {
    let mut r = Routine::default();
    r.prologue(MUL_ROUTINE, 0)
        .ins(Instr::load_imm(R0, 0))
        .ins(Instr::load(R1, left_operand()))
        .ins(Instr::load(R2, right_operand()))
        .label("__mul_loop")
        .ins(Instr::test(R2))
        .ins(Instr::branch(Cond::Zero, "__mul_done"))
        .ins(Instr::Push(R2))
        .note(Instr::alu_imm(AluOp::And, R2, 1), "low bit")
        .ins(Instr::branch(Cond::Zero, "__mul_skip"))
        .ins(Instr::alu_rr(AluOp::Add, R0, R1))
        .label("__mul_skip")
        .ins(Instr::Pop(R2))
        .ins(Instr::Shift {
            op: ShiftOp::Asl,
            d: R1,
        })
        .ins(Instr::Shift {
            op: ShiftOp::Lsr,
            d: R2,
        })
        .ins(Instr::bra("__mul_loop"))
        .label("__mul_done")
        .epilogue();
    r.items
}

/// Truncating signed division by repeated subtraction. Division by zero
/// yields zero.
pub fn divide() -> Vec<AsmItem> {
    let mut r = Routine::default();
    r.prologue(DIV_ROUTINE, 1)
        .ins(Instr::load(R0, left_operand()))
        .ins(Instr::load(R1, right_operand()))
        .ins(Instr::test(R1))
        .ins(Instr::branch(Cond::Zero, "__div_zero"))
        .ins(Instr::load_imm(R2, 0))
        .note(Instr::store(sign_cell(), R2), "result sign")
        .ins(Instr::test(R0))
        .ins(Instr::branch(Cond::Plus, "__div_apos"))
        .negate(R0)
        .ins(Instr::load_imm(R2, 1))
        .ins(Instr::store(sign_cell(), R2))
        .label("__div_apos")
        .ins(Instr::test(R1))
        .ins(Instr::branch(Cond::Plus, "__div_bpos"))
        .negate(R1)
        .ins(Instr::load(R2, sign_cell()))
        .ins(Instr::alu_imm(AluOp::Xor, R2, 1))
        .ins(Instr::store(sign_cell(), R2))
        .label("__div_bpos")
        .note(Instr::load_imm(R2, 0), "quotient")
        .label("__div_loop")
        .ins(Instr::alu_rr(AluOp::Sub, R0, R1))
        .ins(Instr::branch(Cond::Minus, "__div_end"))
        .ins(Instr::alu_imm(AluOp::Add, R2, 1))
        .ins(Instr::bra("__div_loop"))
        .label("__div_end")
        .ins(Instr::mov(R0, R2))
        .ins(Instr::load(R1, sign_cell()))
        .ins(Instr::test(R1))
        .ins(Instr::branch(Cond::Zero, "__div_ret"))
        .negate(R0)
        .label("__div_ret")
        .epilogue()
        .label("__div_zero")
        .ins(Instr::load_imm(R0, 0))
        .ins(Instr::bra("__div_ret"));
    r.items
}

/// Remainder with the sign of the dividend. Modulo zero yields zero.
pub fn modulo() -> Vec<AsmItem> {
    let mut r = Routine::default();
    r.prologue(MOD_ROUTINE, 1)
        .ins(Instr::load(R0, left_operand()))
        .ins(Instr::load(R1, right_operand()))
        .ins(Instr::test(R1))
        .ins(Instr::branch(Cond::Zero, "__mod_zero"))
        .ins(Instr::load_imm(R2, 0))
        .note(Instr::store(sign_cell(), R2), "result sign")
        .ins(Instr::test(R0))
        .ins(Instr::branch(Cond::Plus, "__mod_apos"))
        .negate(R0)
        .ins(Instr::load_imm(R2, 1))
        .ins(Instr::store(sign_cell(), R2))
        .label("__mod_apos")
        .ins(Instr::test(R1))
        .ins(Instr::branch(Cond::Plus, "__mod_loop"))
        .negate(R1)
        .label("__mod_loop")
        .ins(Instr::alu_rr(AluOp::Sub, R0, R1))
        .ins(Instr::branch(Cond::Plus, "__mod_loop"))
        .note(Instr::alu_rr(AluOp::Add, R0, R1), "undo last step")
        .ins(Instr::load(R2, sign_cell()))
        .ins(Instr::test(R2))
        .ins(Instr::branch(Cond::Zero, "__mod_ret"))
        .negate(R0)
        .label("__mod_ret")
        .epilogue()
        .label("__mod_zero")
        .ins(Instr::load_imm(R0, 0))
        .ins(Instr::bra("__mod_ret"));
    r.items
}

/// All routines, in emission order.
pub fn library() -> Vec<AsmItem> {
    let mut items = multiply();
    items.extend(divide());
    items.extend(modulo());
    items
}
