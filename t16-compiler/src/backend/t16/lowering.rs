//! Abstract op → T16 instruction lowering.
//!
//! Expression values live on the machine stack. Binary operators pop the
//! right operand into `r1` and the left into `r0`; booleans are built in
//! `r2`. Every idiom leaves exactly one value pushed.

use super::abi::{
    local_field, param_displacement, param_field, Register, DIV_ROUTINE, ENTRY_POINT, EXIT_LABEL,
    MOD_ROUTINE, MUL_ROUTINE, STACK_TOP,
};
use super::instruction::{AluOp, Cond, Instr, Operand, ShiftOp};
use super::runtime;
use super::Sink;
use crate::diag::ice;
use crate::emit::{Access, BinOp, Op, StoreTarget, UnOp};
use crate::symbols::{Address, Region};

const R0: Register = Register::VALUE;
const R1: Register = Register::ADDR;
const R2: Register = Register::FLAG;

/// Memory operand naming a scalar's own cell.
fn slot(address: &Address) -> Operand {
    match address.region {
        Region::Global => Operand::ZeroPage(address.offset as u16),
        Region::Parameter => Operand::FrameUp(param_field(address.offset, address.arity)),
        Region::Local => Operand::FrameDown(local_field(address.offset)),
    }
}

fn alu_op(op: BinOp) -> Option<AluOp> {
    match op {
        BinOp::Add => Some(AluOp::Add),
        BinOp::Sub => Some(AluOp::Sub),
        BinOp::BitAnd => Some(AluOp::And),
        BinOp::BitOr => Some(AluOp::Or),
        BinOp::BitXor => Some(AluOp::Xor),
        _ => None,
    }
}

fn runtime_routine(op: BinOp) -> Option<&'static str> {
    match op {
        BinOp::Mul => Some(MUL_ROUTINE),
        BinOp::Div => Some(DIV_ROUTINE),
        BinOp::Mod => Some(MOD_ROUTINE),
        _ => None,
    }
}

impl Sink<'_> {
    pub(crate) fn lower(&mut self, op: &Op) {
        match op {
            Op::BeginProgram => self.lower_begin(),
            Op::EndProgram => {
                self.push_label(EXIT_LABEL);
                self.push_commented(Instr::bra(EXIT_LABEL), "halt");
            }
            Op::LoadImmediate(v) => {
                self.push_asm(Instr::load_imm(R0, *v));
                self.push_asm(Instr::Push(R0));
            }
            Op::Binary(b) => self.lower_binary(*b),
            Op::Unary(u) => self.lower_unary(*u),
            Op::Load {
                access,
                address,
                rvalue,
            } => self.lower_load(*access, address, *rvalue),
            Op::Store(target) => self.lower_store(target),
            Op::Deref => {
                self.push_asm(Instr::Pop(R1));
                self.push_asm(Instr::load(R0, Operand::Indirect(R1)));
                self.push_asm(Instr::Push(R0));
            }
            Op::Discard | Op::DiscardArgument => self.push_asm(Instr::Pop(R1)),
            Op::Call { name, args } => {
                self.push_commented(Instr::jsr(name.as_str()), format!("{args} arg(s)"));
            }
            Op::ReturnValue => self.push_asm(Instr::Push(R0)),
            Op::Entry { name, frame } => {
                self.push_label(name.as_str());
                self.push_asm(Instr::Push(Register::Bp));
                self.push_asm(Instr::mov(Register::Bp, Register::Sp));
                self.push_commented(
                    Instr::alu(AluOp::Sub, Register::Sp, Operand::Symbol(frame.to_string())),
                    "reserve locals",
                );
            }
            Op::FixEntry { frame, size } => self.push_define(frame.to_string(), *size as i64),
            Op::Return { has_value, is_main } => {
                if *has_value {
                    self.push_asm(Instr::Pop(R0));
                }
                self.push_asm(Instr::mov(Register::Sp, Register::Bp));
                self.push_asm(Instr::Pop(Register::Bp));
                if *is_main {
                    self.push_asm(Instr::bra(EXIT_LABEL));
                } else {
                    self.push_asm(Instr::Rts);
                }
            }
            Op::Jump(l) => self.push_asm(Instr::bra(l.to_string())),
            Op::JumpIfFalse(l) => self.lower_test_branch(Cond::Zero, &l.to_string()),
            Op::JumpIfTrue(l) => self.lower_test_branch(Cond::NotZero, &l.to_string()),
            Op::Label(l) => self.push_label(l.to_string()),
        }
    }

    fn lower_begin(&mut self) {
        self.push_asm(Instr::Mov {
            dst: Operand::Reg(Register::Sp),
            src: Operand::Imm(STACK_TOP),
        });
        self.push_asm(Instr::load_imm(Register::Bp, 0));
        self.push_asm(Instr::bra(ENTRY_POINT));
        for item in runtime::library() {
            self.out.push(item);
        }
    }

    fn lower_test_branch(&mut self, cond: Cond, target: &str) {
        self.push_asm(Instr::Pop(R0));
        self.push_asm(Instr::test(R0));
        self.push_asm(Instr::branch(cond, target));
    }

    // ── Addressing ──────────────────────────────────────────────────────

    /// Put the address of a variable into `d` (unmasked displacement).
    fn address_into(&mut self, d: Register, address: &Address) {
        match address.region {
            Region::Global => self.push_asm(Instr::load_imm(d, address.offset as i32)),
            Region::Parameter => {
                self.push_asm(Instr::mov(d, Register::Bp));
                self.push_asm(Instr::alu_imm(
                    AluOp::Add,
                    d,
                    param_displacement(address.offset, address.arity) as i32,
                ));
            }
            Region::Local => {
                self.push_asm(Instr::mov(d, Register::Bp));
                self.push_asm(Instr::alu_imm(
                    AluOp::Sub,
                    d,
                    address.offset as i32,
                ));
            }
        }
    }

    /// Base of an indexed access: a pointer's value or an array's address.
    fn base_into(&mut self, d: Register, address: &Address) {
        if address.is_pointer() {
            self.push_asm(Instr::load(d, slot(address)));
        } else {
            self.address_into(d, address);
        }
    }

    fn lower_load(&mut self, access: Access, address: &Address, rvalue: bool) {
        match access {
            Access::Direct if address.is_array() => {
                self.address_into(R0, address);
                self.push_asm(Instr::Push(R0));
            }
            Access::Direct => {
                self.push_asm(Instr::load(R0, slot(address)));
                self.push_asm(Instr::Push(R0));
            }
            Access::Reference => {
                self.address_into(R0, address);
                self.push_asm(Instr::Push(R0));
            }
            Access::Indirect => {
                self.push_asm(Instr::Pop(R0));
                self.base_into(R1, address);
                self.push_commented(Instr::alu_rr(AluOp::Sub, R1, R0), "base - index");
                self.push_deref_or_address(rvalue);
            }
            Access::Pointer => {
                self.push_asm(Instr::load(R1, slot(address)));
                self.push_deref_or_address(rvalue);
            }
        }
    }

    fn push_deref_or_address(&mut self, rvalue: bool) {
        if rvalue {
            self.push_asm(Instr::load(R0, Operand::Indirect(R1)));
            self.push_asm(Instr::Push(R0));
        } else {
            self.push_asm(Instr::Push(R1));
        }
    }

    fn lower_store(&mut self, target: &StoreTarget) {
        self.push_asm(Instr::Pop(R0));
        match target {
            StoreTarget::Direct(address) => {
                if address.is_array() {
                    ice("store to an array name reached the backend");
                }
                self.push_asm(Instr::store(slot(address), R0));
            }
            StoreTarget::Pointer(address) => {
                self.push_asm(Instr::load(R1, slot(address)));
                self.push_asm(Instr::store(Operand::Indirect(R1), R0));
            }
            StoreTarget::Indirect => {
                self.push_asm(Instr::Pop(R1));
                self.push_asm(Instr::store(Operand::Indirect(R1), R0));
            }
        }
        self.push_asm(Instr::Push(R0));
    }

    // ── Operators ───────────────────────────────────────────────────────

    fn lower_binary(&mut self, op: BinOp) {
        if let Some(routine) = runtime_routine(op) {
            // Operands are already pushed as arguments.
            self.push_commented(Instr::jsr(routine), op.symbol());
            self.push_asm(Instr::Pop(R1));
            self.push_asm(Instr::Pop(R1));
            self.push_asm(Instr::Push(R0));
            return;
        }

        self.push_asm(Instr::Pop(R1));
        self.push_asm(Instr::Pop(R0));

        if let Some(alu) = alu_op(op) {
            self.push_asm(Instr::alu_rr(alu, R0, R1));
            self.push_asm(Instr::Push(R0));
            return;
        }

        match op {
            BinOp::LogAnd => self.lower_logical(Cond::Zero, 0, 1),
            BinOp::LogOr => self.lower_logical(Cond::NotZero, 1, 0),
            BinOp::Shl => self.lower_shift(ShiftOp::Asl),
            BinOp::Shr => self.lower_shift(ShiftOp::Lsr),
            rel if rel.is_relational() => self.lower_relational(rel),
            other => ice(format!("no lowering for operator {}", other.symbol())),
        }
    }

    /// Both operands are already evaluated; `r2` starts at `early` and any
    /// operand matching `cond` keeps it, otherwise it becomes `late`.
    fn lower_logical(&mut self, cond: Cond, early: i32, late: i32) {
        let done = self.fresh_label();
        self.push_asm(Instr::load_imm(R2, early));
        self.push_asm(Instr::test(R0));
        self.push_asm(Instr::branch(cond, done.as_str()));
        self.push_asm(Instr::test(R1));
        self.push_asm(Instr::branch(cond, done.as_str()));
        self.push_asm(Instr::load_imm(R2, late));
        self.push_label(done);
        self.push_asm(Instr::Push(R2));
    }

    fn lower_shift(&mut self, shift: ShiftOp) {
        let top = self.fresh_label();
        let done = self.fresh_label();
        self.push_label(top.as_str());
        self.push_asm(Instr::alu_imm(AluOp::Sub, R1, 1));
        self.push_asm(Instr::branch(Cond::Minus, done.as_str()));
        self.push_asm(Instr::Shift { op: shift, d: R0 });
        self.push_asm(Instr::bra(top));
        self.push_label(done);
        self.push_asm(Instr::Push(R0));
    }

    /// `r2 = 1`, compare by subtraction, clear `r2` unless the condition holds.
    fn lower_relational(&mut self, op: BinOp) {
        let is_true = self.fresh_label();
        self.push_asm(Instr::load_imm(R2, 1));
        self.push_commented(Instr::alu_rr(AluOp::Sub, R0, R1), op.symbol());
        match op {
            BinOp::Eq => self.push_asm(Instr::branch(Cond::Zero, is_true.as_str())),
            BinOp::Ne => self.push_asm(Instr::branch(Cond::NotZero, is_true.as_str())),
            BinOp::Lt => self.push_asm(Instr::branch(Cond::Minus, is_true.as_str())),
            BinOp::Ge => self.push_asm(Instr::branch(Cond::Plus, is_true.as_str())),
            BinOp::Le => {
                self.push_asm(Instr::branch(Cond::Zero, is_true.as_str()));
                self.push_asm(Instr::branch(Cond::Minus, is_true.as_str()));
            }
            BinOp::Gt => {
                // Zero check feeds the sign check.
                let is_zero = self.fresh_label();
                self.push_asm(Instr::branch(Cond::Zero, is_zero.as_str()));
                self.push_asm(Instr::branch(Cond::Plus, is_true.as_str()));
                self.push_label(is_zero);
            }
            other => ice(format!("{} is not relational", other.symbol())),
        }
        self.push_asm(Instr::load_imm(R2, 0));
        self.push_label(is_true);
        self.push_asm(Instr::Push(R2));
    }

    fn lower_unary(&mut self, op: UnOp) {
        match op {
            UnOp::Not => {
                let done = self.fresh_label();
                self.push_asm(Instr::Pop(R0));
                self.push_asm(Instr::load_imm(R2, 1));
                self.push_asm(Instr::test(R0));
                self.push_asm(Instr::branch(Cond::Zero, done.as_str()));
                self.push_asm(Instr::load_imm(R2, 0));
                self.push_label(done);
                self.push_asm(Instr::Push(R2));
            }
            UnOp::BitNot => {
                self.push_asm(Instr::Pop(R0));
                self.push_asm(Instr::alu_imm(AluOp::Xor, R0, -1));
                self.push_asm(Instr::Push(R0));
            }
            UnOp::Neg => {
                self.push_asm(Instr::Pop(R1));
                self.push_asm(Instr::load_imm(R0, 0));
                self.push_asm(Instr::alu_rr(AluOp::Sub, R0, R1));
                self.push_asm(Instr::Push(R0));
            }
        }
    }
}
