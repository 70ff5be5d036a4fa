//! Target-independent operations.
//!
//! Every operation works on an implicit evaluation stack: operands are
//! pushed by loads and consumed by operators, stores and branches.

use std::fmt;

use crate::symbols::Address;

/// Compiler-generated label. Numbers are unique per compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    BitAnd,
    BitOr,
    BitXor,
    LogAnd,
    LogOr,
    Shl,
    Shr,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::LogAnd => "&&",
            BinOp::LogOr => "||",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        }
    }

    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    /// Logical complement.
    Not,
    /// Bitwise complement.
    BitNot,
    Neg,
}

impl UnOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnOp::Not => "!",
            UnOp::BitNot => "~",
            UnOp::Neg => "neg",
        }
    }
}

/// How a load reaches its variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// The variable's own cell.
    Direct,
    /// Element of an array (or pointer) at an index already on the stack.
    Indirect,
    /// The cell a pointer variable points at.
    Pointer,
    /// The variable's address.
    Reference,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Direct => write!(f, "direct"),
            Access::Indirect => write!(f, "indirect"),
            Access::Pointer => write!(f, "pointer"),
            Access::Reference => write!(f, "reference"),
        }
    }
}

/// Destination of a store. The value is always on top of the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreTarget {
    Direct(Address),
    /// Through the pointer held in a variable.
    Pointer(Address),
    /// Through an address pushed below the value.
    Indirect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    BeginProgram,
    EndProgram,
    LoadImmediate(i32),
    Binary(BinOp),
    Unary(UnOp),
    /// With `rvalue` unset an indirect or pointer load leaves the address.
    Load {
        access: Access,
        address: Address,
        rvalue: bool,
    },
    Store(StoreTarget),
    /// Replace the address on top of the stack with the cell it names.
    Deref,
    /// Drop the value of an expression statement.
    Discard,
    Call {
        name: String,
        args: usize,
    },
    /// Caller-side removal of one pushed argument.
    DiscardArgument,
    /// Push the value the callee returned.
    ReturnValue,
    Entry {
        name: String,
        frame: Label,
    },
    /// Resolve the frame-size placeholder of an entry.
    FixEntry {
        frame: Label,
        size: usize,
    },
    Return {
        has_value: bool,
        is_main: bool,
    },
    Jump(Label),
    JumpIfFalse(Label),
    JumpIfTrue(Label),
    Label(Label),
}

impl Op {
    /// Values popped and pushed on the evaluation stack, in that order.
    ///
    /// Argument cleanup is charged to the call itself, so `DiscardArgument`
    /// moves nothing here.
    pub fn stack_effect(&self) -> (usize, usize) {
        match self {
            Op::LoadImmediate(_) | Op::ReturnValue => (0, 1),
            Op::Binary(_) => (2, 1),
            Op::Unary(_) | Op::Deref => (1, 1),
            Op::Load { access, .. } => match access {
                Access::Indirect => (1, 1),
                _ => (0, 1),
            },
            Op::Store(StoreTarget::Indirect) => (2, 1),
            Op::Store(_) => (1, 1),
            Op::Discard | Op::JumpIfFalse(_) | Op::JumpIfTrue(_) => (1, 0),
            Op::Call { args, .. } => (*args, 0),
            Op::Return { has_value, .. } => (usize::from(*has_value), 0),
            Op::BeginProgram
            | Op::EndProgram
            | Op::DiscardArgument
            | Op::Entry { .. }
            | Op::FixEntry { .. }
            | Op::Jump(_)
            | Op::Label(_) => (0, 0),
        }
    }
}
