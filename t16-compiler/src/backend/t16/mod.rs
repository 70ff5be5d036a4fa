//! T16 backend: lowers abstract ops to T16 instructions.
//!
//! Module layout:
//! - `abi`: registers, frame layout, 5-bit field encoding
//! - `instruction`: typed instructions and operands
//! - `lowering`: one instruction idiom per abstract op
//! - `runtime`: multiply/divide/modulo library routines

pub mod abi;
pub mod instruction;
mod lowering;
pub mod runtime;

use super::{AsmItem, Backend};
use crate::emit::{LabelAllocator, Op};
use instruction::Instr;

#[derive(Debug, Default)]
pub struct T16Backend;

impl T16Backend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for T16Backend {
    fn name(&self) -> &'static str {
        "t16"
    }

    fn lower(&mut self, op: &Op, labels: &mut LabelAllocator, out: &mut Vec<AsmItem>) {
        let mut sink = Sink { out, labels };
        sink.lower(op);
    }
}

/// Item buffer plus label source for one lowering step.
pub(crate) struct Sink<'a> {
    out: &'a mut Vec<AsmItem>,
    labels: &'a mut LabelAllocator,
}

impl Sink<'_> {
    pub(crate) fn push_asm(&mut self, instr: Instr) {
        self.out.push(AsmItem::Instr {
            instr,
            comment: None,
        });
    }

    pub(crate) fn push_commented(&mut self, instr: Instr, comment: impl Into<String>) {
        self.out.push(AsmItem::Instr {
            instr,
            comment: Some(comment.into()),
        });
    }

    pub(crate) fn push_label(&mut self, name: impl Into<String>) {
        self.out.push(AsmItem::Label(name.into()));
    }

    pub(crate) fn push_define(&mut self, name: impl Into<String>, value: i64) {
        self.out.push(AsmItem::Define {
            name: name.into(),
            value,
        });
    }

    pub(crate) fn fresh_label(&mut self) -> String {
        self.labels.fresh().to_string()
    }
}
