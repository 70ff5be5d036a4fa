//! Code-emission abstraction.
//!
//! The [`Emitter`] turns each semantic action into an [`Op`] and hands it to
//! the backend chosen when the compilation starts. It also owns the label
//! counter, the break/continue stacks and the frame-size fixups.

pub mod fixup;
pub mod op;

pub use fixup::{Fixup, FixupId, FixupTable};
pub use op::{Access, BinOp, Label, Op, StoreTarget, UnOp};

use crate::backend::{AsmItem, Backend, Listing, TargetKind};
use crate::diag::{ice, SemanticError, SemanticErrorKind};

/// Hands out labels; never reuses a number within one compilation.
#[derive(Debug, Default)]
pub struct LabelAllocator {
    next: u32,
}

impl LabelAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self) -> Label {
        let label = Label(self.next);
        self.next += 1;
        label
    }

    /// Number of labels handed out so far.
    pub fn count(&self) -> u32 {
        self.next
    }
}

pub struct Emitter {
    backend: Box<dyn Backend>,
    labels: LabelAllocator,
    break_stack: Vec<Label>,
    continue_stack: Vec<Label>,
    fixups: FixupTable,
    out: Vec<AsmItem>,
    /// One entry per value on the evaluation stack; `true` stands for the
    /// result a void call never pushed.
    operands: Vec<bool>,
}

impl Emitter {
    pub fn new(target: TargetKind) -> Self {
        Self::with_backend(target.backend())
    }

    pub fn with_backend(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            labels: LabelAllocator::new(),
            break_stack: Vec::new(),
            continue_stack: Vec::new(),
            fixups: FixupTable::new(),
            out: Vec::new(),
            operands: Vec::new(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.fresh()
    }

    pub fn labels_used(&self) -> u32 {
        self.labels.count()
    }

    pub fn fixups(&self) -> &FixupTable {
        &self.fixups
    }

    pub fn items(&self) -> &[AsmItem] {
        &self.out
    }

    /// Lower one op. Consuming the missing value of a void call is reported,
    /// but the op is still emitted.
    pub fn emit(&mut self, op: Op) -> Result<(), SemanticError> {
        let (pops, pushes) = op.stack_effect();
        let keep = self.operands.len().saturating_sub(pops);
        let result = if self.operands.drain(keep..).any(|void| void) {
            Err(SemanticError::new(
                SemanticErrorKind::VoidValueUsed,
                "a void function does not produce a value",
            ))
        } else {
            Ok(())
        };
        self.operands.extend(std::iter::repeat(false).take(pushes));
        tracing::trace!(?op, depth = self.operands.len(), "emit");
        self.backend.lower(&op, &mut self.labels, &mut self.out);
        result
    }

    /// Whether the top of the stack is the missing result of a void call.
    /// The placeholder is dropped when it is.
    pub fn take_void(&mut self) -> bool {
        if self.operands.last() == Some(&true) {
            self.operands.pop();
            true
        } else {
            false
        }
    }

    /// Values currently on the evaluation stack, void placeholders included.
    pub fn stack_depth(&self) -> usize {
        self.operands.len()
    }

    // ── Program bracketing ──────────────────────────────────────────────

    pub fn begin_program(&mut self) {
        self.lower_infallible(Op::BeginProgram);
    }

    pub fn end_program(&mut self) -> Listing {
        if let Some(fixup) = self.fixups.pending().next() {
            ice(format!("frame of '{}' was never resolved", fixup.function));
        }
        if !self.break_stack.is_empty() || !self.continue_stack.is_empty() {
            ice("loop stacks not empty at end of program");
        }
        self.lower_infallible(Op::EndProgram);
        Listing::new(std::mem::take(&mut self.out))
    }

    fn lower_infallible(&mut self, op: Op) {
        tracing::trace!(?op, "emit");
        self.backend.lower(&op, &mut self.labels, &mut self.out);
    }

    // ── Functions ───────────────────────────────────────────────────────

    /// Emit the entry label and prologue against a placeholder frame size.
    pub fn entry(&mut self, name: &str) -> FixupId {
        let frame = self.new_label();
        let id = self.fixups.register(name, frame);
        self.lower_infallible(Op::Entry {
            name: name.to_string(),
            frame,
        });
        id
    }

    /// Resolve the placeholder once the whole body has been seen.
    pub fn fix_entry(&mut self, id: FixupId, size: usize) {
        let frame = self.fixups.resolve(id, size).label;
        self.lower_infallible(Op::FixEntry { frame, size });
    }

    /// Call sequence: call, caller-side argument cleanup, then the return
    /// value unless the callee is void.
    pub fn call(&mut self, name: &str, args: usize, has_value: bool) -> Result<(), SemanticError> {
        let result = self.emit(Op::Call {
            name: name.to_string(),
            args,
        });
        for _ in 0..args {
            self.lower_infallible(Op::DiscardArgument);
        }
        if has_value {
            self.emit(Op::ReturnValue)?;
        } else {
            self.operands.push(true);
        }
        result
    }

    // ── Loops ───────────────────────────────────────────────────────────

    pub fn enter_loop(&mut self, break_label: Label, continue_label: Label) {
        self.break_stack.push(break_label);
        self.continue_stack.push(continue_label);
    }

    pub fn leave_loop(&mut self) {
        if self.break_stack.pop().is_none() || self.continue_stack.pop().is_none() {
            ice("leave_loop without a matching enter_loop");
        }
    }

    pub fn loop_depth(&self) -> usize {
        self.break_stack.len()
    }

    pub fn emit_break(&mut self) -> Result<(), SemanticError> {
        match self.break_stack.last().copied() {
            Some(label) => self.emit(Op::Jump(label)),
            None => Err(SemanticError::new(
                SemanticErrorKind::NoLoopOpen,
                "'break' outside of a loop",
            )),
        }
    }

    pub fn emit_continue(&mut self) -> Result<(), SemanticError> {
        match self.continue_stack.last().copied() {
            Some(label) => self.emit(Op::Jump(label)),
            None => Err(SemanticError::new(
                SemanticErrorKind::NoLoopOpen,
                "'continue' outside of a loop",
            )),
        }
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("backend", &self.backend.name())
            .field("labels", &self.labels.count())
            .field("loops", &self.break_stack.len())
            .field("items", &self.out.len())
            .finish()
    }
}
