//! One compilation: every semantic action the front end fires.
//!
//! A [`Session`] owns the symbol table, the emitter and the diagnostics.
//! Each entry point records its own error before returning it, so a caller
//! may ignore the `Err` and keep compiling. When an action fails the
//! session still emits stand-in ops that keep the evaluation stack
//! balanced; the output is then not meant to be assembled.

use crate::backend::t16::abi::ENTRY_POINT;
use crate::backend::Listing;
use crate::diag::{ice, Diagnostic, Diagnostics, SemanticError, SemanticErrorKind, WarningKind};
use crate::emit::{Access, BinOp, Emitter, FixupId, Label, Op, StoreTarget, UnOp};
use crate::symbols::{
    ArityCheck, SymbolId, SymbolKind, SymbolTable, FIRST_LOCAL_DEPTH, GLOBAL_DEPTH,
};
use crate::CompileOptions;

/// Result of [`Session::finish`].
#[derive(Debug, Clone)]
pub struct Compilation {
    pub listing: Listing,
    pub diagnostics: Vec<Diagnostic>,
    pub errors: usize,
    pub warnings: usize,
}

impl Compilation {
    pub fn is_clean(&self) -> bool {
        self.errors == 0
    }

    pub fn first_error(&self) -> Option<&Diagnostic> {
        self.diagnostics.iter().find(|d| d.error_kind().is_some())
    }
}

/// The function whose body is being compiled.
#[derive(Debug)]
struct FunctionContext {
    symbol: SymbolId,
    name: String,
    has_return: bool,
    fixup: Option<FixupId>,
    last_param: Option<SymbolId>,
    returns_value: bool,
}

#[derive(Debug)]
pub struct Session {
    symbols: SymbolTable,
    emitter: Emitter,
    diagnostics: Diagnostics,
    function: Option<FunctionContext>,
    main_defined: bool,
}

impl Session {
    pub fn new(options: &CompileOptions) -> Self {
        let mut diagnostics = Diagnostics::new();
        diagnostics.set_position(&options.file_name, 1);
        let mut emitter = Emitter::new(options.target);
        emitter.begin_program();
        tracing::debug!(backend = emitter.backend_name(), file = %options.file_name, "session started");
        Self {
            symbols: SymbolTable::new(),
            emitter,
            diagnostics,
            function: None,
            main_defined: false,
        }
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn set_position(&mut self, file: &str, line: usize) {
        self.diagnostics.set_position(file, line);
    }

    pub fn note_token(&mut self, text: &str) {
        self.diagnostics.note_token(text);
    }

    fn record<T>(&mut self, result: Result<T, SemanticError>) -> Result<T, SemanticError> {
        if let Err(err) = &result {
            self.diagnostics.error(err);
        }
        result
    }

    fn emit(&mut self, op: Op) -> Result<(), SemanticError> {
        let result = self.emitter.emit(op);
        self.record(result)
    }

    fn current(&self) -> &FunctionContext {
        match &self.function {
            Some(ctx) => ctx,
            None => ice("no function is being compiled"),
        }
    }

    fn current_mut(&mut self) -> &mut FunctionContext {
        match &mut self.function {
            Some(ctx) => ctx,
            None => ice("no function is being compiled"),
        }
    }

    // ── Identifiers and declarations ────────────────────────────────────

    /// Resolve a name, creating an undeclared stub on first sight.
    pub fn identifier(&mut self, name: &str) -> SymbolId {
        self.symbols.lookup_or_create(name)
    }

    pub fn declare_variable(
        &mut self,
        name: &str,
        size: usize,
        ref_level: u8,
    ) -> Result<SymbolId, SemanticError> {
        let id = self.identifier(name);
        let result = self.symbols.declare_variable(id, size, ref_level);
        self.record(result)
    }

    /// Start a function definition. A duplicate definition is reported but
    /// the body is still compiled.
    pub fn declare_function(
        &mut self,
        name: &str,
        has_return: bool,
    ) -> Result<SymbolId, SemanticError> {
        if self.function.is_some() {
            ice("nested function definition");
        }
        let id = self.identifier(name);
        let result = self.symbols.declare_function(id, has_return);
        if result.is_ok() && name == ENTRY_POINT {
            self.main_defined = true;
        }
        self.function = Some(FunctionContext {
            symbol: id,
            name: name.to_string(),
            has_return,
            fixup: None,
            last_param: None,
            returns_value: false,
        });
        self.record(result)
    }

    pub fn begin_parameters(&mut self) {
        self.symbols.begin_function();
        self.symbols.enter_scope();
    }

    pub fn add_parameter(&mut self, name: &str, ref_level: u8) -> Result<SymbolId, SemanticError> {
        let id = self.identifier(name);
        let result = self.symbols.declare_variable(id, 0, ref_level);
        let param = self.record(result)?;
        let ctx = self.current_mut();
        let (function, prev) = (ctx.symbol, ctx.last_param.replace(param));
        self.symbols.link_parameter(function, prev, param);
        Ok(param)
    }

    /// Close the parameter list. The definition seeds the arity memo when
    /// no call site has been seen yet.
    pub fn end_parameters(&mut self) {
        let arity = self.symbols.param_count();
        let (function, name) = {
            let ctx = self.current();
            (ctx.symbol, ctx.name.clone())
        };
        if let ArityCheck::Mismatch { expected, found } = self.symbols.check_arity(function, arity)
        {
            self.diagnostics.warning(
                WarningKind::ArityMismatch,
                format!("'{name}' takes {found} parameter(s) but was called with {expected}"),
            );
        }
    }

    /// Emit the prologue and open the body scope.
    pub fn begin_body(&mut self) {
        let name = self.current().name.clone();
        let fixup = self.emitter.entry(&name);
        self.current_mut().fixup = Some(fixup);
        self.symbols.enter_scope();
        tracing::debug!(function = %name, "function entry");
    }

    /// Fall-through return, scope teardown and frame-size resolution.
    pub fn end_function(&mut self) {
        let Some(ctx) = self.function.take() else {
            ice("end_function without a function");
        };
        let _ = self.lower_return(false, &ctx.name);
        if ctx.has_return && !ctx.returns_value && ctx.name != ENTRY_POINT {
            self.diagnostics.warning(
                WarningKind::MissingReturnValue,
                format!("'{}' never returns a value", ctx.name),
            );
        }
        self.symbols.leave_scope();
        let frame = self.symbols.frame_size();
        self.symbols.leave_scope();
        let Some(fixup) = ctx.fixup else {
            ice(format!("'{}' has no entry", ctx.name));
        };
        self.emitter.fix_entry(fixup, frame);
        tracing::debug!(function = %ctx.name, frame, "function done");
    }

    pub fn enter_block(&mut self) {
        self.symbols.enter_scope();
    }

    pub fn leave_block(&mut self) {
        if self.symbols.depth() <= FIRST_LOCAL_DEPTH {
            ice("leave_block would close a function scope");
        }
        self.symbols.leave_scope();
    }

    // ── Control flow ────────────────────────────────────────────────────

    pub fn new_label(&mut self) -> Label {
        self.emitter.new_label()
    }

    pub fn label(&mut self, label: Label) {
        let _ = self.emit(Op::Label(label));
    }

    pub fn jump(&mut self, label: Label) {
        let _ = self.emit(Op::Jump(label));
    }

    pub fn jump_if_false(&mut self, label: Label) -> Result<(), SemanticError> {
        self.emit(Op::JumpIfFalse(label))
    }

    pub fn jump_if_true(&mut self, label: Label) -> Result<(), SemanticError> {
        self.emit(Op::JumpIfTrue(label))
    }

    pub fn enter_loop(&mut self, break_label: Label, continue_label: Label) {
        self.emitter.enter_loop(break_label, continue_label);
    }

    pub fn leave_loop(&mut self) {
        self.emitter.leave_loop();
    }

    pub fn emit_break(&mut self) -> Result<(), SemanticError> {
        let result = self.emitter.emit_break();
        self.record(result)
    }

    pub fn emit_continue(&mut self) -> Result<(), SemanticError> {
        let result = self.emitter.emit_continue();
        self.record(result)
    }

    // ── Expressions ─────────────────────────────────────────────────────

    pub fn load_immediate(&mut self, value: i32) {
        let _ = self.emit(Op::LoadImmediate(value));
    }

    pub fn binary(&mut self, op: BinOp) -> Result<(), SemanticError> {
        self.emit(Op::Binary(op))
    }

    pub fn unary(&mut self, op: UnOp) -> Result<(), SemanticError> {
        self.emit(Op::Unary(op))
    }

    /// `*(expr)` with the address already pushed.
    pub fn deref(&mut self) -> Result<(), SemanticError> {
        self.emit(Op::Deref)
    }

    /// End of an expression statement: drop its value, if any.
    pub fn expression_statement(&mut self) {
        if !self.emitter.take_void() {
            let _ = self.emit(Op::Discard);
        }
    }

    fn variable(&mut self, name: &str) -> Result<SymbolId, SemanticError> {
        let id = self.identifier(name);
        let result = self.symbols.use_as_variable(id).map(|()| id);
        self.record(result)
    }

    fn indexable(&mut self, name: &str) -> Result<SymbolId, SemanticError> {
        let id = self.variable(name)?;
        let sym = self.symbols.get(id);
        let result = if sym.is_array() || sym.ref_level > 0 {
            Ok(id)
        } else {
            Err(SemanticError::new(
                SemanticErrorKind::NotAnArray,
                format!("'{name}' is neither an array nor a pointer"),
            ))
        };
        self.record(result)
    }

    /// Push a variable's value; an array name yields its address.
    pub fn load_variable(&mut self, name: &str) -> Result<(), SemanticError> {
        match self.variable(name) {
            Ok(id) => {
                let address = self.symbols.address(id);
                self.emit(Op::Load {
                    access: Access::Direct,
                    address,
                    rvalue: true,
                })
            }
            Err(err) => {
                self.load_immediate(0);
                Err(err)
            }
        }
    }

    /// `name[index]` with the index on the stack. With `rvalue` unset the
    /// element's address is left for a later [`Session::store_indexed`].
    pub fn load_indexed(&mut self, name: &str, rvalue: bool) -> Result<(), SemanticError> {
        match self.indexable(name) {
            Ok(id) => {
                let address = self.symbols.address(id);
                self.emit(Op::Load {
                    access: Access::Indirect,
                    address,
                    rvalue,
                })
            }
            Err(err) => {
                let _ = self.emit(Op::Discard);
                self.load_immediate(0);
                Err(err)
            }
        }
    }

    /// `*name`. With `rvalue` unset the pointer value itself is pushed.
    pub fn load_pointer(&mut self, name: &str, rvalue: bool) -> Result<(), SemanticError> {
        let id = match self.variable(name) {
            Ok(id) => id,
            Err(err) => {
                self.load_immediate(0);
                return Err(err);
            }
        };
        let address = self.symbols.address(id);
        if address.is_array() {
            // `*a` is `a[0]`.
            self.load_immediate(0);
            return self.emit(Op::Load {
                access: Access::Indirect,
                address,
                rvalue,
            });
        }
        self.emit(Op::Load {
            access: Access::Pointer,
            address,
            rvalue,
        })
    }

    /// `&name`.
    pub fn address_of(&mut self, name: &str) -> Result<(), SemanticError> {
        match self.variable(name) {
            Ok(id) => {
                let address = self.symbols.address(id);
                self.emit(Op::Load {
                    access: Access::Reference,
                    address,
                    rvalue: false,
                })
            }
            Err(err) => {
                self.load_immediate(0);
                Err(err)
            }
        }
    }

    /// `name = value`; the value stays on the stack as the expression result.
    pub fn store_variable(&mut self, name: &str) -> Result<(), SemanticError> {
        let id = self.variable(name)?;
        if self.symbols.get(id).is_array() {
            return self.record(Err(SemanticError::new(
                SemanticErrorKind::ArrayNotAssignable,
                format!("cannot assign to array '{name}'"),
            )));
        }
        let address = self.symbols.address(id);
        self.emit(Op::Store(StoreTarget::Direct(address)))
    }

    /// Store through the address pushed below the value.
    pub fn store_indexed(&mut self) -> Result<(), SemanticError> {
        self.emit(Op::Store(StoreTarget::Indirect))
    }

    /// `*name = value`.
    pub fn store_pointer(&mut self, name: &str) -> Result<(), SemanticError> {
        let id = self.variable(name)?;
        let address = self.symbols.address(id);
        if address.is_array() {
            // The element address has to sit below the value.
            let _ = self.emit(Op::Discard);
            self.load_immediate(0);
            let _ = self.emit(Op::Load {
                access: Access::Indirect,
                address,
                rvalue: false,
            });
            return self.record(Err(SemanticError::new(
                SemanticErrorKind::ArrayNotAssignable,
                format!("write '{name}[0]' instead of '*{name}'"),
            )));
        }
        self.emit(Op::Store(StoreTarget::Pointer(address)))
    }

    /// Call with `args` arguments already pushed.
    pub fn call(&mut self, name: &str, args: usize) -> Result<(), SemanticError> {
        let id = self.identifier(name);
        let result = self.symbols.use_as_function(id);
        if let Err(err) = self.record(result) {
            for _ in 0..args {
                let _ = self.emit(Op::Discard);
            }
            self.load_immediate(0);
            return Err(err);
        }
        if let ArityCheck::Mismatch { expected, found } = self.symbols.check_arity(id, args) {
            self.diagnostics.warning(
                WarningKind::ArityMismatch,
                format!("'{name}' called with {found} argument(s), expected {expected}"),
            );
        }
        let has_value = self.symbols.get(id).kind != SymbolKind::VoidFunction;
        let result = self.emitter.call(name, args, has_value);
        self.record(result)
    }

    /// `return;` or `return expr;` with the value pushed.
    pub fn ret(&mut self, has_value: bool) -> Result<(), SemanticError> {
        let (name, has_return) = {
            let ctx = self.current();
            (ctx.name.clone(), ctx.has_return)
        };
        let mut result = Ok(());
        if has_value {
            if has_return {
                self.current_mut().returns_value = true;
            } else {
                result = self.record(Err(SemanticError::new(
                    SemanticErrorKind::ReturnValueInVoid,
                    format!("void function '{name}' returns a value"),
                )));
            }
        } else if has_return {
            self.diagnostics.warning(
                WarningKind::MissingReturnValue,
                format!("'return' without a value in '{name}'"),
            );
        }
        let lowered = self.lower_return(has_value, &name);
        result.and(lowered)
    }

    fn lower_return(&mut self, has_value: bool, name: &str) -> Result<(), SemanticError> {
        self.emit(Op::Return {
            has_value,
            is_main: name == ENTRY_POINT,
        })
    }

    // ── Program end ─────────────────────────────────────────────────────

    /// Close the global scope and produce the listing.
    pub fn finish(mut self) -> Compilation {
        if let Some(ctx) = &self.function {
            ice(format!("function '{}' still open at end of input", ctx.name));
        }
        if self.symbols.depth() != GLOBAL_DEPTH {
            ice(format!("scope depth {} at end of input", self.symbols.depth()));
        }
        for name in self.symbols.leave_scope() {
            self.diagnostics.warning(
                WarningKind::ImplicitFunction,
                format!("'{name}' is called but never defined"),
            );
        }
        if !self.main_defined {
            let err = SemanticError::new(
                SemanticErrorKind::MissingMain,
                format!("no '{ENTRY_POINT}' function defined"),
            );
            self.diagnostics.error(&err);
        }
        let listing = self.emitter.end_program();
        let errors = self.diagnostics.error_count();
        let warnings = self.diagnostics.warning_count();
        tracing::debug!(errors, warnings, lines = listing.items.len(), "session finished");
        Compilation {
            listing,
            diagnostics: self.diagnostics.into_vec(),
            errors,
            warnings,
        }
    }
}
