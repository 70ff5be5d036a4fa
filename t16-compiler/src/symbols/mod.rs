//! Symbol table: storage classes, scope lifetime and region offsets.
//!
//! Scopes form an explicit stack indexed by depth. Depth 0 is a sentinel
//! that is never left, depth 1 holds globals and every function, depth 2
//! holds the parameters of the function being compiled and depth 3 and up
//! are the function body and its nested blocks. Symbols live in a slot
//! arena; leaving a scope frees its slots for reuse.

pub mod scope;
pub mod symbol;

pub use scope::Scope;
pub use symbol::{
    Address, Region, Symbol, SymbolId, SymbolKind, FIRST_LOCAL_DEPTH, GLOBAL_DEPTH, PARAM_DEPTH,
    SENTINEL_DEPTH,
};

use crate::backend::t16::abi::ZERO_PAGE_CELLS;
use crate::diag::{ice, SemanticError, SemanticErrorKind};

/// Outcome of comparing a call site's argument count with the memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArityCheck {
    /// First count seen; now remembered.
    Memoized,
    Matched,
    Mismatch { expected: usize, found: usize },
}

#[derive(Debug)]
pub struct SymbolTable {
    slots: Vec<Option<Symbol>>,
    free: Vec<usize>,
    scopes: Vec<Scope>,
    global_top: usize,
    param_top: usize,
    local_top: usize,
    local_max: usize,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            scopes: vec![
                Scope::new(SENTINEL_DEPTH, 0),
                Scope::new(GLOBAL_DEPTH, 0),
            ],
            global_top: 0,
            param_top: 0,
            local_top: 0,
            local_max: 0,
        }
    }

    // ── Access ──────────────────────────────────────────────────────────

    pub fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        match self.slots.get(id.0) {
            Some(Some(sym)) => sym,
            _ => ice(format!("dangling symbol handle {}", id.0)),
        }
    }

    fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        match self.slots.get_mut(id.0) {
            Some(Some(sym)) => sym,
            _ => ice(format!("dangling symbol handle {}", id.0)),
        }
    }

    /// Number of live symbols across all scopes.
    pub fn live_symbols(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Number of arena slots ever allocated.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn global_size(&self) -> usize {
        self.global_top
    }

    pub fn param_count(&self) -> usize {
        self.param_top
    }

    /// Largest local region reached since [`SymbolTable::begin_function`].
    pub fn frame_size(&self) -> usize {
        self.local_max
    }

    pub fn address(&self, id: SymbolId) -> Address {
        let sym = self.get(id);
        if !sym.kind.is_storage() {
            ice(format!("'{}' has no storage ({})", sym.name, sym.kind));
        }
        Address {
            region: sym.region(),
            offset: sym.offset,
            size: sym.size,
            ref_level: sym.ref_level,
            arity: self.param_top,
        }
    }

    /// Walk a function's parameter chain in declaration order.
    pub fn parameters(&self, function: SymbolId) -> Vec<SymbolId> {
        let mut out = Vec::new();
        let mut cursor = self.get(function).first_param;
        while let Some(id) = cursor {
            out.push(id);
            cursor = self.get(id).next_param;
        }
        out
    }

    // ── Lookup and creation ─────────────────────────────────────────────

    /// Nearest visible binding of `name`.
    pub fn find(&self, name: &str) -> Option<SymbolId> {
        self.scopes.iter().rev().find_map(|scope| scope.lookup(name))
    }

    /// Insert an undeclared stub into the innermost scope.
    pub fn create(&mut self, name: &str) -> SymbolId {
        let depth = self.depth();
        let id = self.alloc(Symbol::stub(name, depth));
        let displaced = self
            .scopes
            .last_mut()
            .and_then(|scope| scope.insert(name, id));
        if let Some(old) = displaced {
            self.release(old);
        }
        id
    }

    pub fn lookup_or_create(&mut self, name: &str) -> SymbolId {
        match self.find(name) {
            Some(id) => id,
            None => self.create(name),
        }
    }

    fn alloc(&mut self, sym: Symbol) -> SymbolId {
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(sym);
                SymbolId(slot)
            }
            None => {
                self.slots.push(Some(sym));
                SymbolId(self.slots.len() - 1)
            }
        }
    }

    fn release(&mut self, id: SymbolId) -> Option<Symbol> {
        let sym = self.slots.get_mut(id.0).and_then(Option::take);
        if sym.is_some() {
            self.free.push(id.0);
        }
        sym
    }

    /// Move a binding into the global scope.
    fn promote_to_global(&mut self, id: SymbolId) {
        let name = self.get(id).name.clone();
        for scope in self.scopes.iter_mut().skip(GLOBAL_DEPTH + 1) {
            if scope.lookup(&name) == Some(id) {
                scope.remove(&name);
            }
        }
        let displaced = self.scopes[GLOBAL_DEPTH].insert(&name, id);
        if let Some(old) = displaced.filter(|old| *old != id) {
            self.release(old);
        }
        self.get_mut(id).depth = GLOBAL_DEPTH;
    }

    // ── Declarations ────────────────────────────────────────────────────

    /// Declare a variable (or, at parameter depth, a parameter).
    ///
    /// Redeclaring a name of the same depth is an error; the new declaration
    /// still shadows the old one so later uses resolve. Duplicate parameters
    /// keep the first entry but still reserve an argument slot.
    pub fn declare_variable(
        &mut self,
        id: SymbolId,
        size: usize,
        ref_level: u8,
    ) -> Result<SymbolId, SemanticError> {
        let depth = self.depth();
        if depth == SENTINEL_DEPTH {
            ice("declaration outside the global scope");
        }
        let (name, kind, sym_depth) = {
            let sym = self.get(id);
            (sym.name.clone(), sym.kind, sym.depth)
        };
        let same_depth = sym_depth == depth;

        let mut duplicate = None;
        let target = match kind {
            SymbolKind::Undeclared if same_depth => id,
            _ if same_depth && depth == PARAM_DEPTH => {
                self.param_top += 1;
                return Err(SemanticError::new(
                    SemanticErrorKind::DuplicateParameter,
                    format!("parameter '{name}' appears twice in the list"),
                ));
            }
            SymbolKind::Undeclared => self.create(&name),
            _ if same_depth => {
                duplicate = Some(kind);
                self.create(&name)
            }
            _ => self.create(&name),
        };

        let region = Region::for_depth(depth);
        let cells = size.max(1);
        let offset = match region {
            Region::Global => {
                let base = self.global_top;
                self.global_top += cells;
                // Arrays anchor at their last cell.
                if size > 0 {
                    self.global_top - 1
                } else {
                    base
                }
            }
            Region::Parameter => {
                let k = self.param_top;
                self.param_top += 1;
                k
            }
            Region::Local => {
                let base = self.local_top;
                self.local_top += cells;
                self.local_max = self.local_max.max(self.local_top);
                base
            }
        };

        let sym = self.get_mut(target);
        sym.kind = if region == Region::Parameter {
            SymbolKind::Parameter
        } else {
            SymbolKind::Variable
        };
        sym.depth = depth;
        sym.offset = offset;
        sym.size = size;
        sym.ref_level = ref_level;
        tracing::debug!(name = %name, %region, offset, size, "declared");

        if let Some(previous) = duplicate {
            return Err(SemanticError::new(
                SemanticErrorKind::DuplicateName,
                format!("'{name}' is already declared as a {previous} in this scope"),
            ));
        }
        if region == Region::Global && self.global_top > ZERO_PAGE_CELLS {
            return Err(SemanticError::new(
                SemanticErrorKind::ZeroPageOverflow,
                format!(
                    "'{name}' ends at cell {}, beyond the {ZERO_PAGE_CELLS}-cell zero page",
                    self.global_top - 1
                ),
            ));
        }
        Ok(target)
    }

    /// Define a function. The symbol moves to the global scope.
    pub fn declare_function(
        &mut self,
        id: SymbolId,
        has_return: bool,
    ) -> Result<SymbolId, SemanticError> {
        match self.get(id).kind {
            SymbolKind::Undeclared | SymbolKind::UndefinedFunction => {}
            other => {
                return Err(SemanticError::new(
                    SemanticErrorKind::DuplicateDefinition,
                    format!("'{}' is already defined as a {other}", self.get(id).name),
                ));
            }
        }
        self.get_mut(id).kind = if has_return {
            SymbolKind::Function
        } else {
            SymbolKind::VoidFunction
        };
        self.promote_to_global(id);
        Ok(id)
    }

    // ── Use sites ───────────────────────────────────────────────────────

    pub fn use_as_variable(&self, id: SymbolId) -> Result<(), SemanticError> {
        let sym = self.get(id);
        match sym.kind {
            SymbolKind::Variable | SymbolKind::Parameter => Ok(()),
            SymbolKind::Undeclared => Err(SemanticError::new(
                SemanticErrorKind::UndeclaredVariable,
                format!("'{}' is not declared", sym.name),
            )),
            _ => Err(SemanticError::new(
                SemanticErrorKind::FunctionUsedAsVariable,
                format!("function '{}' used as a variable", sym.name),
            )),
        }
    }

    /// Validate a call target. An undeclared name becomes a forward
    /// reference to a function defined later.
    pub fn use_as_function(&mut self, id: SymbolId) -> Result<(), SemanticError> {
        match self.get(id).kind {
            SymbolKind::Function | SymbolKind::VoidFunction | SymbolKind::UndefinedFunction => {
                Ok(())
            }
            SymbolKind::Undeclared => {
                self.get_mut(id).kind = SymbolKind::UndefinedFunction;
                self.promote_to_global(id);
                Ok(())
            }
            SymbolKind::Variable => Err(SemanticError::new(
                SemanticErrorKind::VariableUsedAsFunction,
                format!("variable '{}' used as a function", self.get(id).name),
            )),
            SymbolKind::Parameter => Err(SemanticError::new(
                SemanticErrorKind::UnexpectedParameter,
                format!("parameter '{}' used as a function", self.get(id).name),
            )),
        }
    }

    /// Append `next` to a function's parameter chain after `prev`.
    pub fn link_parameter(&mut self, function: SymbolId, prev: Option<SymbolId>, next: SymbolId) {
        match prev {
            Some(prev) => self.get_mut(prev).next_param = Some(next),
            None => self.get_mut(function).first_param = Some(next),
        }
    }

    pub fn check_arity(&mut self, id: SymbolId, argc: usize) -> ArityCheck {
        let sym = self.get_mut(id);
        match sym.expected_args {
            None => {
                sym.expected_args = Some(argc);
                ArityCheck::Memoized
            }
            Some(expected) if expected == argc => ArityCheck::Matched,
            Some(expected) => ArityCheck::Mismatch {
                expected,
                found: argc,
            },
        }
    }

    // ── Scope lifetime ──────────────────────────────────────────────────

    /// Restart parameter and local numbering for a new function.
    pub fn begin_function(&mut self) {
        self.param_top = 0;
        self.local_top = 0;
        self.local_max = 0;
    }

    pub fn enter_scope(&mut self) {
        let depth = self.depth() + 1;
        tracing::debug!(depth, "enter scope");
        self.scopes.push(Scope::new(depth, self.local_top));
    }

    /// Drop the innermost scope and everything declared in it. Returns the
    /// names of functions that were called but never defined.
    pub fn leave_scope(&mut self) -> Vec<String> {
        if self.depth() == SENTINEL_DEPTH {
            ice("attempt to leave the sentinel scope");
        }
        let Some(scope) = self.scopes.pop() else {
            ice("scope stack is empty");
        };
        tracing::debug!(depth = scope.depth, symbols = scope.len(), "leave scope");
        if scope.depth >= FIRST_LOCAL_DEPTH {
            self.local_top = scope.local_mark;
        }
        let mut undefined = Vec::new();
        for id in scope.into_ids() {
            if let Some(sym) = self.release(id) {
                if sym.kind == SymbolKind::UndefinedFunction {
                    undefined.push(sym.name);
                }
            }
        }
        undefined.sort();
        undefined
    }
}
