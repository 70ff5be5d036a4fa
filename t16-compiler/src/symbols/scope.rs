use std::collections::HashMap;

use super::symbol::SymbolId;

/// One level of the scope stack.
#[derive(Debug, Default)]
pub struct Scope {
    pub depth: usize,
    /// Local region top when the scope was entered; restored on exit.
    pub local_mark: usize,
    symbols: HashMap<String, SymbolId>,
}

impl Scope {
    pub fn new(depth: usize, local_mark: usize) -> Self {
        Self {
            depth,
            local_mark,
            symbols: HashMap::new(),
        }
    }

    /// Bind `name`, returning the binding it displaced.
    pub fn insert(&mut self, name: &str, id: SymbolId) -> Option<SymbolId> {
        self.symbols.insert(name.to_string(), id)
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.symbols.get(name).copied()
    }

    pub fn remove(&mut self, name: &str) -> Option<SymbolId> {
        self.symbols.remove(name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn into_ids(self) -> impl Iterator<Item = SymbolId> {
        self.symbols.into_values()
    }
}
