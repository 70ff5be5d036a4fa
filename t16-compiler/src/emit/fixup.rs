//! Deferred frame sizes.
//!
//! A prologue has to reserve the local frame before any local of the body
//! has been declared. The entry registers a pending fixup naming the
//! placeholder label; the fixup is resolved once the body is complete.

use super::op::Label;
use crate::diag::ice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixupId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixup {
    pub function: String,
    pub label: Label,
    pub value: Option<usize>,
}

impl Fixup {
    pub fn is_pending(&self) -> bool {
        self.value.is_none()
    }
}

#[derive(Debug, Default)]
pub struct FixupTable {
    entries: Vec<Fixup>,
}

impl FixupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, function: &str, label: Label) -> FixupId {
        self.entries.push(Fixup {
            function: function.to_string(),
            label,
            value: None,
        });
        FixupId(self.entries.len() - 1)
    }

    pub fn resolve(&mut self, id: FixupId, value: usize) -> &Fixup {
        let Some(entry) = self.entries.get_mut(id.0) else {
            ice(format!("unknown fixup {}", id.0));
        };
        if let Some(previous) = entry.value {
            ice(format!(
                "frame of '{}' already resolved to {previous}",
                entry.function
            ));
        }
        entry.value = Some(value);
        tracing::debug!(function = %entry.function, label = %entry.label, value, "fixup resolved");
        entry
    }

    pub fn get(&self, id: FixupId) -> &Fixup {
        match self.entries.get(id.0) {
            Some(entry) => entry,
            None => ice(format!("unknown fixup {}", id.0)),
        }
    }

    pub fn pending(&self) -> impl Iterator<Item = &Fixup> {
        self.entries.iter().filter(|f| f.is_pending())
    }
}
