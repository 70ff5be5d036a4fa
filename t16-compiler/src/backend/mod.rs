//! Backends: lower abstract ops into listing items.
//!
//! Module layout:
//! - `trace`: one readable line per op, for debugging the front end
//! - `t16`: the T16 register machine (ABI, instructions, lowering, runtime)

pub mod t16;
pub mod trace;

use std::fmt;

use crate::emit::{LabelAllocator, Op};
use t16::instruction::Instr;

pub use t16::T16Backend;
pub use trace::TraceBackend;

/// Lowers abstract ops for one output syntax.
pub trait Backend {
    fn name(&self) -> &'static str;

    /// Append the items for `op`. Backends may allocate extra labels.
    fn lower(&mut self, op: &Op, labels: &mut LabelAllocator, out: &mut Vec<AsmItem>);
}

/// Output syntax, chosen once per compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetKind {
    /// Debug trace of the abstract ops.
    Trace,
    /// T16 mnemonics.
    #[default]
    T16,
}

impl TargetKind {
    pub fn backend(self) -> Box<dyn Backend> {
        match self {
            TargetKind::Trace => Box::new(TraceBackend::new()),
            TargetKind::T16 => Box::new(T16Backend::new()),
        }
    }
}

/// One line of output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsmItem {
    Label(String),
    Instr {
        instr: Instr,
        comment: Option<String>,
    },
    /// `.define name, value` equate.
    Define {
        name: String,
        value: i64,
    },
    /// A trace line.
    Trace(String),
}

impl AsmItem {
    pub fn as_label(&self) -> Option<&str> {
        match self {
            AsmItem::Label(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_instr(&self) -> Option<&Instr> {
        match self {
            AsmItem::Instr { instr, .. } => Some(instr),
            _ => None,
        }
    }
}

impl fmt::Display for AsmItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmItem::Label(name) => write!(f, "{name}:"),
            AsmItem::Instr {
                instr,
                comment: Some(c),
            } => write!(f, "{:<24}; {c}", instr.to_string()),
            AsmItem::Instr {
                instr,
                comment: None,
            } => write!(f, "{instr}"),
            AsmItem::Define { name, value } => write!(f, "  .define {name}, {value}"),
            AsmItem::Trace(text) => write!(f, "  {text}"),
        }
    }
}

/// Complete output of one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub items: Vec<AsmItem>,
}

impl Listing {
    pub fn new(items: Vec<AsmItem>) -> Self {
        Self { items }
    }

    pub fn lines(&self) -> Vec<String> {
        self.items.iter().map(ToString::to_string).collect()
    }

    pub fn instrs(&self) -> impl Iterator<Item = &Instr> {
        self.items.iter().filter_map(AsmItem::as_instr)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(AsmItem::as_label)
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in &self.items {
            writeln!(f, "{item}")?;
        }
        Ok(())
    }
}
