//! Diagnostics collected while a compilation runs.
//!
//! Two severities exist. An error bumps the running count and compilation
//! carries on in degraded mode; a warning is reported and otherwise ignored.
//! Internal invariant violations are not diagnostics at all: they go through
//! [`ice`] and abort.

use std::fmt;
use thiserror::Error;

/// Upper bound on stored diagnostics; counts keep running past it.
const MAX_STORED: usize = 512;

/// Characters of recent token text kept for the snippet.
const SNIPPET_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticErrorKind {
    DuplicateName,
    DuplicateParameter,
    DuplicateDefinition,
    UndeclaredVariable,
    UnexpectedParameter,
    FunctionUsedAsVariable,
    VariableUsedAsFunction,
    NotAnArray,
    ArrayNotAssignable,
    NoLoopOpen,
    VoidValueUsed,
    ReturnValueInVoid,
    ZeroPageOverflow,
    MissingMain,
}

impl fmt::Display for SemanticErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticErrorKind::DuplicateName => write!(f, "duplicate name"),
            SemanticErrorKind::DuplicateParameter => write!(f, "duplicate parameter"),
            SemanticErrorKind::DuplicateDefinition => write!(f, "duplicate definition"),
            SemanticErrorKind::UndeclaredVariable => write!(f, "undeclared variable"),
            SemanticErrorKind::UnexpectedParameter => write!(f, "unexpected parameter"),
            SemanticErrorKind::FunctionUsedAsVariable => write!(f, "function used as variable"),
            SemanticErrorKind::VariableUsedAsFunction => write!(f, "variable used as function"),
            SemanticErrorKind::NotAnArray => write!(f, "not an array"),
            SemanticErrorKind::ArrayNotAssignable => write!(f, "array not assignable"),
            SemanticErrorKind::NoLoopOpen => write!(f, "no loop open"),
            SemanticErrorKind::VoidValueUsed => write!(f, "void value used"),
            SemanticErrorKind::ReturnValueInVoid => write!(f, "return value in void function"),
            SemanticErrorKind::ZeroPageOverflow => write!(f, "zero page overflow"),
            SemanticErrorKind::MissingMain => write!(f, "missing main"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    ArityMismatch,
    ImplicitFunction,
    MissingReturnValue,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningKind::ArityMismatch => write!(f, "arity mismatch"),
            WarningKind::ImplicitFunction => write!(f, "implicit function"),
            WarningKind::MissingReturnValue => write!(f, "missing return value"),
        }
    }
}

/// Result error of every semantic action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct SemanticError {
    pub kind: SemanticErrorKind,
    pub message: String,
}

impl SemanticError {
    pub fn new(kind: SemanticErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Approximate source position, as tracked from line markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePosition {
    pub file: String,
    pub line: usize,
}

impl Default for SourcePosition {
    fn default() -> Self {
        Self {
            file: "<input>".to_string(),
            line: 1,
        }
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Error(SemanticErrorKind),
    Warning(WarningKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub position: SourcePosition,
    pub snippet: String,
    pub message: String,
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self.kind {
            DiagnosticKind::Error(_) => Severity::Error,
            DiagnosticKind::Warning(_) => Severity::Warning,
        }
    }

    pub fn error_kind(&self) -> Option<SemanticErrorKind> {
        match self.kind {
            DiagnosticKind::Error(kind) => Some(kind),
            DiagnosticKind::Warning(_) => None,
        }
    }

    pub fn warning_kind(&self) -> Option<WarningKind> {
        match self.kind {
            DiagnosticKind::Warning(kind) => Some(kind),
            DiagnosticKind::Error(_) => None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity() {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {}: {}", self.position, label, self.message)?;
        if !self.snippet.is_empty() {
            write!(f, " (near \"{}\")", self.snippet)?;
        }
        Ok(())
    }
}

/// Per-compilation diagnostic sink.
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
    errors: usize,
    warnings: usize,
    position: SourcePosition,
    recent: String,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_position(&mut self, file: &str, line: usize) {
        if self.position.file != file {
            self.position.file = file.to_string();
        }
        self.position.line = line;
    }

    pub fn position(&self) -> &SourcePosition {
        &self.position
    }

    /// Remember token text for the trailing snippet of later diagnostics.
    pub fn note_token(&mut self, text: &str) {
        if !self.recent.is_empty() {
            self.recent.push(' ');
        }
        self.recent.push_str(text);
        let excess = self.recent.chars().count().saturating_sub(SNIPPET_LEN);
        if excess > 0 {
            let cut = self
                .recent
                .char_indices()
                .nth(excess)
                .map_or(self.recent.len(), |(i, _)| i);
            self.recent.drain(..cut);
        }
    }

    pub fn snippet(&self) -> &str {
        &self.recent
    }

    pub fn error(&mut self, err: &SemanticError) {
        self.errors += 1;
        tracing::debug!(kind = %err.kind, "{}", err.message);
        self.push(DiagnosticKind::Error(err.kind), err.message.clone());
    }

    pub fn warning(&mut self, kind: WarningKind, message: impl Into<String>) {
        let message = message.into();
        self.warnings += 1;
        tracing::warn!(%kind, "{}", message);
        self.push(DiagnosticKind::Warning(kind), message);
    }

    fn push(&mut self, kind: DiagnosticKind, message: String) {
        if self.items.len() >= MAX_STORED {
            return;
        }
        self.items.push(Diagnostic {
            kind,
            position: self.position.clone(),
            snippet: self.recent.clone(),
            message,
        });
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

/// Abort on a broken internal invariant.
#[track_caller]
pub fn ice(message: impl fmt::Display) -> ! {
    panic!("internal compiler error: {message}")
}
