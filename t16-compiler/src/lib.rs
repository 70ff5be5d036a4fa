pub mod backend;
pub mod diag;
pub mod emit;
pub mod frontend;
pub mod session;
pub mod sim;
pub mod symbols;

use thiserror::Error;

pub use backend::{Listing, TargetKind};
pub use diag::{Diagnostic, SemanticError, SemanticErrorKind, WarningKind};
pub use session::{Compilation, Session};

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Lexical error: {0}")]
    Lexical(#[from] frontend::lexer::LexicalError),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Compilation ran to the end but reported errors.
    #[error("compilation failed with {errors} error(s); first: {first}")]
    Semantic { errors: usize, first: String },

    #[error("warnings treated as errors: {warnings} warning(s)")]
    Warnings { warnings: usize },
}

/// Per-compilation settings.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub target: TargetKind,
    /// Reported in diagnostics until a line marker names another file.
    pub file_name: String,
    pub warnings_as_errors: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            target: TargetKind::T16,
            file_name: "<input>".to_string(),
            warnings_as_errors: false,
        }
    }
}

impl CompileOptions {
    pub fn trace() -> Self {
        Self {
            target: TargetKind::Trace,
            ..Self::default()
        }
    }
}

/// Run a whole compilation and keep the result even when it has errors.
///
/// Only lexical and syntax errors are returned as `Err`; semantic errors
/// are in the returned [`Compilation`].
pub fn compile_to_listing(
    source: &str,
    options: &CompileOptions,
) -> Result<Compilation, CompileError> {
    let mut session = Session::new(options);
    frontend::parse_into(source, &options.file_name, &mut session)?;
    Ok(session.finish())
}

/// Compile and fail on any error (and on warnings when asked to).
pub fn compile(source: &str, options: &CompileOptions) -> Result<Compilation, CompileError> {
    let compilation = compile_to_listing(source, options)?;
    if !compilation.is_clean() {
        // The first error may have been counted after the store filled up.
        let first = match compilation.first_error() {
            Some(diagnostic) => diagnostic.to_string(),
            None => "not recorded, diagnostic limit reached".to_string(),
        };
        return Err(CompileError::Semantic {
            errors: compilation.errors,
            first,
        });
    }
    if options.warnings_as_errors && compilation.warnings > 0 {
        return Err(CompileError::Warnings {
            warnings: compilation.warnings,
        });
    }
    Ok(compilation)
}

/// Compile source text directly to T16 assembly.
pub fn compile_to_t16(source: &str) -> Result<String, CompileError> {
    let compilation = compile(source, &CompileOptions::default())?;
    Ok(compilation.listing.to_string())
}
