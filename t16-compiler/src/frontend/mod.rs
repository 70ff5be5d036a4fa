//! Reference front end: logos lexer plus a recursive-descent driver that
//! fires the session's semantic actions in source order.

pub mod lexer;
pub mod parser;

pub use lexer::{tokenize, LexicalError, Lexeme, Token};
pub use parser::Parser;

use crate::session::Session;
use crate::CompileError;

/// Drive `session` over a whole translation unit.
pub fn parse_into(source: &str, file_name: &str, session: &mut Session) -> Result<(), CompileError> {
    let tokens = tokenize(source)?;
    tracing::debug!(tokens = tokens.len(), "lexed");
    Parser::new(tokens, file_name, session).parse_program()
}
