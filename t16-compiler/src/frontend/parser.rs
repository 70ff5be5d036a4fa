//! Recursive-descent driver for the C subset.
//!
//! The parser builds nothing: it fires the session's semantic actions in
//! source order. Semantic errors are recorded by the session and parsing
//! continues; syntax errors stop it.

use super::lexer::{Lexeme, LineMarker, Token};
use crate::emit::{BinOp, UnOp};
use crate::session::Session;
use crate::CompileError;

type PResult<T> = Result<T, CompileError>;

/// Where physical lines map to after the last line marker.
#[derive(Debug, Clone)]
struct Origin {
    file: String,
    /// Logical line of the physical line after the marker.
    line: usize,
    /// Physical line of the marker itself.
    marker_line: usize,
}

impl Origin {
    fn logical(&self, physical: usize) -> usize {
        (self.line + physical).saturating_sub(self.marker_line + 1)
    }
}

pub struct Parser<'s> {
    tokens: Vec<Lexeme>,
    pos: usize,
    origin: Origin,
    session: &'s mut Session,
}

impl<'s> Parser<'s> {
    pub fn new(tokens: Vec<Lexeme>, file_name: &str, session: &'s mut Session) -> Self {
        let mut parser = Self {
            tokens,
            pos: 0,
            origin: Origin {
                file: file_name.to_string(),
                line: 1,
                marker_line: 0,
            },
            session,
        };
        parser.skip_markers();
        parser.sync_position();
        parser
    }

    // ── Token plumbing ──────────────────────────────────────────────────

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|l| &l.token)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|l| &l.token)
    }

    fn at(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn line(&self) -> usize {
        let physical = self
            .tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |l| l.line);
        self.origin.logical(physical)
    }

    fn sync_position(&mut self) {
        let line = self.line();
        self.session.set_position(&self.origin.file, line);
    }

    fn skip_markers(&mut self) {
        while let Some(Lexeme {
            token: Token::LineMarker(LineMarker { line, file }),
            line: physical,
            ..
        }) = self.tokens.get(self.pos)
        {
            if let Some(file) = file {
                self.origin.file = file.clone();
            }
            self.origin.line = *line;
            self.origin.marker_line = *physical;
            self.pos += 1;
        }
    }

    fn bump(&mut self) -> Option<Token> {
        let lexeme = self.tokens.get(self.pos)?.clone();
        self.session.note_token(&lexeme.text);
        self.pos += 1;
        self.skip_markers();
        self.sync_position();
        Some(lexeme.token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.at(token) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn error<T>(&self, message: impl Into<String>) -> PResult<T> {
        Err(CompileError::Parse {
            line: self.line(),
            message: message.into(),
        })
    }

    fn expect(&mut self, token: Token) -> PResult<()> {
        if self.eat(&token) {
            return Ok(());
        }
        match self.peek() {
            Some(found) => self.error(format!("expected '{token}', found '{found}'")),
            None => self.error(format!("expected '{token}', found end of input")),
        }
    }

    fn ident(&mut self) -> PResult<String> {
        match self.peek() {
            Some(Token::Ident(_)) => match self.bump() {
                Some(Token::Ident(name)) => Ok(name),
                _ => self.error("expected identifier"),
            },
            Some(found) => self.error(format!("expected identifier, found '{found}'")),
            None => self.error("expected identifier, found end of input"),
        }
    }

    /// Index of the token after the bracket matching the one at `ahead`.
    fn after_matching(&self, ahead: usize, open: &Token, close: &Token) -> Option<usize> {
        let mut depth = 0usize;
        let mut i = self.pos + ahead;
        while let Some(lexeme) = self.tokens.get(i) {
            if &lexeme.token == open {
                depth += 1;
            } else if &lexeme.token == close {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            i += 1;
        }
        None
    }

    fn token_at(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index).map(|l| &l.token)
    }

    // ── Top level ───────────────────────────────────────────────────────

    pub fn parse_program(&mut self) -> PResult<()> {
        while self.peek().is_some() {
            self.parse_external()?;
        }
        Ok(())
    }

    fn parse_external(&mut self) -> PResult<()> {
        let has_return = match self.peek() {
            Some(Token::Int) => true,
            Some(Token::Void) => false,
            Some(found) => return self.error(format!("expected declaration, found '{found}'")),
            None => return self.error("expected declaration"),
        };
        self.bump();

        let is_function = matches!(
            (self.peek(), self.peek_at(1)),
            (Some(Token::Ident(_)), Some(Token::LParen))
        );
        if is_function {
            return self.parse_function(has_return);
        }
        if !has_return {
            return self.error("only functions may be declared 'void'");
        }
        self.parse_declarators(true)
    }

    fn parse_function(&mut self, has_return: bool) -> PResult<()> {
        if self.is_prototype() {
            // Prototypes carry nothing the backend checks.
            while !self.eat(&Token::Semicolon) {
                if self.bump().is_none() {
                    return self.error("unterminated prototype");
                }
            }
            return Ok(());
        }

        let name = self.ident()?;
        let _ = self.session.declare_function(&name, has_return);
        self.session.begin_parameters();
        self.expect(Token::LParen)?;
        self.parse_parameters()?;
        self.expect(Token::RParen)?;
        self.session.end_parameters();

        self.expect(Token::LBrace)?;
        self.session.begin_body();
        while !self.at(&Token::RBrace) {
            if self.peek().is_none() {
                return self.error(format!("missing '}}' at end of '{name}'"));
            }
            self.parse_block_item()?;
        }
        self.expect(Token::RBrace)?;
        self.session.end_function();
        Ok(())
    }

    fn is_prototype(&self) -> bool {
        self.after_matching(1, &Token::LParen, &Token::RParen)
            .and_then(|i| self.token_at(i))
            == Some(&Token::Semicolon)
    }

    fn parse_parameters(&mut self) -> PResult<()> {
        if self.at(&Token::RParen) {
            return Ok(());
        }
        if self.at(&Token::Void) && self.peek_at(1) == Some(&Token::RParen) {
            self.bump();
            return Ok(());
        }
        loop {
            self.expect(Token::Int)?;
            let mut ref_level = self.parse_stars();
            let name = self.ident()?;
            if self.eat(&Token::LBracket) {
                self.expect(Token::RBracket)?;
                ref_level += 1;
            }
            let _ = self.session.add_parameter(&name, ref_level);
            if !self.eat(&Token::Comma) {
                return Ok(());
            }
        }
    }

    fn parse_stars(&mut self) -> u8 {
        let mut level = 0u8;
        while self.eat(&Token::Star) {
            level = level.saturating_add(1);
        }
        level
    }

    /// `*p, a[5], x = e;` after the leading `int`.
    fn parse_declarators(&mut self, file_scope: bool) -> PResult<()> {
        loop {
            let ref_level = self.parse_stars();
            let name = self.ident()?;
            let mut size = 0;
            if self.eat(&Token::LBracket) {
                size = match self.bump() {
                    Some(Token::Number(n)) if n > 0 => n as usize,
                    _ => return self.error(format!("array '{name}' needs a positive size")),
                };
                self.expect(Token::RBracket)?;
            }
            let _ = self.session.declare_variable(&name, size, ref_level);

            if self.eat(&Token::Assign) {
                if file_scope {
                    return self.error("initialisers are not supported at file scope");
                }
                if size > 0 {
                    return self.error(format!("array '{name}' cannot be initialised"));
                }
                self.parse_assignment()?;
                let _ = self.session.store_variable(&name);
                self.session.expression_statement();
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::Semicolon)
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn parse_block_item(&mut self) -> PResult<()> {
        if self.eat(&Token::Int) {
            return self.parse_declarators(false);
        }
        self.parse_statement()
    }

    fn parse_block(&mut self) -> PResult<()> {
        self.expect(Token::LBrace)?;
        self.session.enter_block();
        while !self.at(&Token::RBrace) {
            if self.peek().is_none() {
                return self.error("missing '}'");
            }
            self.parse_block_item()?;
        }
        self.expect(Token::RBrace)?;
        self.session.leave_block();
        Ok(())
    }

    fn parse_condition(&mut self) -> PResult<()> {
        self.expect(Token::LParen)?;
        self.parse_expression()?;
        self.expect(Token::RParen)
    }

    fn parse_statement(&mut self) -> PResult<()> {
        match self.peek() {
            Some(Token::Semicolon) => {
                self.bump();
                Ok(())
            }
            Some(Token::LBrace) => self.parse_block(),
            Some(Token::If) => self.parse_if(),
            Some(Token::While) => self.parse_while(),
            Some(Token::Do) => self.parse_do(),
            Some(Token::For) => self.parse_for(),
            Some(Token::Break) => {
                self.bump();
                let _ = self.session.emit_break();
                self.expect(Token::Semicolon)
            }
            Some(Token::Continue) => {
                self.bump();
                let _ = self.session.emit_continue();
                self.expect(Token::Semicolon)
            }
            Some(Token::Return) => {
                self.bump();
                let has_value = !self.at(&Token::Semicolon);
                if has_value {
                    self.parse_expression()?;
                }
                let _ = self.session.ret(has_value);
                self.expect(Token::Semicolon)
            }
            Some(_) => {
                self.parse_expression()?;
                self.session.expression_statement();
                self.expect(Token::Semicolon)
            }
            None => self.error("expected statement, found end of input"),
        }
    }

    fn parse_if(&mut self) -> PResult<()> {
        self.bump();
        self.parse_condition()?;
        let else_label = self.session.new_label();
        let _ = self.session.jump_if_false(else_label);
        self.parse_statement()?;
        if self.eat(&Token::Else) {
            let end = self.session.new_label();
            self.session.jump(end);
            self.session.label(else_label);
            self.parse_statement()?;
            self.session.label(end);
        } else {
            self.session.label(else_label);
        }
        Ok(())
    }

    fn parse_while(&mut self) -> PResult<()> {
        self.bump();
        let test = self.session.new_label();
        let end = self.session.new_label();
        self.session.label(test);
        self.parse_condition()?;
        let _ = self.session.jump_if_false(end);
        self.session.enter_loop(end, test);
        self.parse_statement()?;
        self.session.leave_loop();
        self.session.jump(test);
        self.session.label(end);
        Ok(())
    }

    fn parse_do(&mut self) -> PResult<()> {
        self.bump();
        let top = self.session.new_label();
        let test = self.session.new_label();
        let end = self.session.new_label();
        self.session.label(top);
        self.session.enter_loop(end, test);
        self.parse_statement()?;
        self.session.leave_loop();
        self.expect(Token::While)?;
        self.session.label(test);
        self.parse_condition()?;
        let _ = self.session.jump_if_true(top);
        self.session.label(end);
        self.expect(Token::Semicolon)
    }

    /// ```text
    ///   init; drop
    /// test:  cond; jf end; bra body
    /// step:  step; drop; bra test
    /// body:  ...; bra step
    /// end:
    /// ```
    fn parse_for(&mut self) -> PResult<()> {
        self.bump();
        self.expect(Token::LParen)?;
        if !self.at(&Token::Semicolon) {
            self.parse_expression()?;
            self.session.expression_statement();
        }
        self.expect(Token::Semicolon)?;

        let test = self.session.new_label();
        let body = self.session.new_label();
        let step = self.session.new_label();
        let end = self.session.new_label();

        self.session.label(test);
        if !self.at(&Token::Semicolon) {
            self.parse_expression()?;
            let _ = self.session.jump_if_false(end);
        }
        self.expect(Token::Semicolon)?;
        self.session.jump(body);

        self.session.label(step);
        if !self.at(&Token::RParen) {
            self.parse_expression()?;
            self.session.expression_statement();
        }
        self.expect(Token::RParen)?;
        self.session.jump(test);

        self.session.label(body);
        self.session.enter_loop(end, step);
        self.parse_statement()?;
        self.session.leave_loop();
        self.session.jump(step);
        self.session.label(end);
        Ok(())
    }

    // ── Expressions ─────────────────────────────────────────────────────

    fn parse_expression(&mut self) -> PResult<()> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> PResult<()> {
        match (self.peek(), self.peek_at(1)) {
            (Some(Token::Ident(_)), Some(Token::Assign)) => {
                let name = self.ident()?;
                self.bump();
                self.parse_assignment()?;
                let _ = self.session.store_variable(&name);
                Ok(())
            }
            (Some(Token::Ident(_)), Some(Token::LBracket)) if self.assigns_after(1) => {
                let name = self.ident()?;
                self.bump();
                self.parse_expression()?;
                self.expect(Token::RBracket)?;
                let _ = self.session.load_indexed(&name, false);
                self.expect(Token::Assign)?;
                self.parse_assignment()?;
                let _ = self.session.store_indexed();
                Ok(())
            }
            (Some(Token::Star), Some(Token::Ident(_)))
                if self.token_at(self.pos + 2) == Some(&Token::Assign) =>
            {
                self.bump();
                let name = self.ident()?;
                self.bump();
                self.parse_assignment()?;
                let _ = self.session.store_pointer(&name);
                Ok(())
            }
            (Some(Token::Star), Some(Token::LParen)) if self.assigns_after(1) => {
                self.bump();
                self.parse_condition()?;
                self.expect(Token::Assign)?;
                self.parse_assignment()?;
                let _ = self.session.store_indexed();
                Ok(())
            }
            _ => self.parse_binary(0),
        }
    }

    /// Whether the bracket group starting `ahead` tokens on is followed by `=`.
    fn assigns_after(&self, ahead: usize) -> bool {
        let (open, close) = match self.peek_at(ahead) {
            Some(Token::LBracket) => (Token::LBracket, Token::RBracket),
            Some(Token::LParen) => (Token::LParen, Token::RParen),
            _ => return false,
        };
        self.after_matching(ahead, &open, &close)
            .and_then(|i| self.token_at(i))
            == Some(&Token::Assign)
    }

    /// Binary levels, loosest first. Bitwise operators share one level
    /// that binds tighter than the comparisons.
    fn parse_binary(&mut self, level: usize) -> PResult<()> {
        const LEVELS: usize = 8;
        if level == LEVELS {
            return self.parse_unary();
        }
        self.parse_binary(level + 1)?;
        while let Some(op) = self.peek().and_then(|t| binary_op(t, level)) {
            self.bump();
            self.parse_binary(level + 1)?;
            let _ = self.session.binary(op);
        }
        Ok(())
    }

    fn parse_unary(&mut self) -> PResult<()> {
        match self.peek() {
            Some(Token::Bang) => self.unary_op(UnOp::Not),
            Some(Token::Tilde) => self.unary_op(UnOp::BitNot),
            Some(Token::Minus) => {
                if let Some(Token::Number(n)) = self.peek_at(1) {
                    let value = -*n;
                    self.bump();
                    self.bump();
                    self.session.load_immediate(value);
                    return Ok(());
                }
                self.unary_op(UnOp::Neg)
            }
            Some(Token::Star) => {
                self.bump();
                let plain_name = matches!(self.peek(), Some(Token::Ident(_)))
                    && !matches!(
                        self.peek_at(1),
                        Some(Token::LBracket) | Some(Token::LParen)
                    );
                if plain_name {
                    let name = self.ident()?;
                    let _ = self.session.load_pointer(&name, true);
                    return Ok(());
                }
                self.parse_unary()?;
                let _ = self.session.deref();
                Ok(())
            }
            Some(Token::Amp) => {
                self.bump();
                let name = self.ident()?;
                if self.eat(&Token::LBracket) {
                    self.parse_expression()?;
                    self.expect(Token::RBracket)?;
                    let _ = self.session.load_indexed(&name, false);
                } else {
                    let _ = self.session.address_of(&name);
                }
                Ok(())
            }
            _ => self.parse_postfix(),
        }
    }

    fn unary_op(&mut self, op: UnOp) -> PResult<()> {
        self.bump();
        self.parse_unary()?;
        let _ = self.session.unary(op);
        Ok(())
    }

    fn parse_postfix(&mut self) -> PResult<()> {
        match self.peek() {
            Some(Token::Number(_)) => match self.bump() {
                Some(Token::Number(n)) => {
                    self.session.load_immediate(n);
                    Ok(())
                }
                _ => self.error("expected number"),
            },
            Some(Token::LParen) => {
                self.bump();
                self.parse_expression()?;
                self.expect(Token::RParen)
            }
            Some(Token::Ident(_)) => {
                let name = self.ident()?;
                if self.eat(&Token::LParen) {
                    let args = self.parse_arguments()?;
                    let _ = self.session.call(&name, args);
                } else if self.eat(&Token::LBracket) {
                    self.parse_expression()?;
                    self.expect(Token::RBracket)?;
                    let _ = self.session.load_indexed(&name, true);
                } else {
                    let _ = self.session.load_variable(&name);
                }
                Ok(())
            }
            Some(found) => self.error(format!("expected expression, found '{found}'")),
            None => self.error("expected expression, found end of input"),
        }
    }

    /// Arguments are pushed left to right.
    fn parse_arguments(&mut self) -> PResult<usize> {
        let mut count = 0;
        if self.eat(&Token::RParen) {
            return Ok(count);
        }
        loop {
            self.parse_assignment()?;
            count += 1;
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;
        Ok(count)
    }
}

fn binary_op(token: &Token, level: usize) -> Option<BinOp> {
    let op = match (level, token) {
        (0, Token::OrOr) => BinOp::LogOr,
        (1, Token::AndAnd) => BinOp::LogAnd,
        (2, Token::Eq) => BinOp::Eq,
        (2, Token::Neq) => BinOp::Ne,
        (3, Token::Lt) => BinOp::Lt,
        (3, Token::Le) => BinOp::Le,
        (3, Token::Gt) => BinOp::Gt,
        (3, Token::Ge) => BinOp::Ge,
        (4, Token::Pipe) => BinOp::BitOr,
        (4, Token::Caret) => BinOp::BitXor,
        (4, Token::Amp) => BinOp::BitAnd,
        (5, Token::Shl) => BinOp::Shl,
        (5, Token::Shr) => BinOp::Shr,
        (6, Token::Plus) => BinOp::Add,
        (6, Token::Minus) => BinOp::Sub,
        (7, Token::Star) => BinOp::Mul,
        (7, Token::Slash) => BinOp::Div,
        (7, Token::Percent) => BinOp::Mod,
        _ => return None,
    };
    Some(op)
}
