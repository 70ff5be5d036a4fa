use logos::Logos;
use std::fmt;

/// `# <line> "<file>"` left behind by the preprocessor. Other directives
/// are skipped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineMarker {
    pub line: usize,
    pub file: Option<String>,
}

fn line_marker(lex: &mut logos::Lexer<Token>) -> logos::Filter<LineMarker> {
    let body = lex.slice()[1..].trim();
    let body = body.strip_prefix("line").map_or(body, str::trim_start);
    let mut parts = body.splitn(2, char::is_whitespace);
    let Some(line) = parts.next().and_then(|n| n.parse().ok()) else {
        return logos::Filter::Skip;
    };
    let file = parts
        .next()
        .map(str::trim)
        .and_then(|rest| rest.strip_prefix('"'))
        .and_then(|rest| rest.split('"').next())
        .map(str::to_string);
    logos::Filter::Emit(LineMarker { line, file })
}

fn number(lex: &mut logos::Lexer<Token>) -> Option<i32> {
    let text = lex.slice();
    let value = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => text.parse::<i64>().ok()?,
    };
    // Literals fill one 16-bit word.
    (value <= 0xFFFF).then_some(value as i32)
}

#[derive(Logos, Debug, PartialEq, Eq, Hash, Clone)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub enum Token {
    // --- Keywords ---
    #[token("int")]
    Int,
    #[token("void")]
    Void,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("do")]
    Do,
    #[token("for")]
    For,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("return")]
    Return,

    // --- Identifiers and Numbers ---
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[regex(r"0[xX][0-9a-fA-F]+|[0-9]+", number)]
    Number(i32),

    #[regex(r"#[^\n]*", line_marker)]
    LineMarker(LineMarker),

    // --- Operators ---
    #[token("==")]
    Eq,
    #[token("!=")]
    Neq,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,

    #[token("=")]
    Assign,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token(">")]
    Gt,
    #[token("<")]
    Lt,
    #[token("!")]
    Bang,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("~")]
    Tilde,

    // --- Punctuation ---
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Int => write!(f, "int"),
            Token::Void => write!(f, "void"),
            Token::If => write!(f, "if"),
            Token::Else => write!(f, "else"),
            Token::While => write!(f, "while"),
            Token::Do => write!(f, "do"),
            Token::For => write!(f, "for"),
            Token::Break => write!(f, "break"),
            Token::Continue => write!(f, "continue"),
            Token::Return => write!(f, "return"),
            Token::Ident(s) => write!(f, "{s}"),
            Token::Number(n) => write!(f, "{n}"),
            Token::LineMarker(m) => write!(f, "# {}", m.line),
            Token::Eq => write!(f, "=="),
            Token::Neq => write!(f, "!="),
            Token::Le => write!(f, "<="),
            Token::Ge => write!(f, ">="),
            Token::Shl => write!(f, "<<"),
            Token::Shr => write!(f, ">>"),
            Token::AndAnd => write!(f, "&&"),
            Token::OrOr => write!(f, "||"),
            Token::Assign => write!(f, "="),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Gt => write!(f, ">"),
            Token::Lt => write!(f, "<"),
            Token::Bang => write!(f, "!"),
            Token::Amp => write!(f, "&"),
            Token::Pipe => write!(f, "|"),
            Token::Caret => write!(f, "^"),
            Token::Tilde => write!(f, "~"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Semicolon => write!(f, ";"),
        }
    }
}

/// Input no token matches. `line` is physical; line markers are not applied
/// this early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexicalError {
    pub location: usize,
    pub line: usize,
    pub column: usize,
    pub unexpected_char: char,
    pub context: String,
}

impl fmt::Display for LexicalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unexpected input '{}' at line {}, column {}\n  Context: {}",
            self.unexpected_char, self.line, self.column, self.context
        )
    }
}

impl std::error::Error for LexicalError {}

impl LexicalError {
    /// Error at byte `position`, which sits on physical `line`.
    fn at(source: &str, position: usize, line: usize) -> Self {
        let line_start = source[..position].rfind('\n').map_or(0, |nl| nl + 1);
        let line_end = source[position..]
            .find('\n')
            .map_or(source.len(), |nl| position + nl);
        LexicalError {
            location: position,
            line,
            column: source[line_start..position].chars().count() + 1,
            unexpected_char: source[position..].chars().next().unwrap_or('\0'),
            context: source[line_start..line_end].trim().to_string(),
        }
    }
}

/// A token with its source text and physical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexeme {
    pub token: Token,
    pub text: String,
    pub line: usize,
    pub offset: usize,
}

/// Tokenize the whole input up front.
pub fn tokenize(source: &str) -> Result<Vec<Lexeme>, LexicalError> {
    let mut lexer = Token::lexer(source);
    let mut out = Vec::new();
    let mut line = 1;
    let mut scanned = 0;

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        line += source[scanned..span.start].matches('\n').count();
        scanned = span.start;
        match result {
            Ok(token) => out.push(Lexeme {
                token,
                text: lexer.slice().to_string(),
                line,
                offset: span.start,
            }),
            Err(()) => return Err(LexicalError::at(source, span.start, line)),
        }
    }
    Ok(out)
}
