use std::borrow::Cow;
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

use crate::input::LineSource;

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Eof,
    Def,
    Extern,
    Delimiter,
    OpenParen,
    CloseParen,
    Comma,
    Ident(String),
    Number(f64),
    Op(char),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Eof => write!(f, "end of input"),
            Token::Def => write!(f, "keyword 'def'"),
            Token::Extern => write!(f, "keyword 'extern'"),
            Token::Delimiter => write!(f, "';'"),
            Token::OpenParen => write!(f, "'('"),
            Token::CloseParen => write!(f, "')'"),
            Token::Comma => write!(f, "','"),
            Token::Ident(name) => write!(f, "identifier '{}'", name),
            Token::Number(value) => write!(f, "number {}", value),
            Token::Op(op) => write!(f, "'{}'", op),
        }
    }
}

lazy_static! {
    static ref COMMENT_RE: Regex = Regex::new(r"#.*").unwrap();
    static ref TOKEN_RE: Regex = Regex::new(&[
        r"(?P<ident>\p{Alphabetic}[\p{Alphabetic}\d]*)",
        r"(?P<number>[\d.]+)",
        r"(?P<delimiter>;)",
        r"(?P<oppar>\()",
        r"(?P<clpar>\))",
        r"(?P<comma>,)",
        r"(?P<op>\S)",
    ]
    .join("|"))
    .unwrap();
}

fn strip_comment(line: &str) -> Cow<'_, str> {
    COMMENT_RE.replace(line, "")
}

/// Lex one line into a stack of tokens, first-on last-off; the line
/// terminator contributes a trailing `Delimiter`.
fn lex_line(line: &str) -> Vec<Token> {
    let stripped = strip_comment(line);

    let mut tokens = Vec::new();
    for cap in TOKEN_RE.captures_iter(&stripped) {
        let token = if let Some(ident) = cap.name("ident") {
            match ident.as_str() {
                "def" => Token::Def,
                "extern" => Token::Extern,
                text => Token::Ident(text.to_string()),
            }
        } else if let Some(number) = cap.name("number") {
            // a maximal digit/dot run can be malformed ("1.2.3"); degrade
            // to 0.0 rather than failing
            Token::Number(number.as_str().parse().unwrap_or(0.0))
        } else if cap.name("delimiter").is_some() {
            Token::Delimiter
        } else if cap.name("oppar").is_some() {
            Token::OpenParen
        } else if cap.name("clpar").is_some() {
            Token::CloseParen
        } else if cap.name("comma").is_some() {
            Token::Comma
        } else if let Some(op) = cap.name("op") {
            // the group matches exactly one non-space character
            Token::Op(op.as_str().chars().next().unwrap())
        } else {
            unreachable!("token regex has no other capture groups")
        };

        tokens.push(token);
    }
    tokens.push(Token::Delimiter);
    tokens.reverse();
    tokens
}

/// Streaming tokenizer: pulls lines from the source on demand and serves
/// one token per call. Lexing never fails; the end of the source is
/// reported as [`Token::Eof`] on every subsequent call.
pub struct Lexer<S> {
    source: S,
    pending: Vec<Token>,
    exhausted: bool,
}

impl<S: LineSource> Lexer<S> {
    pub fn new(source: S) -> Self {
        Lexer {
            source,
            pending: Vec::new(),
            exhausted: false,
        }
    }

    pub fn next_token(&mut self) -> Token {
        loop {
            if let Some(token) = self.pending.pop() {
                return token;
            }
            if self.exhausted {
                return Token::Eof;
            }
            match self.source.next_line() {
                Some(line) => self.pending = lex_line(&line),
                None => self.exhausted = true,
            }
        }
    }
}
