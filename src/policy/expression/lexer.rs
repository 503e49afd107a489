// SPDX-License-Identifier: MIT

//! Tokenizer for policy expressions

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::policy::error::EvaluationError;

/// Token kinds produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    /// Word reserved by the language but not supported in expressions
    Reserved(String),

    True,
    False,
    None,
    And,
    Or,
    Not,
    In,
    If,
    Else,
    Return,
    Raise,
    Pass,

    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Assign,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Semicolon,
    Newline,
    Eof,
}

/// A token with its 1-based source position
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

static KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    HashMap::from([
        ("True", TokenKind::True),
        ("False", TokenKind::False),
        ("None", TokenKind::None),
        ("and", TokenKind::And),
        ("or", TokenKind::Or),
        ("not", TokenKind::Not),
        ("in", TokenKind::In),
        ("if", TokenKind::If),
        ("else", TokenKind::Else),
        ("return", TokenKind::Return),
        ("raise", TokenKind::Raise),
        ("pass", TokenKind::Pass),
    ])
});

/// Words with meaning in the host language that expressions may not use
const RESERVED: &[&str] = &[
    "as", "assert", "async", "await", "break", "class", "continue", "def", "del", "elif",
    "except", "exec", "finally", "for", "from", "global", "import", "is", "lambda",
    "nonlocal", "try", "while", "with", "yield",
];

/// Whether `word` is a keyword or reserved word
pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains_key(word) || RESERVED.contains(&word)
}

/// Split `source` into tokens, ending with `Eof`
pub fn tokenize(source: &str) -> Result<Vec<Token>, EvaluationError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
    /// Nesting of (), [] and {}; newlines inside brackets are not separators
    bracket_depth: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
            bracket_depth: 0,
            tokens: Vec::new(),
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn push(&mut self, kind: TokenKind, line: usize, column: usize) {
        self.tokens.push(Token { kind, line, column });
    }

    fn run(mut self) -> Result<Vec<Token>, EvaluationError> {
        while let Some(&c) = self.chars.peek() {
            let (line, column) = (self.line, self.column);
            match c {
                '\n' => {
                    self.bump();
                    if self.bracket_depth == 0 {
                        self.push(TokenKind::Newline, line, column);
                    }
                }
                c if c.is_whitespace() => {
                    self.bump();
                }
                '#' => {
                    while self.chars.peek().is_some_and(|c| *c != '\n') {
                        self.bump();
                    }
                }
                '\'' | '"' => {
                    let s = self.string(c)?;
                    self.push(TokenKind::Str(s), line, column);
                }
                c if c.is_ascii_digit() => {
                    let kind = self.number()?;
                    self.push(kind, line, column);
                }
                c if c == '_' || c.is_alphabetic() => {
                    let mut word = String::new();
                    while let Some(&c) = self.chars.peek() {
                        if c == '_' || c.is_alphanumeric() {
                            word.push(c);
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    let kind = match KEYWORDS.get(word.as_str()) {
                        Some(kind) => kind.clone(),
                        None if RESERVED.contains(&word.as_str()) => TokenKind::Reserved(word),
                        None => TokenKind::Ident(word),
                    };
                    self.push(kind, line, column);
                }
                _ => {
                    self.bump();
                    let kind = self.operator(c, line, column)?;
                    self.push(kind, line, column);
                }
            }
        }
        let (line, column) = (self.line, self.column);
        self.push(TokenKind::Eof, line, column);
        Ok(self.tokens)
    }

    fn operator(&mut self, c: char, line: usize, column: usize) -> Result<TokenKind, EvaluationError> {
        let kind = match c {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' if self.eat('/') => TokenKind::DoubleSlash,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '=' if self.eat('=') => TokenKind::EqEq,
            '=' => TokenKind::Assign,
            '!' if self.eat('=') => TokenKind::NotEq,
            '<' if self.eat('=') => TokenKind::Lte,
            '<' => TokenKind::Lt,
            '>' if self.eat('=') => TokenKind::Gte,
            '>' => TokenKind::Gt,
            '(' | '[' | '{' => {
                self.bracket_depth += 1;
                match c {
                    '(' => TokenKind::LParen,
                    '[' => TokenKind::LBracket,
                    _ => TokenKind::LBrace,
                }
            }
            ')' | ']' | '}' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                match c {
                    ')' => TokenKind::RParen,
                    ']' => TokenKind::RBracket,
                    _ => TokenKind::RBrace,
                }
            }
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            ';' => TokenKind::Semicolon,
            other => {
                return Err(EvaluationError::compile(
                    line,
                    column,
                    format!("unexpected character '{}'", other),
                ))
            }
        };
        Ok(kind)
    }

    fn string(&mut self, quote: char) -> Result<String, EvaluationError> {
        let (line, column) = (self.line, self.column);
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(EvaluationError::compile(
                        line,
                        column,
                        "unterminated string literal",
                    ))
                }
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('0') => out.push('\0'),
                    Some('\\') => out.push('\\'),
                    Some('\'') => out.push('\''),
                    Some('"') => out.push('"'),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => {
                        return Err(EvaluationError::compile(
                            line,
                            column,
                            "unterminated string literal",
                        ))
                    }
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn number(&mut self) -> Result<TokenKind, EvaluationError> {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        let mut is_float = false;

        self.digits(&mut text);
        if self.chars.peek() == Some(&'.') {
            is_float = true;
            text.push('.');
            self.bump();
            self.digits(&mut text);
        }
        if matches!(self.chars.peek(), Some('e') | Some('E')) {
            is_float = true;
            text.push('e');
            self.bump();
            if let Some(&sign) = self.chars.peek() {
                if sign == '+' || sign == '-' {
                    text.push(sign);
                    self.bump();
                }
            }
            let before = text.len();
            self.digits(&mut text);
            if text.len() == before {
                return Err(EvaluationError::compile(line, column, "malformed exponent"));
            }
        }
        if self
            .chars
            .peek()
            .is_some_and(|c| c.is_alphabetic() || *c == '_')
        {
            return Err(EvaluationError::compile(
                line,
                column,
                format!("invalid numeric literal '{}'", text),
            ));
        }

        if is_float {
            text.parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|e| EvaluationError::compile(line, column, e.to_string()))
        } else {
            text.parse::<i64>().map(TokenKind::Int).map_err(|_| {
                EvaluationError::compile(line, column, format!("integer literal too large: {}", text))
            })
        }
    }

    fn digits(&mut self, text: &mut String) {
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else if c == '_' {
                self.bump();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_simple_tokens() {
        assert_eq!(
            kinds("return x >= 1.5"),
            vec![
                TokenKind::Return,
                TokenKind::Ident("x".to_string()),
                TokenKind::Gte,
                TokenKind::Float(1.5),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a // b / c != d == e"),
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::DoubleSlash,
                TokenKind::Ident("b".to_string()),
                TokenKind::Slash,
                TokenKind::Ident("c".to_string()),
                TokenKind::NotEq,
                TokenKind::Ident("d".to_string()),
                TokenKind::EqEq,
                TokenKind::Ident("e".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "say \"hi\"\n""#),
            vec![
                TokenKind::Str("it's".to_string()),
                TokenKind::Str("say \"hi\"\n".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_newlines_inside_brackets_ignored() {
        assert_eq!(
            kinds("f(\n1,\n2)\nx"),
            vec![
                TokenKind::Ident("f".to_string()),
                TokenKind::LParen,
                TokenKind::Int(1),
                TokenKind::Comma,
                TokenKind::Int(2),
                TokenKind::RParen,
                TokenKind::Newline,
                TokenKind::Ident("x".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            kinds("True # deny everyone"),
            vec![TokenKind::True, TokenKind::Eof]
        );
    }

    #[test]
    fn test_reserved_words() {
        assert_eq!(
            kinds("import os"),
            vec![
                TokenKind::Reserved("import".to_string()),
                TokenKind::Ident("os".to_string()),
                TokenKind::Eof,
            ]
        );
        assert!(is_keyword("lambda"));
        assert!(is_keyword("None"));
        assert!(!is_keyword("request"));
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("a\n  b").unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[2].line, tokens[2].column), (2, 3));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("ak_message(\"oops)").unwrap_err();
        assert_eq!(err, EvaluationError::compile(1, 12, "unterminated string literal"));
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("a $ b").unwrap_err();
        assert_eq!(err, EvaluationError::compile(1, 3, "unexpected character '$'"));
    }

    #[test]
    fn test_integer_overflow_is_compile_error() {
        assert!(tokenize("99999999999999999999").is_err());
        assert!(tokenize("12abc").is_err());
    }
}
