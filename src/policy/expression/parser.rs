// SPDX-License-Identifier: MIT

//! Recursive-descent parser for policy expressions
//!
//! Parses programs like:
//! - `True`
//! - `return request.user.username == 'akadmin'`
//! - `ak_message(message); return False`
//! - `name = request.user.name; return 'admin' in request.user.groups`

use super::ast::{BinaryOp, CompareOp, Expression, Literal, Program, Statement, UnaryOp};
use super::lexer::{tokenize, Token, TokenKind};
use crate::policy::error::EvaluationError;

/// Parse a program, rejecting nesting deeper than `max_depth`
pub fn parse(source: &str, max_depth: usize) -> Result<Program, EvaluationError> {
    if source.trim().is_empty() {
        return Err(EvaluationError::compile(1, 1, "expression is empty"));
    }
    let tokens = tokenize(source)?;
    Parser {
        tokens,
        pos: 0,
        depth: 0,
        max_depth,
    }
    .program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.current().kind
    }

    fn peek_next(&self) -> &TokenKind {
        let idx = (self.pos + 1).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn current(&self) -> &Token {
        // tokenize always ends with Eof, and advance never moves past it
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        kind
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), EvaluationError> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}, found {}", what, describe(self.peek()))))
        }
    }

    fn error(&self, message: impl Into<String>) -> EvaluationError {
        let token = self.current();
        EvaluationError::compile(token.line, token.column, message)
    }

    fn enter(&mut self) -> Result<(), EvaluationError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(self.error(format!(
                "expression nested deeper than {} levels",
                self.max_depth
            )));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn is_separator(&self) -> bool {
        matches!(self.peek(), TokenKind::Semicolon | TokenKind::Newline)
    }

    fn program(mut self) -> Result<Program, EvaluationError> {
        let mut statements = Vec::new();
        loop {
            while self.is_separator() {
                self.advance();
            }
            if self.check(&TokenKind::Eof) {
                break;
            }
            statements.push(self.statement()?);
            if !self.is_separator() && !self.check(&TokenKind::Eof) {
                return Err(self.error(format!(
                    "expected end of statement, found {}",
                    describe(self.peek())
                )));
            }
        }
        if statements.is_empty() {
            return Err(self.error("expression is empty"));
        }
        Ok(Program { statements })
    }

    fn statement(&mut self) -> Result<Statement, EvaluationError> {
        match self.peek().clone() {
            TokenKind::Return => {
                self.advance();
                if self.is_separator() || self.check(&TokenKind::Eof) {
                    Ok(Statement::Return(None))
                } else {
                    Ok(Statement::Return(Some(self.expression()?)))
                }
            }
            TokenKind::Raise => {
                self.advance();
                Ok(Statement::Raise(self.expression()?))
            }
            TokenKind::Pass => {
                self.advance();
                Ok(Statement::Pass)
            }
            TokenKind::Ident(name) if self.peek_next() == &TokenKind::Assign => {
                self.advance();
                self.advance();
                let value = self.expression()?;
                Ok(Statement::Assign { name, value })
            }
            _ => Ok(Statement::Expr(self.expression()?)),
        }
    }

    /// expression := or_expr ['if' or_expr 'else' expression]
    fn expression(&mut self) -> Result<Expression, EvaluationError> {
        self.enter()?;
        let then = self.or_expr()?;
        let expr = if self.eat(&TokenKind::If) {
            let condition = self.or_expr()?;
            self.expect(TokenKind::Else, "'else'")?;
            let otherwise = self.expression()?;
            Expression::Conditional {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            }
        } else {
            then
        };
        self.leave();
        Ok(expr)
    }

    /// Each link of a left-associative chain nests the tree one level deeper
    fn chain(&mut self, links: &mut usize) -> Result<(), EvaluationError> {
        self.enter()?;
        *links += 1;
        Ok(())
    }

    fn or_expr(&mut self) -> Result<Expression, EvaluationError> {
        let mut links = 0;
        let mut left = self.and_expr()?;
        while self.eat(&TokenKind::Or) {
            self.chain(&mut links)?;
            let right = self.and_expr()?;
            left = Expression::Or(Box::new(left), Box::new(right));
        }
        self.depth -= links;
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expression, EvaluationError> {
        let mut links = 0;
        let mut left = self.not_expr()?;
        while self.eat(&TokenKind::And) {
            self.chain(&mut links)?;
            let right = self.not_expr()?;
            left = Expression::And(Box::new(left), Box::new(right));
        }
        self.depth -= links;
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expression, EvaluationError> {
        if self.eat(&TokenKind::Not) {
            self.enter()?;
            let inner = self.not_expr()?;
            self.leave();
            return Ok(Expression::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn compare_op(&mut self) -> Option<CompareOp> {
        let op = match self.peek() {
            TokenKind::EqEq => CompareOp::Eq,
            TokenKind::NotEq => CompareOp::NotEq,
            TokenKind::Lt => CompareOp::Lt,
            TokenKind::Lte => CompareOp::Lte,
            TokenKind::Gt => CompareOp::Gt,
            TokenKind::Gte => CompareOp::Gte,
            TokenKind::In => CompareOp::In,
            TokenKind::Not if self.peek_next() == &TokenKind::In => {
                self.advance();
                CompareOp::NotIn
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn comparison(&mut self) -> Result<Expression, EvaluationError> {
        let left = self.sum()?;
        let Some(op) = self.compare_op() else {
            return Ok(left);
        };
        let right = self.sum()?;
        if self.compare_op().is_some() {
            return Err(self.error("chained comparisons are not supported"));
        }
        Ok(Expression::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn sum(&mut self) -> Result<Expression, EvaluationError> {
        let mut links = 0;
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => {
                    self.depth -= links;
                    return Ok(left);
                }
            };
            self.advance();
            self.chain(&mut links)?;
            let right = self.term()?;
            left = Expression::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn term(&mut self) -> Result<Expression, EvaluationError> {
        let mut links = 0;
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::DoubleSlash => BinaryOp::FloorDiv,
                TokenKind::Percent => BinaryOp::Mod,
                _ => {
                    self.depth -= links;
                    return Ok(left);
                }
            };
            self.advance();
            self.chain(&mut links)?;
            let right = self.unary()?;
            left = Expression::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn unary(&mut self) -> Result<Expression, EvaluationError> {
        let op = match self.peek() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Pos,
            _ => return self.postfix(),
        };
        self.advance();
        self.enter()?;
        let operand = self.unary()?;
        self.leave();
        Ok(Expression::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn postfix(&mut self) -> Result<Expression, EvaluationError> {
        let mut links = 0;
        let mut expr = self.atom()?;
        loop {
            match self.peek() {
                TokenKind::LParen => {
                    self.chain(&mut links)?;
                    let Expression::Name(function) = expr else {
                        return Err(self.error("only helper functions can be called"));
                    };
                    self.advance();
                    let args = self.sequence(TokenKind::RParen, "')'")?;
                    expr = Expression::Call { function, args };
                }
                TokenKind::Dot => {
                    self.chain(&mut links)?;
                    self.advance();
                    let name = match self.advance() {
                        TokenKind::Ident(name) => name,
                        other => {
                            return Err(self.error(format!(
                                "expected attribute name, found {}",
                                describe(&other)
                            )))
                        }
                    };
                    expr = Expression::Attribute {
                        object: Box::new(expr),
                        name,
                    };
                }
                TokenKind::LBracket => {
                    self.chain(&mut links)?;
                    self.advance();
                    let index = self.expression()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    expr = Expression::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => {
                    self.depth -= links;
                    return Ok(expr);
                }
            }
        }
    }

    /// Comma-separated expressions up to `close`; trailing comma allowed
    fn sequence(&mut self, close: TokenKind, what: &str) -> Result<Vec<Expression>, EvaluationError> {
        let mut items = Vec::new();
        while !self.check(&close) {
            items.push(self.expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(close, what)?;
        Ok(items)
    }

    fn atom(&mut self) -> Result<Expression, EvaluationError> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Int(i) => {
                self.advance();
                Ok(Expression::Literal(Literal::Int(i)))
            }
            TokenKind::Float(f) => {
                self.advance();
                Ok(Expression::Literal(Literal::Float(f)))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expression::Literal(Literal::String(s)))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expression::Literal(Literal::Boolean(true)))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expression::Literal(Literal::Boolean(false)))
            }
            TokenKind::None => {
                self.advance();
                Ok(Expression::Literal(Literal::None))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expression::Name(name))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.advance();
                self.enter()?;
                let items = self.sequence(TokenKind::RBracket, "']'")?;
                self.leave();
                Ok(Expression::List(items))
            }
            TokenKind::LBrace => {
                self.advance();
                self.enter()?;
                let entries = self.dict_entries()?;
                self.leave();
                Ok(Expression::Dict(entries))
            }
            TokenKind::Reserved(word) => {
                Err(self.error(format!("'{}' is not supported in policy expressions", word)))
            }
            other => Err(self.error(format!("unexpected {}", describe(&other)))),
        }
    }

    fn dict_entries(&mut self) -> Result<Vec<(Expression, Expression)>, EvaluationError> {
        let mut entries = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            let key = self.expression()?;
            self.expect(TokenKind::Colon, "':'")?;
            let value = self.expression()?;
            entries.push((key, value));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(entries)
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Int(i) => format!("number {}", i),
        TokenKind::Float(f) => format!("number {}", f),
        TokenKind::Str(_) => "string literal".to_string(),
        TokenKind::Ident(name) => format!("name '{}'", name),
        TokenKind::Reserved(word) => format!("'{}'", word),
        TokenKind::Newline => "end of line".to_string(),
        TokenKind::Eof => "end of input".to_string(),
        TokenKind::LParen => "'('".to_string(),
        TokenKind::RParen => "')'".to_string(),
        TokenKind::LBracket => "'['".to_string(),
        TokenKind::RBracket => "']'".to_string(),
        TokenKind::LBrace => "'{'".to_string(),
        TokenKind::RBrace => "'}'".to_string(),
        TokenKind::Comma => "','".to_string(),
        TokenKind::Colon => "':'".to_string(),
        TokenKind::Dot => "'.'".to_string(),
        TokenKind::Semicolon => "';'".to_string(),
        TokenKind::Assign => "'='".to_string(),
        other => format!("{:?}", other).to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_expr(source: &str) -> Expression {
        let program = parse(source, 64).unwrap();
        match program.statements.as_slice() {
            [Statement::Expr(expr)] => expr.clone(),
            other => panic!("Expected single expression, got {:?}", other),
        }
    }

    fn name(n: &str) -> Box<Expression> {
        Box::new(Expression::Name(n.to_string()))
    }

    fn int(i: i64) -> Box<Expression> {
        Box::new(Expression::Literal(Literal::Int(i)))
    }

    #[test]
    fn test_parse_true() {
        assert_eq!(parse_expr("True"), Expression::Literal(Literal::Boolean(true)));
    }

    #[test]
    fn test_parse_precedence() {
        assert_eq!(
            parse_expr("a + b * 2"),
            Expression::Binary {
                op: BinaryOp::Add,
                left: name("a"),
                right: Box::new(Expression::Binary {
                    op: BinaryOp::Mul,
                    left: name("b"),
                    right: int(2),
                }),
            }
        );
    }

    #[test]
    fn test_parse_and_or() {
        // and binds tighter than or
        assert_eq!(
            parse_expr("a or b and c"),
            Expression::Or(name("a"), Box::new(Expression::And(name("b"), name("c"))))
        );
    }

    #[test]
    fn test_parse_not_in() {
        assert_eq!(
            parse_expr("'admins' not in groups"),
            Expression::Compare {
                op: CompareOp::NotIn,
                left: Box::new(Expression::Literal(Literal::String("admins".to_string()))),
                right: name("groups"),
            }
        );
    }

    #[test]
    fn test_parse_attribute_and_index() {
        assert_eq!(
            parse_expr("request.user.groups[0]"),
            Expression::Index {
                object: Box::new(Expression::Attribute {
                    object: Box::new(Expression::Attribute {
                        object: name("request"),
                        name: "user".to_string(),
                    }),
                    name: "groups".to_string(),
                }),
                index: int(0),
            }
        );
    }

    #[test]
    fn test_parse_conditional() {
        assert_eq!(
            parse_expr("1 if flag else 2"),
            Expression::Conditional {
                condition: name("flag"),
                then: int(1),
                otherwise: int(2),
            }
        );
    }

    #[test]
    fn test_parse_deny_template() {
        let program = parse("ak_message(message);return False", 64).unwrap();
        assert_eq!(
            program.statements,
            vec![
                Statement::Expr(Expression::Call {
                    function: "ak_message".to_string(),
                    args: vec![Expression::Name("message".to_string())],
                }),
                Statement::Return(Some(Expression::Literal(Literal::Boolean(false)))),
            ]
        );
    }

    #[test]
    fn test_parse_assignment_and_newlines() {
        let program = parse("x = 1\n\ny = x + 1\nreturn", 64).unwrap();
        assert_eq!(program.statements.len(), 3);
        assert!(matches!(program.statements[0], Statement::Assign { .. }));
        assert_eq!(program.statements[2], Statement::Return(None));
    }

    #[test]
    fn test_parse_collections() {
        assert_eq!(
            parse_expr("[1, 2,]"),
            Expression::List(vec![*int(1), *int(2)])
        );
        assert_eq!(
            parse_expr("{'a': 1}"),
            Expression::Dict(vec![(
                Expression::Literal(Literal::String("a".to_string())),
                *int(1)
            )])
        );
    }

    #[test]
    fn test_empty_is_compile_error() {
        assert!(matches!(parse("", 64), Err(EvaluationError::Compile { .. })));
        assert!(matches!(parse("  \n ", 64), Err(EvaluationError::Compile { .. })));
        assert!(matches!(parse(";;", 64), Err(EvaluationError::Compile { .. })));
    }

    #[test]
    fn test_syntax_errors() {
        for source in [
            "return (",
            "1 +",
            "a b",
            "x = ",
            "a < b < c",
            "import os",
            "request.user.delete()",
            "lambda: 1",
            "1 if x",
        ] {
            assert!(
                matches!(parse(source, 64), Err(EvaluationError::Compile { .. })),
                "{source:?} should fail to compile"
            );
        }
    }

    #[test]
    fn test_error_position() {
        let err = parse("x = 1\ny = )", 64).unwrap_err();
        assert_eq!(
            err,
            EvaluationError::compile(2, 5, "unexpected ')'")
        );
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("{}1{}", "(".repeat(40), ")".repeat(40));
        assert!(parse(&deep, 64).is_ok());
        assert!(matches!(parse(&deep, 16), Err(EvaluationError::Compile { .. })));

        let negations = format!("{}True", "not ".repeat(100));
        assert!(matches!(parse(&negations, 64), Err(EvaluationError::Compile { .. })));

        let long_chain = vec!["1"; 200].join(" + ");
        assert!(matches!(parse(&long_chain, 64), Err(EvaluationError::Compile { .. })));
        let short_chain = vec!["1"; 20].join(" + ");
        assert!(parse(&short_chain, 64).is_ok());
    }

    #[test]
    fn test_postfix_chain_depth_limit() {
        let attributes = format!("x{}", ".a".repeat(200_000));
        assert!(matches!(parse(&attributes, 64), Err(EvaluationError::Compile { .. })));

        let indexes = format!("x{}", "[0]".repeat(1_000));
        assert!(matches!(parse(&indexes, 64), Err(EvaluationError::Compile { .. })));

        let short = format!("x{}", ".a".repeat(20));
        assert!(parse(&short, 64).is_ok());
    }
}
