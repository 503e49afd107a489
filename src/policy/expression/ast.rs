// SPDX-License-Identifier: MIT

//! Abstract Syntax Tree for policy expressions

/// A compiled policy: statements run in order until a `return`
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
}

/// A single statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Bare expression, evaluated for its value and side effects
    Expr(Expression),
    /// Local assignment: name = value
    Assign { name: String, value: Expression },
    /// return [value]
    Return(Option<Expression>),
    /// raise value
    Raise(Expression),
    Pass,
}

/// An expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    /// Variable reference
    Name(String),
    List(Vec<Expression>),
    Dict(Vec<(Expression, Expression)>),
    /// Unary minus / plus
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    /// Arithmetic
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// Comparison expression: left op right
    Compare {
        op: CompareOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// Logical AND
    And(Box<Expression>, Box<Expression>),
    /// Logical OR
    Or(Box<Expression>, Box<Expression>),
    /// Logical NOT
    Not(Box<Expression>),
    /// then if condition else otherwise
    Conditional {
        condition: Box<Expression>,
        then: Box<Expression>,
        otherwise: Box<Expression>,
    },
    /// object.name
    Attribute {
        object: Box<Expression>,
        name: String,
    },
    /// object[index]
    Index {
        object: Box<Expression>,
        index: Box<Expression>,
    },
    /// function(args); only helper names are callable
    Call {
        function: String,
        args: Vec<Expression>,
    },
}

/// Literal values in expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Neg,
    Pos,
}

/// Arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompareOp {
    /// ==
    Eq,
    /// !=
    NotEq,
    /// >
    Gt,
    /// >=
    Gte,
    /// <
    Lt,
    /// <=
    Lte,
    /// in (substring, list element, dict key)
    In,
    /// not in
    NotIn,
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "=="),
            CompareOp::NotEq => write!(f, "!="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Gte => write!(f, ">="),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Lte => write!(f, "<="),
            CompareOp::In => write!(f, "in"),
            CompareOp::NotIn => write!(f, "not in"),
        }
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryOp::Add => write!(f, "+"),
            BinaryOp::Sub => write!(f, "-"),
            BinaryOp::Mul => write!(f, "*"),
            BinaryOp::Div => write!(f, "/"),
            BinaryOp::FloorDiv => write!(f, "//"),
            BinaryOp::Mod => write!(f, "%"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_op_display() {
        assert_eq!(format!("{}", CompareOp::Eq), "==");
        assert_eq!(format!("{}", CompareOp::NotEq), "!=");
        assert_eq!(format!("{}", CompareOp::Gt), ">");
        assert_eq!(format!("{}", CompareOp::Gte), ">=");
        assert_eq!(format!("{}", CompareOp::Lt), "<");
        assert_eq!(format!("{}", CompareOp::Lte), "<=");
        assert_eq!(format!("{}", CompareOp::In), "in");
        assert_eq!(format!("{}", CompareOp::NotIn), "not in");
    }

    #[test]
    fn test_binary_op_display() {
        assert_eq!(BinaryOp::FloorDiv.to_string(), "//");
        assert_eq!(BinaryOp::Mod.to_string(), "%");
    }
}
