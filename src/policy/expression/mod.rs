// SPDX-License-Identifier: MIT

//! Policy expression language
//!
//! This module provides parsing and interpretation of policy expressions.
//! Expressions are short Python-flavoured programs like:
//! - `True`
//! - `return request.user.is_superuser`
//! - `ak_message(message); return False`
//! - `'admins' in request.user.groups and score > 0.8`

mod ast;
mod interpreter;
mod lexer;
mod parser;

pub use ast::{BinaryOp, CompareOp, Expression, Literal, Program, Statement, UnaryOp};
pub use interpreter::Interpreter;
pub use lexer::is_keyword;
pub use parser::parse;
