// SPDX-License-Identifier: MIT

//! Typed error handling for gatekeeper-rs
//!
//! Evaluation failures are values: the evaluator never panics and never lets
//! a failure escape `evaluate`. Callers turn every `EvaluationError` into a
//! deny decision.

use thiserror::Error;

/// Top-level error type for loading definitions and running the engine
#[derive(Debug, Error)]
pub enum GatekeeperError {
    /// Configuration errors (invalid limits, bad definitions)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Context construction errors
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    /// Blocking evaluation task panicked or was cancelled
    #[error("Evaluation task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Classified failure of a single expression evaluation
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvaluationError {
    /// Malformed expression source
    #[error("Compile error at {line}:{column}: {message}")]
    Compile {
        line: usize,
        column: usize,
        message: String,
    },

    /// Name not bound in the context or the local scope
    #[error("Name '{name}' is not defined")]
    Reference { name: String },

    /// Failure raised while the expression was running
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Step, depth or wall-clock budget exhausted
    #[error("Budget exceeded: {limit}")]
    BudgetExceeded { limit: String },
}

/// Coarse classification of an `EvaluationError`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Compile,
    Reference,
    Runtime,
    BudgetExceeded,
}

/// Errors raised while building a `Context`
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ContextError {
    /// Name is not a usable identifier
    #[error("Invalid variable name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
}

impl EvaluationError {
    /// Create a compile error at a source position
    pub fn compile(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::Compile {
            line,
            column,
            message: message.into(),
        }
    }

    /// Create an unbound-name error
    pub fn reference(name: impl Into<String>) -> Self {
        Self::Reference { name: name.into() }
    }

    /// Create a runtime error
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }

    /// Create a budget error naming the exhausted limit
    pub fn budget(limit: impl Into<String>) -> Self {
        Self::BudgetExceeded {
            limit: limit.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Compile { .. } => ErrorKind::Compile,
            Self::Reference { .. } => ErrorKind::Reference,
            Self::Runtime(_) => ErrorKind::Runtime,
            Self::BudgetExceeded { .. } => ErrorKind::BudgetExceeded,
        }
    }
}

impl ContextError {
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl GatekeeperError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            EvaluationError::compile(1, 2, "x").kind(),
            ErrorKind::Compile
        );
        assert_eq!(EvaluationError::reference("x").kind(), ErrorKind::Reference);
        assert_eq!(EvaluationError::runtime("x").kind(), ErrorKind::Runtime);
        assert_eq!(
            EvaluationError::budget("steps").kind(),
            ErrorKind::BudgetExceeded
        );
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            EvaluationError::compile(3, 7, "unexpected ')'").to_string(),
            "Compile error at 3:7: unexpected ')'"
        );
        assert_eq!(
            EvaluationError::reference("message").to_string(),
            "Name 'message' is not defined"
        );
        assert_eq!(
            ContextError::invalid_name("1x", "must not start with a digit").to_string(),
            "Invalid variable name '1x': must not start with a digit"
        );
    }
}
