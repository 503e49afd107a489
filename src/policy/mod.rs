// SPDX-License-Identifier: MIT

pub mod context;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod expression;
pub mod helpers;

pub use context::{Context, Value};
pub use error::{ContextError, ErrorKind, EvaluationError, GatekeeperError};
pub use evaluator::{evaluate, Evaluation, Limits, PolicyEvaluator, PolicyResult};
