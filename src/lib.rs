// SPDX-License-Identifier: MIT

//! Sandboxed policy expression evaluation for authentication flows.

pub mod flow;
pub mod policy;

pub use policy::{evaluate, Context, Evaluation, EvaluationError, PolicyResult, Value};
