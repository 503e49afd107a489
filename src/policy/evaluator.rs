// SPDX-License-Identifier: MIT

//! Policy evaluator - the sandbox entry point
//!
//! `evaluate` compiles an expression, binds the context and runs it under a
//! budget. Failures come back as classified `EvaluationError`s; nothing
//! panics or propagates past the call.

use serde::Serialize;
use std::time::Duration;

use super::context::{Context, Value};
use super::error::{EvaluationError, GatekeeperError};
use super::expression::{parse, Interpreter};

/// Environment variables overriding the default limits
pub const ENV_MAX_STEPS: &str = "GATEKEEPER_MAX_STEPS";
pub const ENV_MAX_DEPTH: &str = "GATEKEEPER_MAX_DEPTH";
pub const ENV_TIMEOUT_MS: &str = "GATEKEEPER_TIMEOUT_MS";

/// Resource budget for a single evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Limits {
    /// Maximum statements plus expression nodes evaluated
    pub max_steps: u64,
    /// Maximum nesting, enforced by both the parser and the interpreter
    pub max_depth: usize,
    /// Wall-clock budget; `None` disables it
    pub timeout: Option<Duration>,
}

impl Limits {
    /// Upper bound for `max_depth`, keeping recursion well inside the stack
    pub const MAX_DEPTH_CEILING: usize = 256;

    pub fn validate(&self) -> Result<(), GatekeeperError> {
        if self.max_steps == 0 {
            return Err(GatekeeperError::config("max_steps must be greater than 0"));
        }
        if self.max_depth == 0 || self.max_depth > Self::MAX_DEPTH_CEILING {
            return Err(GatekeeperError::config(format!(
                "max_depth must be between 1 and {}",
                Self::MAX_DEPTH_CEILING
            )));
        }
        Ok(())
    }

    /// Apply `GATEKEEPER_*` environment overrides
    pub fn with_env_overrides(self) -> Result<Self, GatekeeperError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self, GatekeeperError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MAX_STEPS) {
            self.max_steps = parse_env(ENV_MAX_STEPS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_DEPTH) {
            self.max_depth = parse_env(ENV_MAX_DEPTH, &raw)?;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            let ms: u64 = parse_env(ENV_TIMEOUT_MS, &raw)?;
            self.timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        self.validate()?;
        Ok(self)
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_steps: 10_000,
            max_depth: 64,
            timeout: Some(Duration::from_secs(1)),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, GatekeeperError> {
    raw.trim()
        .parse()
        .map_err(|_| GatekeeperError::config(format!("{} is not a valid number: '{}'", key, raw)))
}

/// Successful evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    /// Value returned by the expression
    pub value: Value,
    /// Messages emitted through `ak_message`
    pub messages: Vec<String>,
}

/// Raw outcome of one run: the result plus messages emitted before it ended
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub result: Result<Value, EvaluationError>,
    pub messages: Vec<String>,
}

impl From<Execution> for Result<Evaluation, EvaluationError> {
    fn from(execution: Execution) -> Self {
        execution.result.map(|value| Evaluation {
            value,
            messages: execution.messages,
        })
    }
}

/// Pass/fail reduction of an evaluation, as consumed by stages and engines
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyResult {
    pub passing: bool,
    pub messages: Vec<String>,
}

impl PolicyResult {
    pub fn new(passing: bool, messages: Vec<String>) -> Self {
        Self { passing, messages }
    }

    /// Failing result carrying one message
    pub fn failing(message: impl Into<String>) -> Self {
        Self::new(false, vec![message.into()])
    }
}

/// Named evaluator with a fixed budget
///
/// Holds no per-call state, so one evaluator can serve concurrent callers.
#[derive(Debug, Clone)]
pub struct PolicyEvaluator {
    name: String,
    limits: Limits,
}

impl PolicyEvaluator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            limits: Limits::default(),
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Compile and run `source`, keeping messages even when it fails
    pub fn execute(&self, source: &str, context: &Context) -> Execution {
        let program = match parse(source, self.limits.max_depth) {
            Ok(program) => program,
            Err(e) => {
                return Execution {
                    result: Err(e),
                    messages: Vec::new(),
                }
            }
        };
        let (result, effects) = Interpreter::new(context, &self.limits, &self.name).run(&program);
        Execution {
            result,
            messages: effects.messages,
        }
    }

    /// Evaluate `source` against `context`
    pub fn evaluate(&self, source: &str, context: &Context) -> Result<Evaluation, EvaluationError> {
        self.execute(source, context).into()
    }

    /// Evaluate and reduce to pass/fail; failures are logged and never pass
    pub fn evaluate_policy(&self, source: &str, context: &Context) -> PolicyResult {
        let Execution { result, mut messages } = self.execute(source, context);
        match result {
            Ok(value) => {
                log::debug!(
                    "Policy evaluator '{}' returned {} for \"{}\"",
                    self.name,
                    value.repr(),
                    source
                );
                PolicyResult::new(value.is_truthy(), messages)
            }
            Err(e) => {
                log::warn!(
                    "Policy evaluator '{}' failed to evaluate \"{}\": {}",
                    self.name,
                    source,
                    e
                );
                messages.push(e.to_string());
                PolicyResult::new(false, messages)
            }
        }
    }
}

/// Evaluate `source` with default limits
pub fn evaluate(source: &str, context: &Context) -> Result<Evaluation, EvaluationError> {
    PolicyEvaluator::new("default").evaluate(source, context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::error::ErrorKind;
    use std::collections::HashMap;

    #[test]
    fn test_true_with_empty_context() {
        let evaluation = evaluate("True", &Context::new()).unwrap();
        assert_eq!(evaluation.value, Value::Bool(true));
        assert!(evaluation.messages.is_empty());
    }

    #[test]
    fn test_division_by_zero_is_runtime_error() {
        let err = evaluate("1/0", &Context::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Runtime);
    }

    #[test]
    fn test_error_classification() {
        let ctx = Context::new();
        assert_eq!(evaluate("return (", &ctx).unwrap_err().kind(), ErrorKind::Compile);
        assert_eq!(evaluate("", &ctx).unwrap_err().kind(), ErrorKind::Compile);
        assert_eq!(
            evaluate("return missing", &ctx).unwrap_err().kind(),
            ErrorKind::Reference
        );
        assert_eq!(
            evaluate("raise 'no'", &ctx).unwrap_err().kind(),
            ErrorKind::Runtime
        );

        let tight = PolicyEvaluator::new("t").with_limits(Limits {
            max_steps: 3,
            ..Limits::default()
        });
        assert_eq!(
            tight.evaluate("1 + 2 + 3", &ctx).unwrap_err().kind(),
            ErrorKind::BudgetExceeded
        );
    }

    #[test]
    fn test_execute_keeps_messages_on_failure() {
        let execution =
            PolicyEvaluator::new("deny").execute("ak_message('bye'); return nope", &Context::new());
        assert_eq!(execution.messages, vec!["bye"]);
        assert_eq!(execution.result, Err(EvaluationError::reference("nope")));
    }

    #[test]
    fn test_evaluate_policy_passing() {
        let ctx = Context::new().with("attempts", 2).unwrap();
        let evaluator = PolicyEvaluator::new("check");
        assert_eq!(
            evaluator.evaluate_policy("return attempts < 3", &ctx),
            PolicyResult::new(true, vec![])
        );
        assert_eq!(
            evaluator.evaluate_policy("ak_message('too many'); return attempts > 3", &ctx),
            PolicyResult::new(false, vec!["too many".to_string()])
        );
    }

    #[test]
    fn test_evaluate_policy_failure_is_deny() {
        let result = PolicyEvaluator::new("check").evaluate_policy("1/0", &Context::new());
        assert!(!result.passing);
        assert_eq!(result.messages, vec!["Runtime error: division by zero"]);
    }

    #[test]
    fn test_limits_defaults_valid() {
        assert!(Limits::default().validate().is_ok());
    }

    #[test]
    fn test_limits_validation() {
        let zero_steps = Limits {
            max_steps: 0,
            ..Limits::default()
        };
        assert!(zero_steps.validate().is_err());

        let too_deep = Limits {
            max_depth: Limits::MAX_DEPTH_CEILING + 1,
            ..Limits::default()
        };
        assert!(too_deep.validate().is_err());
    }

    #[test]
    fn test_limits_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_MAX_STEPS, "500"),
            (ENV_MAX_DEPTH, " 32 "),
            (ENV_TIMEOUT_MS, "0"),
        ]);
        let limits = Limits::default()
            .with_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(limits.max_steps, 500);
        assert_eq!(limits.max_depth, 32);
        assert_eq!(limits.timeout, None);
    }

    #[test]
    fn test_limits_overrides_reject_garbage() {
        let result = Limits::default().with_overrides(|key| {
            (key == ENV_MAX_STEPS).then(|| "lots".to_string())
        });
        assert!(matches!(result, Err(GatekeeperError::Config(_))));
    }

    #[test]
    fn test_evaluator_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PolicyEvaluator>();
        assert_send_sync::<Context>();
    }
}
