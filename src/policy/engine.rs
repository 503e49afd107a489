// SPDX-License-Identifier: MIT

//! Policy engine - runs several bound policies against one context
//!
//! Each binding is evaluated on the blocking pool with its own clone of the
//! context, so evaluations never share mutable state. Results are combined
//! in binding order.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::context::Context;
use super::error::GatekeeperError;
use super::evaluator::{PolicyEvaluator, PolicyResult};

/// A policy expression attached to an engine
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PolicyBinding {
    /// Name used in logs and results
    pub name: String,
    /// Expression source
    pub expression: String,
    /// Invert the pass/fail outcome
    #[serde(default)]
    pub negate: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Evaluation order, ascending; ties keep declaration order
    #[serde(default)]
    pub order: i32,
}

fn default_enabled() -> bool {
    true
}

impl PolicyBinding {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
            negate: false,
            enabled: true,
            order: 0,
        }
    }

    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }
}

/// How binding results combine
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    /// Every binding must pass (default)
    #[default]
    All,
    /// At least one binding must pass
    Any,
}

/// Outcome of a single binding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindingResult {
    pub name: String,
    pub result: PolicyResult,
}

/// Combined outcome of an engine run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineResult {
    pub passing: bool,
    /// Messages from all bindings, in binding order
    pub messages: Vec<String>,
    pub results: Vec<BindingResult>,
}

/// Evaluates bindings concurrently and combines them
pub struct PolicyEngine {
    bindings: Vec<PolicyBinding>,
    mode: EngineMode,
    evaluator: Arc<PolicyEvaluator>,
}

impl PolicyEngine {
    pub fn new(bindings: Vec<PolicyBinding>, mode: EngineMode) -> Self {
        Self {
            bindings,
            mode,
            evaluator: Arc::new(PolicyEvaluator::new("engine")),
        }
    }

    pub fn with_evaluator(mut self, evaluator: PolicyEvaluator) -> Self {
        self.evaluator = Arc::new(evaluator);
        self
    }

    /// Enabled bindings in evaluation order
    fn active_bindings(&self) -> Vec<&PolicyBinding> {
        let mut active: Vec<&PolicyBinding> = self.bindings.iter().filter(|b| b.enabled).collect();
        active.sort_by_key(|b| b.order);
        active
    }

    /// Run all enabled bindings against `context`
    pub async fn run(&self, context: &Context) -> Result<EngineResult, GatekeeperError> {
        let active = self.active_bindings();
        if active.is_empty() {
            log::debug!("Policy engine has no enabled bindings, passing");
            return Ok(EngineResult {
                passing: true,
                messages: vec![],
                results: vec![],
            });
        }

        let handles: Vec<_> = active
            .iter()
            .map(|binding| {
                let evaluator = Arc::clone(&self.evaluator);
                let expression = binding.expression.clone();
                let context = context.clone();
                tokio::task::spawn_blocking(move || evaluator.evaluate_policy(&expression, &context))
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (binding, handle) in active.iter().zip(handles) {
            let mut result = handle.await?;
            if binding.negate {
                result.passing = !result.passing;
            }
            log::info!(
                "Policy binding '{}' {}",
                binding.name,
                if result.passing { "passed" } else { "failed" }
            );
            results.push(BindingResult {
                name: binding.name.clone(),
                result,
            });
        }

        let passing = match self.mode {
            EngineMode::All => results.iter().all(|r| r.result.passing),
            EngineMode::Any => results.iter().any(|r| r.result.passing),
        };
        let messages = results
            .iter()
            .flat_map(|r| r.result.messages.iter().cloned())
            .collect();

        Ok(EngineResult {
            passing,
            messages,
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context::new()
            .with("username", "akadmin")
            .unwrap()
            .with("attempts", 2)
            .unwrap()
    }

    #[tokio::test]
    async fn test_no_bindings_passes() {
        let engine = PolicyEngine::new(vec![], EngineMode::All);
        let result = engine.run(&ctx()).await.unwrap();
        assert!(result.passing);
        assert!(result.results.is_empty());
    }

    #[tokio::test]
    async fn test_mode_all() {
        let engine = PolicyEngine::new(
            vec![
                PolicyBinding::new("is-admin", "return username == 'akadmin'"),
                PolicyBinding::new("few-attempts", "return attempts < 2"),
            ],
            EngineMode::All,
        );
        let result = engine.run(&ctx()).await.unwrap();
        assert!(!result.passing);
        assert!(result.results[0].result.passing);
        assert!(!result.results[1].result.passing);
    }

    #[tokio::test]
    async fn test_mode_any() {
        let engine = PolicyEngine::new(
            vec![
                PolicyBinding::new("never", "False"),
                PolicyBinding::new("is-admin", "username == 'akadmin'"),
            ],
            EngineMode::Any,
        );
        assert!(engine.run(&ctx()).await.unwrap().passing);
    }

    #[tokio::test]
    async fn test_negate() {
        let engine = PolicyEngine::new(
            vec![PolicyBinding::new("not-admin", "username == 'akadmin'").negated()],
            EngineMode::All,
        );
        assert!(!engine.run(&ctx()).await.unwrap().passing);
    }

    #[tokio::test]
    async fn test_failure_counts_as_deny() {
        let engine = PolicyEngine::new(
            vec![PolicyBinding::new("broken", "1/0")],
            EngineMode::Any,
        );
        let result = engine.run(&ctx()).await.unwrap();
        assert!(!result.passing);
        assert_eq!(result.messages, vec!["Runtime error: division by zero"]);
    }

    #[tokio::test]
    async fn test_disabled_and_ordering() {
        let mut disabled = PolicyBinding::new("disabled", "1/0");
        disabled.enabled = false;
        let mut second = PolicyBinding::new("second", "ak_message('b'); True");
        second.order = 10;
        let mut first = PolicyBinding::new("first", "ak_message('a'); True");
        first.order = 1;

        let engine = PolicyEngine::new(vec![disabled, second, first], EngineMode::All);
        let result = engine.run(&ctx()).await.unwrap();
        assert!(result.passing);
        assert_eq!(result.messages, vec!["a", "b"]);
        let names: Vec<_> = result.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_binding_deserialize_defaults() {
        let yaml = r#"
name: is-admin
expression: "return request.user.is_superuser"
"#;
        let binding: PolicyBinding = serde_yaml::from_str(yaml).unwrap();
        assert!(binding.enabled);
        assert!(!binding.negate);
        assert_eq!(binding.order, 0);
    }

    #[test]
    fn test_mode_deserialize() {
        assert_eq!(serde_yaml::from_str::<EngineMode>("any").unwrap(), EngineMode::Any);
        assert_eq!(serde_yaml::from_str::<EngineMode>("all").unwrap(), EngineMode::All);
    }
}
