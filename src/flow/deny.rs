// SPDX-License-Identifier: MIT

//! Deny stage - terminates the current flow with a user-visible message
//!
//! The configured message is bound as the `message` context variable and the
//! stage evaluates a fixed expression that emits it. The message is never
//! spliced into the expression source.

use serde::{Deserialize, Serialize};

use super::stage::{StageExecutor, StageResponse};
use crate::policy::context::Context;
use crate::policy::evaluator::{Limits, PolicyEvaluator};

/// Expression evaluated by every deny stage
pub const DENY_EXPRESSION: &str = "ak_message(message); return False";

/// Shown when no message is configured or evaluation failed before emitting
pub const DEFAULT_DENY_MESSAGE: &str = "Flow was denied";

/// Deny stage configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DenyStage {
    pub name: String,
    /// Message shown to the user; falls back to `DEFAULT_DENY_MESSAGE`
    #[serde(default)]
    pub deny_message: Option<String>,
}

impl DenyStage {
    pub fn new(name: impl Into<String>, deny_message: Option<String>) -> Self {
        Self {
            name: name.into(),
            deny_message,
        }
    }

    /// Configured message, or the default when unset or blank
    pub fn message(&self) -> &str {
        self.deny_message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_DENY_MESSAGE)
    }

    /// Run the stage with default limits
    pub fn dispatch(&self, executor: &mut dyn StageExecutor) -> StageResponse {
        self.dispatch_with_limits(executor, Limits::default())
    }

    /// Evaluate the deny expression, log, and invalidate the stage
    pub fn dispatch_with_limits(
        &self,
        executor: &mut dyn StageExecutor,
        limits: Limits,
    ) -> StageResponse {
        let evaluator = PolicyEvaluator::new("deny").with_limits(limits);
        let message = self.message().to_string();

        let mut context = Context::new();
        let user_message = match context.insert("message", message.as_str()) {
            Ok(()) => {
                let execution = evaluator.execute(DENY_EXPRESSION, &context);
                if let Err(e) = &execution.result {
                    log::warn!(
                        "Deny stage '{}' failed to evaluate \"{}\": {}",
                        self.name,
                        DENY_EXPRESSION,
                        e
                    );
                }
                execution
                    .messages
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| DEFAULT_DENY_MESSAGE.to_string())
            }
            Err(e) => {
                log::warn!("Deny stage '{}' could not build context: {}", self.name, e);
                DEFAULT_DENY_MESSAGE.to_string()
            }
        };

        log::warn!("Deny stage '{}': {}", self.name, message);
        executor.stage_invalid(Some(user_message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::stage::LoggingExecutor;

    fn invalid(message: &str) -> StageResponse {
        StageResponse::Invalid {
            message: Some(message.to_string()),
        }
    }

    #[test]
    fn test_dispatch_uses_configured_message() {
        let stage = DenyStage::new("deny", Some("Access denied".to_string()));
        let mut executor = LoggingExecutor::new();
        assert_eq!(stage.dispatch(&mut executor), invalid("Access denied"));
        assert_eq!(executor.responses, vec![invalid("Access denied")]);
    }

    #[test]
    fn test_dispatch_falls_back_to_default() {
        let mut executor = LoggingExecutor::new();
        assert_eq!(
            DenyStage::new("deny", None).dispatch(&mut executor),
            invalid(DEFAULT_DENY_MESSAGE)
        );
        assert_eq!(
            DenyStage::new("deny", Some("   ".to_string())).dispatch(&mut executor),
            invalid(DEFAULT_DENY_MESSAGE)
        );
    }

    #[test]
    fn test_quotes_in_message_do_not_change_expression() {
        let hostile = r#"x"); return True; ak_message("pwned"#;
        let stage = DenyStage::new("deny", Some(hostile.to_string()));
        let mut executor = LoggingExecutor::new();
        assert_eq!(stage.dispatch(&mut executor), invalid(hostile));
    }

    #[test]
    fn test_budget_failure_still_invalidates() {
        let stage = DenyStage::new("deny", Some("Access denied".to_string()));
        let mut executor = LoggingExecutor::new();
        let limits = Limits {
            max_steps: 1,
            ..Limits::default()
        };
        // evaluation aborts before ak_message runs
        assert_eq!(
            stage.dispatch_with_limits(&mut executor, limits),
            invalid(DEFAULT_DENY_MESSAGE)
        );
    }

    #[test]
    fn test_deserialize() {
        let stage: DenyStage = serde_yaml::from_str("name: default-deny").unwrap();
        assert_eq!(stage.deny_message, None);
        assert_eq!(stage.message(), DEFAULT_DENY_MESSAGE);
    }
}
