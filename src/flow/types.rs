// SPDX-License-Identifier: MIT

//! YAML schema types for policy definition files
//!
//! A definition file bundles evaluator limits, an optional deny stage and a
//! list of policy bindings:
//!
//! ```yaml
//! limits:
//!   max_steps: 10000
//!   max_depth: 64
//!   timeout_ms: 1000
//! mode: all
//! stage:
//!   name: default-deny
//!   deny_message: "Access denied"
//! policies:
//!   - name: is-admin
//!     expression: "return request.user.is_superuser"
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::deny::DenyStage;
use crate::policy::engine::{EngineMode, PolicyBinding};
use crate::policy::error::GatekeeperError;
use crate::policy::evaluator::Limits;

/// Top-level definition file
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct PolicyDefinition {
    /// Evaluator limits; unset fields keep their defaults
    #[serde(default)]
    pub limits: LimitsDefinition,
    /// How policy results combine
    #[serde(default)]
    pub mode: EngineMode,
    /// Deny stage configuration
    pub stage: Option<DenyStage>,
    #[serde(default)]
    pub policies: Vec<PolicyBinding>,
}

/// Limits as written in YAML
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct LimitsDefinition {
    pub max_steps: Option<u64>,
    pub max_depth: Option<usize>,
    /// Milliseconds; 0 disables the wall-clock budget
    pub timeout_ms: Option<u64>,
}

impl LimitsDefinition {
    /// Resolve against the defaults and validate
    pub fn to_limits(&self) -> Result<Limits, GatekeeperError> {
        let defaults = Limits::default();
        let limits = Limits {
            max_steps: self.max_steps.unwrap_or(defaults.max_steps),
            max_depth: self.max_depth.unwrap_or(defaults.max_depth),
            timeout: match self.timeout_ms {
                Some(0) => None,
                Some(ms) => Some(Duration::from_millis(ms)),
                None => defaults.timeout,
            },
        };
        limits.validate()?;
        Ok(limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_definition() {
        let yaml = r#"
limits:
  max_steps: 500
  timeout_ms: 0
mode: any
stage:
  name: default-deny
  deny_message: "Access denied"
policies:
  - name: is-admin
    expression: "return request.user.is_superuser"
  - name: not-blocked
    expression: "return request.user.username != 'blocked'"
    negate: true
    order: 5
"#;
        let def: PolicyDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.mode, EngineMode::Any);
        assert_eq!(def.policies.len(), 2);
        assert!(def.policies[1].negate);
        assert_eq!(def.policies[1].order, 5);
        assert_eq!(
            def.stage.as_ref().and_then(|s| s.deny_message.as_deref()),
            Some("Access denied")
        );

        let limits = def.limits.to_limits().unwrap();
        assert_eq!(limits.max_steps, 500);
        assert_eq!(limits.max_depth, Limits::default().max_depth);
        assert_eq!(limits.timeout, None);
    }

    #[test]
    fn test_empty_definition_uses_defaults() {
        let def: PolicyDefinition = serde_yaml::from_str("{}").unwrap();
        assert_eq!(def.mode, EngineMode::All);
        assert!(def.stage.is_none());
        assert!(def.policies.is_empty());
        assert_eq!(def.limits.to_limits().unwrap(), Limits::default());
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let def = LimitsDefinition {
            max_depth: Some(100_000),
            ..LimitsDefinition::default()
        };
        assert!(matches!(def.to_limits(), Err(GatekeeperError::Config(_))));
    }
}
