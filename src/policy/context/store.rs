// SPDX-License-Identifier: MIT

//! Named variables bound into an evaluation

use std::collections::HashMap;

use super::value::Value;
use crate::policy::error::{ContextError, GatekeeperError};
use crate::policy::expression::is_keyword;
use crate::policy::helpers::Helper;

/// Variables visible to a policy expression
///
/// Names are validated on insertion. The evaluator only ever reads a
/// `Context`; assignments made by an expression go to a separate local scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    vars: HashMap<String, Value>,
}

impl Context {
    /// Create an empty Context
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, replacing any previous value
    pub fn insert(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ContextError> {
        validate_name(name)?;
        self.vars.insert(name.to_string(), value.into());
        Ok(())
    }

    /// Builder-style `insert`
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self, ContextError> {
        self.insert(name, value)?;
        Ok(self)
    }

    /// Build a context from a JSON object, one variable per key
    pub fn from_json(json: serde_json::Value) -> Result<Self, GatekeeperError> {
        match json {
            serde_json::Value::Object(obj) => {
                let mut ctx = Self::new();
                for (name, value) in obj {
                    ctx.insert(&name, value)?;
                }
                Ok(ctx)
            }
            serde_json::Value::Null => Ok(Self::new()),
            other => Err(GatekeeperError::config(format!(
                "context must be an object, got {}",
                other
            ))),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Get a nested value using dot notation (e.g., "request.user.username")
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.vars.get(parts.next()?)?;
        for part in parts {
            current = match current {
                Value::Map(map) => map.get(part)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Convert context to JSON object
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.vars
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

/// Check that `name` can be bound as a variable
pub fn validate_name(name: &str) -> Result<(), ContextError> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(ContextError::invalid_name(name, "must not be empty"));
    };
    if first.is_ascii_digit() {
        return Err(ContextError::invalid_name(
            name,
            "must not start with a digit",
        ));
    }
    if !(first == '_' || first.is_ascii_alphabetic())
        || !chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
    {
        return Err(ContextError::invalid_name(
            name,
            "only ASCII letters, digits and '_' are allowed",
        ));
    }
    if is_keyword(name) {
        return Err(ContextError::invalid_name(name, "is a reserved keyword"));
    }
    if Helper::lookup(name).is_some() {
        return Err(ContextError::invalid_name(name, "shadows a helper function"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::error::ContextError;
    use serde_json::json;

    #[test]
    fn test_empty_context() {
        let ctx = Context::new();
        assert!(ctx.is_empty());
        assert!(ctx.get("anything").is_none());
    }

    #[test]
    fn test_insert_and_get() {
        let ctx = Context::new()
            .with("message", "Access denied")
            .unwrap()
            .with("attempts", 3)
            .unwrap();

        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.get("message"), Some(&Value::from("Access denied")));
        assert_eq!(ctx.get("attempts"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_insert_overwrites() {
        let mut ctx = Context::new();
        ctx.insert("x", 1).unwrap();
        ctx.insert("x", 2).unwrap();
        assert_eq!(ctx.get("x"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_invalid_names_rejected() {
        for name in ["", "1abc", "a-b", "with space", "héllo"] {
            let result = Context::new().with(name, true);
            assert!(
                matches!(result, Err(ContextError::InvalidName { .. })),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_keyword_and_helper_names_rejected() {
        assert!(Context::new().with("return", 1).is_err());
        assert!(Context::new().with("True", 1).is_err());
        assert!(Context::new().with("ak_message", 1).is_err());
    }

    #[test]
    fn test_valid_names_accepted() {
        for name in ["_", "_private", "request", "user2", "CamelCase"] {
            assert!(Context::new().with(name, true).is_ok(), "{name:?}");
        }
    }

    #[test]
    fn test_from_json() {
        let ctx = Context::from_json(json!({
            "request": {"user": {"username": "akadmin"}},
            "debug": true
        }))
        .unwrap();

        assert_eq!(ctx.get("debug"), Some(&Value::Bool(true)));
        assert_eq!(
            ctx.get_path("request.user.username"),
            Some(&Value::from("akadmin"))
        );
        assert_eq!(ctx.get_path("request.missing"), None);
        assert_eq!(ctx.get_path("debug.nested"), None);
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        assert!(Context::from_json(json!([1, 2])).is_err());
        assert!(Context::from_json(json!(null)).unwrap().is_empty());
        assert!(Context::from_json(json!({"bad-name": 1})).is_err());
    }

    #[test]
    fn test_to_json() {
        let ctx = Context::new().with("a", 1).unwrap().with("b", "x").unwrap();
        let json = ctx.to_json();
        assert_eq!(json["a"], 1);
        assert_eq!(json["b"], "x");
    }
}
