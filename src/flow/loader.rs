// SPDX-License-Identifier: MIT

//! Definition loader - YAML and JSON file loading and parsing

use std::fs;
use std::path::Path;

use super::types::PolicyDefinition;
use crate::policy::context::Context;
use crate::policy::error::GatekeeperError;

/// Loads policy definitions and evaluation contexts from files
pub struct DefinitionLoader;

impl DefinitionLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a policy definition from a YAML file
    pub fn load_definition<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<PolicyDefinition, GatekeeperError> {
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    /// Parse a policy definition from a YAML string
    pub fn parse_yaml(content: &str) -> Result<PolicyDefinition, GatekeeperError> {
        let def: PolicyDefinition = serde_yaml::from_str(content)?;
        def.limits.to_limits()?;
        Ok(def)
    }

    /// Load a context from a `.json` file, or YAML for any other extension
    pub fn load_context<P: AsRef<Path>>(&self, path: P) -> Result<Context, GatekeeperError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::parse_json_context(&content)
        } else {
            Self::parse_yaml_context(&content)
        }
    }

    pub fn parse_json_context(content: &str) -> Result<Context, GatekeeperError> {
        let json: serde_json::Value = serde_json::from_str(content)?;
        Context::from_json(json)
    }

    pub fn parse_yaml_context(content: &str) -> Result<Context, GatekeeperError> {
        let json: serde_json::Value = serde_yaml::from_str(content)?;
        Context::from_json(json)
    }
}

impl Default for DefinitionLoader {
    fn default() -> Self {
        Self::new()
    }
}
