//! Render context for Jinja templates
//!
//! Values and project variables visible to a template, plus the dbt target.

use minijinja::Value as MinijinjaValue;
use serde::{Deserialize, Serialize};
use sqlslice_core::Config;
use std::collections::BTreeMap;

/// Context a template is rendered against
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateContext {
    /// Top-level names available to the template
    pub values: BTreeMap<String, serde_json::Value>,

    /// Project variables, read through `var()`
    pub vars: BTreeMap<String, serde_json::Value>,

    /// Target configuration (dev, prod, etc.)
    pub target: TargetContext,
}

/// Target context (database connection info)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetContext {
    pub name: String,
    pub schema: String,
    pub database: Option<String>,
    #[serde(rename = "type")]
    pub target_type: String,
}

impl Default for TargetContext {
    fn default() -> Self {
        Self {
            name: "dev".to_string(),
            schema: "public".to_string(),
            database: None,
            target_type: "postgres".to_string(),
        }
    }
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            values: config.context.clone(),
            vars: config.vars.clone(),
            target: TargetContext::default(),
        }
    }

    /// Add a top-level value
    pub fn add_value(&mut self, key: impl Into<String>, value: serde_json::Value) -> &mut Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Add a project variable
    pub fn add_var(&mut self, key: impl Into<String>, value: serde_json::Value) -> &mut Self {
        self.vars.insert(key.into(), value);
        self
    }

    /// Whether `name` resolves without a sentinel
    pub fn defines(&self, name: &str) -> bool {
        name == "target" || self.values.contains_key(name)
    }

    /// Top-level names as minijinja values
    pub fn to_minijinja_map(&self) -> BTreeMap<String, MinijinjaValue> {
        let mut map: BTreeMap<String, MinijinjaValue> = self
            .values
            .iter()
            .map(|(key, value)| (key.clone(), MinijinjaValue::from_serialize(value)))
            .collect();
        map.entry("target".to_string())
            .or_insert_with(|| MinijinjaValue::from_serialize(&self.target));
        map
    }
}

/// Builder for [`TemplateContext`]
#[derive(Debug, Default)]
pub struct TemplateContextBuilder {
    context: TemplateContext,
}

impl TemplateContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.add_value(key, value);
        self
    }

    pub fn var(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.add_var(key, value);
        self
    }

    pub fn target_name(mut self, name: impl Into<String>) -> Self {
        self.context.target.name = name.into();
        self
    }

    pub fn target_schema(mut self, schema: impl Into<String>) -> Self {
        self.context.target.schema = schema.into();
        self
    }

    pub fn build(self) -> TemplateContext {
        self.context
    }
}
