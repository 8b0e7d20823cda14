//! dbt Jinja builtins
//!
//! Stand-ins for `ref()`, `source()`, `var()`, `config()` and
//! `is_incremental()` that render plausible SQL without a dbt project.

use minijinja::value::Rest;
use minijinja::{Environment, Error, ErrorKind, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Names registered by [`register`]
pub const BUILTIN_NAMES: &[&str] = &["ref", "source", "var", "config", "is_incremental", "this"];

/// Rendered value of `{{ this }}`
pub const THIS_MODEL: &str = "this_model";

/// ref() function - references another dbt model
///
/// Usage in Jinja: {{ ref('model_name') }} or {{ ref('package', 'model_name') }}
/// Returns: model_name
pub fn ref_function(model_or_package: Value, model_name: Option<Value>) -> Result<Value, Error> {
    let model = model_name.unwrap_or(model_or_package);
    let model_str = model.as_str().ok_or_else(|| {
        Error::new(ErrorKind::InvalidOperation, "ref() model name must be a string")
    })?;
    Ok(Value::from(model_str))
}

/// source() function - references a source table
///
/// Usage in Jinja: {{ source('source_name', 'table_name') }}
/// Returns: source_name.table_name
pub fn source_function(source_name: Value, table_name: Value) -> Result<Value, Error> {
    let source_str = source_name.as_str().ok_or_else(|| {
        Error::new(ErrorKind::InvalidOperation, "source() source name must be a string")
    })?;

    let table_str = table_name.as_str().ok_or_else(|| {
        Error::new(ErrorKind::InvalidOperation, "source() table name must be a string")
    })?;

    Ok(Value::from(format!("{}.{}", source_str, table_str)))
}

/// var() over a fixed set of project variables
///
/// Returns the variable, else the default, else the literal `item` so that
/// loops over an unknown variable still render once.
pub fn var_function(
    vars: Arc<BTreeMap<String, serde_json::Value>>,
) -> impl Fn(String, Option<Value>) -> Result<Value, Error> + Send + Sync + 'static {
    move |name: String, default: Option<Value>| {
        Ok(match vars.get(&name) {
            Some(value) => Value::from_serialize(value),
            None => default.unwrap_or_else(|| Value::from("item")),
        })
    }
}

/// config() function - model configuration renders nothing
pub fn config_function(_args: Rest<Value>) -> Result<Value, Error> {
    Ok(Value::from(""))
}

/// is_incremental() - models render their incremental branch
pub fn is_incremental_function() -> bool {
    true
}

/// Register every builtin on `env`
pub fn register(env: &mut Environment<'static>, vars: Arc<BTreeMap<String, serde_json::Value>>) {
    env.add_function("ref", ref_function);
    env.add_function("source", source_function);
    env.add_function("var", var_function(vars));
    env.add_function("config", config_function);
    env.add_function("is_incremental", is_incremental_function);
    env.add_global("this", THIS_MODEL);

    env.add_filter("as_bool", |value: String| -> bool {
        matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ref_single_arg() {
        let result = ref_function(Value::from("my_table"), None).unwrap();
        assert_eq!(result.as_str().unwrap(), "my_table");
    }

    #[test]
    fn test_ref_two_args() {
        let result = ref_function(Value::from("my_package"), Some(Value::from("my_table"))).unwrap();
        assert_eq!(result.as_str().unwrap(), "my_table");
    }

    #[test]
    fn test_ref_rejects_non_strings() {
        assert!(ref_function(Value::from(3), None).is_err());
    }

    #[test]
    fn test_source() {
        let result = source_function(Value::from("raw"), Value::from("customers")).unwrap();
        assert_eq!(result.as_str().unwrap(), "raw.customers");
    }

    #[test]
    fn test_var_lookup_order() {
        let vars = Arc::new(BTreeMap::from([("start".to_string(), json!("2020-01-01"))]));
        let var = var_function(vars);

        assert_eq!(var("start".to_string(), None).unwrap().as_str(), Some("2020-01-01"));
        assert_eq!(
            var("end".to_string(), Some(Value::from("2021-01-01"))).unwrap().as_str(),
            Some("2021-01-01")
        );
        assert_eq!(var("end".to_string(), None).unwrap().as_str(), Some("item"));
    }

    #[test]
    fn test_registered_builtins_render() {
        let mut env = Environment::new();
        register(&mut env, Arc::new(BTreeMap::new()));

        let rendered = env
            .render_str(
                "{{ config(materialized='table') }}select * from {{ ref('orders') }} join {{ source('raw', 'users') }}{% if is_incremental() %} where t > (select max(t) from {{ this }}){% endif %}",
                minijinja::context! {},
            )
            .unwrap();
        assert_eq!(
            rendered,
            "select * from orders join raw.users where t > (select max(t) from this_model)"
        );
    }
}
