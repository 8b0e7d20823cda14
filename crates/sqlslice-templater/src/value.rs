//! Values seen by the format-string templater

use serde_json::Value;
use sqlslice_align::Sentinel;

/// A context value, or a placeholder for a name the context lacks
#[derive(Debug, Clone)]
pub enum TemplateValue {
    Value(Value),
    Sentinel(Sentinel),
}

impl TemplateValue {
    /// `str()` of the value
    pub fn to_text(&self) -> String {
        match self {
            Self::Value(Value::String(s)) => s.clone(),
            Self::Value(value) => repr(value),
            Self::Sentinel(sentinel) => sentinel.to_text(),
        }
    }

    /// `repr()` of the value; strings are quoted
    pub fn to_repr(&self) -> String {
        match self {
            Self::Value(value) => repr(value),
            Self::Sentinel(sentinel) => sentinel.to_text(),
        }
    }

    /// `value.attr`, or `None` when a concrete value has no such member
    pub fn get_attribute(&self, attr: &str) -> Option<TemplateValue> {
        match self {
            Self::Value(Value::Object(map)) => map.get(attr).cloned().map(Self::Value),
            Self::Value(_) => None,
            Self::Sentinel(sentinel) => Some(Self::Sentinel(sentinel.get_attribute(attr))),
        }
    }

    /// `value[key]`; numeric keys index arrays
    pub fn get_item(&self, key: &str) -> Option<TemplateValue> {
        match self {
            Self::Value(Value::Array(items)) => key
                .parse::<usize>()
                .ok()
                .and_then(|idx| items.get(idx))
                .cloned()
                .map(Self::Value),
            Self::Value(Value::Object(map)) => map.get(key).cloned().map(Self::Value),
            Self::Value(_) => None,
            Self::Sentinel(sentinel) => Some(Self::Sentinel(sentinel.get_attribute(key))),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Value(Value::Number(n)) => n.as_f64(),
            Self::Value(Value::Bool(b)) => Some(f64::from(u8::from(*b))),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Value(Value::Number(n)) => n.as_i64(),
            Self::Value(Value::Bool(b)) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Self::Value(Value::Number(_)) | Self::Value(Value::Bool(_)))
    }
}

fn repr(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(repr).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(key, value)| format!("'{}': {}", key, repr(value)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlslice_align::UndefinedTracker;

    #[test]
    fn scalar_text() {
        assert_eq!(TemplateValue::Value(json!("spam")).to_text(), "spam");
        assert_eq!(TemplateValue::Value(json!(435.2412)).to_text(), "435.2412");
        assert_eq!(TemplateValue::Value(json!(7)).to_text(), "7");
        assert_eq!(TemplateValue::Value(json!(true)).to_text(), "True");
        assert_eq!(TemplateValue::Value(json!(null)).to_text(), "None");
    }

    #[test]
    fn containers_use_repr() {
        let value = TemplateValue::Value(json!({"a": [1, "x"], "b": false}));
        assert_eq!(value.to_text(), "{'a': [1, 'x'], 'b': False}");
        assert_eq!(TemplateValue::Value(json!("it's")).to_repr(), "'it\\'s'");
    }

    #[test]
    fn member_lookup() {
        let value = TemplateValue::Value(json!({"cols": ["id", "name"]}));
        let cols = value.get_attribute("cols").unwrap();
        assert_eq!(cols.get_item("1").unwrap().to_text(), "name");
        assert!(cols.get_item("5").is_none());
        assert!(value.get_attribute("missing").is_none());
    }

    #[test]
    fn sentinel_members_are_sentinels() {
        let tracker = UndefinedTracker::new();
        let value = TemplateValue::Sentinel(tracker.sentinel("x"));
        match value.get_item("y") {
            Some(TemplateValue::Sentinel(child)) => assert_eq!(child.name(), "x.y"),
            other => panic!("expected sentinel, got {:?}", other),
        }
    }
}
