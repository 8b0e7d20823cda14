//! minijinja binding for [`Sentinel`]

use minijinja::value::{Enumerator, Object, ObjectRepr, Value};
use minijinja::{Error, State};
use sqlslice_align::Sentinel;
use std::fmt;
use std::sync::Arc;

/// A [`Sentinel`] exposed to minijinja as a dynamic object
#[derive(Debug, Clone)]
pub struct JinjaSentinel(pub Sentinel);

impl JinjaSentinel {
    pub fn into_value(self) -> Value {
        Value::from_object(self)
    }

    fn wrap(sentinel: Sentinel) -> Value {
        Self(sentinel).into_value()
    }
}

impl Object for JinjaSentinel {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Map
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let attr = match key.as_str() {
            Some(name) => name.to_string(),
            None => key.to_string(),
        };
        Some(Self::wrap(self.0.get_attribute(&attr)))
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        let items: Vec<Value> = self.0.iterate().into_iter().map(Self::wrap).collect();
        if items.is_empty() {
            Enumerator::Empty
        } else {
            Enumerator::Values(items)
        }
    }

    fn is_true(self: &Arc<Self>) -> bool {
        self.0.as_bool()
    }

    fn call(self: &Arc<Self>, _state: &State<'_, '_>, _args: &[Value]) -> Result<Value, Error> {
        Ok(Self::wrap(self.0.call()))
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        _args: &[Value],
    ) -> Result<Value, Error> {
        Ok(Self::wrap(self.0.get_attribute(method).call()))
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_text())
    }
}
