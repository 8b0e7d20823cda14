//! Undefined-reference tracking
//!
//! When a render looks up a name its context does not define, the templater
//! substitutes a [`Sentinel`] instead of aborting. A recording sentinel adds
//! the names it is asked about to an [`UndefinedTracker`] shared by one render;
//! a stand-in sentinel renders a deterministic placeholder and records nothing.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

/// Names referenced during a render that its context did not define
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UndefinedSet {
    names: BTreeSet<String>,
}

impl UndefinedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a name; returns false if it was already present
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        self.names.insert(name.into())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl IntoIterator for UndefinedSet {
    type Item = String;
    type IntoIter = std::collections::btree_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.names.into_iter()
    }
}

impl<S: Into<String>> FromIterator<S> for UndefinedSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Recorder shared by the sentinels of a single render.
///
/// Create one per render and drain it into the caller's [`UndefinedSet`] once
/// the render returns; never share one across concurrent renders.
#[derive(Debug, Clone, Default)]
pub struct UndefinedTracker {
    names: Arc<Mutex<BTreeSet<String>>>,
}

impl UndefinedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str) {
        if let Ok(mut names) = self.names.lock() {
            if !names.contains(name) {
                names.insert(name.to_string());
            }
        }
    }

    /// A recording sentinel for `name`
    pub fn sentinel(&self, name: impl Into<String>) -> Sentinel {
        Sentinel::recording(name, self.clone())
    }

    /// Move every recorded name into `set`
    pub fn drain_into(&self, set: &mut UndefinedSet) {
        if let Ok(mut names) = self.names.lock() {
            for name in std::mem::take(&mut *names) {
                set.insert(name);
            }
        }
    }
}

#[derive(Debug, Clone)]
enum SentinelMode {
    /// Records names as they are used, renders as empty text
    Record(UndefinedTracker),

    /// Renders the name with dots replaced by underscores
    StandIn,
}

/// Placeholder value for a name missing from the render context
#[derive(Debug, Clone)]
pub struct Sentinel {
    name: String,
    mode: SentinelMode,
}

impl Sentinel {
    pub fn recording(name: impl Into<String>, tracker: UndefinedTracker) -> Self {
        Self {
            name: name.into(),
            mode: SentinelMode::Record(tracker),
        }
    }

    /// A placeholder for templates rendered with undefined reporting turned off
    pub fn stand_in(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: SentinelMode::StandIn,
        }
    }

    /// Dotted name this sentinel stands for
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.mode, SentinelMode::Record(_))
    }

    fn record(&self) {
        if let SentinelMode::Record(tracker) = &self.mode {
            tracker.record(&self.name);
        }
    }

    fn derive(&self, name: String) -> Self {
        Self {
            name,
            mode: self.mode.clone(),
        }
    }

    /// Text emitted when the sentinel is rendered
    pub fn to_text(&self) -> String {
        match &self.mode {
            SentinelMode::Record(tracker) => {
                tracker.record(&self.name);
                String::new()
            }
            SentinelMode::StandIn => self.name.replace('.', "_"),
        }
    }

    /// `name.attr`
    pub fn get_attribute(&self, attr: &str) -> Sentinel {
        self.record();
        self.derive(format!("{}.{}", self.name, attr))
    }

    /// Result of invoking the sentinel as a function.
    ///
    /// A recording sentinel yields `name()`, which records itself once it is
    /// used; the callee alone is never recorded.
    pub fn call(&self) -> Sentinel {
        match self.mode {
            SentinelMode::Record(_) => self.derive(format!("{}()", self.name)),
            SentinelMode::StandIn => self.clone(),
        }
    }

    /// Sentinels are truthy, so `{% if missing %}` bodies still render
    pub fn as_bool(&self) -> bool {
        self.record();
        true
    }

    /// Items produced when the sentinel is iterated
    pub fn iterate(&self) -> Vec<Sentinel> {
        match self.mode {
            SentinelMode::Record(_) => {
                self.record();
                Vec::new()
            }
            SentinelMode::StandIn => vec![self.clone()],
        }
    }
}

impl std::fmt::Display for Sentinel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_text())
    }
}
