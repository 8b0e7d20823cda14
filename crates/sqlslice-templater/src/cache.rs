//! Reusable Jinja environments
//!
//! Building an environment with its builtins is repeated work when a batch of
//! files from one project is rendered. The cache hands out one environment per
//! key. Each entry sits behind its own mutex: a render holds the lock for its
//! whole duration, so an environment is never used by two renders at once.

use minijinja::Environment;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Shared handle to a cached environment
pub type SharedEnvironment = Arc<Mutex<Environment<'static>>>;

/// Environment cache keyed by project
///
/// ## Usage
///
/// ```rust,ignore
/// let cache = EnvironmentCache::new();
/// let env = cache.get_or_create("my_project", build_environment);
/// let rendered = env.lock()?.render_str(raw, ctx)?;
/// ```
#[derive(Clone, Default)]
pub struct EnvironmentCache {
    entries: Arc<RwLock<HashMap<String, SharedEnvironment>>>,
}

impl std::fmt::Debug for EnvironmentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentCache")
            .field("entries", &self.len())
            .finish()
    }
}

impl EnvironmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The environment stored under `key`, building it on first use
    pub fn get_or_create<F>(&self, key: &str, build: F) -> SharedEnvironment
    where
        F: FnOnce() -> Environment<'static>,
    {
        if let Ok(entries) = self.entries.read() {
            if let Some(env) = entries.get(key) {
                return Arc::clone(env);
            }
        }

        match self.entries.write() {
            Ok(mut entries) => Arc::clone(
                entries
                    .entry(key.to_string())
                    .or_insert_with(|| {
                        tracing::debug!(key, "building template environment");
                        Arc::new(Mutex::new(build()))
                    }),
            ),
            // a poisoned map still yields a working, uncached environment
            Err(_) => Arc::new(Mutex::new(build())),
        }
    }

    /// Drop the environment stored under `key`
    pub fn evict(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }

    /// Drop every environment
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
