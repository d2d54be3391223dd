//! Opaque key-value store for user preferences.

use std::collections::HashMap;

/// Load/save collaborator for parameter-set state.
pub trait Preferences {
    /// Stored value for `key`.
    fn get(&self, key: &str) -> Option<String>;
    /// Store `value` under `key`, replacing any previous value.
    fn put(&mut self, key: &str, value: String);
    /// Forget `key`.
    fn remove(&mut self, key: &str);
}

/// Preferences kept in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryPreferences {
    entries: HashMap<String, String>,
}

impl MemoryPreferences {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Preferences for MemoryPreferences {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }
}
