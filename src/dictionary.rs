//! Human-readable descriptions of engine variables.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Maps variable names to descriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataDictionary {
    descriptions: HashMap<String, String>,
}

impl DataDictionary {
    /// An empty dictionary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, variable: impl Into<String>, description: impl Into<String>) -> Self {
        self.insert(variable, description);
        self
    }

    /// Add or replace the description of `variable`.
    pub fn insert(&mut self, variable: impl Into<String>, description: impl Into<String>) {
        self.descriptions.insert(variable.into(), description.into());
    }

    /// Description of `variable`, or the variable name itself when unknown.
    #[must_use]
    pub fn description(&self, variable: &str) -> String {
        self.descriptions
            .get(variable)
            .cloned()
            .unwrap_or_else(|| variable.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_variable_name() {
        let dict = DataDictionary::new().with("fsmoke", "Smoking status");
        assert_eq!(dict.description("fsmoke"), "Smoking status");
        assert_eq!(dict.description("sol1"), "sol1");
    }

    #[test]
    fn deserializes_as_plain_map() {
        let dict: DataDictionary = serde_json::from_str(r#"{"sol1":"Standard of living"}"#).unwrap();
        assert_eq!(dict.description("sol1"), "Standard of living");
    }
}
