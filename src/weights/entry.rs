//! Factor levels and their numerator/denominator weights.

use std::collections::HashMap;
use std::fmt;

use crate::error::ConstructionError;
use crate::frame::{ColumnData, DataFrame};

/// The value an entity holds for a categorical variable.
#[derive(Debug, Clone, PartialEq)]
pub enum LevelValue {
    /// Numeric code of the level.
    Number(f64),
    /// Label of the level.
    Text(String),
}

impl fmt::Display for LevelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<f64> for LevelValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i32> for LevelValue {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<&str> for LevelValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for LevelValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Variable values of one entity, keyed by variable name.
pub type Variables = HashMap<String, LevelValue>;

/// Lookup key of a factor level. Labels that parse as numbers match numeric
/// values, so the level `"2"` matches both `2.0` and `"2.0"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LevelKey {
    /// Bits of the level as a double, with -0 folded into 0.
    Numeric(u64),
    /// Label that does not parse as a number.
    Text(String),
}

impl LevelKey {
    fn numeric(v: f64) -> Self {
        // -0.0 and 0.0 are the same level
        let v = if v == 0.0 { 0.0 } else { v };
        Self::Numeric(v.to_bits())
    }

    /// Key for a level label as named by the proportion table.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        match label.parse::<f64>() {
            Ok(v) if v.is_finite() => Self::numeric(v),
            _ => Self::Text(label.to_string()),
        }
    }

    /// Key for the value an entity holds.
    #[must_use]
    pub fn from_value(value: &LevelValue) -> Self {
        match value {
            LevelValue::Number(v) => Self::numeric(*v),
            LevelValue::Text(s) => Self::from_label(s),
        }
    }
}

/// A factor level with an editable numerator over a fixed denominator.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightEntry {
    level: String,
    numerator: f64,
    denominator: f64,
}

impl WeightEntry {
    /// An entry whose numerator starts equal to its denominator.
    #[must_use]
    pub fn new(level: impl Into<String>, proportion: f64) -> Self {
        Self {
            level: level.into(),
            numerator: proportion,
            denominator: proportion,
        }
    }

    /// Level label.
    #[must_use]
    pub fn level(&self) -> &str {
        &self.level
    }

    /// Edited weight.
    #[must_use]
    pub const fn numerator(&self) -> f64 {
        self.numerator
    }

    /// Proportion of the level in the source data.
    #[must_use]
    pub const fn denominator(&self) -> f64 {
        self.denominator
    }

    /// `numerator / denominator`; 1.0 while unedited.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.denominator == 0.0 {
            return 0.0;
        }
        self.numerator / self.denominator
    }

    /// Replace the edited weight.
    pub fn set_numerator(&mut self, numerator: f64) {
        self.numerator = numerator;
    }

    /// Restore the numerator to the denominator.
    pub fn reset(&mut self) {
        self.numerator = self.denominator;
    }
}

/// Entries in order of discovery, indexed by level.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WeightSet {
    entries: Vec<WeightEntry>,
    index: HashMap<LevelKey, usize>,
}

impl WeightSet {
    /// Build from parallel level names and proportions.
    ///
    /// # Errors
    /// - `NamesLengthMismatch` if the two slices differ in length
    /// - `DuplicateLevel` if two names denote the same level
    pub fn from_levels(levels: &[String], proportions: &[f64]) -> Result<Self, ConstructionError> {
        if levels.len() != proportions.len() {
            return Err(ConstructionError::NamesLengthMismatch {
                names: levels.len(),
                values: proportions.len(),
            });
        }
        let mut set = Self::default();
        for (level, proportion) in levels.iter().zip(proportions) {
            let key = LevelKey::from_label(level);
            if set.index.contains_key(&key) {
                return Err(ConstructionError::DuplicateLevel {
                    level: level.clone(),
                });
            }
            set.index.insert(key, set.entries.len());
            set.entries.push(WeightEntry::new(level.as_str(), *proportion));
        }
        Ok(set)
    }

    /// Number of levels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no levels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in level order.
    pub fn iter(&self) -> impl Iterator<Item = &WeightEntry> {
        self.entries.iter()
    }

    /// Entry for `key`.
    #[must_use]
    pub fn get(&self, key: &LevelKey) -> Option<&WeightEntry> {
        self.index.get(key).map(|i| &self.entries[*i])
    }

    /// Entry for `key`, for editing.
    pub fn get_mut(&mut self, key: &LevelKey) -> Option<&mut WeightEntry> {
        let i = *self.index.get(key)?;
        self.entries.get_mut(i)
    }

    /// Sum of numerators, the current total of the level proportions.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.entries.iter().map(WeightEntry::numerator).sum()
    }

    /// Restore every numerator to its denominator.
    pub fn reset_all(&mut self) {
        for entry in &mut self.entries {
            entry.reset();
        }
    }

    /// Levels with their numerator, denominator and fraction.
    #[must_use]
    pub fn to_frame(&self, name: &str) -> DataFrame {
        let mut frame = DataFrame::new(name);
        let columns = [
            ("level", ColumnData::Text(self.entries.iter().map(|e| e.level.clone()).collect())),
            ("numerator", ColumnData::Float(self.entries.iter().map(WeightEntry::numerator).collect())),
            ("denominator", ColumnData::Float(self.entries.iter().map(WeightEntry::denominator).collect())),
            ("fraction", ColumnData::Float(self.entries.iter().map(WeightEntry::fraction).collect())),
        ];
        for (col, data) in columns {
            // all columns come from the same entries
            if frame.push_column(col, data).is_err() {
                break;
            }
        }
        frame
    }
}
