//! Values held by, and returned from, the statistical engine.
//!
//! The engine works on named vectors, matrices, data frames and nested
//! lists. Vectors carry an optional names attribute, which is how a
//! proportion table exposes its factor levels.

use std::fmt;

use crate::frame::DataFrame;

/// Separator between a top-level variable and its list elements, as in
/// `env.scenario$catadjs$fsmoke`.
pub const PATH_SEPARATOR: char = '$';

/// A column-major numeric matrix with optional dimnames.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    /// Number of rows.
    pub nrow: usize,
    /// Number of columns.
    pub ncol: usize,
    /// Cells in column-major order.
    pub data: Vec<f64>,
    /// Row dimnames.
    pub row_names: Option<Vec<String>>,
    /// Column dimnames.
    pub col_names: Option<Vec<String>>,
}

impl Matrix {
    /// Cell at (`row`, `col`).
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.nrow || col >= self.ncol {
            return None;
        }
        self.data.get(col * self.nrow + row).copied()
    }
}

/// Possible values of an engine expression or variable.
///
/// # Examples
///
/// ```
/// use simbridge::Value;
///
/// let props = Value::named_numeric(vec![0.3, 0.7], vec!["A".into(), "B".into()]);
/// assert_eq!(props.class(), "numeric");
/// assert_eq!(props.names().map(<[String]>::len), Some(2));
/// ```
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Logical(Vec<bool>),
    Numeric {
        values: Vec<f64>,
        names: Option<Vec<String>>,
    },
    Integer {
        values: Vec<i32>,
        names: Option<Vec<String>>,
    },
    Character(Vec<String>),
    Matrix(Matrix),
    Frame(DataFrame),
    List(Vec<(String, Value)>),
}

impl Value {
    /// A numeric vector without names.
    #[must_use]
    pub fn numeric(values: Vec<f64>) -> Self {
        Self::Numeric { values, names: None }
    }

    /// A numeric vector with a names attribute.
    #[must_use]
    pub fn named_numeric(values: Vec<f64>, names: Vec<String>) -> Self {
        Self::Numeric {
            values,
            names: Some(names),
        }
    }

    /// A numeric scalar.
    #[must_use]
    pub fn scalar(value: f64) -> Self {
        Self::numeric(vec![value])
    }

    /// True for `NULL`.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True for a double vector.
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Numeric { .. })
    }

    /// True for a data frame.
    pub const fn is_frame(&self) -> bool {
        matches!(self, Self::Frame(_))
    }

    /// True for a list.
    pub const fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// The engine's class name for this value.
    #[must_use]
    pub const fn class(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Logical(_) => "logical",
            Self::Numeric { .. } => "numeric",
            Self::Integer { .. } => "integer",
            Self::Character(_) => "character",
            Self::Matrix(_) => "matrix",
            Self::Frame(_) => "data.frame",
            Self::List(_) => "list",
        }
    }

    /// The names attribute, if any.
    #[must_use]
    pub fn names(&self) -> Option<&[String]> {
        match self {
            Self::Numeric { names, .. } | Self::Integer { names, .. } => names.as_deref(),
            Self::Frame(frame) => Some(frame.column_names()),
            _ => None,
        }
    }

    /// Numeric contents as doubles. Integers are widened.
    #[must_use]
    pub fn as_doubles(&self) -> Option<Vec<f64>> {
        match self {
            Self::Numeric { values, .. } => Some(values.clone()),
            Self::Integer { values, .. } => Some(values.iter().map(|v| f64::from(*v)).collect()),
            Self::Matrix(m) => Some(m.data.clone()),
            _ => None,
        }
    }

    /// Number of elements (rows for a frame).
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Null => 0,
            Self::Logical(v) => v.len(),
            Self::Numeric { values, .. } => values.len(),
            Self::Integer { values, .. } => values.len(),
            Self::Character(v) => v.len(),
            Self::Matrix(m) => m.data.len(),
            Self::Frame(f) => f.nrows(),
            Self::List(items) => items.len(),
        }
    }

    /// True for `NULL` and zero-length values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element of a list (or column of a frame) by name.
    #[must_use]
    pub fn element(&self, name: &str) -> Option<Value> {
        match self {
            Self::List(items) => items.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone()),
            Self::Frame(frame) => frame.column(name).map(|c| c.data.to_value()),
            _ => None,
        }
    }

    /// Follow `segments` through nested lists.
    #[must_use]
    pub fn get_path(&self, segments: &[&str]) -> Option<Value> {
        match segments.split_first() {
            None => Some(self.clone()),
            Some((head, rest)) => self.element(head)?.get_path(rest),
        }
    }

    /// Replace the element at `segments`, creating intermediate lists as
    /// needed. A non-list value on the path is replaced by a list.
    pub fn set_path(&mut self, segments: &[&str], value: Value) {
        let Some((head, rest)) = segments.split_first() else {
            *self = value;
            return;
        };

        if !self.is_list() {
            *self = Self::List(Vec::new());
        }
        let Self::List(items) = self else {
            return;
        };

        if let Some((_, slot)) = items.iter_mut().find(|(k, _)| k == head) {
            slot.set_path(rest, value);
        } else {
            let mut slot = Self::Null;
            slot.set_path(rest, value);
            items.push(((*head).to_string(), slot));
        }
    }
}

/// Split a variable path into its top-level name and list element names.
///
/// Dots are part of engine identifiers, so `env.scenario$catadjs` names the
/// element `catadjs` of the variable `env.scenario`.
#[must_use]
pub fn split_path(path: &str) -> (&str, Vec<&str>) {
    let mut parts = path.split(PATH_SEPARATOR).map(str::trim);
    let root = parts.next().unwrap_or("");
    (root, parts.collect())
}

fn write_numbers(f: &mut fmt::Formatter<'_>, values: impl Iterator<Item = String>) -> fmt::Result {
    let joined: Vec<String> = values.collect();
    write!(f, "[1] {}", joined.join(" "))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Logical(v) => write_numbers(
                f,
                v.iter().map(|b| if *b { "TRUE".to_string() } else { "FALSE".to_string() }),
            ),
            Self::Numeric {
                values,
                names: Some(names),
            } => {
                let pairs: Vec<String> = names
                    .iter()
                    .zip(values)
                    .map(|(n, v)| format!("{n}={v}"))
                    .collect();
                write!(f, "{}", pairs.join(" "))
            }
            Self::Numeric { values, names: None } => {
                write_numbers(f, values.iter().map(ToString::to_string))
            }
            Self::Integer { values, .. } => write_numbers(f, values.iter().map(ToString::to_string)),
            Self::Character(v) => write_numbers(f, v.iter().map(|s| format!("{s:?}"))),
            Self::Matrix(m) => write!(f, "<matrix {}x{}>", m.nrow, m.ncol),
            Self::Frame(frame) => write!(
                f,
                "<data.frame {}: {} obs. of {} variables>",
                frame.name(),
                frame.nrows(),
                frame.ncols()
            ),
            Self::List(items) => write!(f, "<list of {}>", items.len()),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::scalar(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Self::numeric(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Character(vec![v.to_string()])
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Character(vec![v])
    }
}

impl From<DataFrame> for Value {
    fn from(v: DataFrame) -> Self {
        Self::Frame(v)
    }
}

impl From<Matrix> for Value {
    fn from(v: Matrix) -> Self {
        Self::Matrix(v)
    }
}
