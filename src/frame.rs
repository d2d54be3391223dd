//! Columnar tables exchanged with the statistical engine.
//!
//! A [`DataFrame`] is the container the weighting strategies edit and the
//! lifecycle bridge hands over as a population snapshot. Each column has a
//! declared [`ColumnKind`]; missing cells use the engine's sentinel for
//! that kind (see [`missing`]).

use crate::error::{ConstructionError, ValidationError};
use crate::value::{Matrix, Value};

/// Engine-defined "not available" sentinels, one per column kind.
pub mod missing {
    /// Bit pattern of the engine's missing double: a NaN with payload 1954.
    pub const FLOAT_BITS: u64 = 0x7FF0_0000_0000_07A2;
    /// Missing integer.
    pub const INT: i32 = i32::MIN;
    /// Missing byte.
    pub const BYTE: i8 = i8::MIN;

    /// The missing double.
    #[must_use]
    pub fn float() -> f64 {
        f64::from_bits(FLOAT_BITS)
    }

    /// True only for the engine's missing double, not for any other NaN.
    #[must_use]
    pub fn is_float(value: f64) -> bool {
        value.to_bits() == FLOAT_BITS
    }
}

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    /// Double precision.
    Float,
    /// 32-bit integer.
    Int,
    /// 8-bit integer.
    Byte,
    /// Character strings, used for labels.
    Text,
}

/// Column storage, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum ColumnData {
    Float(Vec<f64>),
    Int(Vec<i32>),
    Byte(Vec<i8>),
    Text(Vec<String>),
}

/// A single cell read from a table.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum Cell {
    Float(f64),
    Int(i32),
    Byte(i8),
    Text(String),
}

impl Cell {
    /// True if the cell holds its kind's missing sentinel.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Float(v) => missing::is_float(*v),
            Self::Int(v) => *v == missing::INT,
            Self::Byte(v) => *v == missing::BYTE,
            Self::Text(_) => false,
        }
    }

    /// Numeric value, `None` for text or missing cells.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        if self.is_missing() {
            return None;
        }
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(f64::from(*v)),
            Self::Byte(v) => Some(f64::from(*v)),
            Self::Text(_) => None,
        }
    }
}

/// Round `value` and check it lies in `[min, max]`.
fn checked_round(field: &str, value: f64, min: f64, max: f64) -> Result<f64, ValidationError> {
    let rounded = value.round();
    if (min..=max).contains(&rounded) {
        Ok(rounded)
    } else {
        Err(ValidationError::OutOfRange {
            field: field.to_string(),
            value,
            min,
            max,
        })
    }
}

// The sentinels are excluded so an edit can never read back as missing.
#[allow(clippy::cast_possible_truncation)]
fn to_int(field: &str, value: f64) -> Result<i32, ValidationError> {
    checked_round(field, value, f64::from(missing::INT) + 1.0, f64::from(i32::MAX)).map(|v| v as i32)
}

#[allow(clippy::cast_possible_truncation)]
fn to_byte(field: &str, value: f64) -> Result<i8, ValidationError> {
    checked_round(field, value, f64::from(missing::BYTE) + 1.0, f64::from(i8::MAX)).map(|v| v as i8)
}

impl ColumnData {
    /// Declared kind of the column.
    #[must_use]
    pub const fn kind(&self) -> ColumnKind {
        match self {
            Self::Float(_) => ColumnKind::Float,
            Self::Int(_) => ColumnKind::Int,
            Self::Byte(_) => ColumnKind::Byte,
            Self::Text(_) => ColumnKind::Text,
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Byte(v) => v.len(),
            Self::Text(v) => v.len(),
        }
    }

    /// True if the column has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell at `row`.
    #[must_use]
    pub fn get(&self, row: usize) -> Option<Cell> {
        match self {
            Self::Float(v) => v.get(row).copied().map(Cell::Float),
            Self::Int(v) => v.get(row).copied().map(Cell::Int),
            Self::Byte(v) => v.get(row).copied().map(Cell::Byte),
            Self::Text(v) => v.get(row).cloned().map(Cell::Text),
        }
    }

    /// Overwrite every cell with the missing sentinel of this column's kind.
    ///
    /// Text columns hold row labels and are left as they are.
    pub fn fill_missing(&mut self) {
        match self {
            Self::Float(v) => v.fill(missing::float()),
            Self::Int(v) => v.fill(missing::INT),
            Self::Byte(v) => v.fill(missing::BYTE),
            Self::Text(_) => {}
        }
    }

    /// Multiply every numeric cell by `factor`. Numeric columns become
    /// floating unless `factor` is exactly 1; missing cells stay missing.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn scaled(&self, factor: f64) -> Self {
        if factor == 1.0 {
            return self.clone();
        }
        let scale = |cell: Option<f64>| cell.map_or_else(missing::float, |v| v * factor);
        match self {
            Self::Float(v) => Self::Float(
                v.iter()
                    .map(|x| scale((!missing::is_float(*x)).then_some(*x)))
                    .collect(),
            ),
            Self::Int(v) => Self::Float(
                v.iter()
                    .map(|x| scale((*x != missing::INT).then(|| f64::from(*x))))
                    .collect(),
            ),
            Self::Byte(v) => Self::Float(
                v.iter()
                    .map(|x| scale((*x != missing::BYTE).then(|| f64::from(*x))))
                    .collect(),
            ),
            Self::Text(v) => Self::Text(v.clone()),
        }
    }

    /// Numeric cells with missing ones as `None`; `None` for text columns.
    fn numeric_cells(&self) -> Option<Vec<Option<f64>>> {
        if matches!(self, Self::Text(_)) {
            return None;
        }
        Some((0..self.len()).map(|row| self.get(row).and_then(|c| c.as_f64())).collect())
    }

    /// Convert a numeric column to `kind`, rounding into integer kinds and
    /// mapping missing cells to the target kind's sentinel. Text columns,
    /// and conversions to text, are returned unchanged.
    pub fn cast(&self, kind: ColumnKind, field: &str) -> Result<Self, ValidationError> {
        if self.kind() == kind {
            return Ok(self.clone());
        }
        let Some(cells) = self.numeric_cells() else {
            return Ok(self.clone());
        };
        let cells = cells.into_iter();
        Ok(match kind {
            ColumnKind::Float => Self::Float(cells.map(|c| c.unwrap_or_else(missing::float)).collect()),
            ColumnKind::Int => Self::Int(
                cells
                    .map(|c| c.map_or(Ok(missing::INT), |v| to_int(field, v)))
                    .collect::<Result<_, _>>()?,
            ),
            ColumnKind::Byte => Self::Byte(
                cells
                    .map(|c| c.map_or(Ok(missing::BYTE), |v| to_byte(field, v)))
                    .collect::<Result<_, _>>()?,
            ),
            ColumnKind::Text => self.clone(),
        })
    }

    /// The column as an engine vector.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Float(v) => Value::numeric(v.clone()),
            Self::Int(v) => Value::Integer {
                values: v.clone(),
                names: None,
            },
            Self::Byte(v) => Value::Integer {
                values: v.iter().map(|b| i32::from(*b)).collect(),
                names: None,
            },
            Self::Text(v) => Value::Character(v.clone()),
        }
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Cells.
    pub data: ColumnData,
}

/// A named, column-oriented table.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    name: String,
    names: Vec<String>,
    columns: Vec<Column>,
    row_names: Option<Vec<String>>,
}

impl DataFrame {
    /// An empty table.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            names: Vec::new(),
            columns: Vec::new(),
            row_names: None,
        }
    }

    /// Builder-style [`DataFrame::push_column`].
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        data: ColumnData,
    ) -> Result<Self, ConstructionError> {
        self.push_column(name, data)?;
        Ok(self)
    }

    /// Append a column. All columns must have the same length.
    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        data: ColumnData,
    ) -> Result<(), ConstructionError> {
        let name = name.into();
        if let Some(first) = self.columns.first() {
            if first.data.len() != data.len() {
                return Err(ConstructionError::RaggedColumn {
                    column: name,
                    expected: first.data.len(),
                    actual: data.len(),
                });
            }
        }
        self.names.push(name.clone());
        self.columns.push(Column { name, data });
        Ok(())
    }

    /// Attach row labels.
    pub fn set_row_names(&mut self, row_names: Option<Vec<String>>) {
        self.row_names = row_names;
    }

    /// Name the table was created or loaded under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Row labels, if any.
    #[must_use]
    pub fn row_names(&self) -> Option<&[String]> {
        self.row_names.as_deref()
    }

    /// Number of rows; zero for a table without columns.
    #[must_use]
    pub fn nrows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.data.len())
    }

    /// Number of columns.
    #[must_use]
    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    /// All columns in order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in order.
    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Column kinds in order.
    #[must_use]
    pub fn column_kinds(&self) -> Vec<ColumnKind> {
        self.columns.iter().map(|c| c.data.kind()).collect()
    }

    /// Column called `name`.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Cell at (`row`, `column`).
    #[must_use]
    pub fn cell(&self, row: usize, column: &str) -> Option<Cell> {
        self.column(column)?.data.get(row)
    }

    /// Text cell, as required for identifier columns.
    pub fn get_string(&self, row: usize, column: &str) -> Result<String, ConstructionError> {
        match self.require(column)?.data.get(row) {
            Some(Cell::Text(s)) => Ok(s),
            _ => Err(ConstructionError::BadColumnType {
                column: column.to_string(),
                row,
                expected: "character".to_string(),
            }),
        }
    }

    /// Non-missing numeric cell.
    pub fn get_double(&self, row: usize, column: &str) -> Result<f64, ConstructionError> {
        self.require(column)?
            .data
            .get(row)
            .and_then(|c| c.as_f64())
            .ok_or_else(|| ConstructionError::BadColumnType {
                column: column.to_string(),
                row,
                expected: "numeric".to_string(),
            })
    }

    fn require(&self, column: &str) -> Result<&Column, ConstructionError> {
        self.column(column).ok_or_else(|| ConstructionError::MissingColumn {
            table: self.name.clone(),
            column: column.to_string(),
        })
    }

    /// Overwrite a numeric cell, as a user edit would.
    ///
    /// Integer and byte cells take the rounded value, which must fit the
    /// kind and must not be its missing sentinel.
    pub fn set_cell(&mut self, row: usize, column: &str, value: f64) -> Result<(), ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NonFinite {
                field: column.to_string(),
                value,
            });
        }
        let unknown = || ValidationError::UnknownCell {
            row,
            column: column.to_string(),
        };
        let col = self
            .columns
            .iter_mut()
            .find(|c| c.name == column)
            .ok_or_else(unknown)?;

        let slot_written = match &mut col.data {
            ColumnData::Float(v) => v.get_mut(row).map(|slot| *slot = value),
            ColumnData::Int(v) => {
                let value = to_int(column, value)?;
                v.get_mut(row).map(|slot| *slot = value)
            }
            ColumnData::Byte(v) => {
                let value = to_byte(column, value)?;
                v.get_mut(row).map(|slot| *slot = value)
            }
            ColumnData::Text(_) => None,
        };
        slot_written.ok_or_else(unknown)
    }

    /// Replace every cell with its column kind's missing sentinel.
    pub fn reset_to_missing(&mut self) {
        for column in &mut self.columns {
            column.data.fill_missing();
        }
    }

    /// Multiply every numeric cell by `factor`, returning a new table.
    #[must_use]
    pub fn scale(&self, factor: f64) -> Self {
        Self {
            name: self.name.clone(),
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    data: c.data.scaled(factor),
                })
                .collect(),
            row_names: self.row_names.clone(),
        }
    }

    /// Convert each column to the matching entry of `kinds`, as loaded
    /// before display scaling. Columns beyond `kinds` are kept as they are.
    pub fn with_kinds(&self, kinds: &[ColumnKind]) -> Result<Self, ValidationError> {
        let columns = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let kind = kinds.get(i).copied().unwrap_or_else(|| c.data.kind());
                Ok(Column {
                    name: c.name.clone(),
                    data: c.data.cast(kind, &c.name)?,
                })
            })
            .collect::<Result<_, ValidationError>>()?;
        Ok(Self {
            name: self.name.clone(),
            names: self.names.clone(),
            columns,
            row_names: self.row_names.clone(),
        })
    }

    /// Column-major numeric matrix with the column names and row labels as
    /// dimnames. Missing cells become the missing double.
    pub fn to_matrix(&self) -> Result<Matrix, ConstructionError> {
        let mut data = Vec::with_capacity(self.nrows() * self.ncols());
        for column in &self.columns {
            let cells = column
                .data
                .numeric_cells()
                .ok_or_else(|| ConstructionError::BadColumnType {
                    column: column.name.clone(),
                    row: 0,
                    expected: "numeric".to_string(),
                })?;
            data.extend(cells.into_iter().map(|c| c.unwrap_or_else(missing::float)));
        }
        Ok(Matrix {
            nrow: self.nrows(),
            ncol: self.ncols(),
            data,
            row_names: self.row_names.clone(),
            col_names: Some(self.names.clone()),
        })
    }

    /// Build a table from an evaluated engine value.
    ///
    /// Frames are taken as they are; matrices become one floating column per
    /// matrix column, named from the column dimnames (`V1`, `V2`, ... when absent).
    pub fn from_value(name: impl Into<String>, value: &Value) -> Result<Self, ConstructionError> {
        let name = name.into();
        match value {
            Value::Frame(frame) => {
                let mut frame = frame.clone();
                frame.name = name;
                Ok(frame)
            }
            Value::Matrix(m) => Self::from_matrix(name, m),
            other => Err(ConstructionError::NotTabular {
                class: other.class().to_string(),
            }),
        }
    }

    fn from_matrix(name: String, m: &Matrix) -> Result<Self, ConstructionError> {
        if m.data.len() != m.nrow * m.ncol {
            return Err(ConstructionError::NotTabular {
                class: format!("matrix with {} cells for {}x{}", m.data.len(), m.nrow, m.ncol),
            });
        }
        let mut frame = Self::new(name);
        for col in 0..m.ncol {
            let col_name = m
                .col_names
                .as_ref()
                .and_then(|n| n.get(col).cloned())
                .unwrap_or_else(|| format!("V{}", col + 1));
            let start = col * m.nrow;
            let cells = m.data[start..start + m.nrow].to_vec();
            frame.push_column(col_name, ColumnData::Float(cells))?;
        }
        frame.row_names.clone_from(&m.row_names);
        Ok(frame)
    }
}
