use anyhow::{anyhow, ensure, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar type of a dataset column.
///
/// The set is closed: every column a [`DatasetSource`](crate::source::DatasetSource)
/// exposes must map onto one of these tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Bool,
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float32,
    Float64,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Bool => "bool",
            ColumnType::Int32 => "i32",
            ColumnType::Int64 => "i64",
            ColumnType::UInt32 => "u32",
            ColumnType::UInt64 => "u64",
            ColumnType::Float32 => "f32",
            ColumnType::Float64 => "f64",
        };
        f.write_str(name)
    }
}

/// Values of one column, stored contiguously with their native type.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Bool(Vec<bool>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

// Applies the same expression to the inner vector of every variant.
macro_rules! each_variant {
    ($data:expr, $values:ident => $body:expr) => {
        match $data {
            ColumnData::Bool($values) => $body,
            ColumnData::Int32($values) => $body,
            ColumnData::Int64($values) => $body,
            ColumnData::UInt32($values) => $body,
            ColumnData::UInt64($values) => $body,
            ColumnData::Float32($values) => $body,
            ColumnData::Float64($values) => $body,
        }
    };
}

// Same as `each_variant`, but rebuilds a column of the same type from the body.
macro_rules! map_variant {
    ($data:expr, $values:ident => $body:expr) => {
        match $data {
            ColumnData::Bool($values) => ColumnData::Bool($body),
            ColumnData::Int32($values) => ColumnData::Int32($body),
            ColumnData::Int64($values) => ColumnData::Int64($body),
            ColumnData::UInt32($values) => ColumnData::UInt32($body),
            ColumnData::UInt64($values) => ColumnData::UInt64($body),
            ColumnData::Float32($values) => ColumnData::Float32($body),
            ColumnData::Float64($values) => ColumnData::Float64($body),
        }
    };
}

impl ColumnData {
    /// Creates an empty column of the given type with room for `capacity` rows.
    pub fn with_capacity(column_type: ColumnType, capacity: usize) -> Self {
        match column_type {
            ColumnType::Bool => ColumnData::Bool(Vec::with_capacity(capacity)),
            ColumnType::Int32 => ColumnData::Int32(Vec::with_capacity(capacity)),
            ColumnType::Int64 => ColumnData::Int64(Vec::with_capacity(capacity)),
            ColumnType::UInt32 => ColumnData::UInt32(Vec::with_capacity(capacity)),
            ColumnType::UInt64 => ColumnData::UInt64(Vec::with_capacity(capacity)),
            ColumnType::Float32 => ColumnData::Float32(Vec::with_capacity(capacity)),
            ColumnType::Float64 => ColumnData::Float64(Vec::with_capacity(capacity)),
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnData::Bool(_) => ColumnType::Bool,
            ColumnData::Int32(_) => ColumnType::Int32,
            ColumnData::Int64(_) => ColumnType::Int64,
            ColumnData::UInt32(_) => ColumnType::UInt32,
            ColumnData::UInt64(_) => ColumnType::UInt64,
            ColumnData::Float32(_) => ColumnType::Float32,
            ColumnData::Float64(_) => ColumnType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        each_variant!(self, values => values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies rows `[start, start + len)` into a new column.
    ///
    /// Panics if the range is out of bounds.
    pub fn slice(&self, start: usize, len: usize) -> Self {
        map_variant!(self, values => values[start..start + len].to_vec())
    }

    /// Gathers the rows at `positions`, in that order.
    ///
    /// Panics if a position is out of bounds.
    pub fn take(&self, positions: &[usize]) -> Self {
        map_variant!(self, values => positions.iter().map(|&p| values[p]).collect())
    }

    /// Appends the rows of `other`, which must have the same type.
    pub fn extend_from(&mut self, other: &ColumnData) -> Result<()> {
        match (self, other) {
            (ColumnData::Bool(a), ColumnData::Bool(b)) => a.extend_from_slice(b),
            (ColumnData::Int32(a), ColumnData::Int32(b)) => a.extend_from_slice(b),
            (ColumnData::Int64(a), ColumnData::Int64(b)) => a.extend_from_slice(b),
            (ColumnData::UInt32(a), ColumnData::UInt32(b)) => a.extend_from_slice(b),
            (ColumnData::UInt64(a), ColumnData::UInt64(b)) => a.extend_from_slice(b),
            (ColumnData::Float32(a), ColumnData::Float32(b)) => a.extend_from_slice(b),
            (ColumnData::Float64(a), ColumnData::Float64(b)) => a.extend_from_slice(b),
            (this, other) => {
                return Err(anyhow!(
                    "Cannot append a {} column to a {} column",
                    other.column_type(),
                    this.column_type()
                ))
            }
        }
        Ok(())
    }

    /// Value at `row` converted to `f32`.
    pub fn value_f32(&self, row: usize) -> f32 {
        match self {
            ColumnData::Bool(v) => f32::from(u8::from(v[row])),
            ColumnData::Int32(v) => v[row] as f32,
            ColumnData::Int64(v) => v[row] as f32,
            ColumnData::UInt32(v) => v[row] as f32,
            ColumnData::UInt64(v) => v[row] as f32,
            ColumnData::Float32(v) => v[row],
            ColumnData::Float64(v) => v[row] as f32,
        }
    }
}

/// A Rust scalar that can be read out of a [`ColumnData`] without conversion.
pub trait ColumnScalar: Copy + Send + Sync + 'static {
    const COLUMN_TYPE: ColumnType;

    fn values(data: &ColumnData) -> Option<&[Self]>;
}

macro_rules! impl_column_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl ColumnScalar for $ty {
                const COLUMN_TYPE: ColumnType = ColumnType::$variant;

                fn values(data: &ColumnData) -> Option<&[Self]> {
                    match data {
                        ColumnData::$variant(values) => Some(values),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_column_scalar!(
    bool => Bool,
    i32 => Int32,
    i64 => Int64,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
);

/// An ordered set of named, equally long columns.
///
/// This is the unit every stage exchanges: the source returns one per range read,
/// the chunk loader concatenates them, the shuffler gathers rows out of them and
/// batches hold projections of them.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnBlock {
    names: Vec<String>,
    columns: Vec<ColumnData>,
}

impl ColumnBlock {
    /// Creates a block from parallel name/column vectors.
    ///
    /// # Errors
    /// - `names` and `columns` differ in length
    /// - columns differ in row count
    pub fn new(names: Vec<String>, columns: Vec<ColumnData>) -> Result<Self> {
        ensure!(
            names.len() == columns.len(),
            "Got {} column names for {} columns",
            names.len(),
            columns.len()
        );
        if let Some(first) = columns.first() {
            let rows = first.len();
            for (name, column) in names.iter().zip(&columns) {
                ensure!(
                    column.len() == rows,
                    "Column '{}' has {} rows, expected {}",
                    name,
                    column.len(),
                    rows
                );
            }
        }
        Ok(Self { names, columns })
    }

    /// Creates a block without rows for the given schema.
    pub fn empty(schema: &[(String, ColumnType)], capacity: usize) -> Self {
        Self {
            names: schema.iter().map(|(name, _)| name.clone()).collect(),
            columns: schema
                .iter()
                .map(|&(_, ty)| ColumnData::with_capacity(ty, capacity))
                .collect(),
        }
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, ColumnData::len)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Looks a column up by name.
    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.position(name).map(|i| &self.columns[i])
    }

    pub fn column_at(&self, index: usize) -> Option<&ColumnData> {
        self.columns.get(index)
    }

    /// Typed view of a column, `None` if it is missing or holds another type.
    pub fn values<T: ColumnScalar>(&self, name: &str) -> Option<&[T]> {
        self.column(name).and_then(T::values)
    }

    /// Every column holding values of type `T`, with its name.
    pub fn columns_of<T: ColumnScalar>(&self) -> impl Iterator<Item = (&str, &[T])> {
        self.names
            .iter()
            .zip(&self.columns)
            .filter_map(|(name, column)| T::values(column).map(|v| (name.as_str(), v)))
    }

    pub fn schema(&self) -> Vec<(String, ColumnType)> {
        self.names
            .iter()
            .cloned()
            .zip(self.columns.iter().map(ColumnData::column_type))
            .collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Rows `[start, start + len)` as a new block.
    pub fn slice(&self, start: usize, len: usize) -> Self {
        Self {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.slice(start, len)).collect(),
        }
    }

    /// Rows at `positions`, in that order, as a new block.
    pub fn take(&self, positions: &[usize]) -> Self {
        Self {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(positions)).collect(),
        }
    }

    /// Keeps only the columns at `indices`, in that order.
    pub fn project(&self, indices: &[usize]) -> Self {
        Self {
            names: indices.iter().map(|&i| self.names[i].clone()).collect(),
            columns: indices.iter().map(|&i| self.columns[i].clone()).collect(),
        }
    }

    /// Appends the rows of `other`, which must have the same schema.
    pub fn append(&mut self, other: &ColumnBlock) -> Result<()> {
        ensure!(
            self.names == other.names,
            "Cannot append block with columns {:?} to block with columns {:?}",
            other.names,
            self.names
        );
        for (name, (column, incoming)) in self
            .names
            .iter()
            .zip(self.columns.iter_mut().zip(&other.columns))
        {
            column
                .extend_from(incoming)
                .map_err(|e| e.context(format!("Column '{}'", name)))?;
        }
        Ok(())
    }

    /// Row-major single precision copy of the block, `num_rows * num_columns` long.
    pub fn to_row_major_f32(&self) -> Vec<f32> {
        let rows = self.num_rows();
        let mut out = Vec::with_capacity(rows * self.num_columns());
        for row in 0..rows {
            out.extend(self.columns.iter().map(|c| c.value_f32(row)));
        }
        out
    }
}
