use crate::column::{ColumnBlock, ColumnData, ColumnType};
use crate::source::DatasetSource;
use anyhow::{anyhow, bail, ensure, Context, Result};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{
    DataType, Float32Type, Float64Type, Int32Type, Int64Type, UInt32Type, UInt64Type,
};
use parquet::arrow::arrow_reader::{ParquetRecordBatchReaderBuilder, RowSelection, RowSelector};
use parquet::arrow::ProjectionMask;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Parquet file exposed as a range-addressable dataset.
///
/// The schema and row count are read once when the source is opened. Every
/// `read_range` call reopens the file and decodes only the selected rows of the
/// requested columns, using a row selection and a projection mask.
///
/// Supported Arrow types: `Boolean`, `Int32`, `Int64`, `UInt32`, `UInt64`,
/// `Float32`, `Float64`. Other columns are listed but cannot be read.
///
/// # Example
/// ```ignore
/// let source = ParquetSource::open("events.parquet")?;
/// let block = source.read_range(1024, 256, &["pt".into(), "label".into()])?;
/// ```
#[derive(Debug, Clone)]
pub struct ParquetSource {
    path: PathBuf,
    fields: Vec<(String, Option<ColumnType>)>,
    num_rows: usize,
    batch_size: usize,
}

impl ParquetSource {
    /// Opens a Parquet file and reads its schema.
    ///
    /// # Errors
    /// - File does not exist or is not a valid Parquet file
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let builder = Self::reader_builder(&path)?;

        let fields = builder
            .schema()
            .fields()
            .iter()
            .map(|field| (field.name().to_string(), column_type_of(field.data_type())))
            .collect();
        let num_rows = usize::try_from(builder.metadata().file_metadata().num_rows())
            .with_context(|| format!("Negative row count in {}", path.display()))?;

        Ok(Self {
            path,
            fields,
            num_rows,
            batch_size: 8192,
        })
    }

    /// Rows per decoded record batch while reading a range.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reader_builder(path: &Path) -> Result<ParquetRecordBatchReaderBuilder<File>> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open Parquet file: {}", path.display()))?;
        ParquetRecordBatchReaderBuilder::try_new(file)
            .with_context(|| format!("Not a valid Parquet file: {}", path.display()))
    }
}

impl DatasetSource for ParquetSource {
    fn column_names(&self) -> Vec<String> {
        self.fields.iter().map(|(name, _)| name.clone()).collect()
    }

    fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|&(_, ty)| ty)
    }

    fn row_count(&self) -> usize {
        self.num_rows
    }

    fn read_range(&self, start: usize, length: usize, columns: &[String]) -> Result<ColumnBlock> {
        ensure!(
            start.checked_add(length).is_some_and(|end| end <= self.num_rows),
            "Range [{}, {}) exceeds the {} rows of {}",
            start,
            start.saturating_add(length),
            self.num_rows,
            self.path.display()
        );

        let schema = columns
            .iter()
            .map(|name| {
                let (_, ty) = self
                    .fields
                    .iter()
                    .find(|(n, _)| n == name)
                    .ok_or_else(|| anyhow!("Column '{}' not found in {}", name, self.path.display()))?;
                let ty = ty.ok_or_else(|| anyhow!("Column '{}' has an unsupported type", name))?;
                Ok((name.clone(), ty))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut block = ColumnBlock::empty(&schema, length);
        if length == 0 {
            return Ok(block);
        }

        let builder = Self::reader_builder(&self.path)?;

        // Parquet needs root field indices for the projection
        let field_indices: Vec<usize> = builder
            .schema()
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, field)| columns.contains(field.name()))
            .map(|(index, _)| index)
            .collect();
        let projection = ProjectionMask::roots(builder.parquet_schema(), field_indices);

        let mut selectors = Vec::with_capacity(2);
        if start > 0 {
            selectors.push(RowSelector::skip(start));
        }
        selectors.push(RowSelector::select(length));

        let reader = builder
            .with_batch_size(self.batch_size)
            .with_projection(projection)
            .with_row_selection(RowSelection::from(selectors))
            .build()?;

        for batch in reader {
            let batch = batch?;
            let data = schema
                .iter()
                .map(|(name, ty)| {
                    let array = batch
                        .column_by_name(name)
                        .ok_or_else(|| anyhow!("Column '{}' missing from decoded batch", name))?;
                    column_from_arrow(name, *ty, array)
                })
                .collect::<Result<Vec<_>>>()?;
            block.append(&ColumnBlock::new(columns.to_vec(), data)?)?;
        }

        ensure!(
            block.num_rows() == length,
            "Read {} rows from {} but expected {}",
            block.num_rows(),
            self.path.display(),
            length
        );
        Ok(block)
    }
}

fn column_type_of(data_type: &DataType) -> Option<ColumnType> {
    match data_type {
        DataType::Boolean => Some(ColumnType::Bool),
        DataType::Int32 => Some(ColumnType::Int32),
        DataType::Int64 => Some(ColumnType::Int64),
        DataType::UInt32 => Some(ColumnType::UInt32),
        DataType::UInt64 => Some(ColumnType::UInt64),
        DataType::Float32 => Some(ColumnType::Float32),
        DataType::Float64 => Some(ColumnType::Float64),
        _ => None,
    }
}

fn column_from_arrow(name: &str, ty: ColumnType, array: &ArrayRef) -> Result<ColumnData> {
    if array.null_count() > 0 {
        bail!("Column '{}' contains {} null values", name, array.null_count());
    }
    let data = match ty {
        ColumnType::Bool => ColumnData::Bool(array.as_boolean().values().iter().collect()),
        ColumnType::Int32 => ColumnData::Int32(array.as_primitive::<Int32Type>().values().to_vec()),
        ColumnType::Int64 => ColumnData::Int64(array.as_primitive::<Int64Type>().values().to_vec()),
        ColumnType::UInt32 => {
            ColumnData::UInt32(array.as_primitive::<UInt32Type>().values().to_vec())
        }
        ColumnType::UInt64 => {
            ColumnData::UInt64(array.as_primitive::<UInt64Type>().values().to_vec())
        }
        ColumnType::Float32 => {
            ColumnData::Float32(array.as_primitive::<Float32Type>().values().to_vec())
        }
        ColumnType::Float64 => {
            ColumnData::Float64(array.as_primitive::<Float64Type>().values().to_vec())
        }
    };
    Ok(data)
}
