//! Dimension tables with run-local surrogate keys.
//!
//! Key assignment is explicit: the source columns are encoded with Arrow's
//! row format, the raw rows are scanned in order, and the first occurrence of
//! every distinct encoded combination receives the next key starting at 0.
//! Nulls encode like any other value, so an all-null combination gets its own
//! row. Float zeros are folded to `0.0` before encoding, so `-0.0` and `0.0`
//! share a key. The same encoding backs the key index used by the fact join, which is
//! a map and therefore cannot hold a combination twice.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use datafusion::arrow::array::{Array, ArrayRef, AsArray, Int64Array, UInt64Array};
use datafusion::arrow::compute::take;
use datafusion::arrow::datatypes::{DataType, Field, Float32Type, Float64Type, Schema};
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::arrow::row::{RowConverter, SortField};

use crate::error::{EtlError, Result};
use crate::table;

/// Rewrites `-0.0` as `0.0` in float columns. Row encoding keeps the sign
/// bit, while the two compare equal as values.
pub(crate) fn fold_negative_zero(columns: Vec<ArrayRef>) -> Vec<ArrayRef> {
    columns
        .into_iter()
        .map(|column| -> ArrayRef {
            match column.data_type() {
                DataType::Float64 => Arc::new(
                    column
                        .as_primitive::<Float64Type>()
                        .unary::<_, Float64Type>(|v| v + 0.0),
                ),
                DataType::Float32 => Arc::new(
                    column
                        .as_primitive::<Float32Type>()
                        .unary::<_, Float32Type>(|v| v + 0.0),
                ),
                _ => column,
            }
        })
        .collect()
}

/// Encoded value combination -> surrogate key.
struct KeyIndex {
    converter: RowConverter,
    keys: HashMap<Vec<u8>, i64>,
}

impl KeyIndex {
    fn new(columns: &[ArrayRef]) -> Result<Self> {
        let fields = columns
            .iter()
            .map(|c| SortField::new(c.data_type().clone()))
            .collect();
        Ok(KeyIndex {
            converter: RowConverter::new(fields)?,
            keys: HashMap::new(),
        })
    }

    /// Registers every unseen combination and returns the row positions
    /// where each was first seen, in key order.
    fn assign(&mut self, columns: &[ArrayRef]) -> Result<Vec<u64>> {
        let rows = self.converter.convert_columns(columns)?;
        let mut first_seen = Vec::new();
        for (position, row) in rows.iter().enumerate() {
            let encoded: &[u8] = row.as_ref();
            if !self.keys.contains_key(encoded) {
                self.keys.insert(encoded.to_vec(), first_seen.len() as i64);
                first_seen.push(position as u64);
            }
        }
        Ok(first_seen)
    }

    fn lookup(&self, columns: &[ArrayRef]) -> Result<Vec<Option<i64>>> {
        let rows = self.converter.convert_columns(columns)?;
        Ok(rows
            .iter()
            .map(|row| {
                let encoded: &[u8] = row.as_ref();
                self.keys.get(encoded).copied()
            })
            .collect())
    }
}

/// A de-duplicated projection of one or more raw columns plus a key column.
///
/// The table layout is the key column, then the source columns, then any
/// attribute columns derived from them.
pub struct Dimension {
    name: String,
    key_column: String,
    source_columns: Vec<String>,
    table: RecordBatch,
    index: KeyIndex,
}

impl Dimension {
    /// Builds `<name>` over `columns` of `raw`, keyed by `<key_prefix>_id`.
    pub fn build<S: AsRef<str>>(
        raw: &RecordBatch,
        name: &str,
        key_prefix: &str,
        columns: &[S],
    ) -> Result<Self> {
        if columns.is_empty() {
            return Err(EtlError::InvalidDimension {
                dimension: name.to_string(),
                reason: "no source columns".to_string(),
            });
        }
        let source_columns: Vec<String> = columns.iter().map(|c| c.as_ref().to_string()).collect();
        let arrays = fold_negative_zero(table::columns(raw, &source_columns)?);

        let mut index = KeyIndex::new(&arrays)?;
        let first_seen = UInt64Array::from(index.assign(&arrays)?);
        let key_column = format!("{key_prefix}_id");

        let raw_schema = raw.schema();
        let mut fields = vec![Field::new(&key_column, DataType::Int64, false)];
        let mut values: Vec<ArrayRef> = vec![Arc::new(Int64Array::from_iter_values(
            0..first_seen.len() as i64,
        ))];
        for (column, array) in source_columns.iter().zip(&arrays) {
            fields.push(raw_schema.field_with_name(column)?.clone());
            values.push(take(array.as_ref(), &first_seen, None)?);
        }
        let table = RecordBatch::try_new(Arc::new(Schema::new(fields)), values)?;

        log::debug!(
            "{name}: {} distinct rows from {} raw rows",
            table.num_rows(),
            raw.num_rows()
        );
        Ok(Dimension {
            name: name.to_string(),
            key_column,
            source_columns,
            table,
            index,
        })
    }

    /// Appends a column computed from this dimension's rows.
    pub fn with_attribute(mut self, field: Field, values: ArrayRef) -> Result<Self> {
        if values.len() != self.table.num_rows() {
            return Err(EtlError::InvalidDimension {
                dimension: self.name.clone(),
                reason: format!(
                    "attribute '{}' has {} values for {} rows",
                    field.name(),
                    values.len(),
                    self.table.num_rows()
                ),
            });
        }
        let schema = self.table.schema();
        let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
        let mut columns = self.table.columns().to_vec();
        fields.push(field);
        columns.push(values);
        self.table = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn source_columns(&self) -> &[String] {
        &self.source_columns
    }

    pub fn table(&self) -> &RecordBatch {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.table.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.table.num_rows() == 0
    }

    /// The dimension's copy of its source columns, in key order.
    pub fn source_arrays(&self) -> Result<Vec<ArrayRef>> {
        table::columns(&self.table, &self.source_columns)
    }

    /// Resolves every row of `batch` to its key by the exact source columns.
    /// Rows whose combination is not in the dimension resolve to `None`.
    pub fn keys_for(&self, batch: &RecordBatch) -> Result<Vec<Option<i64>>> {
        let arrays = fold_negative_zero(table::columns(batch, &self.source_columns)?);
        self.index.lookup(&arrays)
    }
}

impl fmt::Debug for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dimension")
            .field("name", &self.name)
            .field("key_column", &self.key_column)
            .field("source_columns", &self.source_columns)
            .field("rows", &self.table.num_rows())
            .finish()
    }
}
