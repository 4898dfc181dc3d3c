//! Column lookup helpers over Arrow record batches.

use datafusion::arrow::array::ArrayRef;
use datafusion::arrow::compute::concat_batches;
use datafusion::arrow::datatypes::{Schema, SchemaRef};
use datafusion::arrow::record_batch::RecordBatch;

use crate::error::{EtlError, Result};

/// Fails with the first name in `names` that `schema` does not carry.
pub fn require_columns<S: AsRef<str>>(schema: &Schema, names: &[S]) -> Result<()> {
    for name in names {
        let name = name.as_ref();
        if schema.index_of(name).is_err() {
            return Err(EtlError::MissingColumn(name.to_string()));
        }
    }
    Ok(())
}

pub fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| EtlError::MissingColumn(name.to_string()))
}

pub fn columns<S: AsRef<str>>(batch: &RecordBatch, names: &[S]) -> Result<Vec<ArrayRef>> {
    names
        .iter()
        .map(|name| column(batch, name.as_ref()).cloned())
        .collect()
}

/// Collapses scan output into a single batch so row positions are global.
pub fn concat(schema: &SchemaRef, batches: &[RecordBatch]) -> Result<RecordBatch> {
    Ok(concat_batches(schema, batches)?)
}
