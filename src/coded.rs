//! Dimensions over small integer codes with a fixed label set.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use clap::ValueEnum;
use datafusion::arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use datafusion::arrow::compute::cast;
use datafusion::arrow::datatypes::{DataType, Field};
use datafusion::arrow::record_batch::RecordBatch;

use crate::dimension::Dimension;
use crate::error::{EtlError, Result};

/// What to do with a code that has no entry in its label table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum UnmappedCodePolicy {
    /// Keep the row with a null label and log the codes.
    #[default]
    Null,
    /// Abort the job.
    Fail,
}

/// Fixed code -> label lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLabels(BTreeMap<i64, String>);

impl CodeLabels {
    pub fn new<L: Into<String>>(entries: impl IntoIterator<Item = (i64, L)>) -> Self {
        CodeLabels(entries.into_iter().map(|(c, l)| (c, l.into())).collect())
    }

    /// TLC `RatecodeID` values.
    pub fn rate_codes() -> Self {
        CodeLabels::new([
            (1, "Standard rate"),
            (2, "JFK"),
            (3, "Newark"),
            (4, "Nassau or Westchester"),
            (5, "Negotiated fare"),
            (6, "Group ride"),
        ])
    }

    /// TLC `payment_type` values.
    pub fn payment_types() -> Self {
        CodeLabels::new([
            (1, "Credit card"),
            (2, "Cash"),
            (3, "No charge"),
            (4, "Dispute"),
            (5, "Unknown"),
            (6, "Voided trip"),
        ])
    }

    pub fn label(&self, code: i64) -> Option<&str> {
        self.0.get(&code).map(String::as_str)
    }
}

enum Code {
    Missing,
    Integral(i64),
    Other(String),
}

/// Reads a code column as integers. Float columns (`1.0`) are accepted as
/// long as the value is integral.
fn code_values(column: &str, array: &ArrayRef) -> Result<Vec<Code>> {
    match array.data_type() {
        DataType::Null => Ok((0..array.len()).map(|_| Code::Missing).collect()),
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32 => {
            let ints = cast(array, &DataType::Int64)?;
            let ints = ints
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| EtlError::column_type(column, "Int64", ints.data_type()))?;
            Ok(ints
                .iter()
                .map(|v| v.map_or(Code::Missing, Code::Integral))
                .collect())
        }
        DataType::Float16 | DataType::Float32 | DataType::Float64 => {
            let floats = cast(array, &DataType::Float64)?;
            let floats = floats
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| EtlError::column_type(column, "Float64", floats.data_type()))?;
            Ok(floats
                .iter()
                .map(|v| match v {
                    None => Code::Missing,
                    Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                        Code::Integral(f as i64)
                    }
                    Some(f) => Code::Other(f.to_string()),
                })
                .collect())
        }
        other => Err(EtlError::column_type(column, "integer code", other)),
    }
}

/// Builds a dimension over `column` with an extra `<key_prefix>_name` label
/// column resolved through `labels`.
pub fn build_coded(
    raw: &RecordBatch,
    name: &str,
    key_prefix: &str,
    column: &str,
    labels: &CodeLabels,
    policy: UnmappedCodePolicy,
) -> Result<Dimension> {
    let dim = Dimension::build(raw, name, key_prefix, &[column])?;
    let codes = code_values(column, &dim.source_arrays()?[0])?;

    let mut unmapped = BTreeSet::new();
    let names: StringArray = codes
        .iter()
        .map(|code| match code {
            Code::Missing => None,
            Code::Integral(c) => {
                let label = labels.label(*c);
                if label.is_none() {
                    unmapped.insert(c.to_string());
                }
                label
            }
            Code::Other(repr) => {
                unmapped.insert(repr.clone());
                None
            }
        })
        .collect();

    if !unmapped.is_empty() {
        let codes: Vec<String> = unmapped.into_iter().collect();
        match policy {
            UnmappedCodePolicy::Fail => {
                return Err(EtlError::UnmappedCode {
                    dimension: name.to_string(),
                    codes,
                })
            }
            UnmappedCodePolicy::Null => {
                log::warn!("{name}: code(s) without a label, left null: {codes:?}")
            }
        }
    }

    let label_field = Field::new(format!("{key_prefix}_name"), DataType::Utf8, true);
    dim.with_attribute(label_field, Arc::new(names))
}
