//! Fact table assembly: raw rows with descriptive columns swapped for
//! dimension keys.

use std::sync::Arc;

use clap::ValueEnum;
use datafusion::arrow::array::{ArrayRef, BooleanArray, Int64Array};
use datafusion::arrow::compute::filter_record_batch;
use datafusion::arrow::datatypes::{DataType, Field, Schema};
use datafusion::arrow::record_batch::RecordBatch;

use crate::dimension::Dimension;
use crate::error::{EtlError, Result};
use crate::table;

/// How raw rows without a matching dimension row are treated.
///
/// Dimensions built from the same batch as the fact join always match, so a
/// miss means the two were built from different rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum JoinPolicy {
    /// Abort on the first unmatched row.
    #[default]
    Strict,
    /// Keep the row with a null key.
    Left,
    /// Drop the row.
    Inner,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactColumn {
    /// Copied from the raw batch.
    Raw(String),
    /// The key column of the named dimension.
    Key(String),
}

impl FactColumn {
    pub fn raw(name: &str) -> Self {
        FactColumn::Raw(name.to_string())
    }

    pub fn key(dimension: &str) -> Self {
        FactColumn::Key(dimension.to_string())
    }
}

/// Joins `raw` against every dimension named in `layout` and projects to it.
pub fn assemble(
    raw: &RecordBatch,
    dimensions: &[&Dimension],
    layout: &[FactColumn],
    policy: JoinPolicy,
) -> Result<RecordBatch> {
    let raw_schema = raw.schema();
    let mut matched = vec![true; raw.num_rows()];
    let mut fields = Vec::with_capacity(layout.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(layout.len());

    for column in layout {
        match column {
            FactColumn::Raw(name) => {
                columns.push(table::column(raw, name)?.clone());
                fields.push(raw_schema.field_with_name(name)?.clone());
            }
            FactColumn::Key(dimension) => {
                let dim = dimensions
                    .iter()
                    .find(|d| d.name() == dimension.as_str())
                    .ok_or_else(|| EtlError::InvalidDimension {
                        dimension: dimension.clone(),
                        reason: "not built for this fact table".to_string(),
                    })?;
                let keys = dim.keys_for(raw)?;

                let mut misses = 0usize;
                for (row, key) in keys.iter().enumerate() {
                    if key.is_none() {
                        if policy == JoinPolicy::Strict {
                            return Err(EtlError::UnmatchedRow {
                                dimension: dimension.clone(),
                                row,
                            });
                        }
                        matched[row] = false;
                        misses += 1;
                    }
                }
                if misses > 0 {
                    log::warn!("{dimension}: {misses} raw rows have no dimension row");
                }

                fields.push(Field::new(
                    dim.key_column(),
                    DataType::Int64,
                    policy != JoinPolicy::Strict,
                ));
                columns.push(Arc::new(Int64Array::from(keys)));
            }
        }
    }

    let fact = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
    if policy != JoinPolicy::Inner {
        return Ok(fact);
    }
    let fact = filter_record_batch(&fact, &BooleanArray::from(matched))?;
    let dropped = raw.num_rows() - fact.num_rows();
    if dropped > 0 {
        log::warn!("Inner join dropped {dropped} of {} raw rows", raw.num_rows());
    }
    Ok(fact)
}

#[cfg(test)]
mod tests {
    use datafusion::arrow::array::Array;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::loader::parse_csv_bytes;

    const TRIPS: &[u8] = b"VendorID,passenger_count,fare_amount
1,1,7.5
2,2,11.0
1,1,4.0
";

    fn layout() -> Vec<FactColumn> {
        vec![
            FactColumn::raw("VendorID"),
            FactColumn::key("passenger_count_dim"),
            FactColumn::raw("fare_amount"),
        ]
    }

    fn key_column(fact: &RecordBatch, name: &str) -> Vec<Option<i64>> {
        table::column(fact, name)
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap()
            .iter()
            .collect()
    }

    #[test]
    fn replaces_values_with_keys() {
        let raw = parse_csv_bytes(TRIPS).unwrap();
        let dim = Dimension::build(&raw, "passenger_count_dim", "passenger_count", &["passenger_count"])
            .unwrap();
        let fact = assemble(&raw, &[&dim], &layout(), JoinPolicy::Strict).unwrap();

        let schema = fact.schema();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["VendorID", "passenger_count_id", "fare_amount"]);
        assert_eq!(fact.num_rows(), 3);
        assert_eq!(
            key_column(&fact, "passenger_count_id"),
            vec![Some(0), Some(1), Some(0)]
        );
    }

    fn foreign_dimension() -> Dimension {
        let other = parse_csv_bytes(b"passenger_count\n1\n").unwrap();
        Dimension::build(&other, "passenger_count_dim", "passenger_count", &["passenger_count"]).unwrap()
    }

    #[test]
    fn strict_policy_aborts_on_missing_rows() {
        let raw = parse_csv_bytes(TRIPS).unwrap();
        let dim = foreign_dimension();
        let err = assemble(&raw, &[&dim], &layout(), JoinPolicy::Strict).unwrap_err();
        assert!(matches!(err, EtlError::UnmatchedRow { row: 1, .. }));
    }

    #[test]
    fn left_policy_keeps_rows_with_null_keys() {
        let raw = parse_csv_bytes(TRIPS).unwrap();
        let dim = foreign_dimension();
        let fact = assemble(&raw, &[&dim], &layout(), JoinPolicy::Left).unwrap();
        assert_eq!(fact.num_rows(), 3);
        assert_eq!(
            key_column(&fact, "passenger_count_id"),
            vec![Some(0), None, Some(0)]
        );
    }

    #[test]
    fn inner_policy_drops_rows() {
        let raw = parse_csv_bytes(TRIPS).unwrap();
        let dim = foreign_dimension();
        let fact = assemble(&raw, &[&dim], &layout(), JoinPolicy::Inner).unwrap();
        assert_eq!(fact.num_rows(), 2);
        let vendors = table::column(&fact, "VendorID").unwrap();
        assert_eq!(vendors.null_count(), 0);
    }

    #[test]
    fn unknown_dimension_is_rejected() {
        let raw = parse_csv_bytes(TRIPS).unwrap();
        let err = assemble(&raw, &[], &layout(), JoinPolicy::Strict).unwrap_err();
        assert!(matches!(err, EtlError::InvalidDimension { .. }));
    }
}
