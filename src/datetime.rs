//! The datetime dimension: distinct (pickup, dropoff) pairs broken into
//! calendar components.

use std::sync::Arc;

use datafusion::arrow::compute::kernels::temporal::{date_part, DatePart};
use datafusion::arrow::datatypes::{DataType, Field};
use datafusion::arrow::record_batch::RecordBatch;

use crate::dimension::Dimension;
use crate::error::{EtlError, Result};
use crate::table;

pub const DATETIME_DIM: &str = "datetime_dim";

/// Component suffixes in output order. Weekday counts from Monday = 0.
const COMPONENTS: [(&str, DatePart); 5] = [
    ("hour", DatePart::Hour),
    ("day", DatePart::Day),
    ("month", DatePart::Month),
    ("year", DatePart::Year),
    ("weekday", DatePart::DayOfWeekMonday0),
];

/// Builds `datetime_dim` keyed by `datetime_id`. Components come from the
/// stored wall-clock fields; no timezone conversion happens.
pub fn build_datetime(raw: &RecordBatch, pickup: &str, dropoff: &str) -> Result<Dimension> {
    for name in [pickup, dropoff] {
        let column = table::column(raw, name)?;
        if !matches!(column.data_type(), DataType::Timestamp(_, _)) {
            return Err(EtlError::column_type(name, "timestamp", column.data_type()));
        }
    }

    let mut dim = Dimension::build(raw, DATETIME_DIM, "datetime", &[pickup, dropoff])?;
    let stamps = dim.source_arrays()?;
    for (prefix, stamp) in ["pickup", "dropoff"].into_iter().zip(stamps) {
        for (suffix, part) in COMPONENTS {
            let values = date_part(stamp.as_ref(), part)?;
            let field = Field::new(format!("{prefix}_{suffix}"), DataType::Int32, true);
            dim = dim.with_attribute(field, Arc::new(values))?;
        }
    }
    Ok(dim)
}

#[cfg(test)]
mod tests {
    use datafusion::arrow::array::{Array, Int32Array};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::loader::{coerce_timestamps, parse_csv_bytes};

    const PICKUP: &str = "tpep_pickup_datetime";
    const DROPOFF: &str = "tpep_dropoff_datetime";

    fn raw(csv: &str) -> RecordBatch {
        let batch = parse_csv_bytes(csv.as_bytes()).unwrap();
        coerce_timestamps(&batch, &[PICKUP, DROPOFF]).unwrap()
    }

    fn component(dim: &Dimension, column: &str) -> Vec<i32> {
        let col = table::column(dim.table(), column).unwrap();
        col.as_any()
            .downcast_ref::<Int32Array>()
            .unwrap()
            .values()
            .to_vec()
    }

    #[test]
    fn decomposes_pickup_and_dropoff() {
        let dim = build_datetime(
            &raw("tpep_pickup_datetime,tpep_dropoff_datetime\n2024-07-01 08:15:00,2024-07-07 23:59:59\n"),
            PICKUP,
            DROPOFF,
        )
        .unwrap();

        assert_eq!(component(&dim, "pickup_hour"), vec![8]);
        assert_eq!(component(&dim, "pickup_day"), vec![1]);
        assert_eq!(component(&dim, "pickup_month"), vec![7]);
        assert_eq!(component(&dim, "pickup_year"), vec![2024]);
        assert_eq!(component(&dim, "pickup_weekday"), vec![0]);

        assert_eq!(component(&dim, "dropoff_hour"), vec![23]);
        assert_eq!(component(&dim, "dropoff_day"), vec![7]);
        assert_eq!(component(&dim, "dropoff_weekday"), vec![6]);
    }

    #[test]
    fn column_layout() {
        let dim = build_datetime(
            &raw("tpep_pickup_datetime,tpep_dropoff_datetime\n2016-03-01 00:00:00,2016-03-01 00:07:55\n"),
            PICKUP,
            DROPOFF,
        )
        .unwrap();
        let schema = dim.table().schema();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(
            names,
            vec![
                "datetime_id",
                PICKUP,
                DROPOFF,
                "pickup_hour",
                "pickup_day",
                "pickup_month",
                "pickup_year",
                "pickup_weekday",
                "dropoff_hour",
                "dropoff_day",
                "dropoff_month",
                "dropoff_year",
                "dropoff_weekday",
            ]
        );
    }

    #[test]
    fn pairs_are_deduplicated_not_single_timestamps() {
        let dim = build_datetime(
            &raw(
                "tpep_pickup_datetime,tpep_dropoff_datetime
2016-03-01 00:00:00,2016-03-01 00:07:55
2016-03-01 00:00:00,2016-03-01 00:11:06
2016-03-01 00:00:00,2016-03-01 00:07:55
",
            ),
            PICKUP,
            DROPOFF,
        )
        .unwrap();
        assert_eq!(dim.len(), 2);
        assert_eq!(component(&dim, "pickup_weekday"), vec![1, 1]);
        assert_eq!(component(&dim, "dropoff_hour"), vec![0, 0]);
    }

    #[test]
    fn rejects_untyped_timestamps() {
        let batch = parse_csv_bytes(b"tpep_pickup_datetime,tpep_dropoff_datetime\n1,2\n").unwrap();
        let err = build_datetime(&batch, PICKUP, DROPOFF).unwrap_err();
        assert!(matches!(err, EtlError::ColumnType { column, .. } if column == PICKUP));
    }

    #[test]
    fn null_dropoff_gives_null_components() {
        let dim = build_datetime(
            &raw("tpep_pickup_datetime,tpep_dropoff_datetime\n2016-03-01 00:00:00,\n"),
            PICKUP,
            DROPOFF,
        )
        .unwrap();
        let hour = table::column(dim.table(), "dropoff_hour").unwrap();
        assert!(hour.is_null(0));
    }
}
