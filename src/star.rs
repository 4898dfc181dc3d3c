//! The transform job: raw trip records into a star schema.

use std::path::{Path, PathBuf};

use datafusion::arrow::array::{Array, ArrayRef, Int64Array};
use datafusion::arrow::compute::take;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::arrow::row::{RowConverter, SortField};

use crate::coded::{build_coded, CodeLabels, UnmappedCodePolicy};
use crate::datetime::{build_datetime, DATETIME_DIM};
use crate::dimension::{fold_negative_zero, Dimension};
use crate::error::{EtlError, Result};
use crate::fact::{assemble, FactColumn, JoinPolicy};
use crate::loader::{self, Source};
use crate::output;
use crate::table;

pub const DEFAULT_URL: &str =
    "https://storage.googleapis.com/uber-data-engineering-project/uber_data.csv";

pub const PASSENGER_COUNT_DIM: &str = "passenger_count_dim";
pub const TRIP_DISTANCE_DIM: &str = "trip_distance_dim";
pub const RATE_CODE_DIM: &str = "rate_code_dim";
pub const PICKUP_LOCATION_DIM: &str = "pickup_location_dim";
pub const DROPOFF_LOCATION_DIM: &str = "dropoff_location_dim";
pub const PAYMENT_TYPE_DIM: &str = "payment_type_dim";
pub const FACT_TABLE: &str = "fact_table";

/// Column names of the raw trip dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripSchema {
    pub vendor: String,
    pub pickup_datetime: String,
    pub dropoff_datetime: String,
    pub passenger_count: String,
    pub trip_distance: String,
    pub rate_code: String,
    pub store_and_fwd_flag: String,
    pub pickup_location: Vec<String>,
    pub dropoff_location: Vec<String>,
    pub payment_type: String,
    /// Monetary columns carried into the fact table, in order.
    pub amounts: Vec<String>,
}

fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

impl Default for TripSchema {
    /// Yellow taxi layout with coordinate locations.
    fn default() -> Self {
        TripSchema {
            vendor: "VendorID".to_string(),
            pickup_datetime: "tpep_pickup_datetime".to_string(),
            dropoff_datetime: "tpep_dropoff_datetime".to_string(),
            passenger_count: "passenger_count".to_string(),
            trip_distance: "trip_distance".to_string(),
            rate_code: "RatecodeID".to_string(),
            store_and_fwd_flag: "store_and_fwd_flag".to_string(),
            pickup_location: strings(&["pickup_longitude", "pickup_latitude"]),
            dropoff_location: strings(&["dropoff_longitude", "dropoff_latitude"]),
            payment_type: "payment_type".to_string(),
            amounts: strings(&[
                "fare_amount",
                "extra",
                "mta_tax",
                "tip_amount",
                "tolls_amount",
                "improvement_surcharge",
                "total_amount",
            ]),
        }
    }
}

impl TripSchema {
    /// Newer TLC layout where locations are taxi zone ids.
    pub fn zones() -> Self {
        TripSchema {
            pickup_location: strings(&["PULocationID"]),
            dropoff_location: strings(&["DOLocationID"]),
            ..TripSchema::default()
        }
    }

    pub fn required_columns(&self) -> Vec<&str> {
        let mut names = vec![
            self.vendor.as_str(),
            self.pickup_datetime.as_str(),
            self.dropoff_datetime.as_str(),
            self.passenger_count.as_str(),
            self.trip_distance.as_str(),
            self.rate_code.as_str(),
            self.store_and_fwd_flag.as_str(),
        ];
        names.extend(self.pickup_location.iter().map(String::as_str));
        names.extend(self.dropoff_location.iter().map(String::as_str));
        names.push(self.payment_type.as_str());
        names.extend(self.amounts.iter().map(String::as_str));
        names
    }

    pub fn fact_layout(&self) -> Vec<FactColumn> {
        let mut layout = vec![
            FactColumn::raw(&self.vendor),
            FactColumn::key(DATETIME_DIM),
            FactColumn::key(PASSENGER_COUNT_DIM),
            FactColumn::key(TRIP_DISTANCE_DIM),
            FactColumn::key(RATE_CODE_DIM),
            FactColumn::raw(&self.store_and_fwd_flag),
            FactColumn::key(PICKUP_LOCATION_DIM),
            FactColumn::key(DROPOFF_LOCATION_DIM),
            FactColumn::key(PAYMENT_TYPE_DIM),
        ];
        layout.extend(self.amounts.iter().map(|a| FactColumn::raw(a)));
        layout
    }
}

#[derive(Debug, Clone)]
pub struct TransformConfig {
    pub source: Source,
    pub schema: TripSchema,
    pub rate_codes: CodeLabels,
    pub payment_types: CodeLabels,
    pub unmapped_codes: UnmappedCodePolicy,
    pub join: JoinPolicy,
    /// Check that every fact key leads back to the raw values.
    pub verify: bool,
    pub preview_rows: usize,
    /// Write every table as CSV here when set.
    pub output_dir: Option<PathBuf>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        TransformConfig {
            source: Source::Url(DEFAULT_URL.to_string()),
            schema: TripSchema::default(),
            rate_codes: CodeLabels::rate_codes(),
            payment_types: CodeLabels::payment_types(),
            unmapped_codes: UnmappedCodePolicy::default(),
            join: JoinPolicy::default(),
            verify: false,
            preview_rows: 5,
            output_dir: None,
        }
    }
}

#[derive(Debug)]
pub struct StarSchema {
    pub datetime: Dimension,
    pub passenger_count: Dimension,
    pub trip_distance: Dimension,
    pub rate_code: Dimension,
    pub pickup_location: Dimension,
    pub dropoff_location: Dimension,
    pub payment_type: Dimension,
    pub fact: RecordBatch,
}

impl StarSchema {
    pub fn dimensions(&self) -> [&Dimension; 7] {
        [
            &self.datetime,
            &self.passenger_count,
            &self.trip_distance,
            &self.rate_code,
            &self.pickup_location,
            &self.dropoff_location,
            &self.payment_type,
        ]
    }

    /// Writes `<dimension>.csv` for every dimension plus `fact_table.csv`.
    pub fn write_csv(&self, dir: &Path) -> Result<()> {
        for dim in self.dimensions() {
            output::write_csv(&dir.join(format!("{}.csv", dim.name())), dim.table())?;
        }
        output::write_csv(&dir.join(format!("{FACT_TABLE}.csv")), &self.fact)
    }
}

/// Derives every dimension from `raw` and joins them back into the fact
/// table. `raw` must already carry typed timestamps.
pub fn build_star_schema(raw: &RecordBatch, config: &TransformConfig) -> Result<StarSchema> {
    let schema = &config.schema;
    table::require_columns(&raw.schema(), &schema.required_columns())?;

    let datetime = build_datetime(raw, &schema.pickup_datetime, &schema.dropoff_datetime)?;
    let passenger_count = Dimension::build(
        raw,
        PASSENGER_COUNT_DIM,
        "passenger_count",
        &[&schema.passenger_count],
    )?;
    let trip_distance =
        Dimension::build(raw, TRIP_DISTANCE_DIM, "trip_distance", &[&schema.trip_distance])?;
    let rate_code = build_coded(
        raw,
        RATE_CODE_DIM,
        "rate_code",
        &schema.rate_code,
        &config.rate_codes,
        config.unmapped_codes,
    )?;
    let pickup_location = Dimension::build(
        raw,
        PICKUP_LOCATION_DIM,
        "pickup_location",
        &schema.pickup_location,
    )?;
    let dropoff_location = Dimension::build(
        raw,
        DROPOFF_LOCATION_DIM,
        "dropoff_location",
        &schema.dropoff_location,
    )?;
    let payment_type = build_coded(
        raw,
        PAYMENT_TYPE_DIM,
        "payment_type",
        &schema.payment_type,
        &config.payment_types,
        config.unmapped_codes,
    )?;

    let fact = assemble(
        raw,
        &[
            &datetime,
            &passenger_count,
            &trip_distance,
            &rate_code,
            &pickup_location,
            &dropoff_location,
            &payment_type,
        ],
        &schema.fact_layout(),
        config.join,
    )?;

    let star = StarSchema {
        datetime,
        passenger_count,
        trip_distance,
        rate_code,
        pickup_location,
        dropoff_location,
        payment_type,
        fact,
    };
    for dim in star.dimensions() {
        log::info!("{}: {} rows", dim.name(), dim.len());
    }
    log::info!("{FACT_TABLE}: {} rows", star.fact.num_rows());
    Ok(star)
}

/// Follows every fact key into its dimension and checks the dimension row
/// holds exactly the raw values of that fact row. Null keys are skipped.
/// Needs the fact table row-aligned with `raw`, so not valid after an
/// inner join dropped rows.
pub fn verify_round_trip(raw: &RecordBatch, star: &StarSchema) -> Result<()> {
    if star.fact.num_rows() != raw.num_rows() {
        return Err(EtlError::RoundTrip {
            dimension: FACT_TABLE.to_string(),
            row: star.fact.num_rows().min(raw.num_rows()),
        });
    }

    for dim in star.dimensions() {
        let keys = table::column(&star.fact, dim.key_column())?;
        let keys = keys
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| EtlError::column_type(dim.key_column(), "Int64", keys.data_type()))?;

        let expected = fold_negative_zero(table::columns(raw, dim.source_columns())?);
        let resolved = dim
            .source_arrays()?
            .iter()
            .map(|a| take(a.as_ref(), keys, None))
            .collect::<std::result::Result<Vec<ArrayRef>, _>>()?;

        let converter = RowConverter::new(
            expected
                .iter()
                .map(|a| SortField::new(a.data_type().clone()))
                .collect(),
        )?;
        let expected = converter.convert_columns(&expected)?;
        let resolved = converter.convert_columns(&resolved)?;
        for row in 0..raw.num_rows() {
            if keys.is_valid(row) && expected.row(row) != resolved.row(row) {
                return Err(EtlError::RoundTrip {
                    dimension: dim.name().to_string(),
                    row,
                });
            }
        }
    }
    Ok(())
}

/// Runs the whole transform job: load, build, optionally verify, preview,
/// optionally write out.
pub async fn run_transform(config: &TransformConfig) -> Result<StarSchema> {
    let ctx = loader::session();
    let raw = loader::load(&ctx, &config.source).await?;
    table::require_columns(&raw.schema(), &config.schema.required_columns())?;
    let raw = loader::coerce_timestamps(
        &raw,
        &[&config.schema.pickup_datetime, &config.schema.dropoff_datetime],
    )?;

    let star = build_star_schema(&raw, config)?;
    if config.verify {
        verify_round_trip(&raw, &star)?;
        log::info!("Round-trip check passed for {} rows", raw.num_rows());
    }

    output::print_batch(&ctx, "Fact table", star.fact.clone(), config.preview_rows).await?;
    if let Some(dir) = &config.output_dir {
        star.write_csv(dir)?;
    }
    Ok(star)
}
