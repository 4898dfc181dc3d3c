//! The sampling job: drop incomplete rows from a large CSV and keep a
//! seeded uniform sample.

use std::path::PathBuf;

use datafusion::arrow::array::UInt64Array;
use datafusion::arrow::compute::take_record_batch;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{EtlError, Result};
use crate::loader::{self, Source};
use crate::output;
use crate::table;

/// Columns of the 2024 TLC yellow taxi files that must be present on a row.
pub const REQUIRED_COLUMNS: [&str; 19] = [
    "VendorID",
    "tpep_pickup_datetime",
    "tpep_dropoff_datetime",
    "passenger_count",
    "trip_distance",
    "RatecodeID",
    "store_and_fwd_flag",
    "PULocationID",
    "DOLocationID",
    "payment_type",
    "fare_amount",
    "extra",
    "mta_tax",
    "tip_amount",
    "tolls_amount",
    "improvement_surcharge",
    "total_amount",
    "congestion_surcharge",
    "Airport_fee",
];

#[derive(Debug, Clone)]
pub struct SampleConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub required_columns: Vec<String>,
    pub sample_size: usize,
    pub seed: u64,
}

impl Default for SampleConfig {
    fn default() -> Self {
        SampleConfig {
            input: PathBuf::from("tripdata_july_2024.csv"),
            output: PathBuf::from("modified_file.csv"),
            required_columns: REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect(),
            sample_size: 150_000,
            seed: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSummary {
    pub input_rows: usize,
    pub complete_rows: usize,
    pub sampled_rows: usize,
}

/// Positions of a uniform sample of `amount` out of `len` rows, without
/// replacement, in draw order. The seed alone fixes the result.
pub fn sample_indices(len: usize, amount: usize, seed: u64) -> Result<Vec<u64>> {
    if amount > len {
        return Err(EtlError::InsufficientRows {
            requested: amount,
            available: len,
        });
    }
    let mut rng = StdRng::seed_from_u64(seed);
    Ok(rand::seq::index::sample(&mut rng, len, amount)
        .into_iter()
        .map(|i| i as u64)
        .collect())
}

/// Keeps only rows with a value in every one of `columns`. Row order is kept.
pub async fn drop_incomplete<S: AsRef<str>>(
    ctx: &SessionContext,
    batch: RecordBatch,
    columns: &[S],
) -> Result<RecordBatch> {
    table::require_columns(&batch.schema(), columns)?;
    let schema = batch.schema();
    let Some(predicate) = columns
        .iter()
        .map(|c| ident(c.as_ref()).is_not_null())
        .reduce(Expr::and)
    else {
        return Ok(batch);
    };
    let batches = ctx.read_batch(batch)?.filter(predicate)?.collect().await?;
    table::concat(&schema, &batches)
}

/// Runs the sampling job end to end and writes the sample to `config.output`.
pub async fn run_sample(config: &SampleConfig) -> Result<SampleSummary> {
    let ctx = loader::session();
    let raw = loader::load(&ctx, &Source::Path(config.input.clone())).await?;
    let schema = raw.schema();
    let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    log::info!("Column names in the CSV file: {names:?}");

    let input_rows = raw.num_rows();
    let complete = drop_incomplete(&ctx, raw, &config.required_columns).await?;
    log::info!(
        "{} of {input_rows} rows have every required column",
        complete.num_rows()
    );

    let indices = sample_indices(complete.num_rows(), config.sample_size, config.seed)?;
    let sampled = take_record_batch(&complete, &UInt64Array::from(indices))?;
    output::write_csv(&config.output, &sampled)?;
    log::debug!("Wrote sample to {}", config.output.display());

    Ok(SampleSummary {
        input_rows,
        complete_rows: complete.num_rows(),
        sampled_rows: sampled.num_rows(),
    })
}
