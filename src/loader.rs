//! Fetching and parsing raw trip CSVs.

use std::convert::Infallible;
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use datafusion::arrow::array::ArrayRef;
use datafusion::arrow::compute::kernels::cast::{cast_with_options, CastOptions};
use datafusion::arrow::csv::reader::Format;
use datafusion::arrow::csv::ReaderBuilder;
use datafusion::arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::prelude::*;

use crate::error::{EtlError, Result};
use crate::table;

/// Where a job reads its CSV from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Url(String),
    Path(PathBuf),
}

impl FromStr for Source {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("http://") || s.starts_with("https://") {
            Ok(Source::Url(s.to_string()))
        } else {
            Ok(Source::Path(PathBuf::from(s)))
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Url(url) => write!(f, "{url}"),
            Source::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Session used by both jobs. A single partition keeps scans and filters in
/// file order, which the sampler's seed contract relies on.
pub fn session() -> SessionContext {
    SessionContext::new_with_config(SessionConfig::new().with_target_partitions(1))
}

pub async fn load(ctx: &SessionContext, source: &Source) -> Result<RecordBatch> {
    let batch = match source {
        Source::Url(url) => {
            let body = fetch(url).await?;
            parse_csv_bytes(&body)?
        }
        Source::Path(path) => read_csv_file(ctx, path).await?,
    };
    log::info!(
        "Loaded {} rows x {} columns from {}",
        batch.num_rows(),
        batch.num_columns(),
        source
    );
    Ok(batch)
}

async fn fetch(url: &str) -> Result<Vec<u8>> {
    let fetch_err = |source| EtlError::Fetch {
        url: url.to_string(),
        source,
    };
    log::info!("Fetching {url}");
    let response = reqwest::get(url)
        .await
        .and_then(|r| r.error_for_status())
        .map_err(fetch_err)?;
    let body = response.bytes().await.map_err(fetch_err)?;
    Ok(body.to_vec())
}

async fn read_csv_file(ctx: &SessionContext, path: &Path) -> Result<RecordBatch> {
    if !path.is_file() {
        return Err(EtlError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        ));
    }
    // read_csv filters on extension, so accept whatever the file carries
    let extension = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let options = CsvReadOptions::new()
        .has_header(true)
        .file_extension(&extension)
        .schema_infer_max_records(usize::MAX);

    let df = ctx
        .read_csv(path.to_string_lossy().as_ref(), options)
        .await?;
    let df_schema = df.schema().inner().clone();
    let batches = df.collect().await?;
    let schema = batches.first().map(|b| b.schema()).unwrap_or(df_schema);
    table::concat(&schema, &batches)
}

/// Parses a headered CSV held in memory, inferring the schema over every record.
pub fn parse_csv_bytes(bytes: &[u8]) -> Result<RecordBatch> {
    let (schema, _) = Format::default()
        .with_header(true)
        .infer_schema(Cursor::new(bytes), None)?;
    let schema = Arc::new(schema);
    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .build(Cursor::new(bytes))?;
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    table::concat(&schema, &batches)
}

/// Converts each named column into a naive timestamp. Text that does not
/// parse aborts the load instead of becoming null; a column with no values
/// at all becomes an all-null timestamp column.
pub fn coerce_timestamps<S: AsRef<str>>(batch: &RecordBatch, names: &[S]) -> Result<RecordBatch> {
    let schema = batch.schema();
    table::require_columns(&schema, names)?;

    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
    let target = DataType::Timestamp(TimeUnit::Nanosecond, None);
    let options = CastOptions {
        safe: false,
        ..Default::default()
    };

    for name in names {
        let name = name.as_ref();
        let idx = schema.index_of(name)?;
        match fields[idx].data_type() {
            DataType::Timestamp(_, _) => continue,
            DataType::Null | DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
                columns[idx] = cast_with_options(&columns[idx], &target, &options).map_err(|e| {
                    EtlError::Timestamp {
                        column: name.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                fields[idx] = fields[idx].clone().with_data_type(target.clone());
            }
            other => return Err(EtlError::column_type(name, "timestamp or text", other)),
        }
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}
