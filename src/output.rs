//! Console previews and CSV write-out.

use std::fs::{self, File};
use std::path::Path;

use datafusion::arrow::csv::WriterBuilder;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::arrow::util::pretty::pretty_format_batches;
use datafusion::prelude::*;

use crate::error::{EtlError, Result};

/// Same layout the raw TLC files use, so written tables load back as-is.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Prints the first `rows` rows of `batch` under a title.
pub async fn print_batch(
    ctx: &SessionContext,
    title: &str,
    batch: RecordBatch,
    rows: usize,
) -> Result<()> {
    let df = ctx.read_batch(batch)?.limit(0, Some(rows))?;
    print_df(title, df).await
}

async fn print_df(title: &str, df: DataFrame) -> Result<()> {
    let batches = df.collect().await?;
    let formatted = pretty_format_batches(&batches)?;
    println!("\n--- {} ---", title);
    println!("{}", formatted);
    Ok(())
}

/// Writes `batch` with a header row and no index column.
pub fn write_csv(path: &Path, batch: &RecordBatch) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| EtlError::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| EtlError::io(path, e))?;
    let mut writer = WriterBuilder::new()
        .with_header(true)
        .with_timestamp_format(TIMESTAMP_FORMAT.to_string())
        .build(file);
    writer.write(batch)?;
    log::info!("Wrote {} rows to {}", batch.num_rows(), path.display());
    Ok(())
}
