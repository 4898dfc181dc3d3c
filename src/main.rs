use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use trip_star::coded::{CodeLabels, UnmappedCodePolicy};
use trip_star::fact::JoinPolicy;
use trip_star::loader::Source;
use trip_star::sampler::{self, SampleConfig, REQUIRED_COLUMNS};
use trip_star::star::{self, TransformConfig, TripSchema, DEFAULT_URL};

#[derive(Parser, Debug)]
#[command(
    name = "trip_star",
    about = "Reshape ride-hailing trip records into a star schema, or down-sample a trip CSV"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build dimension tables and the fact table, then print a preview
    Transform(TransformArgs),
    /// Drop incomplete rows and write a seeded random sample
    Sample(SampleArgs),
}

#[derive(Args, Debug)]
struct TransformArgs {
    /// URL or local path of the raw trip CSV
    #[arg(long, default_value = DEFAULT_URL)]
    source: Source,

    /// Raw locations are PULocationID/DOLocationID zones instead of coordinates
    #[arg(long)]
    zones: bool,

    /// What to do with a rate code or payment type that has no label
    #[arg(long, value_enum, default_value_t = UnmappedCodePolicy::Null)]
    unmapped_codes: UnmappedCodePolicy,

    /// How raw rows without a dimension row are handled
    #[arg(long, value_enum, default_value_t = JoinPolicy::Strict)]
    join: JoinPolicy,

    /// Check that every fact key leads back to the raw values
    #[arg(long)]
    verify: bool,

    /// Number of fact rows to print
    #[arg(long, default_value_t = 5)]
    preview_rows: usize,

    /// Also write every table as CSV into this directory
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SampleArgs {
    /// Large trip CSV to sample from
    #[arg(long, default_value = "tripdata_july_2024.csv")]
    input: PathBuf,

    /// Where the sample is written
    #[arg(long, default_value = "modified_file.csv")]
    output: PathBuf,

    /// Number of rows to keep
    #[arg(long, default_value_t = 150_000)]
    sample_size: usize,

    /// RNG seed; the same seed over the same file gives the same sample
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Columns that must be non-empty (defaults to the 19 TLC trip columns)
    #[arg(long, value_delimiter = ',')]
    required: Vec<String>,
}

impl From<TransformArgs> for TransformConfig {
    fn from(args: TransformArgs) -> Self {
        TransformConfig {
            source: args.source,
            schema: if args.zones {
                TripSchema::zones()
            } else {
                TripSchema::default()
            },
            rate_codes: CodeLabels::rate_codes(),
            payment_types: CodeLabels::payment_types(),
            unmapped_codes: args.unmapped_codes,
            join: args.join,
            verify: args.verify,
            preview_rows: args.preview_rows,
            output_dir: args.output_dir,
        }
    }
}

impl From<SampleArgs> for SampleConfig {
    fn from(args: SampleArgs) -> Self {
        let required_columns = if args.required.is_empty() {
            REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect()
        } else {
            args.required
        };
        SampleConfig {
            input: args.input,
            output: args.output,
            required_columns,
            sample_size: args.sample_size,
            seed: args.seed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Transform(args) => {
            let config = TransformConfig::from(args);
            let star = star::run_transform(&config)
                .await
                .with_context(|| format!("transform of {} failed", config.source))?;
            log::info!(
                "Built {} dimensions and {} fact rows",
                star.dimensions().len(),
                star.fact.num_rows()
            );
        }
        Command::Sample(args) => {
            let config = SampleConfig::from(args);
            let summary = sampler::run_sample(&config)
                .await
                .with_context(|| format!("sampling of {} failed", config.input.display()))?;
            println!("Total rows in sampled data: {}", summary.sampled_rows);
        }
    }
    Ok(())
}
