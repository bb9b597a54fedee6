pub mod batch;
pub mod cache;
pub mod cli;
pub mod config;
pub mod districts;
pub mod errors;
pub mod geocoder;
pub mod model;
pub mod normalize;
pub mod retry;
pub mod table;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use crate::batch::{BatchDriver, BatchOutcome, BatchStats, CheckpointSink, NoCheckpoints};
pub use crate::cache::ResultCache;
pub use crate::cli::CliArgs;
pub use crate::config::{AppConfig, PublicAppConfig};
pub use crate::districts::{BoundaryClient, DistrictLookup, SenateSource, TargetRegion};
pub use crate::errors::{AppError, AppResult};
pub use crate::geocoder::{AddressLookup, GeocodingClient};
pub use crate::model::{AddressRecord, Districts, GeocodeResult, ProviderMatch};
pub use crate::normalize::normalize;
pub use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use crate::table::{Table, TableCheckpoints};

/// One input file to geocode.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub columns: Vec<String>,
    pub delimiter: u8,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub output: PathBuf,
    pub checkpoints: Vec<PathBuf>,
    pub stats: BatchStats,
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,geobatch=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}

/// Entry point used by the binary: environment config, CLI overrides, run.
pub async fn run(args: CliArgs) -> AppResult<RunSummary> {
    init_tracing();
    let mut config = AppConfig::from_env();
    args.apply_to(&mut config)?;
    let job = args.job()?;
    geocode_file(&config, &job).await
}

pub async fn geocode_file(config: &AppConfig, job: &BatchJob) -> AppResult<RunSummary> {
    info!(config = ?config.public_profile(), "starting geocoding batch");

    let table = Table::read(&job.input, job.delimiter)?;
    let records = table.address_records(&job.columns)?;
    ensure_output_dir(&job.output)?;

    let geocoder = Arc::new(GeocodingClient::new(config, Arc::new(TokioSleeper))?);
    let districts = Arc::new(BoundaryClient::new(config)?);
    let mut driver = BatchDriver::from_config(config, geocoder, districts);

    let mut checkpoints = TableCheckpoints::new(&table, &job.output);
    let outcome = driver.run(&records, &mut checkpoints).await;
    let output = table.write_merged(&outcome.results, &job.output)?;
    info!(
        path = %output.display(),
        rows = outcome.results.len(),
        "wrote geocoded table"
    );

    Ok(RunSummary {
        output,
        checkpoints: checkpoints.written().to_vec(),
        stats: outcome.stats,
    })
}

fn ensure_output_dir(output: &Path) -> AppResult<()> {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(AppError::Input(format!(
                "output directory does not exist: {}",
                parent.display()
            )))
        }
        _ => Ok(()),
    }
}
