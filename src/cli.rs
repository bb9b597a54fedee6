use std::path::PathBuf;

use clap::Parser;

use crate::config::AppConfig;
use crate::districts::SenateSource;
use crate::errors::{AppError, AppResult};
use crate::BatchJob;

/// CLI arguments for geobatch
#[derive(Debug, Parser)]
#[command(
    name = "geobatch",
    version,
    about = "Geocode the addresses in a CSV file and append coordinates and legislative districts"
)]
pub struct CliArgs {
    /// Input CSV file with a header row
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Where the augmented table is written; checkpoints land next to it
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Address column; repeat to combine several columns (e.g. -c Street -c City -c Zip)
    #[arg(short = 'c', long = "column", required = true)]
    pub columns: Vec<String>,

    /// Field delimiter of the input file
    #[arg(short = 'd', long = "delimiter", default_value_t = ',')]
    pub delimiter: char,

    /// Write a checkpoint every N rows (overrides CHECKPOINT_EVERY)
    #[arg(long = "checkpoint-every")]
    pub checkpoint_every: Option<usize>,

    /// Log progress every N rows (overrides PROGRESS_EVERY)
    #[arg(long = "progress-every")]
    pub progress_every: Option<usize>,

    /// Skip intermediate checkpoint files
    #[arg(long = "no-checkpoints")]
    pub no_checkpoints: bool,

    /// Two-letter state that gets district lookups (overrides TARGET_STATE)
    #[arg(long = "target-state")]
    pub target_state: Option<String>,

    /// FIPS code of the target state (overrides TARGET_STATE_CODE)
    #[arg(long = "target-state-code")]
    pub target_state_code: Option<String>,

    /// Senate district source: "house" (derive from house district) or "upper"
    #[arg(long = "senate-source")]
    pub senate_source: Option<String>,
}

impl CliArgs {
    pub fn apply_to(&self, config: &mut AppConfig) -> AppResult<()> {
        if let Some(rows) = self.checkpoint_every {
            config.checkpoint_every = rows;
        }
        if let Some(rows) = self.progress_every {
            config.progress_every = rows.max(1);
        }
        if let Some(state) = &self.target_state {
            config.target_state = state.trim().to_string();
        }
        if let Some(code) = &self.target_state_code {
            config.target_state_code = code.trim().to_string();
        }
        if let Some(source) = &self.senate_source {
            config.senate_source = SenateSource::parse(source)
                .ok_or_else(|| AppError::Config(format!("unknown senate source: {source}")))?;
        }
        if self.no_checkpoints {
            config.checkpoint_every = 0;
        }
        Ok(())
    }

    pub fn job(&self) -> AppResult<BatchJob> {
        if !self.delimiter.is_ascii() {
            return Err(AppError::Config(format!(
                "delimiter must be a single ASCII character, got {:?}",
                self.delimiter
            )));
        }
        Ok(BatchJob {
            input: self.input.clone(),
            output: self.output.clone(),
            columns: self.columns.clone(),
            delimiter: self.delimiter as u8,
        })
    }
}
