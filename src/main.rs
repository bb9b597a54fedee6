//! geobatch: batch geocoder for CSV address lists.
//!
//! Reads a delimited file, geocodes the selected address column(s), looks up
//! state legislative districts for addresses in the target state, and writes
//! the input table back out with result columns appended.
//!
//! Usage examples
//! --------------
//!
//! - Geocode a single address column
//!   $ geobatch -i data/members.csv -o data/members-geocoded.csv -c Address
//!
//! - Combine street, city and zip columns, checkpoint every 500 rows
//!   $ geobatch -i in.csv -o out.csv -c Street -c City -c Zip --checkpoint-every 500
//!
//! The provider key is read from `GEOCODE_API_KEY`; see `config.rs` for the
//! remaining environment variables.
use clap::Parser;
use geobatch::CliArgs;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let summary = geobatch::run(args).await?;

    let stats = &summary.stats;
    println!("Geocoded {} rows:", stats.total_rows);
    println!("  Matched: {}", stats.matched);
    println!("  Unmatched: {}", stats.unmatched);
    println!("  Failed: {}", stats.failed);
    println!("  Blank: {}", stats.blank);
    println!("  Cache hits: {}", stats.cache_hits);
    println!("  Checkpoints: {}", summary.checkpoints.len());
    println!("Output: {}", summary.output.display());
    Ok(())
}
