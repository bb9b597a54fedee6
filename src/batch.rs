use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::ResultCache;
use crate::config::{AppConfig, DEFAULT_CHECKPOINT_EVERY, DEFAULT_PROGRESS_EVERY};
use crate::districts::{DistrictLookup, RegionGate, TargetRegion};
use crate::errors::AppResult;
use crate::geocoder::AddressLookup;
use crate::model::{AddressRecord, Districts, GeocodeResult};
use crate::normalize::{is_blank, normalize};

/// Receives every result produced so far at each checkpoint interval.
pub trait CheckpointSink {
    fn write_checkpoint(&mut self, processed: usize, results: &[GeocodeResult]) -> AppResult<()>;
}

/// Sink for runs that skip checkpointing.
#[derive(Debug, Default)]
pub struct NoCheckpoints;

impl CheckpointSink for NoCheckpoints {
    fn write_checkpoint(&mut self, _processed: usize, _results: &[GeocodeResult]) -> AppResult<()> {
        Ok(())
    }
}

/// How a single row was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    CacheHit,
    Blank,
    Matched,
    Unmatched,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub total_rows: usize,
    pub cache_hits: usize,
    pub provider_calls: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub failed: usize,
    pub blank: usize,
    pub district_lookups: usize,
    pub checkpoints_written: usize,
}

impl BatchStats {
    fn with_total(total_rows: usize) -> Self {
        Self {
            total_rows,
            ..Self::default()
        }
    }

    fn record(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::CacheHit => self.cache_hits += 1,
            RowOutcome::Blank => self.blank += 1,
            RowOutcome::Matched => self.matched += 1,
            RowOutcome::Unmatched => self.unmatched += 1,
            RowOutcome::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub results: Vec<GeocodeResult>,
    pub stats: BatchStats,
}

/// Resolves an address list one row at a time.
///
/// Every input row yields exactly one `GeocodeResult`, in input order. Row
/// level failures become empty rows; nothing aborts the batch.
pub struct BatchDriver {
    geocoder: Arc<dyn AddressLookup>,
    districts: Arc<dyn DistrictLookup>,
    region: TargetRegion,
    cache: ResultCache,
    checkpoint_every: usize,
    progress_every: usize,
    stats: BatchStats,
}

impl BatchDriver {
    pub fn new(
        geocoder: Arc<dyn AddressLookup>,
        districts: Arc<dyn DistrictLookup>,
        region: TargetRegion,
    ) -> Self {
        Self {
            geocoder,
            districts,
            region,
            cache: ResultCache::new(),
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
            progress_every: DEFAULT_PROGRESS_EVERY,
            stats: BatchStats::default(),
        }
    }

    pub fn from_config(
        config: &AppConfig,
        geocoder: Arc<dyn AddressLookup>,
        districts: Arc<dyn DistrictLookup>,
    ) -> Self {
        Self::new(geocoder, districts, config.target_region())
            .with_checkpoint_every(config.checkpoint_every)
            .with_progress_every(config.progress_every)
    }

    /// `0` disables checkpoints.
    pub fn with_checkpoint_every(mut self, rows: usize) -> Self {
        self.checkpoint_every = rows;
        self
    }

    pub fn with_progress_every(mut self, rows: usize) -> Self {
        self.progress_every = rows.max(1);
        self
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub async fn run(
        &mut self,
        records: &[AddressRecord],
        sink: &mut dyn CheckpointSink,
    ) -> BatchOutcome {
        let total = records.len();
        self.stats = BatchStats::with_total(total);
        let mut results = Vec::with_capacity(total);

        for record in records {
            let (result, outcome) = self.resolve(record).await;
            self.stats.record(outcome);
            results.push(result);

            let processed = results.len();
            if processed % self.progress_every == 0 {
                info!(
                    processed,
                    total,
                    address = record.input_string(),
                    "geocoding progress"
                );
            }
            if self.checkpoint_every > 0
                && processed % self.checkpoint_every == 0
                && processed < total
            {
                match sink.write_checkpoint(processed, &results) {
                    Ok(()) => self.stats.checkpoints_written += 1,
                    Err(err) => warn!(?err, processed, "checkpoint write failed; continuing"),
                }
            }
        }

        info!(
            total,
            matched = self.stats.matched,
            unmatched = self.stats.unmatched,
            failed = self.stats.failed,
            cache_hits = self.stats.cache_hits,
            provider_calls = self.stats.provider_calls,
            "batch finished"
        );
        BatchOutcome {
            results,
            stats: self.stats.clone(),
        }
    }

    /// Resolves one row, consulting the cache before any network call.
    pub async fn resolve(&mut self, record: &AddressRecord) -> (GeocodeResult, RowOutcome) {
        let key = normalize(record.raw.as_deref());
        if let Some(hit) = self.cache.get(&key) {
            debug!(row = record.row, key = key.as_str(), "cache hit");
            return (hit.clone(), RowOutcome::CacheHit);
        }

        let input = record.input_string();
        if is_blank(&key) {
            let empty = GeocodeResult::empty(input);
            self.cache.put(key, empty.clone());
            return (empty, RowOutcome::Blank);
        }

        match self.lookup(input).await {
            Ok((result, outcome)) => {
                self.cache.put(key, result.clone());
                (result, outcome)
            }
            // Not cached: a later duplicate gets another attempt.
            Err(err) => {
                warn!(?err, row = record.row, address = input, "row failed; emitting empty result");
                (GeocodeResult::empty(input), RowOutcome::Failed)
            }
        }
    }

    async fn lookup(&mut self, input: &str) -> AppResult<(GeocodeResult, RowOutcome)> {
        self.stats.provider_calls += 1;
        let Some(found) = self.geocoder.geocode(input).await? else {
            return Ok((GeocodeResult::empty(input), RowOutcome::Unmatched));
        };

        let districts = match self.region.gate(&found) {
            RegionGate::Skip => Districts::default(),
            RegionGate::OtherState => TargetRegion::outside_districts(),
            RegionGate::Lookup => {
                self.stats.district_lookups += 1;
                self.districts
                    .resolve_districts(found.latitude, found.longitude)
                    .await
            }
        };
        Ok((
            GeocodeResult::from_match(input, found, districts),
            RowOutcome::Matched,
        ))
    }
}
