use std::time::Duration;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

use crate::districts::{SenateSource, TargetRegion};
use crate::retry::RetryPolicy;

const DEFAULT_GEOCODE_API_BASE: &str = "https://atlas.microsoft.com";
const DEFAULT_DISTRICT_API_BASE: &str = "https://geocoding.geo.census.gov";
pub(crate) const DEFAULT_CHECKPOINT_EVERY: usize = 1000;
pub(crate) const DEFAULT_PROGRESS_EVERY: usize = 50;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub geocode_api_key: Option<SecretString>,
    pub geocode_api_base: String,
    pub geocode_api_version: String,
    pub geocode_country_set: String,
    pub geocode_max_retries: u32,
    pub geocode_retry_base_ms: u64,
    pub geocode_retry_step_ms: u64,
    pub geocode_throttle_ms: u64,
    pub http_timeout_secs: u64,
    pub district_api_base: String,
    pub district_benchmark: String,
    pub district_vintage: String,
    pub target_country: String,
    pub target_state: String,
    pub target_state_code: String,
    pub senate_source: SenateSource,
    pub checkpoint_every: usize,
    pub progress_every: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub has_geocode_api_key: bool,
    pub geocode_api_base: String,
    pub geocode_api_version: String,
    pub geocode_country_set: String,
    pub geocode_max_retries: u32,
    pub geocode_retry_base_ms: u64,
    pub geocode_retry_step_ms: u64,
    pub geocode_throttle_ms: u64,
    pub http_timeout_secs: u64,
    pub district_api_base: String,
    pub district_benchmark: String,
    pub district_vintage: String,
    pub target_country: String,
    pub target_state: String,
    pub target_state_code: String,
    pub senate_source: SenateSource,
    pub checkpoint_every: usize,
    pub progress_every: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self::from_source(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup; `from_env` is a
    /// thin wrapper over this so tests can avoid mutating the process environment.
    pub fn from_source<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            geocode_api_key: lookup("GEOCODE_API_KEY")
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from),
            geocode_api_base: text("GEOCODE_API_BASE", DEFAULT_GEOCODE_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            geocode_api_version: text("GEOCODE_API_VERSION", "1.0"),
            geocode_country_set: text("GEOCODE_COUNTRY_SET", "US"),
            geocode_max_retries: parse_num(&lookup, "GEOCODE_MAX_RETRIES", 2),
            geocode_retry_base_ms: parse_num(&lookup, "GEOCODE_RETRY_BASE_MS", 1_000),
            geocode_retry_step_ms: parse_num(&lookup, "GEOCODE_RETRY_STEP_MS", 1_000),
            geocode_throttle_ms: parse_num(&lookup, "GEOCODE_THROTTLE_MS", 100),
            http_timeout_secs: parse_num(&lookup, "HTTP_TIMEOUT_SECS", 10_u64).max(1),
            district_api_base: text("DISTRICT_API_BASE", DEFAULT_DISTRICT_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            district_benchmark: text("DISTRICT_BENCHMARK", "Public_AR_Current"),
            district_vintage: text("DISTRICT_VINTAGE", "Current_Current"),
            target_country: text("TARGET_COUNTRY", "US"),
            target_state: text("TARGET_STATE", "MN"),
            target_state_code: text("TARGET_STATE_CODE", "27"),
            senate_source: lookup("SENATE_DISTRICT_SOURCE")
                .and_then(|v| SenateSource::parse(&v))
                .unwrap_or_default(),
            checkpoint_every: parse_num(&lookup, "CHECKPOINT_EVERY", DEFAULT_CHECKPOINT_EVERY),
            progress_every: parse_num(&lookup, "PROGRESS_EVERY", DEFAULT_PROGRESS_EVERY).max(1),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.geocode_max_retries,
            Duration::from_millis(self.geocode_retry_base_ms),
            Duration::from_millis(self.geocode_retry_step_ms),
        )
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.geocode_throttle_ms)
    }

    pub fn target_region(&self) -> TargetRegion {
        TargetRegion::new(
            &self.target_country,
            &self.target_state,
            &self.target_state_code,
        )
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            has_geocode_api_key: self.geocode_api_key.is_some(),
            geocode_api_base: self.geocode_api_base.clone(),
            geocode_api_version: self.geocode_api_version.clone(),
            geocode_country_set: self.geocode_country_set.clone(),
            geocode_max_retries: self.geocode_max_retries,
            geocode_retry_base_ms: self.geocode_retry_base_ms,
            geocode_retry_step_ms: self.geocode_retry_step_ms,
            geocode_throttle_ms: self.geocode_throttle_ms,
            http_timeout_secs: self.http_timeout_secs,
            district_api_base: self.district_api_base.clone(),
            district_benchmark: self.district_benchmark.clone(),
            district_vintage: self.district_vintage.clone(),
            target_country: self.target_country.clone(),
            target_state: self.target_state.clone(),
            target_state_code: self.target_state_code.clone(),
            senate_source: self.senate_source,
            checkpoint_every: self.checkpoint_every,
            progress_every: self.progress_every,
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions)
        || env::var("ALLOW_DOTENV")
            .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
            .unwrap_or(false)
}

fn parse_num<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
