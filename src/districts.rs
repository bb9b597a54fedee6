use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::model::{Districts, ProviderMatch};

const COORDINATES_PATH: &str = "/geocoder/geographies/coordinates";
const LOWER_LAYER: &[&str] = &["legislative", "lower"];
const UPPER_LAYER: &[&str] = &["legislative", "upper"];
const STATES_LAYER: &[&str] = &["states"];

/// Senate value for a point confirmed to lie outside the target state.
/// Distinct from `None`, which means no data.
pub const OUTSIDE_TARGET_REGION: &str = "OUTSIDE_TARGET_REGION";

/// Where the senate district comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SenateSource {
    /// Digits of the house district ("12A" -> "12").
    #[default]
    DeriveFromHouse,
    /// The upper-chamber layer of the boundary response.
    UpperLayer,
}

impl SenateSource {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "house" | "derive" | "derive_from_house" => Some(SenateSource::DeriveFromHouse),
            "upper" | "upper_layer" => Some(SenateSource::UpperLayer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRegion {
    pub country: String,
    pub state: String,
    pub state_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionGate {
    /// Not in the target country: no district data, no lookup.
    Skip,
    /// Target country but another state: sentinel senate value, no lookup.
    OtherState,
    Lookup,
}

impl TargetRegion {
    pub fn new(country: &str, state: &str, state_code: &str) -> Self {
        Self {
            country: country.trim().to_string(),
            state: state.trim().to_string(),
            state_code: state_code.trim().to_string(),
        }
    }

    pub fn gate(&self, found: &ProviderMatch) -> RegionGate {
        let same = |value: &Option<String>, expected: &str| {
            value
                .as_deref()
                .map(|v| v.trim().eq_ignore_ascii_case(expected))
                .unwrap_or(false)
        };

        if !found.latitude.is_finite() || !found.longitude.is_finite() {
            return RegionGate::Skip;
        }
        if !same(&found.country, &self.country) {
            return RegionGate::Skip;
        }
        if !same(&found.state, &self.state) {
            return RegionGate::OtherState;
        }
        RegionGate::Lookup
    }

    pub fn outside_districts() -> Districts {
        Districts {
            senate: Some(OUTSIDE_TARGET_REGION.to_string()),
            house: None,
        }
    }
}

/// Legislative districts for a coordinate. Never fails: any problem yields
/// `Districts::default()`.
#[async_trait]
pub trait DistrictLookup: Send + Sync {
    async fn resolve_districts(&self, lat: f64, lng: f64) -> Districts;
}

pub struct BoundaryClient {
    http: reqwest::Client,
    endpoint: String,
    benchmark: String,
    vintage: String,
    region: TargetRegion,
    senate_source: SenateSource,
}

impl BoundaryClient {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .user_agent(concat!("geobatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!(
                "{}{}",
                config.district_api_base.trim_end_matches('/'),
                COORDINATES_PATH
            ),
            benchmark: config.district_benchmark.clone(),
            vintage: config.district_vintage.clone(),
            region: config.target_region(),
            senate_source: config.senate_source,
        })
    }

    async fn fetch(&self, lat: f64, lng: f64) -> AppResult<Districts> {
        let url = Url::parse_with_params(
            &self.endpoint,
            &[
                ("x", lng.to_string()),
                ("y", lat.to_string()),
                ("benchmark", self.benchmark.clone()),
                ("vintage", self.vintage.clone()),
                ("layers", "all".to_string()),
                ("format", "json".to_string()),
            ],
        )
        .map_err(|err| AppError::Config(format!("invalid boundary endpoint: {err}")))?;

        let body: Value = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        extract_districts(&body, &self.region, self.senate_source)
    }
}

#[async_trait]
impl DistrictLookup for BoundaryClient {
    async fn resolve_districts(&self, lat: f64, lng: f64) -> Districts {
        match self.fetch(lat, lng).await {
            Ok(districts) => {
                debug!(lat, lng, ?districts, "resolved legislative districts");
                districts
            }
            Err(err) => {
                warn!(?err, lat, lng, "boundary lookup failed");
                Districts::default()
            }
        }
    }
}

/// Finds the geography layer whose key contains every needle,
/// case-insensitively. Keys carry the vintage year, e.g.
/// "2024 State Legislative Districts - Lower".
pub fn find_layer<'a>(geographies: &'a Map<String, Value>, needles: &[&str]) -> Option<&'a [Value]> {
    geographies
        .iter()
        .find(|(key, _)| {
            let key = key.to_ascii_lowercase();
            needles.iter().all(|needle| key.contains(needle))
        })
        .and_then(|(_, layer)| layer.as_array())
        .map(|features| features.as_slice())
}

fn feature_field(features: Option<&[Value]>, field: &str) -> Option<String> {
    features?
        .first()?
        .get(field)?
        .as_str()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn senate_from_house(house: &str) -> Option<String> {
    let digits: String = house.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

pub fn extract_districts(
    body: &Value,
    region: &TargetRegion,
    senate_source: SenateSource,
) -> AppResult<Districts> {
    let geographies = body
        .pointer("/result/geographies")
        .and_then(Value::as_object)
        .ok_or_else(|| AppError::Parse("boundary response missing result.geographies".into()))?;

    let lower = find_layer(geographies, LOWER_LAYER);
    let house = feature_field(lower, "BASENAME");
    let state_code = feature_field(lower, "STATE")
        .or_else(|| feature_field(find_layer(geographies, STATES_LAYER), "STATE"));

    let senate = match senate_source {
        SenateSource::DeriveFromHouse => house.as_deref().and_then(senate_from_house),
        SenateSource::UpperLayer => {
            feature_field(find_layer(geographies, UPPER_LAYER), "BASENAME")
        }
    };

    let outside = state_code
        .as_deref()
        .map(|code| code != region.state_code)
        .unwrap_or(false);
    Ok(Districts {
        senate: if outside {
            Some(OUTSIDE_TARGET_REGION.to_string())
        } else {
            senate
        },
        house,
    })
}
