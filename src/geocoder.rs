use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::model::ProviderMatch;
use crate::retry::{RetryPolicy, Sleeper};

const SEARCH_PATH: &str = "/search/address/json";

/// Resolves one free-text address to its best provider match.
///
/// `Ok(None)` covers every expected failure (no match, rejected request,
/// exhausted retries, malformed body). `Err` is reserved for local faults.
#[async_trait]
pub trait AddressLookup: Send + Sync {
    async fn geocode(&self, address: &str) -> AppResult<Option<ProviderMatch>>;
}

pub struct GeocodingClient {
    http: reqwest::Client,
    endpoint: String,
    api_version: String,
    api_key: Option<SecretString>,
    country_set: String,
    retry: RetryPolicy,
    throttle: Duration,
    sleeper: Arc<dyn Sleeper>,
}

enum Attempt {
    Found(ProviderMatch),
    NoMatch,
    Rejected(StatusCode),
    Retryable(String),
}

impl GeocodingClient {
    pub fn new(config: &AppConfig, sleeper: Arc<dyn Sleeper>) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .user_agent(concat!("geobatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        if config.geocode_api_key.is_none() {
            warn!("GEOCODE_API_KEY is not set; geocoding requests will be rejected");
        }

        Ok(Self {
            http,
            endpoint: format!(
                "{}{}",
                config.geocode_api_base.trim_end_matches('/'),
                SEARCH_PATH
            ),
            api_version: config.geocode_api_version.clone(),
            api_key: config.geocode_api_key.clone(),
            country_set: config.geocode_country_set.clone(),
            retry: config.retry_policy(),
            throttle: config.throttle(),
            sleeper,
        })
    }

    fn request_url(&self, address: &str) -> AppResult<Url> {
        let key = self
            .api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .unwrap_or_default();
        Url::parse_with_params(
            &self.endpoint,
            &[
                ("api-version", self.api_version.as_str()),
                ("subscription-key", key),
                ("query", address),
                ("countrySet", self.country_set.as_str()),
            ],
        )
        .map_err(|err| AppError::Config(format!("invalid geocoding endpoint: {err}")))
    }

    async fn attempt(&self, url: Url) -> Attempt {
        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(err) => return Attempt::Retryable(describe_transport_error(&err)),
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Attempt::Retryable(format!("provider responded {status}"));
        }
        if !status.is_success() {
            return Attempt::Rejected(status);
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => return Attempt::Retryable(describe_transport_error(&err)),
        };
        match parse_search_response(&body) {
            Ok(Some(found)) => Attempt::Found(found),
            Ok(None) => Attempt::NoMatch,
            Err(err) => {
                warn!(?err, "geocoding response could not be decoded");
                Attempt::NoMatch
            }
        }
    }
}

#[async_trait]
impl AddressLookup for GeocodingClient {
    async fn geocode(&self, address: &str) -> AppResult<Option<ProviderMatch>> {
        let url = self.request_url(address)?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(url.clone()).await {
                Attempt::Found(found) => {
                    trace!(address, lat = found.latitude, lng = found.longitude, "geocoded");
                    self.sleeper.sleep(self.throttle).await;
                    return Ok(Some(found));
                }
                Attempt::NoMatch => {
                    debug!(address, "provider returned no match");
                    self.sleeper.sleep(self.throttle).await;
                    return Ok(None);
                }
                Attempt::Rejected(status) => {
                    warn!(address, %status, "geocoding request rejected");
                    return Ok(None);
                }
                Attempt::Retryable(reason) if self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        address,
                        attempt,
                        reason = reason.as_str(),
                        "geocoding request failed; retrying after {:?}",
                        delay
                    );
                    self.sleeper.sleep(delay).await;
                }
                Attempt::Retryable(reason) => {
                    warn!(
                        address,
                        attempts = attempt,
                        reason = reason.as_str(),
                        "geocoding retries exhausted"
                    );
                    return Ok(None);
                }
            }
        }
    }
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Deserialize)]
struct SearchResult {
    score: Option<f64>,
    position: Option<SearchPosition>,
    #[serde(default)]
    address: SearchAddress,
}

#[derive(Deserialize)]
struct SearchPosition {
    lat: f64,
    lon: f64,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct SearchAddress {
    freeform_address: Option<String>,
    country_subdivision: Option<String>,
    country_secondary_subdivision: Option<String>,
    municipality: Option<String>,
    postal_code: Option<String>,
    country_code: Option<String>,
    country: Option<String>,
}

fn parse_search_response(body: &str) -> AppResult<Option<ProviderMatch>> {
    let parsed: SearchResponse = serde_json::from_str(body)?;
    let Some(first) = parsed.results.into_iter().next() else {
        return Ok(None);
    };
    let Some(position) = first.position else {
        return Err(AppError::Parse("search result missing position".into()));
    };

    let address = first.address;
    Ok(Some(ProviderMatch {
        formatted_address: address.freeform_address,
        latitude: position.lat,
        longitude: position.lon,
        country: address.country_code.or(address.country),
        state: address.country_subdivision,
        county: address.country_secondary_subdivision,
        city: address.municipality,
        postal_code: address.postal_code,
        confidence: first.score,
    }))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::net::TcpListener;

    use httptest::matchers::{all_of, contains, request, url_decoded};
    use httptest::responders::{json_encoded, status_code};
    use httptest::{Expectation, Server};
    use serde_json::json;

    use super::*;
    use crate::retry::testing::RecordingSleeper;

    fn client_for(base: &str, sleeper: &RecordingSleeper) -> GeocodingClient {
        let values: HashMap<&str, String> = HashMap::from([
            ("GEOCODE_API_KEY", "test-key".to_string()),
            ("GEOCODE_API_BASE", base.to_string()),
            ("GEOCODE_MAX_RETRIES", "2".to_string()),
            ("GEOCODE_RETRY_BASE_MS", "100".to_string()),
            ("GEOCODE_RETRY_STEP_MS", "50".to_string()),
            ("GEOCODE_THROTTLE_MS", "10".to_string()),
            ("HTTP_TIMEOUT_SECS", "2".to_string()),
        ]);
        let config = AppConfig::from_source(|key| values.get(key).cloned());
        GeocodingClient::new(&config, Arc::new(sleeper.clone())).unwrap()
    }

    fn minneapolis_payload() -> serde_json::Value {
        json!({
            "summary": { "numResults": 1 },
            "results": [{
                "type": "Point Address",
                "score": 9.87,
                "address": {
                    "freeformAddress": "123 Main St, Springfield, MN 55101",
                    "countrySubdivision": "MN",
                    "countrySecondarySubdivision": "Ramsey",
                    "municipality": "Springfield",
                    "postalCode": "55101",
                    "countryCode": "US",
                    "country": "United States"
                },
                "position": { "lat": 44.9, "lon": -93.1 }
            }]
        })
    }

    #[tokio::test]
    async fn returns_first_match_and_throttles() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/search/address/json"),
                request::query(url_decoded(contains(("query", "123 Main St Apt 4B")))),
                request::query(url_decoded(contains(("countrySet", "US")))),
                request::query(url_decoded(contains(("subscription-key", "test-key")))),
                request::query(url_decoded(contains(("api-version", "1.0")))),
            ])
            .respond_with(json_encoded(minneapolis_payload())),
        );

        let sleeper = RecordingSleeper::default();
        let client = client_for(&server.url("/").to_string(), &sleeper);
        let found = client
            .geocode("123 Main St Apt 4B")
            .await
            .unwrap()
            .expect("match");

        assert_eq!(found.latitude, 44.9);
        assert_eq!(found.longitude, -93.1);
        assert_eq!(found.country.as_deref(), Some("US"));
        assert_eq!(found.state.as_deref(), Some("MN"));
        assert_eq!(found.county.as_deref(), Some("Ramsey"));
        assert_eq!(found.confidence, Some(9.87));
        assert_eq!(sleeper.calls(), vec![Duration::from_millis(10)]);
    }

    #[tokio::test]
    async fn empty_results_are_a_miss_without_retry() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/search/address/json"))
                .times(1)
                .respond_with(json_encoded(json!({ "results": [] }))),
        );

        let sleeper = RecordingSleeper::default();
        let client = client_for(&server.url("/").to_string(), &sleeper);
        assert!(client.geocode("nowhere").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn gives_up_after_configured_attempts_on_503() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/search/address/json"))
                .times(3)
                .respond_with(status_code(503)),
        );

        let sleeper = RecordingSleeper::default();
        let client = client_for(&server.url("/").to_string(), &sleeper);
        let result = client.geocode("1 Busy Rd").await.unwrap();

        assert!(result.is_none());
        assert_eq!(
            sleeper.calls(),
            vec![Duration::from_millis(150), Duration::from_millis(200)]
        );
    }

    #[tokio::test]
    async fn retries_rate_limits_until_success() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/search/address/json"))
                .times(2)
                .respond_with(httptest::cycle![
                    status_code(429),
                    json_encoded(minneapolis_payload()),
                ]),
        );

        let sleeper = RecordingSleeper::default();
        let client = client_for(&server.url("/").to_string(), &sleeper);
        let found = client.geocode("123 Main St").await.unwrap();

        assert!(found.is_some());
        assert_eq!(
            sleeper.calls(),
            vec![Duration::from_millis(150), Duration::from_millis(10)]
        );
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/search/address/json"))
                .times(1)
                .respond_with(status_code(401)),
        );

        let sleeper = RecordingSleeper::default();
        let client = client_for(&server.url("/").to_string(), &sleeper);
        assert!(client.geocode("1 Main St").await.unwrap().is_none());
        assert!(sleeper.calls().is_empty());
    }

    #[tokio::test]
    async fn malformed_body_degrades_to_miss() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/search/address/json"))
                .times(1)
                .respond_with(status_code(200).body("<html>oops</html>")),
        );

        let sleeper = RecordingSleeper::default();
        let client = client_for(&server.url("/").to_string(), &sleeper);
        assert!(client.geocode("1 Main St").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn connection_failures_are_retried_then_dropped() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        let sleeper = RecordingSleeper::default();
        let client = client_for(&format!("http://{addr}"), &sleeper);
        let result = client.geocode("1 Offline Way").await.unwrap();

        assert!(result.is_none());
        assert_eq!(sleeper.calls().len(), 2);
    }

    #[test]
    fn result_without_position_is_a_parse_error() {
        let body = r#"{"results":[{"score":1.0,"address":{"countryCode":"US"}}]}"#;
        assert!(matches!(
            parse_search_response(body),
            Err(AppError::Parse(_))
        ));
    }

    #[test]
    fn falls_back_to_country_name() {
        let body = r#"{"results":[{"position":{"lat":1.0,"lon":2.0},"address":{"country":"Canada"}}]}"#;
        let found = parse_search_response(body).unwrap().unwrap();
        assert_eq!(found.country.as_deref(), Some("Canada"));
        assert!(found.confidence.is_none());
    }
}
