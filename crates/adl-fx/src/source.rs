//! Live market-rate sources.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Why a live fetch did not produce a rate table. None of these are fatal to
/// the caller; the service degrades to cached or fallback rates.
#[derive(Debug, Error)]
pub enum FxFetchError {
    #[error("fx transport error: {0}")]
    Transport(String),
    #[error("fx fetch timed out after {0:?}")]
    Timeout(Duration),
    #[error("fx http status {0}")]
    Status(u16),
    #[error("fx response decode failed: {0}")]
    Decode(String),
    #[error("fx source reported an error: {0}")]
    Api(String),
    #[error("fx source returned no usable rates")]
    Empty,
}

/// Units of each currency per 1 normalized unit.
pub type RateTable = HashMap<String, f64>;

#[async_trait::async_trait]
pub trait RateSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_rates(&self) -> Result<RateTable, FxFetchError>;
}

/// JSON rate endpoint in the `open.er-api.com` shape:
/// `{"result":"success","base_code":"USD","rates":{"EUR":0.92,...}}`.
#[derive(Debug, Clone)]
pub struct HttpRateSource {
    http: reqwest::Client,
    url: String,
}

impl HttpRateSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FxFetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FxFetchError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RatesResponse {
    result: Option<String>,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
    #[serde(default)]
    rates: HashMap<String, f64>,
}

#[async_trait::async_trait]
impl RateSource for HttpRateSource {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch_rates(&self) -> Result<RateTable, FxFetchError> {
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FxFetchError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FxFetchError::Status(status.as_u16()));
        }

        let body: RatesResponse = resp
            .json()
            .await
            .map_err(|e| FxFetchError::Decode(e.to_string()))?;

        if let Some(result) = body.result.as_deref() {
            if result != "success" {
                return Err(FxFetchError::Api(
                    body.error_type.unwrap_or_else(|| result.to_string()),
                ));
            }
        }

        let rates = sanitize_rates(body.rates);
        if rates.is_empty() {
            return Err(FxFetchError::Empty);
        }
        Ok(rates)
    }
}

/// Upper-case keys and drop non-positive or non-finite rates.
pub fn sanitize_rates(raw: HashMap<String, f64>) -> RateTable {
    raw.into_iter()
        .filter(|(_, r)| r.is_finite() && *r > 0.0)
        .map(|(k, r)| (k.trim().to_ascii_uppercase(), r))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn parses_success_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/latest/USD");
                then.status(200).json_body(json!({
                    "result": "success",
                    "base_code": "USD",
                    "rates": {"USD": 1.0, "EUR": 0.92, "nok": 10.6, "BAD": -1.0}
                }));
            })
            .await;

        let src = HttpRateSource::new(server.url("/latest/USD"), Duration::from_secs(2)).unwrap();
        let rates = src.fetch_rates().await.unwrap();
        assert_eq!(rates.get("EUR"), Some(&0.92));
        assert_eq!(rates.get("NOK"), Some(&10.6));
        assert!(!rates.contains_key("BAD"));
    }

    #[tokio::test]
    async fn non_2xx_is_a_status_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/latest/USD");
                then.status(503);
            })
            .await;

        let src = HttpRateSource::new(server.url("/latest/USD"), Duration::from_secs(2)).unwrap();
        let err = src.fetch_rates().await.unwrap_err();
        assert!(matches!(err, FxFetchError::Status(503)), "got {err:?}");
    }

    #[tokio::test]
    async fn api_error_result_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/latest/USD");
                then.status(200)
                    .json_body(json!({"result": "error", "error-type": "quota-reached"}));
            })
            .await;

        let src = HttpRateSource::new(server.url("/latest/USD"), Duration::from_secs(2)).unwrap();
        match src.fetch_rates().await {
            Err(FxFetchError::Api(msg)) => assert_eq!(msg, "quota-reached"),
            other => panic!("expected api error, got {other:?}"),
        }
    }
}
