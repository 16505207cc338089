//! adl-providers
//!
//! Platform adapters. Each one turns a provider's wire format into
//! [`CanonicalRow`]s in the account's native currency. Nothing here writes to
//! a store; the sync runtime hands the rows to `adl-fx` and `adl-merge`.
//!
//! Adapters never convert currency, with one exception: the RevenueCat event
//! adapter receives a single purchase per call and normalizes it on the spot.

pub mod geo;
pub mod google;
pub mod meta;
pub mod revenuecat;
pub mod stripe;
pub mod tiktok;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use adl_schemas::{parse_decimal_micros, CanonicalRow, Micros, Platform, NORMALIZED_CURRENCY};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

pub use geo::{CountryMapping, BUILTIN_MAPPING_VERSION};
pub use google::GoogleAdsAdapter;
pub use meta::MetaAdsAdapter;
pub use revenuecat::{EventOutcome, RevenueCatEvent, RevenueCatEventAdapter, ALLOWED_EVENT_TYPES};
pub use stripe::StripeAdapter;
pub use tiktok::TikTokAdsAdapter;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network failure, including the client timeout elapsing.
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rate limited (retry_after={retry_after_secs:?})")]
    RateLimited { retry_after_secs: Option<u64> },
    /// Credentials rejected by the provider.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("provider api error status={status}: {message}")]
    Api { status: u16, message: String },
    #[error("decode error: {0}")]
    Decode(String),
    /// Adapter is missing something it needs before it can make a call.
    #[error("config error: {0}")]
    Config(String),
    #[error("invalid date range {start}..={end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    /// The provider still reported more pages when the page cap ran out.
    #[error("pagination did not terminate after {pages} pages")]
    PaginationLimit { pages: usize },
}

impl ProviderError {
    /// Whether retrying the same fetch later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport(_) | ProviderError::RateLimited { .. } => true,
            ProviderError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub(crate) fn transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Transport(format!("timed out: {e}"))
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Adapter contract
// ---------------------------------------------------------------------------

/// Secrets handed to an adapter for one fetch. `Debug` redacts.
#[derive(Clone)]
pub struct AdapterCredentials {
    /// OAuth access token, or the API secret for key-authenticated providers.
    pub access_token: String,
    /// Static provider key some APIs require alongside the token.
    pub developer_token: Option<String>,
}

impl AdapterCredentials {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            developer_token: None,
        }
    }
}

impl fmt::Debug for AdapterCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterCredentials")
            .field("access_token", &"<REDACTED>")
            .field(
                "developer_token",
                &self.developer_token.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

/// Why a provider record produced no row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Every metric was zero after parsing.
    ZeroEffect,
    UnsupportedEventType(String),
    NonPositiveAmount,
    /// The record is not a completed payment (e.g. a failed charge).
    NotSettled(String),
    /// Money without anything to book it against.
    MissingProduct,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ZeroEffect => f.write_str("zero_effect"),
            SkipReason::UnsupportedEventType(t) => write!(f, "unsupported_event_type:{t}"),
            SkipReason::NonPositiveAmount => f.write_str("non_positive_amount"),
            SkipReason::NotSettled(s) => write!(f, "not_settled:{s}"),
            SkipReason::MissingProduct => f.write_str("missing_product"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEvent {
    /// Provider-side identifier of the dropped record.
    pub reference: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Native currency of the account (ISO-4217, upper case).
    pub account_currency: String,
    pub rows: Vec<CanonicalRow>,
    pub skipped: Vec<SkippedEvent>,
}

/// Endpoint and timeout for one adapter instance.
#[derive(Debug, Clone)]
pub struct AdapterSettings {
    /// `None` uses the adapter's public API base.
    pub base_url: Option<String>,
    pub timeout: Duration,
    /// `None` uses the adapter's own page cap.
    pub max_pages: Option<usize>,
}

impl AdapterSettings {
    pub fn new(timeout: Duration) -> Self {
        Self {
            base_url: None,
            timeout,
            max_pages: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = Some(max_pages.max(1));
        self
    }

    pub(crate) fn pages_or(&self, default: usize) -> usize {
        self.max_pages.unwrap_or(default)
    }

    pub(crate) fn base_or(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }

    pub(crate) fn client(&self) -> Result<reqwest::Client, ProviderError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ProviderError::Config(format!("http client build failed: {e}")))
    }
}

/// Pull-style source of campaign/day rows for one account.
#[async_trait::async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Fetch every row for `start..=end` (provider reporting timezone).
    /// Pagination is exhausted before returning.
    async fn fetch_rows(
        &self,
        creds: &AdapterCredentials,
        account_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchOutcome, ProviderError>;
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

pub(crate) fn check_range(start: NaiveDate, end: NaiveDate) -> Result<(), ProviderError> {
    if start > end {
        return Err(ProviderError::InvalidRange { start, end });
    }
    Ok(())
}

/// Map a finished response to `T`, classifying non-2xx statuses.
pub(crate) async fn read_json<T: DeserializeOwned>(
    platform: Platform,
    resp: reqwest::Response,
) -> Result<T, ProviderError> {
    let status = resp.status();
    let retry_after_secs = resp
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = resp.text().await.map_err(ProviderError::transport)?;

    if status.as_u16() == 429 {
        return Err(ProviderError::RateLimited { retry_after_secs });
    }
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(ProviderError::Unauthorized(truncate(&body, 200)));
    }
    if !status.is_success() {
        return Err(ProviderError::Api {
            status: status.as_u16(),
            message: truncate(&body, 200),
        });
    }

    serde_json::from_str(&body)
        .map_err(|e| ProviderError::Decode(format!("{platform} response: {e}")))
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Decimal money string; malformed input is a data anomaly, not an error.
pub(crate) fn money_field(platform: Platform, field: &str, raw: &str) -> Micros {
    if raw.trim().is_empty() {
        return Micros::ZERO;
    }
    match parse_decimal_micros(raw) {
        Ok(m) => m,
        Err(e) => {
            warn!(platform = %platform, field, error = %e, "malformed money field; using 0");
            Micros::ZERO
        }
    }
}

/// Counter that may arrive as a JSON number, a numeric string, or a float
/// (fractional conversions are rounded).
pub(crate) fn count_field(platform: Platform, field: &str, v: Option<&Value>) -> i64 {
    let parsed = match v {
        None | Some(Value::Null) => return 0,
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Some(Value::String(s)) if s.trim().is_empty() => return 0,
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
        Some(_) => None,
    };
    match parsed {
        Some(n) => n,
        None => {
            warn!(platform = %platform, field, "malformed count field; using 0");
            0
        }
    }
}

/// Float money (e.g. conversion values) that may also arrive as a string.
pub(crate) fn float_money_field(platform: Platform, field: &str, v: Option<&Value>) -> Micros {
    let f = match v {
        None | Some(Value::Null) => return Micros::ZERO,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    match f.and_then(Micros::from_f64) {
        Some(m) => m,
        None => {
            warn!(platform = %platform, field, "malformed money field; using 0");
            Micros::ZERO
        }
    }
}

/// Clamp negative metrics to zero, logging when that changes anything.
pub(crate) fn clamp_row(mut row: CanonicalRow) -> CanonicalRow {
    let m = row.metrics();
    if m.has_negative() {
        warn!(
            platform = %row.platform,
            campaign = %row.campaign_id,
            date = %row.date,
            "negative metric clamped to zero"
        );
        let c = m.non_negative();
        row.spend = c.spend;
        row.revenue = c.revenue;
        row.impressions = c.impressions;
        row.clicks = c.clicks;
        row.purchases = c.purchases;
    }
    row
}

/// Fold rows sharing (campaign, country, date, currency) and split off
/// zero-effect results. Output order is deterministic.
pub(crate) fn finalize_rows(rows: Vec<CanonicalRow>) -> (Vec<CanonicalRow>, Vec<SkippedEvent>) {
    let mut folded: BTreeMap<(String, Option<String>, NaiveDate, String), CanonicalRow> =
        BTreeMap::new();

    for row in rows.into_iter().map(clamp_row) {
        let key = (
            row.campaign_id.clone(),
            row.country_code.clone(),
            row.date,
            row.currency_code.clone(),
        );
        match folded.get_mut(&key) {
            Some(acc) => {
                let m = acc.metrics().plus(&row.metrics());
                acc.spend = m.spend;
                acc.revenue = m.revenue;
                acc.impressions = m.impressions;
                acc.clicks = m.clicks;
                acc.purchases = m.purchases;
                if row.campaign_name.is_some() {
                    acc.campaign_name = row.campaign_name;
                }
            }
            None => {
                folded.insert(key, row);
            }
        }
    }

    let mut kept = Vec::with_capacity(folded.len());
    let mut skipped = Vec::new();
    for row in folded.into_values() {
        if row.is_zero_effect() {
            skipped.push(SkippedEvent {
                reference: format!(
                    "{}/{}/{}",
                    row.campaign_id,
                    row.country_code.as_deref().unwrap_or(""),
                    row.date
                ),
                reason: SkipReason::ZeroEffect,
            });
        } else {
            kept.push(row);
        }
    }
    (kept, skipped)
}

/// Upper-case a provider currency code, falling back to the normalized unit
/// with a warning when it is missing or malformed.
pub(crate) fn account_currency_or_default(platform: Platform, raw: Option<&str>) -> String {
    match raw.and_then(adl_schemas::normalize_currency_code) {
        Some(c) => c,
        None => {
            warn!(
                platform = %platform,
                raw = ?raw,
                fallback = NORMALIZED_CURRENCY,
                "account currency unavailable; using normalized currency"
            );
            NORMALIZED_CURRENCY.to_string()
        }
    }
}

/// Parse `YYYY-MM-DD`, tolerating a trailing time component.
pub(crate) fn parse_report_date(platform: Platform, raw: &str) -> Result<NaiveDate, ProviderError> {
    let day = raw.trim().get(..10).unwrap_or(raw.trim());
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| ProviderError::Decode(format!("{platform} date '{raw}': {e}")))
}
