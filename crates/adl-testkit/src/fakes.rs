use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use adl_auth::{CredentialError, RefreshedToken, TokenRefresher};
use adl_fx::{FxFetchError, FxService, RateSource, RateTable};
use adl_providers::{AdapterCredentials, FetchOutcome, PlatformAdapter, ProviderError, SkippedEvent};
use adl_schemas::{CanonicalRow, Platform};
use chrono::NaiveDate;

// ---------------------------------------------------------------------------
// FX
// ---------------------------------------------------------------------------

/// Rate source that answers from a fixed table, or fails, and counts calls.
#[derive(Debug)]
pub struct CountingRateSource {
    rates: Option<RateTable>,
    calls: AtomicUsize,
}

impl CountingRateSource {
    /// Every fetch fails with a 503.
    pub fn failing() -> Self {
        Self {
            rates: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_rates(pairs: &[(&str, f64)]) -> Self {
        Self {
            rates: Some(pairs.iter().map(|(c, r)| (c.to_string(), *r)).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RateSource for CountingRateSource {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn fetch_rates(&self) -> Result<RateTable, FxFetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.rates.clone().ok_or(FxFetchError::Status(503))
    }
}

/// FX service whose live source is always down, so every conversion uses
/// the static fallback table.
pub fn fallback_only_fx() -> FxService {
    FxService::new(Arc::new(CountingRateSource::failing()))
}

// ---------------------------------------------------------------------------
// Adapters
// ---------------------------------------------------------------------------

/// Adapter that returns a preset outcome and records the token it was given.
pub struct ScriptedAdapter {
    platform: Platform,
    account_currency: String,
    rows: Mutex<Vec<CanonicalRow>>,
    skipped: Vec<SkippedEvent>,
    failure: Option<fn() -> ProviderError>,
    calls: AtomicUsize,
    last_token: Mutex<Option<String>>,
}

impl std::fmt::Debug for ScriptedAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedAdapter")
            .field("platform", &self.platform)
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

impl ScriptedAdapter {
    pub fn new(platform: Platform, account_currency: &str, rows: Vec<CanonicalRow>) -> Self {
        Self {
            platform,
            account_currency: account_currency.to_string(),
            rows: Mutex::new(rows),
            skipped: Vec::new(),
            failure: None,
            calls: AtomicUsize::new(0),
            last_token: Mutex::new(None),
        }
    }

    pub fn failing(platform: Platform, failure: fn() -> ProviderError) -> Self {
        let mut a = Self::new(platform, "USD", Vec::new());
        a.failure = Some(failure);
        a
    }

    pub fn with_skipped(mut self, skipped: Vec<SkippedEvent>) -> Self {
        self.skipped = skipped;
        self
    }

    /// Replace the rows returned by later fetches.
    pub fn set_rows(&self, rows: Vec<CanonicalRow>) {
        match self.rows.lock() {
            Ok(mut g) => *g = rows,
            Err(p) => *p.into_inner() = rows,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_token(&self) -> Option<String> {
        match self.last_token.lock() {
            Ok(g) => g.clone(),
            Err(p) => p.into_inner().clone(),
        }
    }
}

#[async_trait::async_trait]
impl PlatformAdapter for ScriptedAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn fetch_rows(
        &self,
        creds: &AdapterCredentials,
        _account_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchOutcome, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.last_token.lock() {
            Ok(mut g) => *g = Some(creds.access_token.clone()),
            Err(p) => *p.into_inner() = Some(creds.access_token.clone()),
        }
        if let Some(make) = self.failure {
            return Err(make());
        }
        if start > end {
            return Err(ProviderError::InvalidRange { start, end });
        }
        let rows = match self.rows.lock() {
            Ok(g) => g.clone(),
            Err(p) => p.into_inner().clone(),
        };
        Ok(FetchOutcome {
            account_currency: self.account_currency.clone(),
            rows: rows
                .into_iter()
                .filter(|r| r.date >= start && r.date <= end)
                .collect(),
            skipped: self.skipped.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Token refresh
// ---------------------------------------------------------------------------

/// Hands out `refreshed-<n>` tokens and counts exchanges.
#[derive(Debug, Default)]
pub struct StaticRefresher {
    calls: AtomicUsize,
    expires_in: Option<i64>,
}

impl StaticRefresher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_expires_in(secs: i64) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            expires_in: Some(secs),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TokenRefresher for StaticRefresher {
    async fn refresh(&self, _platform: Platform, _refresh_token: &str) -> Result<RefreshedToken, CredentialError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RefreshedToken {
            access_token: format!("refreshed-{n}"),
            expires_in: self.expires_in,
            refresh_token: None,
        })
    }
}
