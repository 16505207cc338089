use std::collections::HashMap;
use std::sync::Arc;

use adl_auth::CredentialManager;
use adl_fx::FxService;
use adl_merge::{MergeEngine, MergeSummary};
use adl_providers::{AdapterCredentials, PlatformAdapter, SkippedEvent};
use adl_schemas::{CanonicalRow, MergeMode, Platform, NORMALIZED_CURRENCY};
use chrono::NaiveDate;
use tracing::{info, warn};

use crate::SyncError;

/// One unit of sync work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub user_id: String,
    pub platform: Platform,
    pub account_id: String,
    /// Inclusive.
    pub start: NaiveDate,
    /// Inclusive.
    pub end: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub platform: Platform,
    pub account_currency: String,
    pub rows_fetched: usize,
    pub skipped: Vec<SkippedEvent>,
    pub merge: MergeSummary,
}

#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers under `adapter.platform()`, replacing any previous one.
    pub fn insert(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        self.adapters.insert(adapter.platform(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        self.insert(adapter);
        self
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(&platform).cloned()
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut out: Vec<Platform> = self.adapters.keys().copied().collect();
        out.sort();
        out
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("platforms", &self.platforms())
            .finish()
    }
}

/// Convert every row's money into USD in place of the native amounts.
///
/// A row without its own currency takes `account_currency`. Rows already in
/// USD and zero amounts never touch the rate cache.
pub async fn normalize_rows(
    fx: &FxService,
    rows: Vec<CanonicalRow>,
    account_currency: &str,
) -> Vec<CanonicalRow> {
    let mut out = Vec::with_capacity(rows.len());
    for mut row in rows {
        let currency = if row.currency_code.trim().is_empty() {
            account_currency.to_string()
        } else {
            row.currency_code.clone()
        };
        row.spend = fx.convert(row.spend, &currency).await;
        row.revenue = fx.convert(row.revenue, &currency).await;
        row.currency_code = NORMALIZED_CURRENCY.to_string();
        out.push(row);
    }
    out
}

/// OAuth platforms refresh through the credential manager; the rest
/// authenticate with a stored secret key.
fn uses_oauth(platform: Platform) -> bool {
    matches!(
        platform,
        Platform::GoogleAds | Platform::MetaAds | Platform::TikTokAds
    )
}

pub struct SyncRunner {
    credentials: Arc<CredentialManager>,
    adapters: AdapterRegistry,
    fx: Arc<FxService>,
    merge: Arc<MergeEngine>,
    developer_tokens: HashMap<Platform, String>,
}

impl std::fmt::Debug for SyncRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRunner")
            .field("adapters", &self.adapters)
            .finish_non_exhaustive()
    }
}

impl SyncRunner {
    pub fn new(
        credentials: Arc<CredentialManager>,
        adapters: AdapterRegistry,
        fx: Arc<FxService>,
        merge: Arc<MergeEngine>,
    ) -> Self {
        Self {
            credentials,
            adapters,
            fx,
            merge,
            developer_tokens: HashMap::new(),
        }
    }

    /// Static key sent alongside the access token (Google Ads developer token).
    pub fn with_developer_token(mut self, platform: Platform, token: impl Into<String>) -> Self {
        self.developer_tokens.insert(platform, token.into());
        self
    }

    /// Full resync of one window. The whole row sequence is fetched before
    /// anything is written; the merge is a single overwrite batch.
    pub async fn run(&self, req: &SyncRequest) -> Result<SyncReport, SyncError> {
        let result = self.run_inner(req).await;
        if let Err(e) = &result {
            warn!(
                user = %req.user_id,
                platform = %req.platform,
                retryable = e.is_retryable(),
                reason = %e.reason(),
                error = %e,
                "sync failed"
            );
        }
        result
    }

    async fn run_inner(&self, req: &SyncRequest) -> Result<SyncReport, SyncError> {
        let platform = req.platform;
        let adapter = self
            .adapters
            .get(platform)
            .ok_or(SyncError::NoAdapter(platform))?;

        let access_token = if uses_oauth(platform) {
            self.credentials
                .ensure_valid_token(&req.user_id, platform)
                .await?
        } else {
            self.credentials.stored_secret(&req.user_id, platform).await?
        };
        let creds = AdapterCredentials {
            access_token,
            developer_token: self.developer_tokens.get(&platform).cloned(),
        };

        let outcome = adapter
            .fetch_rows(&creds, &req.account_id, req.start, req.end)
            .await
            .map_err(|source| SyncError::Provider { platform, source })?;

        let rows_fetched = outcome.rows.len();
        let rows = normalize_rows(&self.fx, outcome.rows, &outcome.account_currency).await;
        let merge = self
            .merge
            .merge_rows(&req.user_id, &rows, MergeMode::Overwrite)
            .await?;

        info!(
            user = %req.user_id,
            platform = %platform,
            start = %req.start,
            end = %req.end,
            currency = %outcome.account_currency,
            rows = rows_fetched,
            skipped = outcome.skipped.len(),
            "sync complete"
        );

        Ok(SyncReport {
            platform,
            account_currency: outcome.account_currency,
            rows_fetched,
            skipped: outcome.skipped,
            merge,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adl_schemas::Micros;
    use adl_testkit::{fallback_only_fx, CountingRateSource};

    fn row(currency: &str, spend_units: i64) -> CanonicalRow {
        let mut r = CanonicalRow::new(
            Platform::MetaAds,
            "c1",
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
        );
        r.spend = Micros::from_units(spend_units);
        r.currency_code = currency.to_string();
        r
    }

    #[tokio::test]
    async fn usd_rows_skip_the_rate_cache() {
        let source = Arc::new(CountingRateSource::failing());
        let fx = FxService::new(source.clone());
        let out = normalize_rows(&fx, vec![row("usd", 5), row("", 7)], "USD").await;

        assert_eq!(out[0].spend, Micros::from_units(5));
        assert_eq!(out[1].spend, Micros::from_units(7));
        assert!(out.iter().all(|r| r.currency_code == "USD"));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn row_without_currency_takes_the_account_currency() {
        let fx = fallback_only_fx();
        let out = normalize_rows(&fx, vec![row("", 100)], "EUR").await;
        assert_eq!(out[0].spend, Micros::new(108_695_652));
        assert_eq!(out[0].currency_code, "USD");
    }
}
