use std::sync::Arc;

use adl_schemas::{
    normalize_country_code, CampaignDailyAggregate, CampaignKey, CanonicalRow, Clock,
    CountryDailyAggregate, CountryKey, MergeMode, Metrics, SystemClock, UNKNOWN_COUNTRY,
};
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::plan::{plan_merge, CampaignDelta, MergePlan};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("row for campaign {campaign_id} is in {currency}; convert before merging")]
    NotNormalized { campaign_id: String, currency: String },
    #[error("invalid manual entry: {0}")]
    InvalidEntry(String),
    /// The transaction was rolled back; nothing from the batch was written.
    #[error("aggregate store error: {0}")]
    Store(String),
}

impl MergeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, MergeError::Store(_))
    }
}

// ---------------------------------------------------------------------------
// Store seam
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub country_inserted: usize,
    pub country_updated: usize,
    pub campaign_inserted: usize,
    pub campaign_updated: usize,
}

/// Persistent home of both aggregate tables.
///
/// `apply` must be atomic across both tables and combine stored/incoming
/// values per [`crate::combine`] and [`crate::next_cached_at`].
#[async_trait::async_trait]
pub trait AggregateStore: Send + Sync {
    async fn apply(&self, plan: &MergePlan, now: DateTime<Utc>) -> anyhow::Result<ApplyStats>;

    async fn country_row(&self, key: &CountryKey) -> anyhow::Result<Option<CountryDailyAggregate>>;

    async fn campaign_row(&self, key: &CampaignKey) -> anyhow::Result<Option<CampaignDailyAggregate>>;

    /// Country rows of `user_id` with `start <= date <= end`, key order.
    async fn country_rows(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<CountryDailyAggregate>>;

    /// Campaign rows of `user_id` with `start <= date <= end`, key order.
    async fn campaign_rows(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<CampaignDailyAggregate>>;
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub mode: MergeMode,
    pub rows_received: usize,
    pub rows_discarded: usize,
    pub country_keys: usize,
    pub campaign_keys: usize,
    pub stats: ApplyStats,
}

impl MergeSummary {
    fn from_plan(plan: &MergePlan, stats: ApplyStats) -> Self {
        Self {
            mode: plan.mode,
            rows_received: plan.rows_received,
            rows_discarded: plan.rows_discarded,
            country_keys: plan.country.len(),
            campaign_keys: plan.campaign.len(),
            stats,
        }
    }
}

/// Exactly one aggregate key a manual correction overwrites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualTarget {
    Country(CountryKey),
    Campaign {
        key: CampaignKey,
        campaign_name: Option<String>,
    },
}

pub struct MergeEngine {
    store: Arc<dyn AggregateStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for MergeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeEngine").finish_non_exhaustive()
    }
}

impl MergeEngine {
    pub fn new(store: Arc<dyn AggregateStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn AggregateStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<dyn AggregateStore> {
        &self.store
    }

    /// Merge normalized rows for `user_id` into both aggregates atomically.
    pub async fn merge_rows(
        &self,
        user_id: &str,
        rows: &[CanonicalRow],
        mode: MergeMode,
    ) -> Result<MergeSummary, MergeError> {
        let plan = plan_merge(user_id, rows, mode)?;
        self.apply(plan).await
    }

    /// Overwrite a single key with `metrics`. A zero value is a valid
    /// correction here and is written.
    pub async fn apply_manual_entry(
        &self,
        user_id: &str,
        target: ManualTarget,
        metrics: Metrics,
    ) -> Result<MergeSummary, MergeError> {
        if metrics.has_negative() {
            return Err(MergeError::InvalidEntry("metrics must be non-negative".into()));
        }

        let mut plan = MergePlan::empty(user_id, MergeMode::Overwrite);
        plan.rows_received = 1;
        match target {
            ManualTarget::Country(mut key) => {
                if key.user_id != user_id {
                    return Err(MergeError::InvalidEntry("key belongs to another user".into()));
                }
                key.country_code = normalize_country_code(&key.country_code).ok_or_else(|| {
                    MergeError::InvalidEntry(format!("country '{}' is not alpha-2", key.country_code))
                })?;
                plan.country.insert(key, metrics);
            }
            ManualTarget::Campaign { mut key, campaign_name } => {
                if key.user_id != user_id {
                    return Err(MergeError::InvalidEntry("key belongs to another user".into()));
                }
                if key.campaign_id.trim().is_empty() {
                    return Err(MergeError::InvalidEntry("campaign_id is required".into()));
                }
                if key.country_code != UNKNOWN_COUNTRY {
                    key.country_code = normalize_country_code(&key.country_code).ok_or_else(|| {
                        MergeError::InvalidEntry(format!("country '{}' is not alpha-2", key.country_code))
                    })?;
                }
                plan.campaign.insert(key, CampaignDelta { campaign_name, metrics });
            }
        }
        self.apply(plan).await
    }

    async fn apply(&self, plan: MergePlan) -> Result<MergeSummary, MergeError> {
        if plan.is_empty() {
            debug!(user = %plan.user_id, mode = %plan.mode, discarded = plan.rows_discarded, "nothing to merge");
            return Ok(MergeSummary::from_plan(&plan, ApplyStats::default()));
        }

        let stats = self
            .store
            .apply(&plan, self.clock.now())
            .await
            .map_err(|e| MergeError::Store(format!("{e:#}")))?;

        let summary = MergeSummary::from_plan(&plan, stats);
        info!(
            user = %plan.user_id,
            mode = %plan.mode,
            rows = summary.rows_received,
            discarded = summary.rows_discarded,
            country_keys = summary.country_keys,
            campaign_keys = summary.campaign_keys,
            "merge applied"
        );
        Ok(summary)
    }
}
