use std::collections::{BTreeMap, BTreeSet};

use adl_schemas::{
    CampaignKey, CanonicalRow, CountryKey, MergeMode, Metrics, Platform, UNKNOWN_COUNTRY,
};
use chrono::{DateTime, NaiveDate, Utc};

use crate::engine::MergeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignDelta {
    /// Latest non-empty name seen in the batch.
    pub campaign_name: Option<String>,
    pub metrics: Metrics,
}

/// Everything one merge call will write, folded per key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    pub user_id: String,
    pub mode: MergeMode,
    pub country: BTreeMap<CountryKey, Metrics>,
    pub campaign: BTreeMap<CampaignKey, CampaignDelta>,
    pub rows_received: usize,
    pub rows_discarded: usize,
}

impl MergePlan {
    pub fn empty(user_id: impl Into<String>, mode: MergeMode) -> Self {
        Self {
            user_id: user_id.into(),
            mode,
            country: BTreeMap::new(),
            campaign: BTreeMap::new(),
            rows_received: 0,
            rows_discarded: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.country.is_empty() && self.campaign.is_empty()
    }

    /// Distinct (platform, date) pairs touched, in sorted order. Stores that
    /// serialize writers lock on these.
    pub fn lock_scopes(&self) -> BTreeSet<(Platform, NaiveDate)> {
        self.country
            .keys()
            .map(|k| (k.platform, k.date))
            .chain(self.campaign.keys().map(|k| (k.platform, k.date)))
            .collect()
    }
}

/// Build the write plan for `rows`.
///
/// # Errors
/// `NotNormalized` when a row with money still carries a foreign currency;
/// conversion must happen before merge.
pub fn plan_merge(user_id: &str, rows: &[CanonicalRow], mode: MergeMode) -> Result<MergePlan, MergeError> {
    let mut plan = MergePlan::empty(user_id, mode);
    plan.rows_received = rows.len();

    for row in rows {
        if row.is_zero_effect() {
            plan.rows_discarded += 1;
            continue;
        }
        let has_money = !row.spend.is_zero() || !row.revenue.is_zero();
        if has_money && !row.is_normalized() {
            return Err(MergeError::NotNormalized {
                campaign_id: row.campaign_id.clone(),
                currency: row.currency_code.clone(),
            });
        }

        let metrics = row.metrics().non_negative();
        if metrics.is_zero() {
            plan.rows_discarded += 1;
            continue;
        }

        if let Some(country) = row.known_country() {
            let key = CountryKey {
                user_id: user_id.to_string(),
                country_code: country.to_string(),
                date: row.date,
                platform: row.platform,
            };
            *plan.country.entry(key).or_default() += metrics;
        }

        let key = CampaignKey {
            user_id: user_id.to_string(),
            platform: row.platform,
            campaign_id: row.campaign_id.clone(),
            country_code: row
                .known_country()
                .unwrap_or(UNKNOWN_COUNTRY)
                .to_string(),
            date: row.date,
        };
        let delta = plan.campaign.entry(key).or_insert(CampaignDelta {
            campaign_name: None,
            metrics: Metrics::ZERO,
        });
        delta.metrics += metrics;
        if let Some(name) = row.campaign_name.as_deref().filter(|n| !n.trim().is_empty()) {
            delta.campaign_name = Some(name.to_string());
        }
    }

    Ok(plan)
}

/// Value stored after applying `incoming` under `mode`.
pub fn combine(mode: MergeMode, stored: Option<&Metrics>, incoming: &Metrics) -> Metrics {
    match (mode, stored) {
        (MergeMode::Overwrite, _) | (MergeMode::Accumulate, None) => *incoming,
        (MergeMode::Accumulate, Some(prev)) => prev.plus(incoming),
    }
}

/// `cached_at` after a write. Accumulate and inserts always stamp `now`;
/// overwrite keeps the old stamp when the stored value does not change.
pub fn next_cached_at(
    mode: MergeMode,
    stored: Option<(&Metrics, DateTime<Utc>)>,
    new_value: &Metrics,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match (mode, stored) {
        (MergeMode::Overwrite, Some((prev, at))) if prev == new_value => at,
        _ => now,
    }
}
