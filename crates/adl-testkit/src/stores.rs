use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use adl_attribution::AttributionStore;
use adl_auth::{CredentialRecord, CredentialStore};
use adl_merge::{combine, next_cached_at, AggregateStore, ApplyStats, MergePlan};
use adl_schemas::{
    AttributionMode, CampaignAttributionSetting, CampaignDailyAggregate, CampaignKey, CampaignRef,
    CountryDailyAggregate, CountryKey, Metrics, Platform,
};
use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, Utc};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(p) => p.into_inner(),
    }
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct Tables {
    country: BTreeMap<CountryKey, (Metrics, DateTime<Utc>)>,
    campaign: BTreeMap<CampaignKey, (Option<String>, Metrics, DateTime<Utc>)>,
}

/// Both aggregate tables in memory. `apply` works on a copy and swaps it in
/// only when every key succeeded.
#[derive(Debug, Default)]
pub struct MemoryAggregateStore {
    tables: Mutex<Tables>,
    /// One-shot: fail the next `apply` after this many key writes.
    fail_after: Mutex<Option<usize>>,
}

impl MemoryAggregateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `apply` fail after `writes` keys have been written to
    /// its working copy.
    pub fn fail_next_apply_after(&self, writes: usize) {
        *lock(&self.fail_after) = Some(writes);
    }

    pub fn country_len(&self) -> usize {
        lock(&self.tables).country.len()
    }

    pub fn campaign_len(&self) -> usize {
        lock(&self.tables).campaign.len()
    }

    pub fn all_country_rows(&self) -> Vec<CountryDailyAggregate> {
        lock(&self.tables)
            .country
            .iter()
            .map(|(k, (m, at))| CountryDailyAggregate {
                key: k.clone(),
                metrics: *m,
                cached_at: *at,
            })
            .collect()
    }

    pub fn all_campaign_rows(&self) -> Vec<CampaignDailyAggregate> {
        lock(&self.tables)
            .campaign
            .iter()
            .map(|(k, (name, m, _))| CampaignDailyAggregate {
                key: k.clone(),
                campaign_name: name.clone(),
                metrics: *m,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl AggregateStore for MemoryAggregateStore {
    async fn apply(&self, plan: &MergePlan, now: DateTime<Utc>) -> Result<ApplyStats> {
        let fail_after = lock(&self.fail_after).take();
        let mut tables = lock(&self.tables);
        let mut work = tables.clone();
        let mut stats = ApplyStats::default();
        let mut writes = 0usize;

        let mut tick = || -> Result<()> {
            if fail_after == Some(writes) {
                bail!("injected store failure after {writes} writes");
            }
            writes += 1;
            Ok(())
        };

        for (key, incoming) in &plan.country {
            tick()?;
            let stored = work.country.get(key).copied();
            let value = combine(plan.mode, stored.as_ref().map(|(m, _)| m), incoming);
            let at = next_cached_at(plan.mode, stored.as_ref().map(|(m, at)| (m, *at)), &value, now);
            if stored.is_some() {
                stats.country_updated += 1;
            } else {
                stats.country_inserted += 1;
            }
            work.country.insert(key.clone(), (value, at));
        }

        for (key, delta) in &plan.campaign {
            tick()?;
            let stored = work.campaign.get(key).cloned();
            let value = combine(plan.mode, stored.as_ref().map(|(_, m, _)| m), &delta.metrics);
            let at = next_cached_at(
                plan.mode,
                stored.as_ref().map(|(_, m, at)| (m, *at)),
                &value,
                now,
            );
            let name = delta
                .campaign_name
                .clone()
                .or_else(|| stored.as_ref().and_then(|(n, _, _)| n.clone()));
            if stored.is_some() {
                stats.campaign_updated += 1;
            } else {
                stats.campaign_inserted += 1;
            }
            work.campaign.insert(key.clone(), (name, value, at));
        }

        *tables = work;
        Ok(stats)
    }

    async fn country_row(&self, key: &CountryKey) -> Result<Option<CountryDailyAggregate>> {
        Ok(lock(&self.tables).country.get(key).map(|(m, at)| CountryDailyAggregate {
            key: key.clone(),
            metrics: *m,
            cached_at: *at,
        }))
    }

    async fn campaign_row(&self, key: &CampaignKey) -> Result<Option<CampaignDailyAggregate>> {
        Ok(lock(&self.tables).campaign.get(key).map(|(name, m, _)| CampaignDailyAggregate {
            key: key.clone(),
            campaign_name: name.clone(),
            metrics: *m,
        }))
    }

    async fn country_rows(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CountryDailyAggregate>> {
        Ok(self
            .all_country_rows()
            .into_iter()
            .filter(|r| r.key.user_id == user_id && r.key.date >= start && r.key.date <= end)
            .collect())
    }

    async fn campaign_rows(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CampaignDailyAggregate>> {
        Ok(self
            .all_campaign_rows()
            .into_iter()
            .filter(|r| r.key.user_id == user_id && r.key.date >= start && r.key.date <= end)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    rows: Mutex<HashMap<(String, Platform), CredentialRecord>>,
    saves: Mutex<usize>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: CredentialRecord) {
        lock(&self.rows).insert((record.user_id.clone(), record.platform), record);
    }

    pub fn get(&self, user_id: &str, platform: Platform) -> Option<CredentialRecord> {
        lock(&self.rows).get(&(user_id.to_string(), platform)).cloned()
    }

    pub fn save_count(&self) -> usize {
        *lock(&self.saves)
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, user_id: &str, platform: Platform) -> Result<Option<CredentialRecord>> {
        Ok(self.get(user_id, platform))
    }

    async fn save(&self, record: &CredentialRecord) -> Result<()> {
        *lock(&self.saves) += 1;
        self.insert(record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Attribution settings
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryAttributionStore {
    rows: Mutex<BTreeMap<CampaignRef, CampaignAttributionSetting>>,
}

impl MemoryAttributionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AttributionStore for MemoryAttributionStore {
    async fn get(&self, campaign: &CampaignRef) -> Result<Option<CampaignAttributionSetting>> {
        Ok(lock(&self.rows).get(campaign).cloned())
    }

    async fn put(&self, setting: &CampaignAttributionSetting) -> Result<()> {
        // Same rule the settings table enforces with a check constraint.
        if setting.mode == AttributionMode::Single && setting.country_code.is_none() {
            bail!("single attribution without a country");
        }
        lock(&self.rows).insert(setting.campaign.clone(), setting.clone());
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<CampaignAttributionSetting>> {
        Ok(lock(&self.rows)
            .values()
            .filter(|s| s.campaign.user_id == user_id)
            .cloned()
            .collect())
    }
}
