use std::collections::BTreeMap;

use adl_schemas::{CampaignRef, Metrics, Platform};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Country-level cell a contribution lands in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RollupKey {
    pub country_code: String,
    pub date: NaiveDate,
    pub platform: Platform,
}

/// A `multiple`-mode entry with no country of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeedsDetail {
    pub campaign: CampaignRef,
    pub date: NaiveDate,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MisconfigReason {
    SingleWithoutCountry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Misconfigured {
    pub campaign: CampaignRef,
    pub reason: MisconfigReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupReport {
    /// Campaign-derived country totals.
    pub contributions: BTreeMap<RollupKey, Metrics>,
    /// The part of `contributions` that came from campaign rows without a
    /// country of their own. Those rows never reached the country table.
    #[serde(default)]
    pub unlocated: BTreeMap<RollupKey, Metrics>,
    pub needs_detail: Vec<NeedsDetail>,
    /// Campaigns excluded because their effective mode is `none`.
    pub unattributed: Vec<CampaignRef>,
    pub misconfigured: Vec<Misconfigured>,
}

impl RollupReport {
    pub fn contribution(&self, country: &str, date: NaiveDate, platform: Platform) -> Option<&Metrics> {
        self.contributions.get(&RollupKey {
            country_code: country.to_string(),
            date,
            platform,
        })
    }
}

/// One cell of the combined country view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryViewEntry {
    /// From `country_daily_aggregates`.
    pub direct: Metrics,
    /// From campaign rows via attribution.
    pub attributed: Metrics,
}

impl CountryViewEntry {
    pub fn total(&self) -> Metrics {
        self.direct.plus(&self.attributed)
    }
}
