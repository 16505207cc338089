use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::platform::Platform;
use crate::row::Metrics;

/// How a batch combines with what is already stored for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Replace stored values. Used for full re-syncs and manual corrections.
    Overwrite,
    /// Add to stored values. Used for webhook-delivered events.
    Accumulate,
}

impl MergeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeMode::Overwrite => "overwrite",
            MergeMode::Accumulate => "accumulate",
        }
    }
}

impl fmt::Display for MergeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(MergeMode::Overwrite),
            "accumulate" => Ok(MergeMode::Accumulate),
            other => Err(format!(
                "invalid merge mode '{other}'. expected one of: overwrite | accumulate"
            )),
        }
    }
}

/// Key of `country_daily_aggregates`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CountryKey {
    pub user_id: String,
    pub country_code: String,
    pub date: NaiveDate,
    pub platform: Platform,
}

/// Key of `campaign_daily_aggregates`. `country_code` is
/// [`UNKNOWN_COUNTRY`](crate::UNKNOWN_COUNTRY) when the source has no geography.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CampaignKey {
    pub user_id: String,
    pub platform: Platform,
    pub campaign_id: String,
    pub country_code: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryDailyAggregate {
    pub key: CountryKey,
    pub metrics: Metrics,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignDailyAggregate {
    pub key: CampaignKey,
    pub campaign_name: Option<String>,
    pub metrics: Metrics,
}
