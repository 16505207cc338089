use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::platform::Platform;

/// Per-campaign rule for rolling campaign-level data up to country level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionMode {
    /// Campaign-level only; excluded from campaign-derived country views.
    #[default]
    None,
    /// Everything goes to one configured country.
    Single,
    /// Each entry's own country is authoritative.
    Multiple,
}

impl AttributionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributionMode::None => "none",
            AttributionMode::Single => "single",
            AttributionMode::Multiple => "multiple",
        }
    }
}

impl fmt::Display for AttributionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(AttributionMode::None),
            "single" => Ok(AttributionMode::Single),
            "multiple" => Ok(AttributionMode::Multiple),
            other => Err(format!(
                "invalid attribution mode '{other}'. expected one of: none | single | multiple"
            )),
        }
    }
}

/// Identifies one campaign of one user on one platform.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CampaignRef {
    pub user_id: String,
    pub platform: Platform,
    pub campaign_id: String,
}

impl CampaignRef {
    pub fn new(user_id: impl Into<String>, platform: Platform, campaign_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            platform,
            campaign_id: campaign_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignAttributionSetting {
    pub campaign: CampaignRef,
    pub mode: AttributionMode,
    /// Only meaningful when `mode` is `Single`.
    pub country_code: Option<String>,
}

impl CampaignAttributionSetting {
    /// What an unseen campaign reads as.
    pub fn default_for(campaign: CampaignRef) -> Self {
        Self {
            campaign,
            mode: AttributionMode::None,
            country_code: None,
        }
    }
}
