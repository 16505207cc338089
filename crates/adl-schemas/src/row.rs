use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

use crate::money::Micros;
use crate::platform::Platform;

/// ISO-4217 code of the normalized unit all stored money is expressed in.
pub const NORMALIZED_CURRENCY: &str = "USD";

/// Empty/unknown country sentinel used in campaign keys.
pub const UNKNOWN_COUNTRY: &str = "";

/// Numeric payload shared by rows and both aggregate tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Metrics {
    pub spend: Micros,
    pub revenue: Micros,
    pub impressions: i64,
    pub clicks: i64,
    pub purchases: i64,
}

impl Metrics {
    pub const ZERO: Metrics = Metrics {
        spend: Micros::ZERO,
        revenue: Micros::ZERO,
        impressions: 0,
        clicks: 0,
        purchases: 0,
    };

    /// All five fields are zero: the value carries no information.
    pub fn is_zero(&self) -> bool {
        self.spend.is_zero()
            && self.revenue.is_zero()
            && self.impressions == 0
            && self.clicks == 0
            && self.purchases == 0
    }

    /// Field-wise saturating sum.
    pub fn plus(&self, other: &Metrics) -> Metrics {
        Metrics {
            spend: self.spend.saturating_add(other.spend),
            revenue: self.revenue.saturating_add(other.revenue),
            impressions: self.impressions.saturating_add(other.impressions),
            clicks: self.clicks.saturating_add(other.clicks),
            purchases: self.purchases.saturating_add(other.purchases),
        }
    }

    /// Clamp every field at zero.
    pub fn non_negative(&self) -> Metrics {
        Metrics {
            spend: self.spend.clamp_non_negative(),
            revenue: self.revenue.clamp_non_negative(),
            impressions: self.impressions.max(0),
            clicks: self.clicks.max(0),
            purchases: self.purchases.max(0),
        }
    }

    pub fn has_negative(&self) -> bool {
        self.spend.is_negative()
            || self.revenue.is_negative()
            || self.impressions < 0
            || self.clicks < 0
            || self.purchases < 0
    }
}

impl AddAssign for Metrics {
    fn add_assign(&mut self, rhs: Metrics) {
        *self = self.plus(&rhs);
    }
}

/// Provider-agnostic record for one campaign, one day and one (possibly
/// absent) country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRow {
    pub platform: Platform,
    pub campaign_id: String,
    pub campaign_name: Option<String>,
    /// `None` when the provider has no geographic breakdown.
    pub country_code: Option<String>,
    /// Calendar day in the provider's reporting timezone.
    pub date: NaiveDate,
    pub spend: Micros,
    pub revenue: Micros,
    pub impressions: i64,
    pub clicks: i64,
    pub purchases: i64,
    /// Currency `spend`/`revenue` are expressed in.
    pub currency_code: String,
}

impl CanonicalRow {
    pub fn new(platform: Platform, campaign_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            platform,
            campaign_id: campaign_id.into(),
            campaign_name: None,
            country_code: None,
            date,
            spend: Micros::ZERO,
            revenue: Micros::ZERO,
            impressions: 0,
            clicks: 0,
            purchases: 0,
            currency_code: NORMALIZED_CURRENCY.to_string(),
        }
    }

    pub fn metrics(&self) -> Metrics {
        Metrics {
            spend: self.spend,
            revenue: self.revenue,
            impressions: self.impressions,
            clicks: self.clicks,
            purchases: self.purchases,
        }
    }

    pub fn is_zero_effect(&self) -> bool {
        self.metrics().is_zero()
    }

    pub fn is_normalized(&self) -> bool {
        self.currency_code.eq_ignore_ascii_case(NORMALIZED_CURRENCY)
    }

    /// Known, non-empty country code.
    pub fn known_country(&self) -> Option<&str> {
        self.country_code.as_deref().filter(|c| !c.is_empty())
    }
}
