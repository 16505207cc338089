//! adl-schemas
//!
//! Shared vocabulary for the ingestion workspace: platform tags, the
//! canonical row adapters emit, aggregate keys, merge modes, attribution
//! settings and fixed-point money. No IO lives here.

pub mod aggregate;
pub mod attribution;
pub mod money;
pub mod platform;
pub mod row;

use chrono::{DateTime, Utc};

pub use aggregate::{CampaignDailyAggregate, CampaignKey, CountryDailyAggregate, CountryKey, MergeMode};
pub use attribution::{AttributionMode, CampaignAttributionSetting, CampaignRef};
pub use money::{parse_decimal_micros, DecimalError, Micros, MICROS_SCALE};
pub use platform::{Platform, UnknownPlatform};
pub use row::{CanonicalRow, Metrics, NORMALIZED_CURRENCY, UNKNOWN_COUNTRY};

/// Source of "now". Injected wherever TTLs or expiry are evaluated so tests
/// can pin time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Normalize a provider country code to ISO-3166 alpha-2 upper case.
/// Anything that is not exactly two ASCII letters yields `None`.
pub fn normalize_country_code(raw: &str) -> Option<String> {
    let t = raw.trim();
    if t.len() == 2 && t.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(t.to_ascii_uppercase())
    } else {
        None
    }
}

/// Normalize an ISO-4217 code to upper case. Three ASCII letters or `None`.
pub fn normalize_currency_code(raw: &str) -> Option<String> {
    let t = raw.trim();
    if t.len() == 3 && t.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(t.to_ascii_uppercase())
    } else {
        None
    }
}
