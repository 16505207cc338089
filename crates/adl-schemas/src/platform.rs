use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// External data source tag. The lowercase wire form is what gets stored in
/// the aggregate tables and accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "google_ads")]
    GoogleAds,
    #[serde(rename = "meta_ads")]
    MetaAds,
    #[serde(rename = "tiktok_ads")]
    TikTokAds,
    #[serde(rename = "stripe")]
    Stripe,
    #[serde(rename = "revenuecat")]
    RevenueCat,
    #[serde(rename = "manual")]
    Manual,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::GoogleAds,
        Platform::MetaAds,
        Platform::TikTokAds,
        Platform::Stripe,
        Platform::RevenueCat,
        Platform::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::GoogleAds => "google_ads",
            Platform::MetaAds => "meta_ads",
            Platform::TikTokAds => "tiktok_ads",
            Platform::Stripe => "stripe",
            Platform::RevenueCat => "revenuecat",
            Platform::Manual => "manual",
        }
    }

    /// Whether the provider reports a per-country breakdown.
    pub fn reports_geography(&self) -> bool {
        !matches!(self, Platform::TikTokAds)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown platform '{0}'; expected one of: google_ads | meta_ads | tiktok_ads | stripe | revenuecat | manual")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google_ads" | "google" => Ok(Platform::GoogleAds),
            "meta_ads" | "meta" | "facebook" => Ok(Platform::MetaAds),
            "tiktok_ads" | "tiktok" => Ok(Platform::TikTokAds),
            "stripe" => Ok(Platform::Stripe),
            "revenuecat" => Ok(Platform::RevenueCat),
            "manual" => Ok(Platform::Manual),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tags_round_trip_through_from_str() {
        for p in Platform::ALL {
            assert_eq!(p.as_str().parse::<Platform>().unwrap(), p);
        }
        assert!("bing".parse::<Platform>().is_err());
    }

    #[test]
    fn serde_uses_wire_tag() {
        let v = serde_json::to_value(Platform::RevenueCat).unwrap();
        assert_eq!(v, serde_json::json!("revenuecat"));
    }
}
