//! Typed view of the merged configuration document.
//!
//! ```yaml
//! fx:
//!   url: "https://open.er-api.com/v6/latest/USD"
//!   timeout_secs: 5
//!   ttl_hours: 12
//! providers:
//!   google_ads:
//!     base_url: "https://googleads.googleapis.com/v17"
//!     timeout_secs: 60
//!     developer_token_env: "ADL_GOOGLE_ADS_DEVELOPER_TOKEN"
//! oauth:
//!   google_ads:
//!     token_url: "https://oauth2.googleapis.com/token"
//!     client_id_env: "ADL_GOOGLE_CLIENT_ID"
//!     client_secret_env: "ADL_GOOGLE_CLIENT_SECRET"
//! ```

use std::collections::BTreeMap;

use adl_schemas::Platform;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

pub const DEFAULT_FX_URL: &str = "https://open.er-api.com/v6/latest/USD";
pub const DEFAULT_FX_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_FX_TTL_HOURS: u64 = 12;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub fx: FxSettings,
    /// Keyed by platform wire tag.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,
    /// Keyed by platform wire tag.
    #[serde(default)]
    pub oauth: BTreeMap<String, OAuthSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FxSettings {
    #[serde(default = "default_fx_url")]
    pub url: String,
    #[serde(default = "default_fx_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_fx_ttl_hours")]
    pub ttl_hours: u64,
}

impl Default for FxSettings {
    fn default() -> Self {
        Self {
            url: default_fx_url(),
            timeout_secs: DEFAULT_FX_TIMEOUT_SECS,
            ttl_hours: DEFAULT_FX_TTL_HOURS,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderSettings {
    /// Overrides the adapter's built-in API base URL.
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    /// Env var NAME holding a static provider key (e.g. the Google Ads
    /// developer token). Never the value itself.
    pub developer_token_env: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthSettings {
    pub token_url: String,
    pub client_id_env: String,
    pub client_secret_env: String,
}

fn default_fx_url() -> String {
    DEFAULT_FX_URL.to_string()
}

fn default_fx_timeout_secs() -> u64 {
    DEFAULT_FX_TIMEOUT_SECS
}

fn default_fx_ttl_hours() -> u64 {
    DEFAULT_FX_TTL_HOURS
}

/// Observed provider latency envelopes; reporting endpoints for Google are
/// the slowest.
pub fn default_timeout_secs(platform: Platform) -> u64 {
    match platform {
        Platform::GoogleAds => 60,
        Platform::Stripe => 20,
        Platform::RevenueCat | Platform::Manual => 10,
        Platform::MetaAds | Platform::TikTokAds => 30,
    }
}

impl AppConfig {
    pub fn from_json(v: &Value) -> Result<Self> {
        serde_json::from_value(v.clone()).context("config does not match AppConfig shape")
    }

    pub fn provider(&self, platform: Platform) -> ProviderSettings {
        self.providers
            .get(platform.as_str())
            .cloned()
            .unwrap_or_default()
    }

    pub fn provider_timeout_secs(&self, platform: Platform) -> u64 {
        self.provider(platform)
            .timeout_secs
            .unwrap_or_else(|| default_timeout_secs(platform))
    }

    pub fn oauth(&self, platform: Platform) -> Option<&OAuthSettings> {
        self.oauth.get(platform.as_str())
    }
}
