//! Construction of the runtime pieces from a loaded `AppConfig`.

use std::sync::Arc;
use std::time::Duration;

use adl_auth::OAuthRefresher;
use adl_config::secrets::{resolve_developer_token, resolve_oauth_client};
use adl_config::AppConfig;
use adl_fx::{FxService, HttpRateSource};
use adl_providers::{
    AdapterSettings, CountryMapping, GoogleAdsAdapter, MetaAdsAdapter, StripeAdapter,
    TikTokAdsAdapter,
};
use adl_schemas::Platform;
use anyhow::{Context, Result};
use tracing::warn;

use crate::sync::AdapterRegistry;

const OAUTH_TIMEOUT: Duration = Duration::from_secs(30);

pub fn adapter_settings(cfg: &AppConfig, platform: Platform) -> AdapterSettings {
    let mut s = AdapterSettings::new(Duration::from_secs(cfg.provider_timeout_secs(platform)));
    if let Some(base) = cfg.provider(platform).base_url {
        s = s.with_base_url(base);
    }
    s
}

pub fn build_fx(cfg: &AppConfig) -> Result<Arc<FxService>> {
    let timeout = Duration::from_secs(cfg.fx.timeout_secs);
    let source = HttpRateSource::new(cfg.fx.url.clone(), timeout).context("fx rate source build failed")?;
    Ok(Arc::new(
        FxService::new(Arc::new(source))
            .ttl(Duration::from_secs(cfg.fx.ttl_hours.saturating_mul(3600)))
            .fetch_timeout(timeout),
    ))
}

/// Every pull adapter. RevenueCat is push-only and handled by the webhook path.
pub fn build_adapters(cfg: &AppConfig, mapping: Arc<CountryMapping>) -> Result<AdapterRegistry> {
    let google = GoogleAdsAdapter::new(&adapter_settings(cfg, Platform::GoogleAds), mapping)
        .context("google ads adapter build failed")?;
    let meta = MetaAdsAdapter::new(&adapter_settings(cfg, Platform::MetaAds))
        .context("meta ads adapter build failed")?;
    let tiktok = TikTokAdsAdapter::new(&adapter_settings(cfg, Platform::TikTokAds))
        .context("tiktok ads adapter build failed")?;
    let stripe = StripeAdapter::new(&adapter_settings(cfg, Platform::Stripe))
        .context("stripe adapter build failed")?;

    Ok(AdapterRegistry::new()
        .with(Arc::new(google))
        .with(Arc::new(meta))
        .with(Arc::new(tiktok))
        .with(Arc::new(stripe)))
}

/// Refresher with a client for every `oauth.<platform>` section whose env
/// vars resolve. Unresolvable sections are logged and left out; refreshing
/// that platform then fails with a config error.
pub fn build_refresher(cfg: &AppConfig) -> Result<OAuthRefresher> {
    let mut refresher = OAuthRefresher::new(OAUTH_TIMEOUT).context("oauth client build failed")?;
    for platform in Platform::ALL {
        if cfg.oauth(platform).is_none() {
            continue;
        }
        match resolve_oauth_client(cfg, platform) {
            Ok(client) => refresher = refresher.with_client(platform, client),
            Err(e) => warn!(platform = %platform, error = %e, "oauth client not resolved"),
        }
    }
    Ok(refresher)
}

/// Developer tokens named in config. A named but unset variable is an error.
pub fn developer_tokens(cfg: &AppConfig) -> Result<Vec<(Platform, String)>> {
    let mut out = Vec::new();
    for platform in Platform::ALL {
        if let Some(token) = resolve_developer_token(cfg, platform)? {
            out.push((platform, token));
        }
    }
    Ok(out)
}
