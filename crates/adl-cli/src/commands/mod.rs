//! Command handler modules for adl-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod attribution;
pub mod ingest;
pub mod sync;

use std::sync::Arc;

use adl_auth::CredentialManager;
use adl_config::AppConfig;
use adl_db::{PgAggregateStore, PgAttributionStore, PgCredentialStore};
use adl_merge::MergeEngine;
use adl_schemas::{parse_decimal_micros, Metrics, Micros, Platform};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Parse a CLI `--platform` string.
pub fn parse_platform(raw: &str) -> Result<Platform> {
    Ok(raw.parse::<Platform>()?)
}

/// Parse a `YYYY-MM-DD` argument.
pub fn parse_date(flag: &str, raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid --{flag} '{raw}'. expected YYYY-MM-DD"))
}

/// Parse a decimal money argument such as `12.50`.
pub fn parse_money(flag: &str, raw: &str) -> Result<Micros> {
    parse_decimal_micros(raw).with_context(|| format!("invalid --{flag} '{raw}'"))
}

/// Typed config from layered YAML. No paths means all defaults.
pub fn load_app_config(paths: &[String]) -> Result<AppConfig> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = if path_refs.is_empty() {
        adl_config::load_layered_yaml_from_strings(&[])?
    } else {
        adl_config::load_layered_yaml(&path_refs)?
    };
    loaded.app_config()
}

/// Print one metrics block in key=value form.
pub fn print_metrics(prefix: &str, m: &Metrics) {
    println!(
        "{prefix}spend_usd={} {prefix}revenue_usd={} {prefix}impressions={} {prefix}clicks={} {prefix}purchases={}",
        m.spend, m.revenue, m.impressions, m.clicks, m.purchases
    );
}

/// Database-backed stores plus the engines built on them.
pub struct Services {
    pub aggregates: Arc<PgAggregateStore>,
    pub attribution: Arc<PgAttributionStore>,
    pub merge: Arc<MergeEngine>,
    pub credentials: Arc<CredentialManager>,
}

impl Services {
    pub fn new(pool: PgPool, cfg: &AppConfig) -> Result<Self> {
        let aggregates = Arc::new(PgAggregateStore::new(pool.clone()));
        let attribution = Arc::new(PgAttributionStore::new(pool.clone()));
        let merge = Arc::new(MergeEngine::new(aggregates.clone()));
        let refresher = adl_runtime::wiring::build_refresher(cfg)?;
        let credentials = Arc::new(CredentialManager::new(
            Arc::new(PgCredentialStore::new(pool)),
            Arc::new(refresher),
        ));
        Ok(Self {
            aggregates,
            attribution,
            merge,
            credentials,
        })
    }
}
