//! Pull sync and account connection handlers.

use std::path::Path;
use std::sync::Arc;

use adl_auth::RefreshedToken;
use adl_providers::CountryMapping;
use adl_runtime::{wiring, SyncRequest, SyncRunner};
use anyhow::{Context, Result};
use tracing::info;

use super::{load_app_config, parse_date, parse_platform, Services};

pub struct SyncArgs {
    pub user: String,
    pub platform: String,
    pub account: String,
    pub start: String,
    pub end: String,
    pub config_paths: Vec<String>,
    pub geo_mapping: Option<String>,
}

// ---------------------------------------------------------------------------
// sync
// ---------------------------------------------------------------------------

pub async fn run_sync(args: SyncArgs) -> Result<()> {
    let platform = parse_platform(&args.platform)?;
    let start = parse_date("start", &args.start)?;
    let end = parse_date("end", &args.end)?;
    let cfg = load_app_config(&args.config_paths)?;

    let mapping = match &args.geo_mapping {
        Some(p) => CountryMapping::builtin_extended_from_file(Path::new(p))
            .with_context(|| format!("load geo mapping failed: {p}"))?,
        None => CountryMapping::builtin(),
    };

    let pool = adl_db::connect_from_env().await?;
    let services = Services::new(pool, &cfg)?;
    let fx = wiring::build_fx(&cfg)?;
    let adapters = wiring::build_adapters(&cfg, Arc::new(mapping))?;

    let mut runner = SyncRunner::new(services.credentials.clone(), adapters, fx, services.merge.clone());
    for (p, token) in wiring::developer_tokens(&cfg)? {
        runner = runner.with_developer_token(p, token);
    }

    let req = SyncRequest {
        user_id: args.user,
        platform,
        account_id: args.account,
        start,
        end,
    };
    info!(user = %req.user_id, platform = %platform, start = %start, end = %end, "sync starting");
    let report = match runner.run(&req).await {
        Ok(r) => r,
        Err(e) => {
            println!("sync_ok=false retryable={} reason={}", e.is_retryable(), e.reason());
            return Err(e.into());
        }
    };

    println!("sync_ok=true");
    println!("platform={}", report.platform);
    println!("account_currency={}", report.account_currency);
    println!("rows_fetched={}", report.rows_fetched);
    println!("rows_discarded={}", report.merge.rows_discarded);
    println!("country_keys={}", report.merge.country_keys);
    println!("campaign_keys={}", report.merge.campaign_keys);
    println!("skipped={}", report.skipped.len());
    for s in report.skipped.iter().take(50) {
        println!("  skipped_ref={} reason={:?}", s.reference, s.reason);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// connect
// ---------------------------------------------------------------------------

/// Store tokens obtained out of band (OAuth consent, or a secret API key).
pub async fn run_connect(
    user: String,
    platform: String,
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    config_paths: Vec<String>,
) -> Result<()> {
    let platform = parse_platform(&platform)?;
    let cfg = load_app_config(&config_paths)?;
    let pool = adl_db::connect_from_env().await?;
    let services = Services::new(pool, &cfg)?;

    let record = services
        .credentials
        .register(
            &user,
            platform,
            RefreshedToken {
                access_token,
                expires_in,
                refresh_token,
            },
        )
        .await?;

    println!("connected=true");
    println!("platform={}", record.platform);
    println!("has_refresh_token={}", record.refresh_token.is_some());
    match record.expires_at {
        Some(at) => println!("expires_at_utc={}", at.to_rfc3339()),
        None => println!("expires_at_utc=UNKNOWN"),
    }
    Ok(())
}
