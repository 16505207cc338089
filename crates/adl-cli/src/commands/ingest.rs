//! Push-side handlers: webhook payloads, manual entries and ad hoc FX.

use std::fs;

use adl_merge::ManualTarget;
use adl_runtime::{apply_manual_entry, wiring, ImportChoice, WebhookIngestor, WebhookOutcome};
use adl_schemas::{CampaignKey, CountryKey, Metrics, NORMALIZED_CURRENCY, UNKNOWN_COUNTRY};
use anyhow::{Context, Result};

use super::{load_app_config, parse_date, parse_money, parse_platform, print_metrics, Services};

// ---------------------------------------------------------------------------
// webhook revenuecat
// ---------------------------------------------------------------------------

pub async fn run_webhook_revenuecat(user: String, file: String, config_paths: Vec<String>) -> Result<()> {
    let body = fs::read(&file).with_context(|| format!("read webhook file failed: {file}"))?;
    let body = body.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&body);

    let cfg = load_app_config(&config_paths)?;
    let pool = adl_db::connect_from_env().await?;
    let services = Services::new(pool, &cfg)?;
    let ingestor = WebhookIngestor::new(wiring::build_fx(&cfg)?, services.merge.clone());

    match ingestor.ingest_revenuecat_body(&user, body).await? {
        WebhookOutcome::Merged(summary) => {
            println!("merged=true");
            println!("country_keys={}", summary.country_keys);
            println!("campaign_keys={}", summary.campaign_keys);
        }
        WebhookOutcome::Skipped(s) => {
            println!("merged=false");
            println!("skipped_ref={} reason={:?}", s.reference, s.reason);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// manual
// ---------------------------------------------------------------------------

pub struct ManualArgs {
    pub user: String,
    pub platform: String,
    pub date: String,
    pub country: Option<String>,
    pub campaign: Option<String>,
    pub campaign_name: Option<String>,
    pub spend: String,
    pub revenue: String,
    pub impressions: i64,
    pub clicks: i64,
    pub purchases: i64,
    pub currency: String,
    pub add: bool,
    pub config_paths: Vec<String>,
}

pub async fn run_manual(args: ManualArgs) -> Result<()> {
    let platform = parse_platform(&args.platform)?;
    let date = parse_date("date", &args.date)?;
    let spend = parse_money("spend", &args.spend)?;
    let revenue = parse_money("revenue", &args.revenue)?;

    let cfg = load_app_config(&args.config_paths)?;
    let fx = wiring::build_fx(&cfg)?;
    let metrics = Metrics {
        spend: fx.convert(spend, &args.currency).await,
        revenue: fx.convert(revenue, &args.currency).await,
        impressions: args.impressions,
        clicks: args.clicks,
        purchases: args.purchases,
    };

    let target = match args.campaign {
        Some(campaign_id) => ManualTarget::Campaign {
            key: CampaignKey {
                user_id: args.user.clone(),
                platform,
                campaign_id,
                country_code: args.country.unwrap_or_else(|| UNKNOWN_COUNTRY.to_string()),
                date,
            },
            campaign_name: args.campaign_name,
        },
        None => ManualTarget::Country(CountryKey {
            user_id: args.user.clone(),
            country_code: args
                .country
                .context("manual country entry requires --country (or pass --campaign)")?,
            date,
            platform,
        }),
    };

    let choice = if args.add {
        ImportChoice::AddToExisting
    } else {
        ImportChoice::Replace
    };

    let pool = adl_db::connect_from_env().await?;
    let services = Services::new(pool, &cfg)?;
    let summary = apply_manual_entry(&services.merge, &args.user, target, metrics, choice).await?;

    println!("applied=true");
    println!("choice={:?}", choice);
    println!("country_keys={} campaign_keys={}", summary.country_keys, summary.campaign_keys);
    print_metrics("entered_", &metrics);
    Ok(())
}

// ---------------------------------------------------------------------------
// fx convert
// ---------------------------------------------------------------------------

pub async fn run_fx_convert(amount: String, currency: String, config_paths: Vec<String>) -> Result<()> {
    let amount = parse_money("amount", &amount)?;
    let cfg = load_app_config(&config_paths)?;
    let fx = wiring::build_fx(&cfg)?;

    let active = fx.get_rates().await;
    let converted = fx.convert(amount, &currency).await;

    println!("amount={} currency={}", amount, currency.trim().to_uppercase());
    println!("converted={} currency={}", converted, NORMALIZED_CURRENCY);
    println!("rate_origin={:?}", active.origin);
    Ok(())
}
