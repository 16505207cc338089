//! Attribution settings and the country rollup.

use adl_attribution::{validate_setting, AttributionStore};
use adl_runtime::rollup_for_user;
use adl_schemas::{AttributionMode, CampaignAttributionSetting, CampaignRef};
use anyhow::Result;

use super::{load_app_config, parse_date, parse_platform, print_metrics, Services};

pub async fn run_attribution_set(
    user: String,
    platform: String,
    campaign: String,
    mode: String,
    country: Option<String>,
) -> Result<()> {
    let platform = parse_platform(&platform)?;
    let mode: AttributionMode = mode.parse().map_err(anyhow::Error::msg)?;
    let setting = validate_setting(CampaignAttributionSetting {
        campaign: CampaignRef::new(user, platform, campaign),
        mode,
        country_code: country,
    })?;

    let pool = adl_db::connect_from_env().await?;
    let services = Services::new(pool, &load_app_config(&[])?)?;
    services.attribution.put(&setting).await?;

    println!("saved=true");
    print_setting(&setting);
    Ok(())
}

pub async fn run_attribution_show(user: String) -> Result<()> {
    let pool = adl_db::connect_from_env().await?;
    let services = Services::new(pool, &load_app_config(&[])?)?;
    let settings = services.attribution.list_for_user(&user).await?;

    println!("settings={}", settings.len());
    for s in &settings {
        print_setting(s);
    }
    Ok(())
}

fn print_setting(s: &CampaignAttributionSetting) {
    println!(
        "platform={} campaign_id={} mode={} country={}",
        s.campaign.platform,
        s.campaign.campaign_id,
        s.mode,
        s.country_code.as_deref().unwrap_or("-")
    );
}

// ---------------------------------------------------------------------------
// rollup
// ---------------------------------------------------------------------------

pub async fn run_rollup(user: String, start: String, end: String) -> Result<()> {
    let start = parse_date("start", &start)?;
    let end = parse_date("end", &end)?;

    let pool = adl_db::connect_from_env().await?;
    let services = Services::new(pool, &load_app_config(&[])?)?;
    let rollup = rollup_for_user(
        services.aggregates.as_ref(),
        services.attribution.as_ref(),
        &user,
        start,
        end,
    )
    .await?;

    println!("rows={}", rollup.view.len());
    for (key, entry) in &rollup.view {
        println!("date={} country={} platform={}", key.date, key.country_code, key.platform);
        print_metrics("  direct_", &entry.direct);
        print_metrics("  attributed_", &entry.attributed);
    }

    let report = &rollup.report;
    println!("needs_detail={}", report.needs_detail.len());
    for n in &report.needs_detail {
        println!(
            "  platform={} campaign_id={} date={}",
            n.campaign.platform, n.campaign.campaign_id, n.date
        );
    }
    println!("unattributed={}", report.unattributed.len());
    println!("misconfigured={}", report.misconfigured.len());
    for m in &report.misconfigured {
        println!(
            "  platform={} campaign_id={} reason={:?}",
            m.campaign.platform, m.campaign.campaign_id, m.reason
        );
    }
    Ok(())
}
