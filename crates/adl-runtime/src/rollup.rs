use std::collections::BTreeMap;

use adl_attribution::{country_view, resolve_rollup, AttributionStore, CountryViewEntry, RollupKey, RollupReport};
use adl_merge::AggregateStore;
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;

#[derive(Debug, Clone)]
pub struct CountryRollup {
    pub report: RollupReport,
    pub view: BTreeMap<RollupKey, CountryViewEntry>,
}

/// Country rollup for `user_id` over `start..=end`, computed fresh from the
/// current settings and stored rows.
pub async fn rollup_for_user(
    aggregates: &dyn AggregateStore,
    settings: &dyn AttributionStore,
    user_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<CountryRollup> {
    if start > end {
        bail!("invalid window {start}..={end}");
    }
    let settings = settings
        .list_for_user(user_id)
        .await
        .context("load attribution settings failed")?;
    let campaign_rows = aggregates
        .campaign_rows(user_id, start, end)
        .await
        .context("load campaign rows failed")?;
    let direct = aggregates
        .country_rows(user_id, start, end)
        .await
        .context("load country rows failed")?;

    let report = resolve_rollup(&settings, &campaign_rows);
    let view = country_view(&direct, &report);
    Ok(CountryRollup { report, view })
}
