use adl_merge::{AggregateStore, ApplyStats, MergePlan};
use adl_schemas::{
    CampaignDailyAggregate, CampaignKey, CountryDailyAggregate, CountryKey, MergeMode, Metrics,
    Micros,
};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::parse_platform;

/// Both aggregate tables behind one transaction per merge.
#[derive(Clone)]
pub struct PgAggregateStore {
    pool: PgPool,
}

impl PgAggregateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl std::fmt::Debug for PgAggregateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgAggregateStore").finish_non_exhaustive()
    }
}

// `$10` is the accumulate flag; accumulated columns saturate at i64::MAX
// (see migration 0002). Under overwrite, cached_at only moves when a value
// actually changes.
const UPSERT_COUNTRY: &str = r#"
    insert into country_daily_aggregates as c (
      user_id, country_code, date, platform,
      spend_micros, revenue_micros, impressions, clicks, purchases, cached_at
    ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $11)
    on conflict (user_id, country_code, date, platform) do update set
      spend_micros   = case when $10 then adl_sat_add(c.spend_micros, excluded.spend_micros) else excluded.spend_micros end,
      revenue_micros = case when $10 then adl_sat_add(c.revenue_micros, excluded.revenue_micros) else excluded.revenue_micros end,
      impressions    = case when $10 then adl_sat_add(c.impressions, excluded.impressions) else excluded.impressions end,
      clicks         = case when $10 then adl_sat_add(c.clicks, excluded.clicks) else excluded.clicks end,
      purchases      = case when $10 then adl_sat_add(c.purchases, excluded.purchases) else excluded.purchases end,
      cached_at      = case
        when not $10
         and (c.spend_micros, c.revenue_micros, c.impressions, c.clicks, c.purchases)
           = (excluded.spend_micros, excluded.revenue_micros, excluded.impressions, excluded.clicks, excluded.purchases)
        then c.cached_at
        else excluded.cached_at
      end
    returning (xmax = 0)
"#;

const UPSERT_CAMPAIGN: &str = r#"
    insert into campaign_daily_aggregates as c (
      user_id, platform, campaign_id, country_code, date, campaign_name,
      spend_micros, revenue_micros, impressions, clicks, purchases, cached_at
    ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $13)
    on conflict (user_id, platform, campaign_id, country_code, date) do update set
      campaign_name  = coalesce(excluded.campaign_name, c.campaign_name),
      spend_micros   = case when $12 then adl_sat_add(c.spend_micros, excluded.spend_micros) else excluded.spend_micros end,
      revenue_micros = case when $12 then adl_sat_add(c.revenue_micros, excluded.revenue_micros) else excluded.revenue_micros end,
      impressions    = case when $12 then adl_sat_add(c.impressions, excluded.impressions) else excluded.impressions end,
      clicks         = case when $12 then adl_sat_add(c.clicks, excluded.clicks) else excluded.clicks end,
      purchases      = case when $12 then adl_sat_add(c.purchases, excluded.purchases) else excluded.purchases end,
      cached_at      = case
        when not $12
         and (c.spend_micros, c.revenue_micros, c.impressions, c.clicks, c.purchases)
           = (excluded.spend_micros, excluded.revenue_micros, excluded.impressions, excluded.clicks, excluded.purchases)
        then c.cached_at
        else excluded.cached_at
      end
    returning (xmax = 0)
"#;

const METRIC_COLUMNS: &str = "spend_micros, revenue_micros, impressions, clicks, purchases";

fn metrics_from_row(r: &PgRow) -> Result<Metrics> {
    Ok(Metrics {
        spend: Micros::new(r.try_get::<i64, _>("spend_micros").context("spend_micros")?),
        revenue: Micros::new(r.try_get::<i64, _>("revenue_micros").context("revenue_micros")?),
        impressions: r.try_get::<i64, _>("impressions").context("impressions")?,
        clicks: r.try_get::<i64, _>("clicks").context("clicks")?,
        purchases: r.try_get::<i64, _>("purchases").context("purchases")?,
    })
}

fn country_from_row(r: &PgRow) -> Result<CountryDailyAggregate> {
    Ok(CountryDailyAggregate {
        key: CountryKey {
            user_id: r.try_get::<String, _>("user_id")?,
            country_code: r.try_get::<String, _>("country_code")?,
            date: r.try_get::<NaiveDate, _>("date")?,
            platform: parse_platform(&r.try_get::<String, _>("platform")?)?,
        },
        metrics: metrics_from_row(r)?,
        cached_at: r.try_get::<DateTime<Utc>, _>("cached_at")?,
    })
}

fn campaign_from_row(r: &PgRow) -> Result<CampaignDailyAggregate> {
    Ok(CampaignDailyAggregate {
        key: CampaignKey {
            user_id: r.try_get::<String, _>("user_id")?,
            platform: parse_platform(&r.try_get::<String, _>("platform")?)?,
            campaign_id: r.try_get::<String, _>("campaign_id")?,
            country_code: r.try_get::<String, _>("country_code")?,
            date: r.try_get::<NaiveDate, _>("date")?,
        },
        campaign_name: r.try_get::<Option<String>, _>("campaign_name")?,
        metrics: metrics_from_row(r)?,
    })
}

#[async_trait::async_trait]
impl AggregateStore for PgAggregateStore {
    async fn apply(&self, plan: &MergePlan, now: DateTime<Utc>) -> Result<ApplyStats> {
        let accumulate = plan.mode == MergeMode::Accumulate;
        let mut stats = ApplyStats::default();
        let mut tx = self.pool.begin().await.context("begin merge tx failed")?;

        // Writers for the same (user, platform, date) serialize here. Sorted
        // acquisition keeps two overlapping batches from deadlocking.
        for (platform, date) in plan.lock_scopes() {
            sqlx::query("select pg_advisory_xact_lock(hashtext($1))")
                .bind(format!("{}|{}|{}", plan.user_id, platform.as_str(), date))
                .execute(&mut *tx)
                .await
                .context("merge advisory lock failed")?;
        }

        for (key, m) in &plan.country {
            let inserted: bool = sqlx::query_scalar(UPSERT_COUNTRY)
                .bind(&key.user_id)
                .bind(&key.country_code)
                .bind(key.date)
                .bind(key.platform.as_str())
                .bind(m.spend.raw())
                .bind(m.revenue.raw())
                .bind(m.impressions)
                .bind(m.clicks)
                .bind(m.purchases)
                .bind(accumulate)
                .bind(now)
                .fetch_one(&mut *tx)
                .await
                .context("upsert country_daily_aggregates failed")?;
            if inserted {
                stats.country_inserted += 1;
            } else {
                stats.country_updated += 1;
            }
        }

        for (key, delta) in &plan.campaign {
            let m = &delta.metrics;
            let inserted: bool = sqlx::query_scalar(UPSERT_CAMPAIGN)
                .bind(&key.user_id)
                .bind(key.platform.as_str())
                .bind(&key.campaign_id)
                .bind(&key.country_code)
                .bind(key.date)
                .bind(&delta.campaign_name)
                .bind(m.spend.raw())
                .bind(m.revenue.raw())
                .bind(m.impressions)
                .bind(m.clicks)
                .bind(m.purchases)
                .bind(accumulate)
                .bind(now)
                .fetch_one(&mut *tx)
                .await
                .context("upsert campaign_daily_aggregates failed")?;
            if inserted {
                stats.campaign_inserted += 1;
            } else {
                stats.campaign_updated += 1;
            }
        }

        tx.commit().await.context("commit merge tx failed")?;
        debug!(
            user_id = %plan.user_id,
            mode = ?plan.mode,
            country_inserted = stats.country_inserted,
            country_updated = stats.country_updated,
            campaign_inserted = stats.campaign_inserted,
            campaign_updated = stats.campaign_updated,
            "merge plan applied"
        );
        Ok(stats)
    }

    async fn country_row(&self, key: &CountryKey) -> Result<Option<CountryDailyAggregate>> {
        let row = sqlx::query(&format!(
            r#"
            select user_id, country_code, date, platform, {METRIC_COLUMNS}, cached_at
            from country_daily_aggregates
            where user_id = $1 and country_code = $2 and date = $3 and platform = $4
            "#
        ))
        .bind(&key.user_id)
        .bind(&key.country_code)
        .bind(key.date)
        .bind(key.platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("fetch country row failed")?;

        row.as_ref().map(country_from_row).transpose()
    }

    async fn campaign_row(&self, key: &CampaignKey) -> Result<Option<CampaignDailyAggregate>> {
        let row = sqlx::query(&format!(
            r#"
            select user_id, platform, campaign_id, country_code, date, campaign_name, {METRIC_COLUMNS}
            from campaign_daily_aggregates
            where user_id = $1 and platform = $2 and campaign_id = $3
              and country_code = $4 and date = $5
            "#
        ))
        .bind(&key.user_id)
        .bind(key.platform.as_str())
        .bind(&key.campaign_id)
        .bind(&key.country_code)
        .bind(key.date)
        .fetch_optional(&self.pool)
        .await
        .context("fetch campaign row failed")?;

        row.as_ref().map(campaign_from_row).transpose()
    }

    async fn country_rows(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CountryDailyAggregate>> {
        let rows = sqlx::query(&format!(
            r#"
            select user_id, country_code, date, platform, {METRIC_COLUMNS}, cached_at
            from country_daily_aggregates
            where user_id = $1 and date >= $2 and date <= $3
            order by country_code asc, date asc, platform asc
            "#
        ))
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .context("fetch country rows failed")?;

        rows.iter().map(country_from_row).collect()
    }

    async fn campaign_rows(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CampaignDailyAggregate>> {
        let rows = sqlx::query(&format!(
            r#"
            select user_id, platform, campaign_id, country_code, date, campaign_name, {METRIC_COLUMNS}
            from campaign_daily_aggregates
            where user_id = $1 and date >= $2 and date <= $3
            order by platform asc, campaign_id asc, country_code asc, date asc
            "#
        ))
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .context("fetch campaign rows failed")?;

        rows.iter().map(campaign_from_row).collect()
    }
}
