use adl_attribution::AttributionStore;
use adl_schemas::{AttributionMode, CampaignAttributionSetting, CampaignRef};
use anyhow::{anyhow, Context, Result};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::parse_platform;

/// Settings table. Writes are expected to be validated with
/// `adl_attribution::validate_setting` first; the table's check
/// constraints reject a `single` row without a country regardless.
#[derive(Clone)]
pub struct PgAttributionStore {
    pool: PgPool,
}

impl PgAttributionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl std::fmt::Debug for PgAttributionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgAttributionStore").finish_non_exhaustive()
    }
}

fn setting_from_row(r: &PgRow) -> Result<CampaignAttributionSetting> {
    let mode_raw = r.try_get::<String, _>("mode")?;
    let mode: AttributionMode = mode_raw
        .parse()
        .map_err(|_| anyhow!("stored attribution mode '{mode_raw}' is not recognised"))?;
    Ok(CampaignAttributionSetting {
        campaign: CampaignRef {
            user_id: r.try_get::<String, _>("user_id")?,
            platform: parse_platform(&r.try_get::<String, _>("platform")?)?,
            campaign_id: r.try_get::<String, _>("campaign_id")?,
        },
        mode,
        country_code: r.try_get::<Option<String>, _>("country_code")?,
    })
}

#[async_trait::async_trait]
impl AttributionStore for PgAttributionStore {
    async fn get(&self, campaign: &CampaignRef) -> Result<Option<CampaignAttributionSetting>> {
        let row = sqlx::query(
            r#"
            select user_id, platform, campaign_id, mode, country_code
            from campaign_attribution_settings
            where user_id = $1 and platform = $2 and campaign_id = $3
            "#,
        )
        .bind(&campaign.user_id)
        .bind(campaign.platform.as_str())
        .bind(&campaign.campaign_id)
        .fetch_optional(&self.pool)
        .await
        .context("fetch campaign_attribution_settings failed")?;

        row.as_ref().map(setting_from_row).transpose()
    }

    async fn put(&self, setting: &CampaignAttributionSetting) -> Result<()> {
        sqlx::query(
            r#"
            insert into campaign_attribution_settings (
              user_id, platform, campaign_id, mode, country_code, updated_at
            ) values ($1, $2, $3, $4, $5, now())
            on conflict (user_id, platform, campaign_id) do update set
              mode         = excluded.mode,
              country_code = excluded.country_code,
              updated_at   = now()
            "#,
        )
        .bind(&setting.campaign.user_id)
        .bind(setting.campaign.platform.as_str())
        .bind(&setting.campaign.campaign_id)
        .bind(setting.mode.as_str())
        .bind(&setting.country_code)
        .execute(&self.pool)
        .await
        .context("upsert campaign_attribution_settings failed")?;
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<CampaignAttributionSetting>> {
        let rows = sqlx::query(
            r#"
            select user_id, platform, campaign_id, mode, country_code
            from campaign_attribution_settings
            where user_id = $1
            order by platform asc, campaign_id asc
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("list campaign_attribution_settings failed")?;

        rows.iter().map(setting_from_row).collect()
    }
}
