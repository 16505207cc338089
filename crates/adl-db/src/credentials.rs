use adl_auth::{CredentialRecord, CredentialStore};
use adl_schemas::Platform;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::parse_platform;

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl std::fmt::Debug for PgCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgCredentialStore").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl CredentialStore for PgCredentialStore {
    async fn load(&self, user_id: &str, platform: Platform) -> Result<Option<CredentialRecord>> {
        let row = sqlx::query(
            r#"
            select user_id, platform, access_token, refresh_token, expires_at
            from platform_credentials
            where user_id = $1 and platform = $2
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("load platform_credentials failed")?;

        let Some(r) = row else {
            return Ok(None);
        };
        Ok(Some(CredentialRecord {
            user_id: r.try_get::<String, _>("user_id")?,
            platform: parse_platform(&r.try_get::<String, _>("platform")?)?,
            access_token: r.try_get::<String, _>("access_token")?,
            refresh_token: r.try_get::<Option<String>, _>("refresh_token")?,
            expires_at: r.try_get::<Option<DateTime<Utc>>, _>("expires_at")?,
        }))
    }

    async fn save(&self, record: &CredentialRecord) -> Result<()> {
        sqlx::query(
            r#"
            insert into platform_credentials (
              user_id, platform, access_token, refresh_token, expires_at, updated_at
            ) values ($1, $2, $3, $4, $5, now())
            on conflict (user_id, platform) do update set
              access_token  = excluded.access_token,
              refresh_token = excluded.refresh_token,
              expires_at    = excluded.expires_at,
              updated_at    = now()
            "#,
        )
        .bind(&record.user_id)
        .bind(record.platform.as_str())
        .bind(&record.access_token)
        .bind(&record.refresh_token)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await
        .context("save platform_credentials failed")?;
        Ok(())
    }
}
