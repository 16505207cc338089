//! Postgres persistence for aggregates, attribution settings and provider
//! credentials.

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

mod aggregates;
mod attribution;
mod credentials;

pub use aggregates::PgAggregateStore;
pub use attribution::PgAttributionStore;
pub use credentials::PgCredentialStore;

pub const ENV_DB_URL: &str = "ADL_DATABASE_URL";

/// Connect to Postgres using ADL_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_aggregate_tables: bool,
}

/// Connectivity plus schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (tables,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        select count(*)::bigint
        from information_schema.tables
        where table_schema = 'public'
          and table_name in ('country_daily_aggregates', 'campaign_daily_aggregates')
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_aggregate_tables: tables == 2,
    })
}

fn parse_platform(raw: &str) -> Result<adl_schemas::Platform> {
    raw.parse()
        .with_context(|| format!("stored platform '{raw}' is not recognised"))
}
