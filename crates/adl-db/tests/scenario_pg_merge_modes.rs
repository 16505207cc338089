//! Overwrite/accumulate semantics against a live Postgres.
//!
//! DB-backed tests, skipped if ADL_DATABASE_URL is not set. Every test uses a
//! fresh random user id so runs never collide.

use std::sync::Arc;

use adl_db::PgAggregateStore;
use adl_merge::{AggregateStore, MergeEngine};
use adl_schemas::{CanonicalRow, CountryKey, MergeMode, Micros, Platform};
use chrono::NaiveDate;

async fn store() -> anyhow::Result<Option<PgAggregateStore>> {
    let url = match std::env::var(adl_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: ADL_DATABASE_URL not set");
            return Ok(None);
        }
    };
    let pool = adl_db::connect(&url).await?;
    adl_db::migrate(&pool).await?;
    Ok(Some(PgAggregateStore::new(pool)))
}

fn row(purchases: i64, revenue_units: i64) -> CanonicalRow {
    let mut r = CanonicalRow::new(
        Platform::RevenueCat,
        "pro_monthly",
        NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
    );
    r.country_code = Some("NO".into());
    r.purchases = purchases;
    r.revenue = Micros::from_units(revenue_units);
    r
}

#[tokio::test]
async fn overwrite_twice_leaves_the_same_value() -> anyhow::Result<()> {
    let Some(store) = store().await? else {
        return Ok(());
    };
    let user = format!("test-{}", uuid::Uuid::new_v4());
    let engine = MergeEngine::new(Arc::new(store.clone()));

    let rows = vec![row(2, 20)];
    let first = engine.merge_rows(&user, &rows, MergeMode::Overwrite).await?;
    assert_eq!(first.stats.country_inserted, 1);
    let key = CountryKey {
        user_id: user.clone(),
        country_code: "NO".into(),
        date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
        platform: Platform::RevenueCat,
    };
    let before = store.country_row(&key).await?.expect("row after first merge");

    let second = engine.merge_rows(&user, &rows, MergeMode::Overwrite).await?;
    assert_eq!(second.stats.country_updated, 1);
    let after = store.country_row(&key).await?.expect("row after second merge");

    assert_eq!(before.metrics, after.metrics);
    assert_eq!(before.cached_at, after.cached_at, "unchanged overwrite keeps cached_at");
    Ok(())
}

#[tokio::test]
async fn accumulate_adds_to_existing_value() -> anyhow::Result<()> {
    let Some(store) = store().await? else {
        return Ok(());
    };
    let user = format!("test-{}", uuid::Uuid::new_v4());
    let engine = MergeEngine::new(Arc::new(store.clone()));

    engine.merge_rows(&user, &[row(1, 10)], MergeMode::Accumulate).await?;
    engine.merge_rows(&user, &[row(1, 5)], MergeMode::Accumulate).await?;

    let rows = store
        .campaign_rows(
            &user,
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
        )
        .await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].metrics.purchases, 2);
    assert_eq!(rows[0].metrics.revenue, Micros::from_units(15));
    Ok(())
}

#[tokio::test]
async fn accumulate_saturates_like_in_memory_sums() -> anyhow::Result<()> {
    let Some(store) = store().await? else {
        return Ok(());
    };
    let user = format!("test-{}", uuid::Uuid::new_v4());
    let engine = MergeEngine::new(Arc::new(store.clone()));

    let mut near_max = row(i64::MAX - 1, 0);
    near_max.revenue = Micros::new(i64::MAX - 1);
    engine.merge_rows(&user, &[near_max], MergeMode::Accumulate).await?;
    engine.merge_rows(&user, &[row(5, 5)], MergeMode::Accumulate).await?;

    let key = CountryKey {
        user_id: user.clone(),
        country_code: "NO".into(),
        date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
        platform: Platform::RevenueCat,
    };
    let stored = store.country_row(&key).await?.expect("accumulated row");
    let expected = row(i64::MAX - 1, 0)
        .metrics()
        .plus(&row(5, 5).metrics());
    assert_eq!(stored.metrics.purchases, i64::MAX);
    assert_eq!(stored.metrics.purchases, expected.purchases);
    assert_eq!(stored.metrics.revenue, Micros::new(i64::MAX));

    let campaigns = store
        .campaign_rows(
            &user,
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
        )
        .await?;
    assert_eq!(campaigns[0].metrics.purchases, i64::MAX);
    Ok(())
}
