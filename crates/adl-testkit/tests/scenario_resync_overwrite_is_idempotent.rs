//! A full resync of the same window, run twice, leaves both aggregate tables
//! exactly as the first run did, `cached_at` included.

use std::sync::Arc;

use adl_runtime::{AdapterRegistry, SyncRequest, SyncRunner};
use adl_schemas::{CanonicalRow, Micros, Platform};
use adl_testkit::{day, fallback_only_fx, Fixture, ScriptedAdapter};
use chrono::Duration;

fn meta_row(campaign: &str, country: &str, spend_units: i64, clicks: i64) -> CanonicalRow {
    let mut r = CanonicalRow::new(Platform::MetaAds, campaign, day("2026-02-01"));
    r.campaign_name = Some(format!("{campaign} name"));
    r.country_code = Some(country.to_string());
    r.spend = Micros::from_units(spend_units);
    r.clicks = clicks;
    r.currency_code = "USD".into();
    r
}

#[tokio::test]
async fn overwrite_twice_yields_identical_aggregates() {
    let fx = Fixture::new();
    fx.connect("u1", Platform::MetaAds, "meta-token", Duration::hours(2));

    let adapter = Arc::new(ScriptedAdapter::new(
        Platform::MetaAds,
        "USD",
        vec![
            meta_row("c1", "US", 10, 3),
            meta_row("c2", "US", 15, 1),
            meta_row("c1", "DE", 4, 0),
        ],
    ));
    let runner = SyncRunner::new(
        fx.credential_manager.clone(),
        AdapterRegistry::new().with(adapter.clone()),
        Arc::new(fallback_only_fx()),
        fx.merge.clone(),
    );
    let req = SyncRequest {
        user_id: "u1".into(),
        platform: Platform::MetaAds,
        account_id: "act_1".into(),
        start: day("2026-02-01"),
        end: day("2026-02-01"),
    };

    let first = runner.run(&req).await.unwrap();
    assert_eq!(first.rows_fetched, 3);
    assert_eq!(first.merge.stats.country_inserted, 2);
    assert_eq!(first.merge.stats.campaign_inserted, 3);
    let country_before = fx.aggregates.all_country_rows();
    let campaign_before = fx.aggregates.all_campaign_rows();

    fx.clock.advance(Duration::minutes(30));
    let second = runner.run(&req).await.unwrap();
    assert_eq!(second.merge.stats.country_updated, 2);
    assert_eq!(second.merge.stats.campaign_updated, 3);

    assert_eq!(fx.aggregates.all_country_rows(), country_before);
    assert_eq!(fx.aggregates.all_campaign_rows(), campaign_before);

    let us = country_before
        .iter()
        .find(|r| r.key.country_code == "US")
        .unwrap();
    assert_eq!(us.metrics.spend, Micros::from_units(25));
    assert_eq!(us.metrics.clicks, 4);
    assert_eq!(adapter.last_token().as_deref(), Some("meta-token"));
}

#[tokio::test]
async fn changed_provider_totals_replace_stored_values() {
    let fx = Fixture::new();
    fx.connect("u1", Platform::MetaAds, "meta-token", Duration::hours(2));
    let adapter = Arc::new(ScriptedAdapter::new(
        Platform::MetaAds,
        "USD",
        vec![meta_row("c1", "US", 10, 3)],
    ));
    let runner = SyncRunner::new(
        fx.credential_manager.clone(),
        AdapterRegistry::new().with(adapter.clone()),
        Arc::new(fallback_only_fx()),
        fx.merge.clone(),
    );
    let req = SyncRequest {
        user_id: "u1".into(),
        platform: Platform::MetaAds,
        account_id: "act_1".into(),
        start: day("2026-02-01"),
        end: day("2026-02-01"),
    };

    runner.run(&req).await.unwrap();
    let t1 = fx.aggregates.all_country_rows()[0].cached_at;

    fx.clock.advance(Duration::hours(1));
    adapter.set_rows(vec![meta_row("c1", "US", 12, 3)]);
    runner.run(&req).await.unwrap();

    let rows = fx.aggregates.all_country_rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].metrics.spend, Micros::from_units(12));
    assert!(rows[0].cached_at > t1);
}
