//! Attribution modes over stored campaign rows.

use adl_attribution::AttributionStore;
use adl_runtime::rollup_for_user;
use adl_schemas::{
    AttributionMode, CampaignAttributionSetting, CampaignRef, CanonicalRow, MergeMode, Micros,
    Platform,
};
use adl_testkit::{day, Fixture};

fn row(platform: Platform, campaign: &str, country: Option<&str>, spend: i64) -> CanonicalRow {
    let mut r = CanonicalRow::new(platform, campaign, day("2026-02-01"));
    r.country_code = country.map(str::to_string);
    r.spend = Micros::from_units(spend);
    r
}

async fn set(fx: &Fixture, platform: Platform, campaign: &str, mode: AttributionMode, country: Option<&str>) {
    fx.attribution
        .put(&CampaignAttributionSetting {
            campaign: CampaignRef::new("u1", platform, campaign),
            mode,
            country_code: country.map(str::to_string),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn single_overrides_the_rows_own_country() {
    let fx = Fixture::new();
    fx.merge
        .merge_rows("u1", &[row(Platform::TikTokAds, "c1", None, 40)], MergeMode::Overwrite)
        .await
        .unwrap();
    set(&fx, Platform::TikTokAds, "c1", AttributionMode::Single, Some("DE")).await;

    let r = rollup_for_user(fx.aggregates.as_ref(), fx.attribution.as_ref(), "u1", day("2026-02-01"), day("2026-02-01"))
        .await
        .unwrap();
    assert_eq!(
        r.report.contribution("DE", day("2026-02-01"), Platform::TikTokAds).map(|m| m.spend),
        Some(Micros::from_units(40))
    );
    assert!(r.report.contribution("", day("2026-02-01"), Platform::TikTokAds).is_none());
}

#[tokio::test]
async fn multiple_flags_rows_without_country() {
    let fx = Fixture::new();
    fx.merge
        .merge_rows(
            "u1",
            &[row(Platform::Manual, "m1", None, 9), row(Platform::Manual, "m1", Some("FR"), 3)],
            MergeMode::Overwrite,
        )
        .await
        .unwrap();
    set(&fx, Platform::Manual, "m1", AttributionMode::Multiple, None).await;

    let r = rollup_for_user(fx.aggregates.as_ref(), fx.attribution.as_ref(), "u1", day("2026-02-01"), day("2026-02-01"))
        .await
        .unwrap();
    assert_eq!(r.report.needs_detail.len(), 1);
    assert_eq!(r.report.needs_detail[0].campaign.campaign_id, "m1");
    assert_eq!(r.report.needs_detail[0].metrics.spend, Micros::from_units(9));
    assert_eq!(
        r.report.contribution("FR", day("2026-02-01"), Platform::Manual).map(|m| m.spend),
        Some(Micros::from_units(3))
    );
}

#[tokio::test]
async fn switching_back_to_none_removes_the_contribution() {
    let fx = Fixture::new();
    fx.merge
        .merge_rows("u1", &[row(Platform::TikTokAds, "c1", None, 40)], MergeMode::Overwrite)
        .await
        .unwrap();
    set(&fx, Platform::TikTokAds, "c1", AttributionMode::Single, Some("DE")).await;
    set(&fx, Platform::TikTokAds, "c1", AttributionMode::None, None).await;

    let r = rollup_for_user(fx.aggregates.as_ref(), fx.attribution.as_ref(), "u1", day("2026-02-01"), day("2026-02-01"))
        .await
        .unwrap();
    assert!(r.report.contributions.is_empty());
    assert_eq!(fx.aggregates.campaign_len(), 1);
}

#[tokio::test]
async fn inverted_window_is_rejected() {
    let fx = Fixture::new();
    let res = rollup_for_user(fx.aggregates.as_ref(), fx.attribution.as_ref(), "u1", day("2026-02-02"), day("2026-02-01")).await;
    assert!(res.is_err());
}
