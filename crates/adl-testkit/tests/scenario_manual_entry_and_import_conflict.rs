//! Manual corrections overwrite exactly one key; "add to existing" is
//! pre-summed by the caller.

use adl_merge::{AggregateStore, ManualTarget, MergeError};
use adl_runtime::{apply_manual_entry, ImportChoice};
use adl_schemas::{CanonicalRow, CountryKey, MergeMode, Metrics, Micros, Platform};
use adl_testkit::{day, Fixture};

fn us_key(date: &str) -> CountryKey {
    CountryKey {
        user_id: "u1".into(),
        country_code: "US".into(),
        date: day(date),
        platform: Platform::Manual,
    }
}

fn spend(units: i64) -> Metrics {
    Metrics {
        spend: Micros::from_units(units),
        ..Metrics::ZERO
    }
}

async fn seed(fx: &Fixture) {
    let rows: Vec<CanonicalRow> = ["2026-02-01", "2026-02-02"]
        .iter()
        .map(|d| {
            let mut r = CanonicalRow::new(Platform::Manual, "import", day(d));
            r.country_code = Some("US".into());
            r.spend = Micros::from_units(50);
            r
        })
        .collect();
    fx.merge.merge_rows("u1", &rows, MergeMode::Overwrite).await.unwrap();
}

#[tokio::test]
async fn replace_touches_only_the_target_key() {
    let fx = Fixture::new();
    seed(&fx).await;

    apply_manual_entry(&fx.merge, "u1", ManualTarget::Country(us_key("2026-02-01")), spend(70), ImportChoice::Replace)
        .await
        .unwrap();

    let day1 = fx.aggregates.country_row(&us_key("2026-02-01")).await.unwrap().unwrap();
    let day2 = fx.aggregates.country_row(&us_key("2026-02-02")).await.unwrap().unwrap();
    assert_eq!(day1.metrics.spend, Micros::from_units(70));
    assert_eq!(day2.metrics.spend, Micros::from_units(50));
}

#[tokio::test]
async fn add_to_existing_sums_with_stored_value() {
    let fx = Fixture::new();
    seed(&fx).await;

    apply_manual_entry(
        &fx.merge,
        "u1",
        ManualTarget::Country(us_key("2026-02-01")),
        spend(20),
        ImportChoice::AddToExisting,
    )
    .await
    .unwrap();

    let day1 = fx.aggregates.country_row(&us_key("2026-02-01")).await.unwrap().unwrap();
    assert_eq!(day1.metrics.spend, Micros::from_units(70));
}

#[tokio::test]
async fn add_to_missing_key_writes_the_incoming_value() {
    let fx = Fixture::new();
    apply_manual_entry(
        &fx.merge,
        "u1",
        ManualTarget::Country(us_key("2026-03-01")),
        spend(5),
        ImportChoice::AddToExisting,
    )
    .await
    .unwrap();
    let row = fx.aggregates.country_row(&us_key("2026-03-01")).await.unwrap().unwrap();
    assert_eq!(row.metrics.spend, Micros::from_units(5));
}

#[tokio::test]
async fn zero_correction_is_written() {
    let fx = Fixture::new();
    seed(&fx).await;
    apply_manual_entry(&fx.merge, "u1", ManualTarget::Country(us_key("2026-02-01")), Metrics::ZERO, ImportChoice::Replace)
        .await
        .unwrap();
    let day1 = fx.aggregates.country_row(&us_key("2026-02-01")).await.unwrap().unwrap();
    assert!(day1.metrics.is_zero());
}

#[tokio::test]
async fn negative_or_foreign_entries_are_rejected() {
    let fx = Fixture::new();
    let negative = Metrics {
        clicks: -1,
        ..Metrics::ZERO
    };
    let err = apply_manual_entry(&fx.merge, "u1", ManualTarget::Country(us_key("2026-02-01")), negative, ImportChoice::Replace)
        .await
        .unwrap_err();
    assert!(matches!(err, MergeError::InvalidEntry(_)));

    let mut other_user = us_key("2026-02-01");
    other_user.user_id = "u2".into();
    let err = apply_manual_entry(&fx.merge, "u1", ManualTarget::Country(other_user), spend(1), ImportChoice::Replace)
        .await
        .unwrap_err();
    assert!(matches!(err, MergeError::InvalidEntry(_)));
    assert_eq!(fx.aggregates.country_len(), 0);
}
