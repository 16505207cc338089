use std::collections::{BTreeMap, BTreeSet, HashMap};

use adl_schemas::{
    AttributionMode, CampaignAttributionSetting, CampaignDailyAggregate, CampaignRef,
    CountryDailyAggregate, Platform,
};
use chrono::NaiveDate;

use crate::types::{
    CountryViewEntry, MisconfigReason, Misconfigured, NeedsDetail, RollupKey, RollupReport,
};

/// Effective mode for one campaign. An absent setting reads as `none`; a
/// `single` setting without a usable country degrades to `none`.
enum Effective<'a> {
    Exclude,
    Single(&'a str),
    Multiple,
}

fn effective<'a>(setting: Option<&'a CampaignAttributionSetting>) -> (Effective<'a>, bool) {
    match setting {
        None => (Effective::Exclude, false),
        Some(s) => match s.mode {
            AttributionMode::None => (Effective::Exclude, false),
            AttributionMode::Multiple => (Effective::Multiple, false),
            AttributionMode::Single => match s.country_code.as_deref().map(str::trim) {
                Some(c) if !c.is_empty() => (Effective::Single(c), false),
                _ => (Effective::Exclude, true),
            },
        },
    }
}

/// Roll campaign rows up to country level under the current settings.
/// Stored rows are read only; nothing is rewritten.
pub fn resolve_rollup(
    settings: &[CampaignAttributionSetting],
    rows: &[CampaignDailyAggregate],
) -> RollupReport {
    let by_campaign: HashMap<&CampaignRef, &CampaignAttributionSetting> =
        settings.iter().map(|s| (&s.campaign, s)).collect();

    let mut report = RollupReport::default();
    let mut unattributed: BTreeSet<CampaignRef> = BTreeSet::new();
    let mut misconfigured: BTreeSet<CampaignRef> = BTreeSet::new();

    for row in rows {
        let campaign = CampaignRef {
            user_id: row.key.user_id.clone(),
            platform: row.key.platform,
            campaign_id: row.key.campaign_id.clone(),
        };
        let (mode, is_misconfigured) = effective(by_campaign.get(&campaign).copied());
        if is_misconfigured {
            misconfigured.insert(campaign.clone());
        }

        let country = match mode {
            Effective::Exclude => {
                unattributed.insert(campaign);
                continue;
            }
            Effective::Single(c) => c.to_ascii_uppercase(),
            Effective::Multiple if row.key.country_code.is_empty() => {
                report.needs_detail.push(NeedsDetail {
                    campaign,
                    date: row.key.date,
                    metrics: row.metrics,
                });
                continue;
            }
            Effective::Multiple => row.key.country_code.clone(),
        };

        let key = RollupKey {
            country_code: country,
            date: row.key.date,
            platform: row.key.platform,
        };
        if row.key.country_code.is_empty() {
            *report.unlocated.entry(key.clone()).or_default() += row.metrics;
        }
        *report.contributions.entry(key).or_default() += row.metrics;
    }

    report.unattributed = unattributed.into_iter().collect();
    report.misconfigured = misconfigured
        .into_iter()
        .map(|campaign| Misconfigured {
            campaign,
            reason: MisconfigReason::SingleWithoutCountry,
        })
        .collect();
    report
}

/// Country view combining direct country aggregates with campaign-derived
/// contributions.
///
/// Campaign rows that carried their own country were also written to the
/// country table. Where a (date, platform) has direct rows, only the
/// contribution from country-less campaign rows is added on top, so the same
/// spend is not counted twice.
pub fn country_view(
    direct: &[CountryDailyAggregate],
    report: &RollupReport,
) -> BTreeMap<RollupKey, CountryViewEntry> {
    let mut out: BTreeMap<RollupKey, CountryViewEntry> = BTreeMap::new();
    let mut direct_scopes: BTreeSet<(NaiveDate, Platform)> = BTreeSet::new();

    for agg in direct {
        direct_scopes.insert((agg.key.date, agg.key.platform));
        let key = RollupKey {
            country_code: agg.key.country_code.clone(),
            date: agg.key.date,
            platform: agg.key.platform,
        };
        out.entry(key).or_default().direct += agg.metrics;
    }

    for (key, metrics) in &report.contributions {
        let attributed = if direct_scopes.contains(&(key.date, key.platform)) {
            match report.unlocated.get(key) {
                Some(m) => *m,
                None => continue,
            }
        } else {
            *metrics
        };
        out.entry(key.clone()).or_default().attributed += attributed;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use adl_schemas::{CampaignKey, CountryKey, Metrics, Micros};
    use chrono::{TimeZone, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, d).unwrap()
    }

    fn spend(units: i64) -> Metrics {
        Metrics {
            spend: Micros::from_units(units),
            ..Metrics::ZERO
        }
    }

    fn camp_row(platform: Platform, campaign: &str, country: &str, units: i64) -> CampaignDailyAggregate {
        CampaignDailyAggregate {
            key: CampaignKey {
                user_id: "u1".into(),
                platform,
                campaign_id: campaign.into(),
                country_code: country.into(),
                date: day(1),
            },
            campaign_name: None,
            metrics: spend(units),
        }
    }

    fn setting(platform: Platform, campaign: &str, mode: AttributionMode, country: Option<&str>) -> CampaignAttributionSetting {
        CampaignAttributionSetting {
            campaign: CampaignRef::new("u1", platform, campaign),
            mode,
            country_code: country.map(str::to_string),
        }
    }

    #[test]
    fn single_overrides_row_country() {
        let rows = vec![camp_row(Platform::TikTokAds, "c1", "", 100), camp_row(Platform::TikTokAds, "c1", "FR", 5)];
        let settings = vec![setting(Platform::TikTokAds, "c1", AttributionMode::Single, Some("DE"))];
        let r = resolve_rollup(&settings, &rows);

        assert_eq!(r.contributions.len(), 1);
        assert_eq!(r.contribution("DE", day(1), Platform::TikTokAds), Some(&spend(105)));
        assert!(r.needs_detail.is_empty());
    }

    #[test]
    fn multiple_flags_entries_without_country() {
        let rows = vec![camp_row(Platform::MetaAds, "c1", "", 7), camp_row(Platform::MetaAds, "c1", "US", 3)];
        let settings = vec![setting(Platform::MetaAds, "c1", AttributionMode::Multiple, None)];
        let r = resolve_rollup(&settings, &rows);

        assert_eq!(r.needs_detail.len(), 1);
        assert_eq!(r.needs_detail[0].metrics, spend(7));
        assert_eq!(r.contribution("US", day(1), Platform::MetaAds), Some(&spend(3)));
    }

    #[test]
    fn absent_setting_reads_as_none() {
        let rows = vec![camp_row(Platform::TikTokAds, "c1", "", 100)];
        let r = resolve_rollup(&[], &rows);
        assert!(r.contributions.is_empty());
        assert_eq!(r.unattributed, vec![CampaignRef::new("u1", Platform::TikTokAds, "c1")]);
    }

    #[test]
    fn single_without_country_is_excluded_and_reported() {
        let rows = vec![camp_row(Platform::TikTokAds, "c1", "", 100)];
        let settings = vec![setting(Platform::TikTokAds, "c1", AttributionMode::Single, Some(" "))];
        let r = resolve_rollup(&settings, &rows);
        assert!(r.contributions.is_empty());
        assert_eq!(r.misconfigured.len(), 1);
        assert_eq!(r.misconfigured[0].reason, MisconfigReason::SingleWithoutCountry);
    }

    #[test]
    fn settings_for_other_users_do_not_apply() {
        let rows = vec![camp_row(Platform::TikTokAds, "c1", "", 100)];
        let mut s = setting(Platform::TikTokAds, "c1", AttributionMode::Single, Some("US"));
        s.campaign.user_id = "u2".into();
        assert!(resolve_rollup(&[s], &rows).contributions.is_empty());
    }

    #[test]
    fn country_view_does_not_double_count_geo_platforms() {
        let direct = vec![CountryDailyAggregate {
            key: CountryKey {
                user_id: "u1".into(),
                country_code: "US".into(),
                date: day(1),
                platform: Platform::MetaAds,
            },
            metrics: spend(10),
            cached_at: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
        }];
        let rows = vec![camp_row(Platform::MetaAds, "m1", "US", 10), camp_row(Platform::TikTokAds, "t1", "", 4)];
        let settings = vec![
            setting(Platform::MetaAds, "m1", AttributionMode::Multiple, None),
            setting(Platform::TikTokAds, "t1", AttributionMode::Single, Some("US")),
        ];
        let view = country_view(&direct, &resolve_rollup(&settings, &rows));

        let meta = view
            .get(&RollupKey { country_code: "US".into(), date: day(1), platform: Platform::MetaAds })
            .unwrap();
        assert_eq!(meta.total(), spend(10));
        let tiktok = view
            .get(&RollupKey { country_code: "US".into(), date: day(1), platform: Platform::TikTokAds })
            .unwrap();
        assert_eq!(tiktok.direct, Metrics::ZERO);
        assert_eq!(tiktok.attributed, spend(4));
    }

    #[test]
    fn country_view_keeps_unlocated_rows_on_days_with_direct_rows() {
        let direct = vec![CountryDailyAggregate {
            key: CountryKey {
                user_id: "u1".into(),
                country_code: "US".into(),
                date: day(1),
                platform: Platform::Stripe,
            },
            metrics: spend(10),
            cached_at: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
        }];
        // "spring" has one charge without a country and one in US; the US one
        // already sits in the direct row above.
        let rows = vec![camp_row(Platform::Stripe, "spring", "", 50), camp_row(Platform::Stripe, "spring", "US", 10)];
        let settings = vec![setting(Platform::Stripe, "spring", AttributionMode::Single, Some("DE"))];
        let report = resolve_rollup(&settings, &rows);
        assert_eq!(report.contribution("DE", day(1), Platform::Stripe), Some(&spend(60)));

        let view = country_view(&direct, &report);
        let de = view
            .get(&RollupKey { country_code: "DE".into(), date: day(1), platform: Platform::Stripe })
            .unwrap();
        assert_eq!(de.direct, Metrics::ZERO);
        assert_eq!(de.attributed, spend(50));

        let total: Micros = view.values().map(|e| e.total().spend).sum();
        assert_eq!(total, Micros::from_units(60));
    }
}
