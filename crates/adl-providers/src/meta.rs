//! Meta (Facebook) Ads Insights, campaign level with a country breakdown.

use adl_schemas::{normalize_country_code, CanonicalRow, Platform, UNKNOWN_COUNTRY};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    account_currency_or_default, check_range, count_field, finalize_rows, money_field,
    parse_report_date, read_json, AdapterCredentials, AdapterSettings, FetchOutcome,
    PlatformAdapter, ProviderError,
};

pub const DEFAULT_BASE_URL: &str = "https://graph.facebook.com/v19.0";

const PAGE_LIMIT: &str = "500";
const MAX_PAGES: usize = 500;
const PURCHASE_ACTIONS: &[&str] = &["purchase", "omni_purchase", "offsite_conversion.fb_pixel_purchase"];

#[derive(Debug, Clone)]
pub struct MetaAdsAdapter {
    http: reqwest::Client,
    base_url: String,
    max_pages: usize,
}

impl MetaAdsAdapter {
    pub fn new(settings: &AdapterSettings) -> Result<Self, ProviderError> {
        Ok(Self {
            http: settings.client()?,
            base_url: settings.base_or(DEFAULT_BASE_URL),
            max_pages: settings.pages_or(MAX_PAGES),
        })
    }

    fn act(account_id: &str) -> String {
        if account_id.starts_with("act_") {
            account_id.to_string()
        } else {
            format!("act_{account_id}")
        }
    }

    async fn account_currency(&self, creds: &AdapterCredentials, account_id: &str) -> String {
        let url = format!("{}/{}", self.base_url, Self::act(account_id));
        let res = async {
            let resp = self
                .http
                .get(url)
                .bearer_auth(&creds.access_token)
                .query(&[("fields", "currency")])
                .send()
                .await
                .map_err(ProviderError::transport)?;
            read_json::<AccountResponse>(Platform::MetaAds, resp).await
        }
        .await;

        let raw = match res {
            Ok(a) => a.currency,
            Err(e) => {
                warn!(platform = %Platform::MetaAds, error = %e, "currency lookup failed");
                None
            }
        };
        account_currency_or_default(Platform::MetaAds, raw.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InsightsResponse {
    #[serde(default)]
    data: Vec<InsightRow>,
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    cursors: Option<Cursors>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Cursors {
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InsightRow {
    campaign_id: Option<String>,
    campaign_name: Option<String>,
    country: Option<String>,
    date_start: String,
    #[serde(default)]
    spend: String,
    impressions: Option<Value>,
    clicks: Option<Value>,
    #[serde(default)]
    actions: Vec<ActionStat>,
    #[serde(default)]
    action_values: Vec<ActionStat>,
}

#[derive(Debug, Deserialize)]
struct ActionStat {
    action_type: String,
    value: Value,
}

/// First matching purchase action; Meta reports the same purchase under
/// several overlapping action types.
fn purchase_stat(stats: &[ActionStat]) -> Option<&Value> {
    PURCHASE_ACTIONS
        .iter()
        .find_map(|t| stats.iter().find(|s| s.action_type == *t))
        .map(|s| &s.value)
}

fn to_row(r: InsightRow, currency: &str) -> Result<Option<CanonicalRow>, ProviderError> {
    let p = Platform::MetaAds;
    let Some(campaign_id) = r.campaign_id.filter(|c| !c.is_empty()) else {
        warn!(platform = %p, "insight row without campaign_id dropped");
        return Ok(None);
    };

    let country = r
        .country
        .as_deref()
        .and_then(normalize_country_code)
        .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string());

    let mut row = CanonicalRow::new(p, campaign_id, parse_report_date(p, &r.date_start)?);
    row.campaign_name = r.campaign_name.filter(|n| !n.is_empty());
    row.country_code = Some(country);
    row.currency_code = currency.to_string();
    row.spend = money_field(p, "spend", &r.spend);
    row.impressions = count_field(p, "impressions", r.impressions.as_ref());
    row.clicks = count_field(p, "clicks", r.clicks.as_ref());
    row.purchases = count_field(p, "actions.purchase", purchase_stat(&r.actions));
    row.revenue = match purchase_stat(&r.action_values) {
        Some(Value::String(s)) => money_field(p, "action_values.purchase", s),
        Some(other) => crate::float_money_field(p, "action_values.purchase", Some(other)),
        None => adl_schemas::Micros::ZERO,
    };
    Ok(Some(row))
}

#[async_trait::async_trait]
impl PlatformAdapter for MetaAdsAdapter {
    fn platform(&self) -> Platform {
        Platform::MetaAds
    }

    async fn fetch_rows(
        &self,
        creds: &AdapterCredentials,
        account_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchOutcome, ProviderError> {
        check_range(start, end)?;
        let account_currency = self.account_currency(creds, account_id).await;

        let url = format!("{}/{}/insights", self.base_url, Self::act(account_id));
        let time_range = serde_json::json!({
            "since": start.format("%Y-%m-%d").to_string(),
            "until": end.format("%Y-%m-%d").to_string(),
        })
        .to_string();

        let mut raw_rows = Vec::new();
        let mut after: Option<String> = None;
        let mut page = 0;
        loop {
            if page == self.max_pages {
                return Err(ProviderError::PaginationLimit { pages: page });
            }
            let mut query: Vec<(&str, &str)> = vec![
                ("level", "campaign"),
                ("breakdowns", "country"),
                ("time_increment", "1"),
                ("time_range", time_range.as_str()),
                ("fields", "campaign_id,campaign_name,spend,impressions,clicks,actions,action_values"),
                ("limit", PAGE_LIMIT),
            ];
            if let Some(a) = after.as_deref() {
                query.push(("after", a));
            }

            let resp = self
                .http
                .get(&url)
                .bearer_auth(&creds.access_token)
                .query(&query)
                .send()
                .await
                .map_err(ProviderError::transport)?;
            let body: InsightsResponse = read_json(Platform::MetaAds, resp).await?;
            debug!(platform = %Platform::MetaAds, page, results = body.data.len(), "page fetched");

            for r in body.data {
                if let Some(row) = to_row(r, &account_currency)? {
                    raw_rows.push(row);
                }
            }

            let next_cursor = body
                .paging
                .filter(|p| p.next.is_some())
                .and_then(|p| p.cursors)
                .and_then(|c| c.after)
                .filter(|a| !a.is_empty());
            match next_cursor {
                Some(a) => after = Some(a),
                None => break,
            }
            page += 1;
        }

        let (rows, skipped) = finalize_rows(raw_rows);
        Ok(FetchOutcome {
            account_currency,
            rows,
            skipped,
        })
    }
}
