//! Google Ads reporting via `googleAds:search` (GAQL over REST).

use std::sync::Arc;

use adl_schemas::{CanonicalRow, Platform};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{
    account_currency_or_default, check_range, count_field, finalize_rows, float_money_field,
    parse_report_date, read_json, AdapterCredentials, AdapterSettings, CountryMapping,
    FetchOutcome, PlatformAdapter, ProviderError,
};

pub const DEFAULT_BASE_URL: &str = "https://googleads.googleapis.com/v17";

/// Safety valve against a provider that keeps returning the same token.
const MAX_PAGES: usize = 500;

#[derive(Debug, Clone)]
pub struct GoogleAdsAdapter {
    http: reqwest::Client,
    base_url: String,
    mapping: Arc<CountryMapping>,
    max_pages: usize,
}

impl GoogleAdsAdapter {
    pub fn new(settings: &AdapterSettings, mapping: Arc<CountryMapping>) -> Result<Self, ProviderError> {
        Ok(Self {
            http: settings.client()?,
            base_url: settings.base_or(DEFAULT_BASE_URL),
            mapping,
            max_pages: settings.pages_or(MAX_PAGES),
        })
    }

    fn search_url(&self, customer_id: &str) -> String {
        format!("{}/customers/{}/googleAds:search", self.base_url, customer_id.replace('-', ""))
    }

    async fn search(
        &self,
        creds: &AdapterCredentials,
        customer_id: &str,
        query: &str,
        page_token: Option<&str>,
    ) -> Result<SearchResponse, ProviderError> {
        let developer_token = creds
            .developer_token
            .as_deref()
            .ok_or_else(|| ProviderError::Config("google ads requires a developer token".into()))?;

        let mut body = json!({ "query": query });
        if let Some(t) = page_token {
            body["pageToken"] = Value::String(t.to_string());
        }

        let resp = self
            .http
            .post(self.search_url(customer_id))
            .bearer_auth(&creds.access_token)
            .header("developer-token", developer_token)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::transport)?;
        read_json(Platform::GoogleAds, resp).await
    }

    async fn account_currency(&self, creds: &AdapterCredentials, customer_id: &str) -> String {
        let q = "SELECT customer.currency_code FROM customer LIMIT 1";
        let raw = match self.search(creds, customer_id, q, None).await {
            Ok(resp) => resp
                .results
                .into_iter()
                .next()
                .and_then(|r| r.customer)
                .and_then(|c| c.currency_code),
            Err(e) => {
                warn!(platform = %Platform::GoogleAds, error = %e, "currency lookup failed");
                None
            }
        };
        account_currency_or_default(Platform::GoogleAds, raw.as_deref())
    }
}

fn report_query(start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "SELECT campaign.id, campaign.name, geographic_view.country_criterion_id, segments.date, \
         metrics.cost_micros, metrics.impressions, metrics.clicks, metrics.conversions, \
         metrics.conversions_value FROM geographic_view \
         WHERE segments.date BETWEEN '{}' AND '{}'",
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchRow>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRow {
    customer: Option<CustomerField>,
    campaign: Option<CampaignField>,
    geographic_view: Option<GeoField>,
    segments: Option<SegmentsField>,
    #[serde(default)]
    metrics: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomerField {
    currency_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CampaignField {
    /// int64 fields are JSON strings in the REST surface.
    id: Value,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeoField {
    country_criterion_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SegmentsField {
    date: String,
}

fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl GoogleAdsAdapter {
    fn to_row(&self, r: SearchRow, currency: &str) -> Result<Option<CanonicalRow>, ProviderError> {
        let p = Platform::GoogleAds;
        let Some(campaign) = r.campaign else {
            return Ok(None);
        };
        let Some(campaign_id) = id_string(&campaign.id) else {
            warn!(platform = %p, "row without campaign id dropped");
            return Ok(None);
        };
        let Some(segments) = r.segments else {
            return Err(ProviderError::Decode("google ads row without segments.date".into()));
        };

        let country = r
            .geographic_view
            .and_then(|g| g.country_criterion_id)
            .and_then(|v| id_string(&v))
            .map(|id| self.mapping.lookup(&id))
            .unwrap_or_default();

        let mut row = CanonicalRow::new(p, campaign_id, parse_report_date(p, &segments.date)?);
        row.campaign_name = campaign.name.filter(|n| !n.is_empty());
        row.country_code = Some(country);
        row.currency_code = currency.to_string();
        row.spend = adl_schemas::Micros::new(count_field(p, "costMicros", r.metrics.get("costMicros")));
        row.impressions = count_field(p, "impressions", r.metrics.get("impressions"));
        row.clicks = count_field(p, "clicks", r.metrics.get("clicks"));
        row.purchases = count_field(p, "conversions", r.metrics.get("conversions"));
        row.revenue = float_money_field(p, "conversionsValue", r.metrics.get("conversionsValue"));
        Ok(Some(row))
    }
}

#[async_trait::async_trait]
impl PlatformAdapter for GoogleAdsAdapter {
    fn platform(&self) -> Platform {
        Platform::GoogleAds
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
        let query = report_query(start, end);

        let mut raw_rows = Vec::new();
        let mut page_token: Option<String> = None;
        let mut page = 0;
        loop {
            if page == self.max_pages {
                return Err(ProviderError::PaginationLimit { pages: page });
            }
            let resp = self
                .search(creds, account_id, &query, page_token.as_deref())
                .await?;
            debug!(platform = %Platform::GoogleAds, page, results = resp.results.len(), "page fetched");
            for r in resp.results {
                if let Some(row) = self.to_row(r, &account_currency)? {
                    raw_rows.push(row);
                }
            }
            match resp.next_page_token.filter(|t| !t.is_empty()) {
                Some(t) => page_token = Some(t),
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
