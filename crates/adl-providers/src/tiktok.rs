//! TikTok Business API integrated report at campaign/day level. No country
//! breakdown: every row leaves `country_code` unset.

use adl_schemas::{CanonicalRow, Platform};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    account_currency_or_default, check_range, count_field, finalize_rows, money_field,
    parse_report_date, read_json, AdapterCredentials, AdapterSettings, FetchOutcome,
    PlatformAdapter, ProviderError,
};

pub const DEFAULT_BASE_URL: &str = "https://business-api.tiktok.com/open_api/v1.3";

const PAGE_SIZE: &str = "1000";
const MAX_PAGES: usize = 500;

// Envelope codes.
const CODE_OK: i64 = 0;
const CODE_RATE_LIMITED: i64 = 40100;
const CODES_UNAUTHORIZED: &[i64] = &[40001, 40104, 40105];

#[derive(Debug, Clone)]
pub struct TikTokAdsAdapter {
    http: reqwest::Client,
    base_url: String,
    max_pages: usize,
}

/// TikTok wraps every payload; errors arrive as HTTP 200 with `code != 0`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<T, ProviderError> {
        match self.code {
            CODE_OK => self
                .data
                .ok_or_else(|| ProviderError::Decode("tiktok envelope without data".into())),
            CODE_RATE_LIMITED => Err(ProviderError::RateLimited { retry_after_secs: None }),
            c if CODES_UNAUTHORIZED.contains(&c) => Err(ProviderError::Unauthorized(self.message)),
            c => Err(ProviderError::Api {
                status: 200,
                message: format!("code={c} {}", self.message),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AdvertiserInfo {
    #[serde(default)]
    list: Vec<AdvertiserEntry>,
}

#[derive(Debug, Deserialize)]
struct AdvertiserEntry {
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReportPage {
    #[serde(default)]
    list: Vec<ReportRow>,
    page_info: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    page: u32,
    total_page: u32,
}

#[derive(Debug, Deserialize)]
struct ReportRow {
    dimensions: Map<String, Value>,
    #[serde(default)]
    metrics: Map<String, Value>,
}

impl TikTokAdsAdapter {
    pub fn new(settings: &AdapterSettings) -> Result<Self, ProviderError> {
        Ok(Self {
            http: settings.client()?,
            base_url: settings.base_or(DEFAULT_BASE_URL),
            max_pages: settings.pages_or(MAX_PAGES),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        creds: &AdapterCredentials,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("Access-Token", &creds.access_token)
            .query(query)
            .send()
            .await
            .map_err(ProviderError::transport)?;
        let env: Envelope<T> = read_json(Platform::TikTokAds, resp).await?;
        env.into_data()
    }

    async fn account_currency(&self, creds: &AdapterCredentials, advertiser_id: &str) -> String {
        let ids = format!("[\"{advertiser_id}\"]");
        let raw = match self
            .get::<AdvertiserInfo>(creds, "/advertiser/info/", &[("advertiser_ids", ids.as_str())])
            .await
        {
            Ok(info) => info.list.into_iter().next().and_then(|a| a.currency),
            Err(e) => {
                warn!(platform = %Platform::TikTokAds, error = %e, "currency lookup failed");
                None
            }
        };
        account_currency_or_default(Platform::TikTokAds, raw.as_deref())
    }
}

fn str_dim<'a>(dims: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    dims.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

fn to_row(r: ReportRow, currency: &str) -> Result<Option<CanonicalRow>, ProviderError> {
    let p = Platform::TikTokAds;
    let campaign_id = match r.dimensions.get("campaign_id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            warn!(platform = %p, "report row without campaign_id dropped");
            return Ok(None);
        }
    };
    let day = str_dim(&r.dimensions, "stat_time_day")
        .ok_or_else(|| ProviderError::Decode("tiktok row without stat_time_day".into()))?;

    let mut row = CanonicalRow::new(p, campaign_id, parse_report_date(p, day)?);
    row.campaign_name = r
        .metrics
        .get("campaign_name")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    row.currency_code = currency.to_string();
    row.spend = match r.metrics.get("spend") {
        Some(Value::String(s)) => money_field(p, "spend", s),
        other => crate::float_money_field(p, "spend", other),
    };
    row.impressions = count_field(p, "impressions", r.metrics.get("impressions"));
    row.clicks = count_field(p, "clicks", r.metrics.get("clicks"));
    row.purchases = count_field(p, "complete_payment", r.metrics.get("complete_payment"));
    Ok(Some(row))
}

#[async_trait::async_trait]
impl PlatformAdapter for TikTokAdsAdapter {
    fn platform(&self) -> Platform {
        Platform::TikTokAds
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

        let start_s = start.format("%Y-%m-%d").to_string();
        let end_s = end.format("%Y-%m-%d").to_string();
        let dimensions = r#"["campaign_id","stat_time_day"]"#;
        let metrics = r#"["campaign_name","spend","impressions","clicks","complete_payment"]"#;

        let mut raw_rows = Vec::new();
        let mut page: usize = 1;
        loop {
            let page_s = page.to_string();
            let body: ReportPage = self
                .get(
                    creds,
                    "/report/integrated/get/",
                    &[
                        ("advertiser_id", account_id),
                        ("report_type", "BASIC"),
                        ("data_level", "AUCTION_CAMPAIGN"),
                        ("dimensions", dimensions),
                        ("metrics", metrics),
                        ("start_date", start_s.as_str()),
                        ("end_date", end_s.as_str()),
                        ("page", page_s.as_str()),
                        ("page_size", PAGE_SIZE),
                    ],
                )
                .await?;
            debug!(platform = %Platform::TikTokAds, page, results = body.list.len(), "page fetched");

            for r in body.list {
                if let Some(row) = to_row(r, &account_currency)? {
                    raw_rows.push(row);
                }
            }

            let total = body
                .page_info
                .map(|pi| pi.total_page.max(pi.page) as usize)
                .unwrap_or(page);
            if page >= total {
                break;
            }
            if page == self.max_pages {
                return Err(ProviderError::PaginationLimit { pages: page });
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
