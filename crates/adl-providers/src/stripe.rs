//! Stripe charges as revenue rows.
//!
//! Charges are grouped by (utm campaign, country, UTC day, charge currency).
//! Net revenue is `amount_captured - amount_refunded` in the currency's
//! minor unit. Each settled charge with positive net counts as one purchase.

use adl_schemas::{normalize_country_code, CanonicalRow, Micros, Platform, UNKNOWN_COUNTRY};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::{
    account_currency_or_default, check_range, finalize_rows, read_json, AdapterCredentials,
    AdapterSettings, FetchOutcome, PlatformAdapter, ProviderError, SkipReason, SkippedEvent,
};

pub const DEFAULT_BASE_URL: &str = "https://api.stripe.com";
pub const UNATTRIBUTED_CAMPAIGN: &str = "unattributed";

const PAGE_LIMIT: &str = "100";
const MAX_PAGES: usize = 1000;

const ZERO_DECIMAL: &[&str] = &[
    "BIF", "CLP", "DJF", "GNF", "JPY", "KMF", "KRW", "MGA", "PYG", "RWF", "UGX", "VND", "VUV",
    "XAF", "XOF", "XPF",
];
const THREE_DECIMAL: &[&str] = &["BHD", "JOD", "KWD", "OMR", "TND"];

/// Minor-unit exponent for an upper-case ISO-4217 code.
pub fn currency_exponent(code: &str) -> u32 {
    if ZERO_DECIMAL.contains(&code) {
        0
    } else if THREE_DECIMAL.contains(&code) {
        3
    } else {
        2
    }
}

#[derive(Debug, Clone)]
pub struct StripeAdapter {
    http: reqwest::Client,
    base_url: String,
    max_pages: usize,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    default_currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChargeList {
    #[serde(default)]
    data: Vec<Charge>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct Charge {
    id: String,
    #[serde(default)]
    amount_captured: i64,
    #[serde(default)]
    amount_refunded: i64,
    currency: String,
    created: i64,
    #[serde(default)]
    status: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    billing_details: Option<BillingDetails>,
    payment_method_details: Option<PaymentMethodDetails>,
}

#[derive(Debug, Deserialize)]
struct BillingDetails {
    address: Option<Address>,
}

#[derive(Debug, Deserialize)]
struct Address {
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentMethodDetails {
    card: Option<CardDetails>,
}

#[derive(Debug, Deserialize)]
struct CardDetails {
    country: Option<String>,
}

impl Charge {
    fn country(&self) -> String {
        let billing = self
            .billing_details
            .as_ref()
            .and_then(|b| b.address.as_ref())
            .and_then(|a| a.country.as_deref());
        let card = self
            .payment_method_details
            .as_ref()
            .and_then(|p| p.card.as_ref())
            .and_then(|c| c.country.as_deref());
        billing
            .and_then(normalize_country_code)
            .or_else(|| card.and_then(normalize_country_code))
            .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string())
    }

    fn campaign(&self) -> String {
        self.metadata
            .get("utm_campaign")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or(UNATTRIBUTED_CAMPAIGN)
            .to_string()
    }
}

impl StripeAdapter {
    pub fn new(settings: &AdapterSettings) -> Result<Self, ProviderError> {
        Ok(Self {
            http: settings.client()?,
            base_url: settings.base_or(DEFAULT_BASE_URL),
            max_pages: settings.pages_or(MAX_PAGES),
        })
    }

    async fn account_currency(&self, creds: &AdapterCredentials) -> String {
        let res = async {
            let resp = self
                .http
                .get(format!("{}/v1/account", self.base_url))
                .bearer_auth(&creds.access_token)
                .send()
                .await
                .map_err(ProviderError::transport)?;
            read_json::<AccountResponse>(Platform::Stripe, resp).await
        }
        .await;
        let raw = match res {
            Ok(a) => a.default_currency,
            Err(e) => {
                warn!(platform = %Platform::Stripe, error = %e, "currency lookup failed");
                None
            }
        };
        account_currency_or_default(Platform::Stripe, raw.as_deref())
    }

    fn charge_to_row(c: &Charge) -> Result<CanonicalRow, SkipReason> {
        if c.status != "succeeded" {
            return Err(SkipReason::NotSettled(c.status.clone()));
        }
        let net = c.amount_captured.saturating_sub(c.amount_refunded);
        if net <= 0 {
            return Err(SkipReason::NonPositiveAmount);
        }

        let currency = adl_schemas::normalize_currency_code(&c.currency).ok_or_else(|| {
            warn!(platform = %Platform::Stripe, charge = %c.id, currency = %c.currency, "charge currency malformed");
            SkipReason::ZeroEffect
        })?;
        let revenue = Micros::from_minor_units(net, currency_exponent(&currency)).ok_or_else(|| {
            warn!(platform = %Platform::Stripe, charge = %c.id, "charge amount out of range");
            SkipReason::ZeroEffect
        })?;
        let created = DateTime::<Utc>::from_timestamp(c.created, 0).ok_or_else(|| {
            warn!(platform = %Platform::Stripe, charge = %c.id, "charge timestamp out of range");
            SkipReason::ZeroEffect
        })?;

        let mut row = CanonicalRow::new(Platform::Stripe, c.campaign(), created.date_naive());
        row.country_code = Some(c.country());
        row.currency_code = currency;
        row.revenue = revenue;
        row.purchases = 1;
        Ok(row)
    }
}

fn window_bounds(start: NaiveDate, end: NaiveDate) -> (i64, i64) {
    let gte = start.and_time(NaiveTime::MIN).and_utc().timestamp();
    let lte = end
        .and_hms_opt(23, 59, 59)
        .map(|t| t.and_utc().timestamp())
        .unwrap_or(gte);
    (gte, lte)
}

#[async_trait::async_trait]
impl PlatformAdapter for StripeAdapter {
    fn platform(&self) -> Platform {
        Platform::Stripe
    }

    /// `account_id` is informational; the secret key already scopes the
    /// account.
    async fn fetch_rows(
        &self,
        creds: &AdapterCredentials,
        _account_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchOutcome, ProviderError> {
        check_range(start, end)?;
        let account_currency = self.account_currency(creds).await;
        let (gte, lte) = window_bounds(start, end);
        let gte_s = gte.to_string();
        let lte_s = lte.to_string();

        let mut raw_rows = Vec::new();
        let mut skipped = Vec::new();
        let mut starting_after: Option<String> = None;
        let mut page = 0;

        loop {
            if page == self.max_pages {
                return Err(ProviderError::PaginationLimit { pages: page });
            }
            let mut query: Vec<(&str, &str)> = vec![
                ("created[gte]", gte_s.as_str()),
                ("created[lte]", lte_s.as_str()),
                ("limit", PAGE_LIMIT),
            ];
            if let Some(id) = starting_after.as_deref() {
                query.push(("starting_after", id));
            }

            let resp = self
                .http
                .get(format!("{}/v1/charges", self.base_url))
                .bearer_auth(&creds.access_token)
                .query(&query)
                .send()
                .await
                .map_err(ProviderError::transport)?;
            let list: ChargeList = read_json(Platform::Stripe, resp).await?;
            debug!(platform = %Platform::Stripe, page, results = list.data.len(), "page fetched");

            let last_id = list.data.last().map(|c| c.id.clone());
            for c in &list.data {
                match Self::charge_to_row(c) {
                    Ok(row) => raw_rows.push(row),
                    Err(reason) => skipped.push(SkippedEvent {
                        reference: c.id.clone(),
                        reason,
                    }),
                }
            }

            match (list.has_more, last_id) {
                (true, Some(id)) => starting_after = Some(id),
                _ => break,
            }
            page += 1;
        }

        let (rows, zero) = finalize_rows(raw_rows);
        skipped.extend(zero);
        Ok(FetchOutcome {
            account_currency,
            rows,
            skipped,
        })
    }
}
