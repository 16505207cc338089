//! RevenueCat webhook events.
//!
//! One event per call. Revenue-bearing event types become a single
//! already-normalized row (`purchases = 1`); everything else is reported as
//! skipped rather than rejected.

use std::sync::Arc;

use adl_fx::FxService;
use adl_schemas::{normalize_country_code, CanonicalRow, Micros, Platform, NORMALIZED_CURRENCY};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{ProviderError, SkipReason, SkippedEvent};

pub const ALLOWED_EVENT_TYPES: &[&str] = &[
    "INITIAL_PURCHASE",
    "RENEWAL",
    "NON_RENEWING_PURCHASE",
    "UNCANCELLATION",
    "PRODUCT_CHANGE",
];

#[derive(Debug, Clone, Deserialize)]
struct WebhookBody {
    event: RevenueCatEvent,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RevenueCatEvent {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub app_user_id: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    /// Price in `currency`.
    #[serde(default)]
    pub price_in_purchased_currency: Option<f64>,
    /// Read when `price_in_purchased_currency` is absent, in the same currency.
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    pub event_timestamp_ms: i64,
}

impl RevenueCatEvent {
    /// Parse a webhook request body (`{"api_version": "...", "event": {...}}`).
    /// A bare event object is accepted too.
    pub fn from_webhook_body(body: &[u8]) -> Result<Self, ProviderError> {
        if let Ok(wrapped) = serde_json::from_slice::<WebhookBody>(body) {
            return Ok(wrapped.event);
        }
        serde_json::from_slice::<RevenueCatEvent>(body)
            .map_err(|e| ProviderError::Decode(format!("revenuecat webhook: {e}")))
    }

    fn reference(&self) -> String {
        if self.id.is_empty() {
            format!("{}@{}", self.event_type, self.event_timestamp_ms)
        } else {
            self.id.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Row(CanonicalRow),
    Skipped(SkippedEvent),
}

#[derive(Debug, Clone)]
pub struct RevenueCatEventAdapter {
    fx: Arc<FxService>,
}

impl RevenueCatEventAdapter {
    pub fn new(fx: Arc<FxService>) -> Self {
        Self { fx }
    }

    pub async fn ingest(&self, event: &RevenueCatEvent) -> Result<EventOutcome, ProviderError> {
        let skip = |reason: SkipReason| -> Result<EventOutcome, ProviderError> {
            debug!(platform = %Platform::RevenueCat, event = %event.reference(), %reason, "event skipped");
            Ok(EventOutcome::Skipped(SkippedEvent {
                reference: event.reference(),
                reason,
            }))
        };

        if !ALLOWED_EVENT_TYPES.contains(&event.event_type.as_str()) {
            return skip(SkipReason::UnsupportedEventType(event.event_type.clone()));
        }

        let price = event
            .price_in_purchased_currency
            .or(event.price)
            .and_then(Micros::from_f64)
            .unwrap_or(Micros::ZERO);
        if price.raw() <= 0 {
            return skip(SkipReason::NonPositiveAmount);
        }

        let Some(product_id) = event.product_id.as_deref().filter(|p| !p.trim().is_empty()) else {
            warn!(platform = %Platform::RevenueCat, event = %event.reference(), "priced event without product_id");
            return skip(SkipReason::MissingProduct);
        };

        let date = DateTime::<Utc>::from_timestamp_millis(event.event_timestamp_ms)
            .ok_or_else(|| {
                ProviderError::Decode(format!(
                    "revenuecat event_timestamp_ms out of range: {}",
                    event.event_timestamp_ms
                ))
            })?
            .date_naive();

        let currency = event.currency.as_deref().unwrap_or(NORMALIZED_CURRENCY);
        let revenue = self.fx.convert(price, currency).await;

        let country = event.country_code.as_deref().and_then(|c| {
            let n = normalize_country_code(c);
            if n.is_none() {
                warn!(platform = %Platform::RevenueCat, country = %c, "event country not alpha-2; dropped");
            }
            n
        });

        let mut row = CanonicalRow::new(Platform::RevenueCat, product_id.trim(), date);
        row.country_code = country;
        row.revenue = revenue;
        row.purchases = 1;
        row.currency_code = NORMALIZED_CURRENCY.to_string();
        Ok(EventOutcome::Row(row))
    }
}
