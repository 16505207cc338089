use std::sync::Arc;

use adl_fx::FxService;
use adl_merge::{MergeEngine, MergeSummary};
use adl_providers::{EventOutcome, RevenueCatEvent, RevenueCatEventAdapter, SkippedEvent};
use adl_schemas::{MergeMode, Platform};
use tracing::info;

use crate::SyncError;

#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    Merged(MergeSummary),
    /// Not an error: the event carried nothing to record.
    Skipped(SkippedEvent),
}

/// Single-event revenue path. Events are deltas, so they accumulate.
/// Duplicate delivery is filtered upstream by event id.
#[derive(Debug)]
pub struct WebhookIngestor {
    revenuecat: RevenueCatEventAdapter,
    merge: Arc<MergeEngine>,
}

impl WebhookIngestor {
    pub fn new(fx: Arc<FxService>, merge: Arc<MergeEngine>) -> Self {
        Self {
            revenuecat: RevenueCatEventAdapter::new(fx),
            merge,
        }
    }

    pub async fn ingest_revenuecat_body(
        &self,
        user_id: &str,
        body: &[u8],
    ) -> Result<WebhookOutcome, SyncError> {
        let event = RevenueCatEvent::from_webhook_body(body).map_err(|source| SyncError::Provider {
            platform: Platform::RevenueCat,
            source,
        })?;
        self.ingest_revenuecat(user_id, &event).await
    }

    pub async fn ingest_revenuecat(
        &self,
        user_id: &str,
        event: &RevenueCatEvent,
    ) -> Result<WebhookOutcome, SyncError> {
        let outcome = self
            .revenuecat
            .ingest(event)
            .await
            .map_err(|source| SyncError::Provider {
                platform: Platform::RevenueCat,
                source,
            })?;

        match outcome {
            EventOutcome::Skipped(s) => Ok(WebhookOutcome::Skipped(s)),
            EventOutcome::Row(row) => {
                let summary = self
                    .merge
                    .merge_rows(user_id, std::slice::from_ref(&row), MergeMode::Accumulate)
                    .await?;
                info!(
                    user = %user_id,
                    platform = %Platform::RevenueCat,
                    event_type = %event.event_type,
                    product = %row.campaign_id,
                    revenue = %row.revenue,
                    "webhook event merged"
                );
                Ok(WebhookOutcome::Merged(summary))
            }
        }
    }
}
