//! adl-runtime
//!
//! Glue invoked by external triggers. Owns no state of its own:
//! - `SyncRunner`: token -> adapter -> FX -> overwrite merge, one
//!   (user, platform, account, window) per call
//! - `WebhookIngestor`: one RevenueCat event -> accumulate merge
//! - manual single-key corrections and the import conflict helper
//! - `rollup_for_user`: attribution read path over stored rows
//! - `wiring`: builds adapters, FX and the OAuth refresher from `AppConfig`

use adl_auth::CredentialError;
use adl_merge::MergeError;
use adl_providers::ProviderError;
use adl_schemas::Platform;
use thiserror::Error;

mod manual;
mod rollup;
mod sync;
mod webhook;
pub mod wiring;

pub use manual::{apply_manual_entry, resolve_import_conflict, ImportChoice};
pub use rollup::{rollup_for_user, CountryRollup};
pub use sync::{normalize_rows, AdapterRegistry, SyncReport, SyncRequest, SyncRunner};
pub use webhook::{WebhookIngestor, WebhookOutcome};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error("{platform} fetch failed: {source}")]
    Provider {
        platform: Platform,
        #[source]
        source: ProviderError,
    },
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error("no adapter registered for platform {0}")]
    NoAdapter(Platform),
}

impl SyncError {
    /// Whether re-running the same window later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Credentials(e) => e.is_retryable(),
            SyncError::Provider { source, .. } => source.is_retryable(),
            SyncError::Merge(e) => e.is_retryable(),
            SyncError::NoAdapter(_) => false,
        }
    }

    /// Short text for a "last sync failed" display.
    pub fn reason(&self) -> String {
        match self {
            SyncError::Credentials(e) if e.is_not_connected() => {
                "platform not connected; reconnect the account".to_string()
            }
            SyncError::Credentials(_) => "token refresh failed".to_string(),
            SyncError::Provider { source, .. } => match source {
                ProviderError::RateLimited { .. } => "provider rate limit reached".to_string(),
                ProviderError::Unauthorized(_) => {
                    "provider rejected the credentials; reconnect the account".to_string()
                }
                ProviderError::Transport(_) => "provider unreachable".to_string(),
                ProviderError::Api { status, .. } if *status >= 500 => {
                    "provider temporarily unavailable".to_string()
                }
                other => format!("provider error: {other}"),
            },
            SyncError::Merge(_) => "saving results failed".to_string(),
            SyncError::NoAdapter(p) => format!("{p} is not supported by this deployment"),
        }
    }
}
