//! adl-fx
//!
//! Currency normalization. Converts provider amounts into the normalized
//! unit (USD) using a process-wide rate snapshot.
//!
//! Snapshot lifecycle:
//! - populated on first use by a live fetch,
//! - fresh for `ttl` (12 h by default),
//! - replaced only by a successful live fetch,
//! - on fetch failure the previous snapshot keeps serving, and with no
//!   snapshot at all the static [`FALLBACK_RATES`] table is used for that
//!   call only (never cached forward, so the next call retries live).
//!
//! Readers never block on a refresh: the snapshot is an `Arc` behind a
//! short-held `RwLock`, and at most one live fetch runs at a time.

mod source;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use adl_schemas::{Clock, Micros, SystemClock, NORMALIZED_CURRENCY};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

pub use source::{sanitize_rates, FxFetchError, HttpRateSource, RateSource, RateTable};

/// Static last-resort rates, units per 1 USD.
pub const FALLBACK_RATES: &[(&str, f64)] = &[
    ("USD", 1.0),
    ("EUR", 0.92),
    ("GBP", 0.79),
    ("JPY", 149.5),
    ("CAD", 1.36),
    ("AUD", 1.53),
    ("NZD", 1.64),
    ("CHF", 0.88),
    ("SEK", 10.5),
    ("NOK", 10.6),
    ("DKK", 6.87),
    ("PLN", 4.0),
    ("CZK", 23.1),
    ("HUF", 360.0),
    ("TRY", 30.5),
    ("INR", 83.1),
    ("CNY", 7.24),
    ("HKD", 7.82),
    ("SGD", 1.34),
    ("KRW", 1330.0),
    ("BRL", 4.97),
    ("MXN", 17.1),
    ("ZAR", 18.7),
    ("AED", 3.67),
    ("ILS", 3.65),
];

pub const DEFAULT_TTL: Duration = Duration::from_secs(12 * 60 * 60);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

fn fallback_table() -> Arc<RateTable> {
    static TABLE: OnceLock<Arc<RateTable>> = OnceLock::new();
    TABLE
        .get_or_init(|| {
            Arc::new(
                FALLBACK_RATES
                    .iter()
                    .map(|(k, v)| (k.to_string(), *v))
                    .collect::<HashMap<_, _>>(),
            )
        })
        .clone()
}

/// Live rates plus the instant they were acquired.
#[derive(Debug, Clone)]
pub struct FxRateSnapshot {
    pub rates: Arc<RateTable>,
    pub fetched_at: DateTime<Utc>,
}

/// Where the rates used for a conversion came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateOrigin {
    /// Fetched during this call.
    Live,
    /// Cached snapshot within its freshness window.
    Cached,
    /// Cached snapshot past its window, served because a refresh failed or
    /// was already in flight.
    Stale,
    /// Static table; no snapshot exists and the live fetch failed.
    Fallback,
}

#[derive(Debug, Clone)]
pub struct ActiveRates {
    pub rates: Arc<RateTable>,
    pub origin: RateOrigin,
}

impl ActiveRates {
    pub fn rate(&self, currency: &str) -> Option<f64> {
        self.rates.get(currency).copied()
    }
}

pub struct FxService {
    source: Arc<dyn RateSource>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    fetch_timeout: Duration,
    snapshot: RwLock<Option<Arc<FxRateSnapshot>>>,
    refresh_gate: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for FxService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FxService")
            .field("source", &self.source.name())
            .field("ttl", &self.ttl)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}

impl FxService {
    pub fn new(source: Arc<dyn RateSource>) -> Self {
        Self::with_clock(source, Arc::new(SystemClock))
    }

    pub fn with_clock(source: Arc<dyn RateSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            ttl: chrono::Duration::hours(12),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            snapshot: RwLock::new(None),
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(12));
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Current cached snapshot, if any. Never triggers a fetch.
    pub fn snapshot(&self) -> Option<Arc<FxRateSnapshot>> {
        match self.snapshot.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn publish(&self, snap: Arc<FxRateSnapshot>) {
        match self.snapshot.write() {
            Ok(mut g) => *g = Some(snap),
            Err(poisoned) => *poisoned.into_inner() = Some(snap),
        }
    }

    fn is_fresh(&self, snap: &FxRateSnapshot) -> bool {
        self.clock.now().signed_duration_since(snap.fetched_at) < self.ttl
    }

    /// Rates to use right now. Never fails.
    pub async fn get_rates(&self) -> ActiveRates {
        if let Some(snap) = self.snapshot() {
            if self.is_fresh(&snap) {
                return ActiveRates {
                    rates: snap.rates.clone(),
                    origin: RateOrigin::Cached,
                };
            }
        }

        // Another caller is already refreshing: use what we have if anything.
        let _gate = match self.refresh_gate.try_lock() {
            Ok(g) => g,
            Err(_) => {
                if let Some(snap) = self.snapshot() {
                    return ActiveRates {
                        rates: snap.rates.clone(),
                        origin: RateOrigin::Stale,
                    };
                }
                self.refresh_gate.lock().await
            }
        };

        // Re-check: the refresh we waited on may have published.
        if let Some(snap) = self.snapshot() {
            if self.is_fresh(&snap) {
                return ActiveRates {
                    rates: snap.rates.clone(),
                    origin: RateOrigin::Cached,
                };
            }
        }

        let fetched = match tokio::time::timeout(self.fetch_timeout, self.source.fetch_rates()).await {
            Ok(r) => r,
            Err(_) => Err(FxFetchError::Timeout(self.fetch_timeout)),
        };

        match fetched {
            Ok(rates) => {
                let snap = Arc::new(FxRateSnapshot {
                    rates: Arc::new(rates),
                    fetched_at: self.clock.now(),
                });
                debug!(
                    source = self.source.name(),
                    currencies = snap.rates.len(),
                    "fx snapshot refreshed"
                );
                self.publish(snap.clone());
                ActiveRates {
                    rates: snap.rates.clone(),
                    origin: RateOrigin::Live,
                }
            }
            Err(e) => match self.snapshot() {
                Some(snap) => {
                    warn!(source = self.source.name(), error = %e, "fx refresh failed; serving stale snapshot");
                    ActiveRates {
                        rates: snap.rates.clone(),
                        origin: RateOrigin::Stale,
                    }
                }
                None => {
                    warn!(source = self.source.name(), error = %e, "fx refresh failed; using static fallback rates");
                    ActiveRates {
                        rates: fallback_table(),
                        origin: RateOrigin::Fallback,
                    }
                }
            },
        }
    }

    /// Convert `amount` in `currency_code` to the normalized unit.
    ///
    /// Zero amounts and amounts already in the normalized unit return
    /// unchanged without touching the cache. An unknown currency is logged
    /// and returned unchanged.
    pub async fn convert(&self, amount: Micros, currency_code: &str) -> Micros {
        let code = currency_code.trim().to_ascii_uppercase();
        if amount.is_zero() || code == NORMALIZED_CURRENCY {
            return amount;
        }

        let active = self.get_rates().await;
        match active.rate(&code).and_then(|r| amount.div_rate(r)) {
            Some(converted) => converted,
            None => {
                warn!(
                    currency = %code,
                    origin = ?active.origin,
                    "unknown currency code; treating amount as already normalized"
                );
                amount
            }
        }
    }
}
