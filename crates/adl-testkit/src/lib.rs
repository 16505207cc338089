//! In-memory stand-ins for every store and network seam, for unit and
//! scenario tests. The memory stores keep the same contracts as the Postgres
//! ones: `apply` is all-or-nothing and settings read back as written.

use std::sync::{Arc, Mutex};

use adl_auth::{CredentialManager, CredentialRecord};
use adl_merge::MergeEngine;
use adl_schemas::{Clock, Platform};
use chrono::{DateTime, Duration, NaiveDate, Utc};

mod fakes;
mod stores;

pub use fakes::{fallback_only_fx, CountingRateSource, ScriptedAdapter, StaticRefresher};
pub use stores::{MemoryAggregateStore, MemoryAttributionStore, MemoryCredentialStore};

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn at(t: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(t)))
    }

    /// 2026-02-01T12:00:00Z.
    pub fn default_start() -> Arc<Self> {
        Self::at(ts("2026-02-01T12:00:00Z"))
    }

    pub fn advance(&self, by: Duration) {
        let mut g = match self.0.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        *g += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.0.lock() {
            Ok(g) => *g,
            Err(p) => *p.into_inner(),
        }
    }
}

/// Parse an RFC 3339 timestamp. Panics on bad input; test helper only.
pub fn ts(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .unwrap_or_else(|e| panic!("bad test timestamp {rfc3339}: {e}"))
        .with_timezone(&Utc)
}

/// Parse `YYYY-MM-DD`. Panics on bad input; test helper only.
pub fn day(ymd: &str) -> NaiveDate {
    NaiveDate::parse_from_str(ymd, "%Y-%m-%d").unwrap_or_else(|e| panic!("bad test date {ymd}: {e}"))
}

/// Memory stores, a manual clock and the engines built over them.
pub struct Fixture {
    pub clock: Arc<ManualClock>,
    pub aggregates: Arc<MemoryAggregateStore>,
    pub credentials: Arc<MemoryCredentialStore>,
    pub attribution: Arc<MemoryAttributionStore>,
    pub refresher: Arc<StaticRefresher>,
    pub merge: Arc<MergeEngine>,
    pub credential_manager: Arc<CredentialManager>,
}

impl Fixture {
    pub fn new() -> Self {
        let clock = ManualClock::default_start();
        let aggregates = Arc::new(MemoryAggregateStore::new());
        let credentials = Arc::new(MemoryCredentialStore::new());
        let refresher = Arc::new(StaticRefresher::new());
        let merge = Arc::new(MergeEngine::with_clock(aggregates.clone(), clock.clone()));
        let credential_manager = Arc::new(CredentialManager::with_clock(
            credentials.clone(),
            refresher.clone(),
            clock.clone(),
        ));
        Self {
            clock,
            aggregates,
            credentials,
            attribution: Arc::new(MemoryAttributionStore::new()),
            refresher,
            merge,
            credential_manager,
        }
    }

    /// Store an OAuth connection whose access token is valid for `valid_for`.
    pub fn connect(&self, user_id: &str, platform: Platform, access_token: &str, valid_for: Duration) {
        self.credentials.insert(CredentialRecord {
            user_id: user_id.to_string(),
            platform,
            access_token: access_token.to_string(),
            refresh_token: Some(format!("refresh-{user_id}")),
            expires_at: Some(self.clock.now() + valid_for),
        });
    }

    /// Store the secret key of a key-authenticated provider.
    pub fn connect_secret(&self, user_id: &str, platform: Platform, secret: &str) {
        self.credentials.insert(CredentialRecord {
            user_id: user_id.to_string(),
            platform,
            access_token: secret.to_string(),
            refresh_token: None,
            expires_at: None,
        });
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
