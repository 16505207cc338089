//! adl-auth
//!
//! Keeps provider OAuth access tokens usable. The manager is the only writer
//! of credential records: an external consent flow hands tokens over through
//! [`CredentialManager::register`], and [`CredentialManager::ensure_valid_token`]
//! refreshes ahead of expiry.
//!
//! Refresh is single-flight per (user, platform). Concurrent callers queue on
//! a per-key async mutex and re-read the record once they hold it, so a
//! rotated refresh token is never spent twice.

pub mod oauth;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use adl_schemas::{Clock, Platform, SystemClock};
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info};

pub use oauth::OAuthRefresher;

/// Tokens expiring sooner than this are refreshed before use.
pub const REFRESH_MARGIN_SECS: i64 = 5 * 60;
/// Lifetime assumed when a refresh response omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub user_id: String,
    pub platform: Platform,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// `None` means unknown; treated as expired.
    pub expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("user_id", &self.user_id)
            .field("platform", &self.platform)
            .field("access_token", &"<REDACTED>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<REDACTED>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl CredentialRecord {
    fn is_valid_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        !self.access_token.is_empty()
            && self.expires_at.map(|exp| exp - now > margin).unwrap_or(false)
    }

    fn usable_refresh_token(&self) -> Option<&str> {
        self.refresh_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Result of a provider refresh exchange.
#[derive(Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Seconds until expiry as reported by the provider.
    pub expires_in: Option<i64>,
    /// Present when the provider rotates refresh tokens.
    pub refresh_token: Option<String>,
}

impl fmt::Debug for RefreshedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshedToken")
            .field("access_token", &"<REDACTED>")
            .field("expires_in", &self.expires_in)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CredentialError {
    /// User-actionable: reconnect the platform.
    #[error("platform {platform} not properly connected for user {user_id}: {detail}")]
    NotConnected {
        user_id: String,
        platform: Platform,
        detail: String,
    },
    #[error("token exchange with {platform} failed: {message}")]
    Exchange {
        platform: Platform,
        message: String,
        retryable: bool,
    },
    #[error("oauth configuration error: {0}")]
    Config(String),
    #[error("credential store error: {0}")]
    Store(String),
}

impl CredentialError {
    pub fn is_retryable(&self) -> bool {
        match self {
            CredentialError::Exchange { retryable, .. } => *retryable,
            CredentialError::Store(_) => true,
            CredentialError::NotConnected { .. } | CredentialError::Config(_) => false,
        }
    }

    pub fn is_not_connected(&self) -> bool {
        matches!(self, CredentialError::NotConnected { .. })
    }

    fn store(e: anyhow::Error) -> Self {
        CredentialError::Store(format!("{e:#}"))
    }
}

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self, user_id: &str, platform: Platform) -> anyhow::Result<Option<CredentialRecord>>;

    async fn save(&self, record: &CredentialRecord) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Exchange `refresh_token` for a new access token. A revoked grant must
    /// surface as [`CredentialError::NotConnected`] (user/platform fields are
    /// filled in by the manager).
    async fn refresh(&self, platform: Platform, refresh_token: &str) -> Result<RefreshedToken, CredentialError>;
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

type KeyLock = Arc<tokio::sync::Mutex<()>>;

pub struct CredentialManager {
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    clock: Arc<dyn Clock>,
    margin: Duration,
    default_lifetime: Duration,
    locks: Mutex<HashMap<(String, Platform), KeyLock>>,
}

impl fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialManager")
            .field("margin", &self.margin)
            .field("default_lifetime", &self.default_lifetime)
            .finish()
    }
}

impl CredentialManager {
    pub fn new(store: Arc<dyn CredentialStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self::with_clock(store, refresher, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            refresher,
            clock,
            margin: Duration::seconds(REFRESH_MARGIN_SECS),
            default_lifetime: Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn key_lock(&self, user_id: &str, platform: Platform) -> KeyLock {
        let mut map = match self.locks.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.entry((user_id.to_string(), platform))
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn not_connected(user_id: &str, platform: Platform, detail: impl Into<String>) -> CredentialError {
        CredentialError::NotConnected {
            user_id: user_id.to_string(),
            platform,
            detail: detail.into(),
        }
    }

    async fn load(&self, user_id: &str, platform: Platform) -> Result<CredentialRecord, CredentialError> {
        self.store
            .load(user_id, platform)
            .await
            .map_err(CredentialError::store)?
            .ok_or_else(|| Self::not_connected(user_id, platform, "no stored credentials"))
    }

    /// Access token valid for at least the refresh margin.
    ///
    /// # Errors
    /// - `NotConnected` when nothing is stored, the refresh token is missing,
    ///   or the provider revoked the grant.
    /// - `Exchange` for other refresh failures (retryable when transient).
    pub async fn ensure_valid_token(&self, user_id: &str, platform: Platform) -> Result<String, CredentialError> {
        let record = self.load(user_id, platform).await?;
        if record.is_valid_at(self.clock.now(), self.margin) {
            return Ok(record.access_token);
        }

        let lock = self.key_lock(user_id, platform);
        let _guard = lock.lock().await;

        // Whoever held the lock before us may have refreshed already.
        let record = self.load(user_id, platform).await?;
        if record.is_valid_at(self.clock.now(), self.margin) {
            debug!(user = %user_id, platform = %platform, "token refreshed by a concurrent caller");
            return Ok(record.access_token);
        }

        let Some(refresh_token) = record.usable_refresh_token() else {
            return Err(Self::not_connected(user_id, platform, "no refresh token stored"));
        };

        let refreshed = match self.refresher.refresh(platform, refresh_token).await {
            Ok(r) => r,
            Err(CredentialError::NotConnected { detail, .. }) => {
                return Err(Self::not_connected(user_id, platform, detail));
            }
            Err(e) => return Err(e),
        };

        let saved = self.persist(record, refreshed).await?;
        info!(
            user = %user_id,
            platform = %platform,
            expires_at = ?saved.expires_at,
            "access token refreshed"
        );
        Ok(saved.access_token)
    }

    /// Store tokens obtained by the external consent flow.
    pub async fn register(
        &self,
        user_id: &str,
        platform: Platform,
        tokens: RefreshedToken,
    ) -> Result<CredentialRecord, CredentialError> {
        let lock = self.key_lock(user_id, platform);
        let _guard = lock.lock().await;
        let base = CredentialRecord {
            user_id: user_id.to_string(),
            platform,
            access_token: String::new(),
            refresh_token: None,
            expires_at: None,
        };
        self.persist(base, tokens).await
    }

    /// Stored secret of a key-authenticated provider (Stripe, RevenueCat).
    /// These never expire and are never refreshed.
    pub async fn stored_secret(&self, user_id: &str, platform: Platform) -> Result<String, CredentialError> {
        let record = self.load(user_id, platform).await?;
        if record.access_token.trim().is_empty() {
            return Err(Self::not_connected(user_id, platform, "stored secret is empty"));
        }
        Ok(record.access_token)
    }

    async fn persist(
        &self,
        mut record: CredentialRecord,
        tokens: RefreshedToken,
    ) -> Result<CredentialRecord, CredentialError> {
        let lifetime = tokens
            .expires_in
            .filter(|s| *s > 0)
            .map(Duration::seconds)
            .unwrap_or(self.default_lifetime);

        record.access_token = tokens.access_token;
        record.expires_at = Some(self.clock.now() + lifetime);
        if let Some(rotated) = tokens.refresh_token.filter(|t| !t.trim().is_empty()) {
            record.refresh_token = Some(rotated);
        }

        self.store.save(&record).await.map_err(CredentialError::store)?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[derive(Default)]
    struct MemStore {
        rows: Mutex<HashMap<(String, Platform), CredentialRecord>>,
    }

    impl MemStore {
        fn with(record: CredentialRecord) -> Arc<Self> {
            let s = Arc::new(Self::default());
            s.rows
                .lock()
                .unwrap()
                .insert((record.user_id.clone(), record.platform), record);
            s
        }

        fn get(&self, user: &str, p: Platform) -> Option<CredentialRecord> {
            self.rows.lock().unwrap().get(&(user.to_string(), p)).cloned()
        }
    }

    #[async_trait::async_trait]
    impl CredentialStore for MemStore {
        async fn load(&self, user_id: &str, platform: Platform) -> anyhow::Result<Option<CredentialRecord>> {
            Ok(self.get(user_id, platform))
        }

        async fn save(&self, record: &CredentialRecord) -> anyhow::Result<()> {
            self.rows
                .lock()
                .unwrap()
                .insert((record.user_id.clone(), record.platform), record.clone());
            Ok(())
        }
    }

    struct CountingRefresher {
        calls: AtomicUsize,
        expires_in: Option<i64>,
        rotate_to: Option<String>,
        revoked: bool,
        delay_ms: u64,
    }

    impl CountingRefresher {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                expires_in: None,
                rotate_to: None,
                revoked: false,
                delay_ms: 0,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self, platform: Platform, _rt: &str) -> Result<RefreshedToken, CredentialError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            }
            if self.revoked {
                return Err(CredentialError::NotConnected {
                    user_id: String::new(),
                    platform,
                    detail: "invalid_grant".into(),
                });
            }
            Ok(RefreshedToken {
                access_token: format!("access-{n}"),
                expires_in: self.expires_in,
                refresh_token: self.rotate_to.clone(),
            })
        }
    }

    fn record(expires_in_secs: i64, refresh: Option<&str>) -> CredentialRecord {
        CredentialRecord {
            user_id: "u1".into(),
            platform: Platform::GoogleAds,
            access_token: "old".into(),
            refresh_token: refresh.map(str::to_string),
            expires_at: Some(t0() + Duration::seconds(expires_in_secs)),
        }
    }

    fn manager(store: Arc<MemStore>, refresher: Arc<CountingRefresher>) -> CredentialManager {
        CredentialManager::with_clock(store, refresher, Arc::new(FixedClock(t0())))
    }

    #[tokio::test]
    async fn fresh_token_is_returned_without_network() {
        let store = MemStore::with(record(3600, Some("rt")));
        let refresher = Arc::new(CountingRefresher::new());
        let m = manager(store, refresher.clone());

        assert_eq!(m.ensure_valid_token("u1", Platform::GoogleAds).await.unwrap(), "old");
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn token_inside_margin_is_refreshed_with_default_lifetime() {
        let store = MemStore::with(record(4 * 60, Some("rt")));
        let refresher = Arc::new(CountingRefresher::new());
        let m = manager(store.clone(), refresher.clone());

        assert_eq!(m.ensure_valid_token("u1", Platform::GoogleAds).await.unwrap(), "access-1");
        let saved = store.get("u1", Platform::GoogleAds).unwrap();
        assert_eq!(saved.expires_at, Some(t0() + Duration::seconds(3600)));
        assert_eq!(saved.refresh_token.as_deref(), Some("rt"));
    }

    #[tokio::test]
    async fn rotated_refresh_token_is_persisted() {
        let store = MemStore::with(record(-10, Some("rt-old")));
        let refresher = Arc::new(CountingRefresher {
            expires_in: Some(1800),
            rotate_to: Some("rt-new".into()),
            ..CountingRefresher::new()
        });
        let m = manager(store.clone(), refresher);

        m.ensure_valid_token("u1", Platform::GoogleAds).await.unwrap();
        let saved = store.get("u1", Platform::GoogleAds).unwrap();
        assert_eq!(saved.refresh_token.as_deref(), Some("rt-new"));
        assert_eq!(saved.expires_at, Some(t0() + Duration::seconds(1800)));
    }

    #[tokio::test]
    async fn missing_refresh_token_is_not_connected() {
        for rt in [None, Some("  ")] {
            let store = MemStore::with(record(0, rt));
            let refresher = Arc::new(CountingRefresher::new());
            let m = manager(store, refresher.clone());
            let err = m.ensure_valid_token("u1", Platform::GoogleAds).await.unwrap_err();
            assert!(err.is_not_connected(), "got {err:?}");
            assert!(!err.is_retryable());
            assert_eq!(refresher.calls(), 0);
        }
    }

    #[tokio::test]
    async fn unknown_user_is_not_connected() {
        let m = manager(Arc::new(MemStore::default()), Arc::new(CountingRefresher::new()));
        let err = m.ensure_valid_token("nobody", Platform::MetaAds).await.unwrap_err();
        assert!(err.to_string().contains("not properly connected"));
    }

    #[tokio::test]
    async fn revoked_grant_names_the_user() {
        let store = MemStore::with(record(0, Some("rt")));
        let refresher = Arc::new(CountingRefresher {
            revoked: true,
            ..CountingRefresher::new()
        });
        let m = manager(store, refresher);
        match m.ensure_valid_token("u1", Platform::GoogleAds).await {
            Err(CredentialError::NotConnected { user_id, .. }) => assert_eq!(user_id, "u1"),
            other => panic!("expected NotConnected, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_refresh() {
        let store = MemStore::with(record(0, Some("rt")));
        let refresher = Arc::new(CountingRefresher {
            delay_ms: 50,
            ..CountingRefresher::new()
        });
        let m = Arc::new(manager(store, refresher.clone()));

        let mut set = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let m = m.clone();
            set.spawn(async move { m.ensure_valid_token("u1", Platform::GoogleAds).await });
        }
        while let Some(res) = set.join_next().await {
            assert_eq!(res.unwrap().unwrap(), "access-1");
        }
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn register_stores_consent_tokens() {
        let store = Arc::new(MemStore::default());
        let m = manager(store.clone(), Arc::new(CountingRefresher::new()));
        m.register(
            "u2",
            Platform::TikTokAds,
            RefreshedToken {
                access_token: "a".into(),
                expires_in: Some(86_400),
                refresh_token: Some("r".into()),
            },
        )
        .await
        .unwrap();
        let saved = store.get("u2", Platform::TikTokAds).unwrap();
        assert_eq!(saved.refresh_token.as_deref(), Some("r"));
        assert_eq!(m.ensure_valid_token("u2", Platform::TikTokAds).await.unwrap(), "a");
    }

    #[tokio::test]
    async fn stored_secret_ignores_expiry() {
        let mut rec = record(0, None);
        rec.platform = Platform::Stripe;
        rec.expires_at = None;
        rec.access_token = "sk_test_1".into();
        let refresher = Arc::new(CountingRefresher::new());
        let m = manager(MemStore::with(rec), refresher.clone());

        assert_eq!(m.stored_secret("u1", Platform::Stripe).await.unwrap(), "sk_test_1");
        assert!(m.stored_secret("u1", Platform::RevenueCat).await.unwrap_err().is_not_connected());
        assert_eq!(refresher.calls(), 0);
    }

    #[test]
    fn debug_redacts_tokens() {
        let s = format!("{:?}", record(0, Some("secret-rt")));
        assert!(!s.contains("secret-rt"));
        assert!(!s.contains("old"));
    }
}
