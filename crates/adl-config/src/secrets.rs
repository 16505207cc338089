//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only **env var NAMES** (e.g. `"ADL_GOOGLE_CLIENT_ID"`).
//! - Callers resolve what they need once, right before building the client
//!   that uses it; `std::env::var` is not scattered across the workspace.
//! - `Debug` impls on secret-carrying structs redact values.
//! - Error messages name the env var, never the value.

use adl_schemas::Platform;
use anyhow::{anyhow, bail, Result};

use crate::settings::AppConfig;

/// OAuth client identity for one provider's refresh-token exchange.
#[derive(Clone)]
pub struct OAuthClientCredentials {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for OAuthClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClientCredentials")
            .field("token_url", &self.token_url)
            .field("client_id", &"<REDACTED>")
            .field("client_secret", &"<REDACTED>")
            .finish()
    }
}

/// Resolve a named environment variable. Unset or blank yields `None`.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve the OAuth client id/secret for `platform`.
///
/// # Errors
/// - `SECRETS_NOT_CONFIGURED` when the config has no `oauth.<platform>` entry.
/// - `SECRETS_MISSING` naming the first env var that is unset or blank.
pub fn resolve_oauth_client(cfg: &AppConfig, platform: Platform) -> Result<OAuthClientCredentials> {
    let o = cfg.oauth(platform).ok_or_else(|| {
        anyhow!(
            "SECRETS_NOT_CONFIGURED platform={}: no oauth.{} section in config",
            platform,
            platform
        )
    })?;

    let client_id = match resolve_env(&o.client_id_env) {
        Some(v) => v,
        None => bail!(
            "SECRETS_MISSING platform={}: required env var '{}' (oauth client id) is not set or empty",
            platform,
            o.client_id_env
        ),
    };
    let client_secret = match resolve_env(&o.client_secret_env) {
        Some(v) => v,
        None => bail!(
            "SECRETS_MISSING platform={}: required env var '{}' (oauth client secret) is not set or empty",
            platform,
            o.client_secret_env
        ),
    };

    Ok(OAuthClientCredentials {
        token_url: o.token_url.clone(),
        client_id,
        client_secret,
    })
}

/// Resolve an optional static provider key (`providers.<platform>.developer_token_env`).
/// `Ok(None)` when the config names no variable; an error when it names one
/// that is unset.
pub fn resolve_developer_token(cfg: &AppConfig, platform: Platform) -> Result<Option<String>> {
    let Some(var) = cfg.provider(platform).developer_token_env else {
        return Ok(None);
    };
    match resolve_env(&var) {
        Some(v) => Ok(Some(v)),
        None => bail!(
            "SECRETS_MISSING platform={}: required env var '{}' (developer token) is not set or empty",
            platform,
            var
        ),
    }
}
