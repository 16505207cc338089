//! RFC 6749 refresh-token grant against per-platform token endpoints.

use std::collections::HashMap;
use std::time::Duration;

use adl_config::secrets::OAuthClientCredentials;
use adl_schemas::Platform;
use serde::Deserialize;
use tracing::warn;

use crate::{CredentialError, RefreshedToken, TokenRefresher};

#[derive(Debug, Clone)]
pub struct OAuthRefresher {
    http: reqwest::Client,
    clients: HashMap<Platform, OAuthClientCredentials>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

impl OAuthRefresher {
    pub fn new(timeout: Duration) -> Result<Self, CredentialError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CredentialError::Config(format!("http client build failed: {e}")))?;
        Ok(Self {
            http,
            clients: HashMap::new(),
        })
    }

    pub fn with_client(mut self, platform: Platform, client: OAuthClientCredentials) -> Self {
        self.clients.insert(platform, client);
        self
    }

    pub fn has_client(&self, platform: Platform) -> bool {
        self.clients.contains_key(&platform)
    }
}

fn exchange_err(platform: Platform, message: String, retryable: bool) -> CredentialError {
    CredentialError::Exchange {
        platform,
        message,
        retryable,
    }
}

#[async_trait::async_trait]
impl TokenRefresher for OAuthRefresher {
    async fn refresh(&self, platform: Platform, refresh_token: &str) -> Result<RefreshedToken, CredentialError> {
        let client = self.clients.get(&platform).ok_or_else(|| {
            CredentialError::Config(format!("no oauth client configured for {platform}"))
        })?;

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
        ];

        let resp = self
            .http
            .post(&client.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| exchange_err(platform, format!("transport: {e}"), true))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| exchange_err(platform, format!("read body: {e}"), true))?;

        if status.is_success() {
            let tok: TokenResponse = serde_json::from_str(&body)
                .map_err(|e| exchange_err(platform, format!("decode: {e}"), false))?;
            if tok.access_token.trim().is_empty() {
                return Err(exchange_err(platform, "empty access_token".into(), false));
            }
            return Ok(RefreshedToken {
                access_token: tok.access_token,
                expires_in: tok.expires_in,
                refresh_token: tok.refresh_token,
            });
        }

        let parsed: Option<TokenErrorBody> = serde_json::from_str(&body).ok();
        let code = parsed.as_ref().and_then(|b| b.error.clone()).unwrap_or_default();
        let description = parsed
            .and_then(|b| b.error_description)
            .unwrap_or_default();

        if matches!(status.as_u16(), 400 | 401) && code == "invalid_grant" {
            warn!(platform = %platform, "refresh token rejected as invalid_grant");
            return Err(CredentialError::NotConnected {
                user_id: String::new(),
                platform,
                detail: format!("refresh token revoked or expired ({description})"),
            });
        }

        let retryable = status.is_server_error() || status.as_u16() == 429;
        Err(exchange_err(
            platform,
            format!("status={} error={code} {description}", status.as_u16()),
            retryable,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn refresher(server: &MockServer) -> OAuthRefresher {
        OAuthRefresher::new(Duration::from_secs(5)).unwrap().with_client(
            Platform::GoogleAds,
            OAuthClientCredentials {
                token_url: server.url("/token"),
                client_id: "cid".into(),
                client_secret: "csecret".into(),
            },
        )
    }

    #[tokio::test]
    async fn posts_refresh_grant_form() {
        let server = MockServer::start_async().await;
        let m = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/token")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body_contains("grant_type=refresh_token")
                    .body_contains("refresh_token=rt-1")
                    .body_contains("client_id=cid");
                then.status(200).json_body(json!({
                    "access_token": "new-access", "expires_in": 3599, "token_type": "Bearer"
                }));
            })
            .await;

        let out = refresher(&server).refresh(Platform::GoogleAds, "rt-1").await.unwrap();
        m.assert_async().await;
        assert_eq!(out.access_token, "new-access");
        assert_eq!(out.expires_in, Some(3599));
        assert!(out.refresh_token.is_none());
    }

    #[tokio::test]
    async fn invalid_grant_means_not_connected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(400).json_body(json!({
                    "error": "invalid_grant", "error_description": "Token has been expired or revoked."
                }));
            })
            .await;
        let err = refresher(&server).refresh(Platform::GoogleAds, "rt").await.unwrap_err();
        assert!(err.is_not_connected(), "got {err:?}");
    }

    #[tokio::test]
    async fn server_errors_are_retryable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(503).body("unavailable");
            })
            .await;
        let err = refresher(&server).refresh(Platform::GoogleAds, "rt").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(!err.is_not_connected());
    }

    #[tokio::test]
    async fn unconfigured_platform_is_a_config_error() {
        let server = MockServer::start_async().await;
        let err = refresher(&server).refresh(Platform::MetaAds, "rt").await.unwrap_err();
        assert!(matches!(err, CredentialError::Config(_)));
    }
}
