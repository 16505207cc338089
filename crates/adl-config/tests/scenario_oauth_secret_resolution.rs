//! OAuth client secrets resolve from env var NAMES and fail closed.
//!
//! Failure tests use globally-unique sentinel names that are never set.
//! The success test sets its own uniquely-named variables.

use adl_config::load_layered_yaml_from_strings;
use adl_config::secrets::{resolve_developer_token, resolve_oauth_client};
use adl_schemas::Platform;

fn cfg(yaml: &str) -> adl_config::AppConfig {
    load_layered_yaml_from_strings(&[yaml])
        .expect("test yaml must parse cleanly")
        .app_config()
        .expect("test yaml must match AppConfig")
}

#[test]
fn unconfigured_platform_is_reported() {
    let c = cfg("{}");
    let msg = resolve_oauth_client(&c, Platform::GoogleAds)
        .unwrap_err()
        .to_string();
    assert!(msg.contains("SECRETS_NOT_CONFIGURED"), "got: {msg}");
    assert!(msg.contains("google_ads"), "got: {msg}");
}

#[test]
fn missing_client_id_names_the_variable() {
    let c = cfg(
        r#"
oauth:
  google_ads:
    token_url: "https://oauth2.googleapis.com/token"
    client_id_env: "ADL_SENTINEL_CLIENT_ID_MISSING_Q7"
    client_secret_env: "ADL_SENTINEL_CLIENT_SECRET_MISSING_Q7"
"#,
    );
    let msg = resolve_oauth_client(&c, Platform::GoogleAds)
        .unwrap_err()
        .to_string();
    assert!(msg.contains("SECRETS_MISSING"), "got: {msg}");
    assert!(msg.contains("ADL_SENTINEL_CLIENT_ID_MISSING_Q7"), "got: {msg}");
}

#[test]
fn resolved_client_debug_is_redacted() {
    std::env::set_var("ADL_TEST_OAUTH_CLIENT_ID_R1", "client-id-value");
    std::env::set_var("ADL_TEST_OAUTH_CLIENT_SECRET_R1", "client-secret-value");
    let c = cfg(
        r#"
oauth:
  tiktok_ads:
    token_url: "https://example.test/token"
    client_id_env: "ADL_TEST_OAUTH_CLIENT_ID_R1"
    client_secret_env: "ADL_TEST_OAUTH_CLIENT_SECRET_R1"
"#,
    );

    let creds = resolve_oauth_client(&c, Platform::TikTokAds).unwrap();
    assert_eq!(creds.client_id, "client-id-value");
    assert_eq!(creds.client_secret, "client-secret-value");

    let dbg = format!("{creds:?}");
    assert!(!dbg.contains("client-secret-value"), "debug leaked: {dbg}");
    assert!(dbg.contains("<REDACTED>"));
}

#[test]
fn developer_token_is_optional_unless_named() {
    let c = cfg("{}");
    assert_eq!(resolve_developer_token(&c, Platform::GoogleAds).unwrap(), None);

    let c = cfg(
        r#"
providers:
  google_ads:
    developer_token_env: "ADL_SENTINEL_DEV_TOKEN_MISSING_Q7"
"#,
    );
    let msg = resolve_developer_token(&c, Platform::GoogleAds)
        .unwrap_err()
        .to_string();
    assert!(msg.contains("ADL_SENTINEL_DEV_TOKEN_MISSING_Q7"), "got: {msg}");
}
