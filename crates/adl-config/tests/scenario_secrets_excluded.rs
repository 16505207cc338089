//! Literal secrets in YAML are refused; env var names are accepted.

use adl_config::load_layered_yaml_from_strings;

const YAML_WITH_ENV_NAMES: &str = r#"
oauth:
  tiktok_ads:
    token_url: "https://business-api.tiktok.com/open_api/v1.3/oauth2/refresh_token/"
    client_id_env: "ADL_TIKTOK_CLIENT_ID"
    client_secret_env: "ADL_TIKTOK_CLIENT_SECRET"
"#;

fn assert_secret_detected(yaml: &str) {
    let result = load_layered_yaml_from_strings(&[yaml]);
    let err_msg = result.expect_err("literal secret must be rejected").to_string();
    assert!(
        err_msg.contains("CONFIG_SECRET_DETECTED"),
        "error should contain CONFIG_SECRET_DETECTED, got: {err_msg}"
    );
    assert!(err_msg.contains("REDACTED"), "value must not be echoed: {err_msg}");
}

#[test]
fn stripe_live_key_rejected() {
    assert_secret_detected(
        r#"
providers:
  stripe:
    api_key: "sk_live_51HxxxxxxxxxxxxxxxxXX"
"#,
    );
}

#[test]
fn google_refresh_token_rejected() {
    assert_secret_detected(
        r#"
oauth:
  google_ads:
    refresh_token: "1//0gabcdefghijklmnop"
"#,
    );
}

#[test]
fn secret_in_array_rejected() {
    assert_secret_detected(
        r#"
webhooks:
  - url: "https://example.com"
    token: "ya29.a0AfH6SMBexample"
"#,
    );
}

#[test]
fn env_var_names_accepted() {
    let loaded = load_layered_yaml_from_strings(&[YAML_WITH_ENV_NAMES]).unwrap();
    let name = loaded
        .config_json
        .pointer("/oauth/tiktok_ads/client_id_env")
        .and_then(|v| v.as_str())
        .unwrap();
    assert_eq!(name, "ADL_TIKTOK_CLIENT_ID");
}

#[test]
fn merged_config_catches_secret_in_overlay() {
    let overlay = r#"
oauth:
  tiktok_ads:
    client_secret_env: "sk_test_overlay_sneaky_value"
"#;
    let result = load_layered_yaml_from_strings(&[YAML_WITH_ENV_NAMES, overlay]);
    assert!(result.is_err(), "secret introduced by overlay must be rejected");
}
