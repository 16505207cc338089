//! Config hash stability.
//!
//! GREEN when:
//! - the same inputs hash identically,
//! - reordering keys within YAML doesn't change the hash,
//! - different values produce different hashes,
//! - merge layers apply in order and hash stably.

use adl_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
fx:
  url: "https://open.er-api.com/v6/latest/USD"
  timeout_secs: 5
  ttl_hours: 12
providers:
  google_ads:
    timeout_secs: 60
oauth:
  google_ads:
    token_url: "https://oauth2.googleapis.com/token"
    client_id_env: "ADL_GOOGLE_CLIENT_ID"
    client_secret_env: "ADL_GOOGLE_CLIENT_SECRET"
"#;

/// Same content as BASE_YAML but with keys in different order.
const BASE_YAML_REORDERED: &str = r#"
oauth:
  google_ads:
    client_secret_env: "ADL_GOOGLE_CLIENT_SECRET"
    client_id_env: "ADL_GOOGLE_CLIENT_ID"
    token_url: "https://oauth2.googleapis.com/token"
providers:
  google_ads:
    timeout_secs: 60
fx:
  ttl_hours: 12
  timeout_secs: 5
  url: "https://open.er-api.com/v6/latest/USD"
"#;

const OVERLAY_YAML: &str = r#"
fx:
  ttl_hours: 6
providers:
  google_ads:
    base_url: "http://127.0.0.1:18080"
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();

    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn reordered_keys_produce_same_hash() {
    let original = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let reordered = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();

    assert_eq!(
        original.config_hash, reordered.config_hash,
        "reordering keys in YAML must not change the hash"
    );
}

#[test]
fn different_values_produce_different_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_ne!(a.config_hash, b.config_hash);
}

#[test]
fn overlay_applies_and_keeps_base_siblings() {
    let loaded = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    let cfg = loaded.app_config().unwrap();

    assert_eq!(cfg.fx.ttl_hours, 6, "overlay should override base ttl");
    assert_eq!(cfg.fx.timeout_secs, 5, "base sibling must survive overlay");

    let google = cfg.provider(adl_schemas::Platform::GoogleAds);
    assert_eq!(google.timeout_secs, Some(60));
    assert_eq!(google.base_url.as_deref(), Some("http://127.0.0.1:18080"));
}

#[test]
fn hash_is_64_hex_chars() {
    let loaded = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(loaded.config_hash.len(), 64);
    assert!(loaded.config_hash.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn files_load_in_merge_order() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.yaml");
    let overlay = dir.path().join("local.yaml");
    std::fs::write(&base, BASE_YAML).unwrap();
    std::fs::write(&overlay, OVERLAY_YAML).unwrap();

    let from_files = adl_config::load_layered_yaml(&[
        base.to_str().unwrap(),
        overlay.to_str().unwrap(),
    ])
    .unwrap();
    let from_strings = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_eq!(from_files.config_hash, from_strings.config_hash);
}

#[test]
fn missing_file_is_an_error_naming_the_path() {
    let err = adl_config::load_layered_yaml(&["/definitely/not/here.yaml"]).unwrap_err();
    assert!(err.to_string().contains("/definitely/not/here.yaml"));
}
