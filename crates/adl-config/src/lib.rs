//! adl-config
//!
//! Layered YAML configuration for the ingestion workspace.
//!
//! - Later documents deep-merge over earlier ones (base -> env -> local).
//! - Literal secrets are refused; YAML carries env var NAMES only and
//!   [`secrets`] resolves them once at startup.
//! - The merged document is canonicalized and hashed (SHA-256) so a sync
//!   log line can name the exact configuration it ran under.

pub mod secrets;
pub mod settings;

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fs;

pub use settings::{AppConfig, FxSettings, OAuthSettings, ProviderSettings};

/// Literal credential shapes refused anywhere in a config layer, with the
/// label reported in the error. The value itself is never echoed.
const CREDENTIAL_SHAPES: &[(&str, &str)] = &[
    ("sk_live", "stripe_secret_key"),
    ("sk_test", "stripe_secret_key"),
    ("rk_live", "stripe_restricted_key"),
    ("sk-", "api_secret"),
    ("ya29.", "google_access_token"),
    ("1//", "google_refresh_token"),
    ("EAAG", "meta_user_token"),
    ("AKIA", "aws_access_key"),
    ("-----BEGIN", "pem_private_key"),
    ("ghp_", "github_token"),
    ("xoxb-", "slack_bot_token"),
];

/// Strings shorter than this are never treated as credentials.
const MIN_CREDENTIAL_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
    /// Where each non-empty layer came from, in merge order.
    pub layers: Vec<String>,
}

impl LoadedConfig {
    /// Typed view of the merged document. Missing sections take defaults.
    pub fn app_config(&self) -> Result<AppConfig> {
        AppConfig::from_json(&self.config_json)
    }
}

/// Read and merge YAML files; later paths win.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let layers = paths
        .iter()
        .map(|p| {
            fs::read_to_string(p)
                .with_context(|| format!("failed to read yaml path: {p}"))
                .map(|raw| (p.to_string(), raw))
        })
        .collect::<Result<Vec<_>>>()?;
    merge_layers(layers)
}

/// Same as [`load_layered_yaml`] for in-memory documents, labelled `doc#<n>`.
pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    merge_layers(
        yaml_docs
            .iter()
            .enumerate()
            .map(|(i, raw)| (format!("doc#{i}"), raw.to_string()))
            .collect(),
    )
}

fn merge_layers(layers: Vec<(String, String)>) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Map::new());
    let mut sources = Vec::with_capacity(layers.len());

    for (source, raw) in layers {
        let doc: serde_yaml::Value =
            serde_yaml::from_str(&raw).with_context(|| format!("invalid yaml in {source}"))?;
        // Empty file or comment-only layer.
        if doc.is_null() {
            continue;
        }
        let doc = serde_json::to_value(doc)
            .with_context(|| format!("yaml->json conversion failed for {source}"))?;

        if let Some((leaf, kind)) = find_credential(&doc, String::new()) {
            bail!("CONFIG_SECRET_DETECTED layer={source} leaf={leaf} kind={kind} value=REDACTED");
        }
        overlay(&mut merged, doc);
        sources.push(source);
    }

    // serde_json's default Map is key-ordered, so this is stable across
    // source key order.
    let canonical_json =
        serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));

    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
        layers: sources,
    })
}

/// Objects merge key by key; anything else in `top` replaces `base`.
fn overlay(base: &mut Value, top: Value) {
    match (base, top) {
        (Value::Object(base_map), Value::Object(top_map)) => {
            for (key, top_val) in top_map {
                match base_map.get_mut(&key) {
                    Some(slot) => overlay(slot, top_val),
                    None => {
                        base_map.insert(key, top_val);
                    }
                }
            }
        }
        (slot, top) => *slot = top,
    }
}

/// First string leaf shaped like a literal credential, as
/// (JSON pointer, credential label).
fn find_credential(v: &Value, pointer: String) -> Option<(String, &'static str)> {
    match v {
        Value::String(s) => credential_kind(s).map(|kind| (pointer, kind)),
        Value::Object(map) => map.iter().find_map(|(k, child)| {
            let token = k.replace('~', "~0").replace('/', "~1");
            find_credential(child, format!("{pointer}/{token}"))
        }),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .find_map(|(i, child)| find_credential(child, format!("{pointer}/{i}"))),
        _ => None,
    }
}

fn credential_kind(s: &str) -> Option<&'static str> {
    let t = s.trim();
    if t.len() < MIN_CREDENTIAL_LEN {
        return None;
    }
    CREDENTIAL_SHAPES
        .iter()
        .find(|(prefix, _)| t.starts_with(prefix))
        .map(|(_, kind)| *kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_overrides_leaves_and_keeps_siblings() {
        let mut base = serde_json::json!({"fx": {"url": "a", "timeout_secs": 5}});
        overlay(&mut base, serde_json::json!({"fx": {"timeout_secs": 9}, "oauth": {}}));
        assert_eq!(base.pointer("/fx/url").and_then(|v| v.as_str()), Some("a"));
        assert_eq!(base.pointer("/fx/timeout_secs").and_then(|v| v.as_u64()), Some(9));
        assert!(base.pointer("/oauth").is_some());
    }

    #[test]
    fn short_strings_are_never_credentials() {
        assert_eq!(credential_kind("sk-1"), None);
        assert_eq!(credential_kind("sk_live_0123456789"), Some("stripe_secret_key"));
    }

    #[test]
    fn empty_documents_are_ignored() {
        let loaded = load_layered_yaml_from_strings(&["", "fx:\n  ttl_hours: 6\n"]).unwrap();
        assert_eq!(
            loaded.config_json.pointer("/fx/ttl_hours").and_then(|v| v.as_u64()),
            Some(6)
        );
        assert_eq!(loaded.layers, vec!["doc#1".to_string()]);
    }

    #[test]
    fn secret_error_names_layer_and_pointer() {
        let err = load_layered_yaml_from_strings(&[
            "fx:\n  ttl_hours: 6\n",
            "providers:\n  stripe:\n    api_key: \"rk_live_abcdefgh\"\n",
        ])
        .unwrap_err()
        .to_string();
        assert!(err.contains("layer=doc#1"), "{err}");
        assert!(err.contains("leaf=/providers/stripe/api_key"), "{err}");
        assert!(err.contains("kind=stripe_restricted_key"), "{err}");
        assert!(!err.contains("abcdefgh"), "{err}");
    }
}
