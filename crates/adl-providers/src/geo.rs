//! Provider geo-target id -> ISO-3166 alpha-2 mapping.
//!
//! Google Ads reports countries as numeric criterion ids (`2000 + ISO
//! numeric`). The table is a versioned artifact: the built-in `geo-v1`
//! covers the common markets and a JSON file can extend or override it.
//!
//! File shape:
//! ```json
//! { "version": "geo-v2", "countries": { "2840": "US", "2070": "BA" } }
//! ```

use std::collections::HashMap;
use std::path::Path;

use adl_schemas::{normalize_country_code, UNKNOWN_COUNTRY};
use serde::Deserialize;

use crate::ProviderError;

pub const BUILTIN_MAPPING_VERSION: &str = "geo-v1";

const BUILTIN: &[(i64, &str)] = &[
    (2036, "AU"),
    (2040, "AT"),
    (2056, "BE"),
    (2076, "BR"),
    (2124, "CA"),
    (2152, "CL"),
    (2156, "CN"),
    (2158, "TW"),
    (2170, "CO"),
    (2203, "CZ"),
    (2208, "DK"),
    (2246, "FI"),
    (2250, "FR"),
    (2276, "DE"),
    (2300, "GR"),
    (2344, "HK"),
    (2348, "HU"),
    (2356, "IN"),
    (2360, "ID"),
    (2372, "IE"),
    (2376, "IL"),
    (2380, "IT"),
    (2392, "JP"),
    (2410, "KR"),
    (2458, "MY"),
    (2484, "MX"),
    (2528, "NL"),
    (2554, "NZ"),
    (2566, "NG"),
    (2578, "NO"),
    (2604, "PE"),
    (2608, "PH"),
    (2616, "PL"),
    (2620, "PT"),
    (2642, "RO"),
    (2643, "RU"),
    (2682, "SA"),
    (2702, "SG"),
    (2704, "VN"),
    (2710, "ZA"),
    (2724, "ES"),
    (2752, "SE"),
    (2756, "CH"),
    (2764, "TH"),
    (2784, "AE"),
    (2792, "TR"),
    (2804, "UA"),
    (2818, "EG"),
    (2826, "GB"),
    (2840, "US"),
    (2032, "AR"),
];

#[derive(Debug, Clone)]
pub struct CountryMapping {
    version: String,
    by_id: HashMap<i64, String>,
}

#[derive(Debug, Deserialize)]
struct MappingFile {
    version: String,
    #[serde(default)]
    countries: HashMap<String, String>,
}

impl CountryMapping {
    pub fn builtin() -> Self {
        Self {
            version: BUILTIN_MAPPING_VERSION.to_string(),
            by_id: BUILTIN
                .iter()
                .map(|(id, iso)| (*id, iso.to_string()))
                .collect(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Layer a JSON mapping document over this one. The result carries the
    /// document's version.
    pub fn extended_with_json(&self, raw: &str) -> Result<Self, ProviderError> {
        let file: MappingFile = serde_json::from_str(raw)
            .map_err(|e| ProviderError::Config(format!("country mapping json invalid: {e}")))?;
        if file.version.trim().is_empty() {
            return Err(ProviderError::Config("country mapping version is empty".into()));
        }

        let mut by_id = self.by_id.clone();
        for (id, iso) in file.countries {
            let id: i64 = id.trim().parse().map_err(|_| {
                ProviderError::Config(format!("country mapping id '{id}' is not numeric"))
            })?;
            let iso = normalize_country_code(&iso).ok_or_else(|| {
                ProviderError::Config(format!("country mapping code '{iso}' for id {id} is not alpha-2"))
            })?;
            by_id.insert(id, iso);
        }
        Ok(Self {
            version: file.version,
            by_id,
        })
    }

    pub fn builtin_extended_from_file(path: &Path) -> Result<Self, ProviderError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::Config(format!("read country mapping {}: {e}", path.display()))
        })?;
        Self::builtin().extended_with_json(&raw)
    }

    /// ISO code for a provider id (numeric or `geoTargetConstants/<id>`).
    /// Unmapped or unparseable ids yield the empty sentinel.
    pub fn lookup(&self, raw_id: &str) -> String {
        let tail = raw_id.rsplit('/').next().unwrap_or(raw_id).trim();
        tail.parse::<i64>()
            .ok()
            .and_then(|id| self.by_id.get(&id).cloned())
            .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string())
    }
}

impl Default for CountryMapping {
    fn default() -> Self {
        Self::builtin()
    }
}
