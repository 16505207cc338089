use adl_merge::{AggregateStore, ManualTarget, MergeEngine, MergeError, MergeSummary};
use adl_schemas::Metrics;
use serde::{Deserialize, Serialize};

/// What to do when an imported value lands on a key that already has data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportChoice {
    /// The imported value replaces what is stored.
    #[default]
    Replace,
    /// The imported value is added to what is stored.
    AddToExisting,
}

/// Value to write for `target` under `choice`. The merge itself stays a
/// single-key overwrite; "add" is pre-summed here against the stored row.
pub async fn resolve_import_conflict(
    store: &dyn AggregateStore,
    target: &ManualTarget,
    incoming: Metrics,
    choice: ImportChoice,
) -> anyhow::Result<Metrics> {
    if choice == ImportChoice::Replace {
        return Ok(incoming);
    }
    let stored = match target {
        ManualTarget::Country(key) => store.country_row(key).await?.map(|r| r.metrics),
        ManualTarget::Campaign { key, .. } => store.campaign_row(key).await?.map(|r| r.metrics),
    };
    Ok(stored.map(|s| s.plus(&incoming)).unwrap_or(incoming))
}

/// Resolve the conflict, then overwrite exactly one key.
pub async fn apply_manual_entry(
    engine: &MergeEngine,
    user_id: &str,
    target: ManualTarget,
    incoming: Metrics,
    choice: ImportChoice,
) -> Result<MergeSummary, MergeError> {
    let value = resolve_import_conflict(engine.store().as_ref(), &target, incoming, choice)
        .await
        .map_err(|e| MergeError::Store(format!("{e:#}")))?;
    engine.apply_manual_entry(user_id, target, value).await
}
