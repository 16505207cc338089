//! adl-merge
//!
//! Aggregation and merge engine.
//!
//! - Rows are planned first (pure, no IO): zero-effect rows are dropped,
//!   rows are folded per target key, and every key is assigned to the
//!   country table, the campaign table, or both.
//! - A plan is applied by an [`AggregateStore`] in one transaction: all keys
//!   of both tables land, or none do.
//! - Overwrite replaces stored values with the batch total for the key;
//!   accumulate adds to them.

mod engine;
mod plan;

pub use engine::{AggregateStore, ApplyStats, ManualTarget, MergeEngine, MergeError, MergeSummary};
pub use plan::{combine, next_cached_at, plan_merge, CampaignDelta, MergePlan};
