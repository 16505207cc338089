//! adl-attribution
//!
//! Campaign -> country attribution, computed on read.
//!
//! - `none`: campaign stays campaign-level only.
//! - `single`: every entry of the campaign counts toward one configured
//!   country, whatever the entry's own country.
//! - `multiple`: each entry's own country counts; entries without one are
//!   flagged as needing detail and left out until corrected.
//!
//! Pure logic. No IO. Settings are read through [`AttributionStore`] by the
//! caller and never written by the resolver.

mod resolver;
mod store;
mod types;

pub use resolver::{country_view, resolve_rollup};
pub use store::{validate_setting, AttributionError, AttributionStore};
pub use types::*;
