//! Identity resolution and duplicate resolution for lead records.
//!
//! [`resolver::resolve`] decides whether an incoming record refers to a lead
//! the store already knows, using a fixed-priority matching cascade.
//! [`dedupe::resolve_duplicates`] is the periodic batch pass that finds
//! records the cascade missed (because the matching field arrived later) and
//! merges them deterministically.

pub mod dedupe;
pub mod resolver;

pub use dedupe::{DedupeReport, MergePlan, plan_merge, resolve_duplicates};
pub use resolver::resolve;
