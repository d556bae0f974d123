//! Core pipelines for LeadFlow: field fusion, record ingest, and the
//! enrichment waterfall.
//!
//! Everything here is wired by explicit dependency injection — the storage
//! handle, adapter registry, rule set, progress sink, and cancellation token
//! are all passed in, so the pipelines run identically against fixture
//! stores and scripted adapters in tests.

pub mod fusion;
pub mod ingest;
pub mod waterfall;

pub use ingest::{IngestStats, ingest_records};
pub use waterfall::{
    ProgressEvent, ProgressSink, SilentProgress, Waterfall, WaterfallStats,
};
