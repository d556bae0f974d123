//! Provider adapters and rate limiting for lead enrichment.
//!
//! This crate owns the mechanism side of the waterfall: one
//! [`ProviderAdapter`](adapters::ProviderAdapter) per external source, an
//! explicit [`AdapterRegistry`](adapters::AdapterRegistry) mapping source
//! names to adapters, and the per-provider [`RateLimiter`](limiter::RateLimiter)
//! every outbound call goes through. Sequencing lives in `leadflow-core`.

pub mod adapters;
pub mod limiter;

pub use adapters::{
    AdapterRegistry, AvvoAdapter, BarRegistryAdapter, FirmSiteAdapter, JustiaAdapter,
    ProviderAdapter, build_registry,
};
pub use limiter::RateLimiter;
