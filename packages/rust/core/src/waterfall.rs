//! Waterfall orchestrator: drive a batch of leads through the enrichment
//! providers, cheapest and most authoritative first.
//!
//! Step order is fixed: profile pages (for leads whose originating source
//! kept a detail-page reference), directory cross-references, jurisdiction
//! bar registries, then the firm-website email crawl. A step only ever sees
//! leads still missing a tracked field at the moment it starts — eligibility
//! is re-filtered per step, so a lead filled by an early step drops out of
//! the expensive late ones.
//!
//! Inside a step the loop is sequential per provider: external directories
//! are rate- and ban-sensitive, so requests to one provider are never fanned
//! out. One adapter failure is logged and contributes zero fields; it never
//! aborts the step or the batch. Cancellation is cooperative, checked once
//! per lead, and keeps everything already done.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use leadflow_enrich::adapters::{AdapterRegistry, ProviderAdapter};
use leadflow_enrich::limiter::RateLimiter;
use leadflow_shared::{FieldSet, Lead, Result, ScoreRule, WaterfallConfig};
use leadflow_storage::Storage;

use crate::fusion;

/// Step identifiers as they appear in progress events and stats.
pub const STEP_PROFILE_PAGES: &str = "profile-pages";
pub const STEP_BAR_REGISTRIES: &str = "bar-registries";
pub const STEP_FIRM_WEBSITES: &str = "firm-websites";

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// One progress event, emitted once per lead per step.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub step: String,
    pub current: usize,
    pub total: usize,
    pub detail: String,
}

/// Receives waterfall progress. Implemented by the CLI progress bar; use
/// [`SilentProgress`] for headless runs.
pub trait ProgressSink: Send + Sync {
    fn waterfall_progress(&self, event: ProgressEvent);
}

/// No-op progress sink.
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn waterfall_progress(&self, _event: ProgressEvent) {}
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Aggregate counters for one waterfall run. Returned even when the run is
/// cancelled partway.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WaterfallStats {
    /// Detail pages fetched in the profile step.
    pub profiles_fetched: usize,
    /// Non-empty results from the directory cross-reference steps.
    pub cross_ref_matches: usize,
    /// Registry lookups attempted.
    pub name_lookups_run: usize,
    /// Emails found by the firm-website crawl.
    pub emails_crawled: usize,
    /// Distinct leads that gained at least one field.
    pub records_touched: usize,
    /// Adapter calls that failed (transport/parse).
    pub adapter_errors: usize,
    /// Fields filled, per step.
    pub fields_filled: BTreeMap<String, usize>,
    pub total_fields_filled: usize,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Sequences the enrichment providers over a batch of leads.
pub struct Waterfall {
    storage: Arc<Storage>,
    registry: Arc<AdapterRegistry>,
    rules: Vec<ScoreRule>,
    limiters: BTreeMap<String, Arc<RateLimiter>>,
    cross_ref_sources: Vec<String>,
}

impl Waterfall {
    /// Build an orchestrator. One rate limiter per registered provider is
    /// created up front from the waterfall config.
    pub fn new(
        storage: Arc<Storage>,
        registry: Arc<AdapterRegistry>,
        rules: Vec<ScoreRule>,
        config: &WaterfallConfig,
    ) -> Self {
        let limiters = registry
            .names()
            .into_iter()
            .map(|name| {
                let limiter = Arc::new(RateLimiter::from_millis(config.rate_limit_for(&name)));
                (name, limiter)
            })
            .collect();

        Self {
            storage,
            registry,
            rules,
            limiters,
            cross_ref_sources: vec!["avvo".into(), "justia".into()],
        }
    }

    /// Override the directory cross-reference order.
    pub fn with_cross_ref_sources(mut self, sources: Vec<String>) -> Self {
        self.cross_ref_sources = sources;
        self
    }

    fn limiter_for(&self, source: &str) -> Arc<RateLimiter> {
        self.limiters
            .get(source)
            .cloned()
            .unwrap_or_else(|| Arc::new(RateLimiter::from_millis(0)))
    }

    /// Run the full waterfall over up to `limit` enrichable leads.
    #[instrument(skip(self, cancel, progress))]
    pub async fn run(
        &self,
        limit: usize,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> Result<WaterfallStats> {
        let mut leads = self.storage.list_enrichable(limit).await?;
        info!(leads = leads.len(), "starting waterfall");

        let mut stats = WaterfallStats::default();
        let mut touched: BTreeSet<String> = BTreeSet::new();

        self.step_profile_pages(&mut leads, &mut stats, &mut touched, cancel, progress)
            .await?;
        for source in self.cross_ref_sources.clone() {
            self.step_cross_ref(&source, &mut leads, &mut stats, &mut touched, cancel, progress)
                .await?;
        }
        self.step_bar_registries(&mut leads, &mut stats, &mut touched, cancel, progress)
            .await?;
        self.step_firm_websites(&mut leads, &mut stats, &mut touched, cancel, progress)
            .await?;

        stats.records_touched = touched.len();
        info!(
            records_touched = stats.records_touched,
            total_fields_filled = stats.total_fields_filled,
            adapter_errors = stats.adapter_errors,
            cancelled = cancel.is_cancelled(),
            "waterfall complete"
        );
        Ok(stats)
    }

    /// Step 1: fetch detail pages for leads whose originating source kept a
    /// profile reference. Grouped by source so the right adapter runs; a
    /// source with no profile capability is skipped, not failed.
    async fn step_profile_pages(
        &self,
        leads: &mut [Lead],
        stats: &mut WaterfallStats,
        touched: &mut BTreeSet<String>,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Ok(());
        }

        let eligible: Vec<usize> = leads
            .iter()
            .enumerate()
            .filter(|(_, lead)| {
                lead.needs_enrichment()
                    && !lead.detail_url.trim().is_empty()
                    && self
                        .registry
                        .get(lead.source.trim())
                        .is_some_and(|a| a.supports_profile_fetch())
            })
            .map(|(idx, _)| idx)
            .collect();
        let total = eligible.len();
        debug!(step = STEP_PROFILE_PAGES, eligible = total, "step starting");

        for (pos, idx) in eligible.into_iter().enumerate() {
            if cancel.is_cancelled() {
                info!(step = STEP_PROFILE_PAGES, "cancelled, stopping step");
                break;
            }

            let Some(adapter) = self.registry.get(leads[idx].source.trim()) else {
                continue;
            };
            let limiter = self.limiter_for(adapter.name());
            match adapter.fetch_profile(&leads[idx], &limiter).await {
                Ok(Some(fields)) => {
                    stats.profiles_fetched += 1;
                    let source = adapter.name().to_string();
                    self.fuse_step_result(
                        &mut leads[idx],
                        &fields,
                        &source,
                        STEP_PROFILE_PAGES,
                        stats,
                        touched,
                    )
                    .await?;
                }
                Ok(None) => {
                    stats.profiles_fetched += 1;
                }
                Err(e) => {
                    warn!(
                        lead = %leads[idx].id,
                        step = STEP_PROFILE_PAGES,
                        error = %e,
                        "adapter failed"
                    );
                    stats.adapter_errors += 1;
                }
            }

            progress.waterfall_progress(ProgressEvent {
                step: STEP_PROFILE_PAGES.into(),
                current: pos + 1,
                total,
                detail: leads[idx].display_name(),
            });
        }
        Ok(())
    }

    /// Steps 2–3: cross-reference a directory for every still-incomplete lead.
    async fn step_cross_ref(
        &self,
        source: &str,
        leads: &mut [Lead],
        stats: &mut WaterfallStats,
        touched: &mut BTreeSet<String>,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Ok(());
        }
        let Some(adapter) = self.registry.get(source) else {
            debug!(source, "no directory adapter registered, skipping step");
            return Ok(());
        };
        let step = format!("directory-{source}");

        let eligible: Vec<usize> = leads
            .iter()
            .enumerate()
            .filter(|(_, lead)| lead.needs_enrichment())
            .map(|(idx, _)| idx)
            .collect();
        let total = eligible.len();
        debug!(step = %step, eligible = total, "step starting");

        let limiter = self.limiter_for(adapter.name());
        for (pos, idx) in eligible.into_iter().enumerate() {
            if cancel.is_cancelled() {
                info!(step = %step, "cancelled, stopping step");
                break;
            }

            match adapter.lookup(&leads[idx], &limiter).await {
                Ok(Some(fields)) if !fields.is_empty() => {
                    stats.cross_ref_matches += 1;
                    let source = adapter.name().to_string();
                    self.fuse_step_result(&mut leads[idx], &fields, &source, &step, stats, touched)
                        .await?;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(lead = %leads[idx].id, step = %step, error = %e, "adapter failed");
                    stats.adapter_errors += 1;
                }
            }

            progress.waterfall_progress(ProgressEvent {
                step: step.clone(),
                current: pos + 1,
                total,
                detail: leads[idx].display_name(),
            });
        }
        Ok(())
    }

    /// Step 4: name-based lookup against the registry covering the lead's
    /// jurisdiction, skipping leads that originated from that registry.
    async fn step_bar_registries(
        &self,
        leads: &mut [Lead],
        stats: &mut WaterfallStats,
        touched: &mut BTreeSet<String>,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Ok(());
        }
        let registries = self.registry.jurisdiction_adapters();
        if registries.is_empty() {
            return Ok(());
        }

        let eligible: Vec<usize> = leads
            .iter()
            .enumerate()
            .filter(|(_, lead)| lead.needs_enrichment())
            .map(|(idx, _)| idx)
            .collect();
        let total = eligible.len();
        debug!(step = STEP_BAR_REGISTRIES, eligible = total, "step starting");

        for (pos, idx) in eligible.into_iter().enumerate() {
            if cancel.is_cancelled() {
                info!(step = STEP_BAR_REGISTRIES, "cancelled, stopping step");
                break;
            }

            // A lead with no covering registry is skipped, not failed.
            if let Some(adapter) = covering_registry(&registries, &leads[idx]) {
                stats.name_lookups_run += 1;
                let limiter = self.limiter_for(adapter.name());
                match adapter.lookup(&leads[idx], &limiter).await {
                    Ok(Some(fields)) if !fields.is_empty() => {
                        let source = adapter.name().to_string();
                        self.fuse_step_result(
                            &mut leads[idx],
                            &fields,
                            &source,
                            STEP_BAR_REGISTRIES,
                            stats,
                            touched,
                        )
                        .await?;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(
                            lead = %leads[idx].id,
                            step = STEP_BAR_REGISTRIES,
                            error = %e,
                            "adapter failed"
                        );
                        stats.adapter_errors += 1;
                    }
                }
            }

            progress.waterfall_progress(ProgressEvent {
                step: STEP_BAR_REGISTRIES.into(),
                current: pos + 1,
                total,
                detail: leads[idx].display_name(),
            });
        }
        Ok(())
    }

    /// Step 5: crawl the firm website of leads that have one but still lack
    /// an email.
    async fn step_firm_websites(
        &self,
        leads: &mut [Lead],
        stats: &mut WaterfallStats,
        touched: &mut BTreeSet<String>,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Ok(());
        }
        let Some(adapter) = self.registry.get("firm-website") else {
            debug!("no firm-website adapter registered, skipping step");
            return Ok(());
        };

        let eligible: Vec<usize> = leads
            .iter()
            .enumerate()
            .filter(|(_, lead)| {
                lead.email.trim().is_empty() && !lead.website.trim().is_empty()
            })
            .map(|(idx, _)| idx)
            .collect();
        let total = eligible.len();
        debug!(step = STEP_FIRM_WEBSITES, eligible = total, "step starting");

        let limiter = self.limiter_for(adapter.name());
        for (pos, idx) in eligible.into_iter().enumerate() {
            if cancel.is_cancelled() {
                info!(step = STEP_FIRM_WEBSITES, "cancelled, stopping step");
                break;
            }

            match adapter.lookup(&leads[idx], &limiter).await {
                Ok(Some(fields)) if !fields.is_empty() => {
                    stats.emails_crawled += 1;
                    let source = adapter.name().to_string();
                    self.fuse_step_result(
                        &mut leads[idx],
                        &fields,
                        &source,
                        STEP_FIRM_WEBSITES,
                        stats,
                        touched,
                    )
                    .await?;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        lead = %leads[idx].id,
                        step = STEP_FIRM_WEBSITES,
                        error = %e,
                        "adapter failed"
                    );
                    stats.adapter_errors += 1;
                }
            }

            progress.waterfall_progress(ProgressEvent {
                step: STEP_FIRM_WEBSITES.into(),
                current: pos + 1,
                total,
                detail: leads[idx].display_name(),
            });
        }
        Ok(())
    }

    /// Fuse a step's field set into one lead, persist, refresh the in-memory
    /// copy, and bump the step counters.
    async fn fuse_step_result(
        &self,
        lead: &mut Lead,
        fields: &FieldSet,
        source: &str,
        step: &str,
        stats: &mut WaterfallStats,
        touched: &mut BTreeSet<String>,
    ) -> Result<()> {
        let update = fusion::fuse(lead, fields, source, &self.rules);
        self.storage.apply_fusion(&lead.id, &update, source).await?;

        if !update.is_empty() {
            let filled = update.fills.len();
            *stats.fields_filled.entry(step.to_string()).or_default() += filled;
            stats.total_fields_filled += filled;
            touched.insert(lead.id.clone());
            update.apply_to(lead);
            debug!(lead = %lead.id, step, filled, "fields filled");
        }
        Ok(())
    }
}

/// The registry covering a lead's jurisdiction, excluding the lead's own
/// originating source.
fn covering_registry(
    registries: &[Arc<dyn ProviderAdapter>],
    lead: &Lead,
) -> Option<Arc<dyn ProviderAdapter>> {
    let state = lead.state.trim().to_uppercase();
    if state.is_empty() {
        return None;
    }
    registries
        .iter()
        .find(|adapter| {
            adapter
                .jurisdictions()
                .is_some_and(|states| states.iter().any(|s| s == &state))
                && !adapter.name().eq_ignore_ascii_case(lead.source.trim())
        })
        .cloned()
}
