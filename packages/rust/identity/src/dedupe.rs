//! Duplicate resolution: find leads that should have resolved to the same
//! identity but didn't, and merge them.
//!
//! Records are grouped by the case-folded name key — the cascade's
//! third-priority signal — which catches the common case of two records
//! inserted before the field that would have matched them existed. The merge
//! itself reuses the never-overwrite policy: losers only fill gaps on the
//! winner, then are deleted after their attributions migrate.

use chrono::Utc;
use leadflow_shared::{Lead, LeadField, Result, ScoreRule};
use leadflow_storage::Storage;
use tracing::{debug, info, instrument};

/// Fields counted when electing a group's winner.
const COUNTED_FIELDS: &[&str] = &[
    "bar_number",
    "email",
    "phone",
    "website",
    "firm_name",
    "title",
    "practice_area",
    "linkedin_url",
    "bio",
    "detail_url",
    "first_name",
    "last_name",
    "city",
    "state",
];

/// Result of a duplicate-resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupeReport {
    /// Duplicate groups found.
    pub groups: usize,
    /// Loser records merged away (deleted).
    pub merged: usize,
    /// Fields copied onto winners from losers.
    pub fields_recovered: usize,
}

/// A computed merge for one duplicate group.
#[derive(Debug, Clone)]
pub struct MergePlan {
    /// The winner with losers' fields already folded in.
    pub winner: Lead,
    pub loser_ids: Vec<String>,
    pub fields_recovered: usize,
}

/// Scan the store for duplicate groups and merge each one.
///
/// Each group commits in its own transaction, so a failure partway through
/// keeps the merges that already landed; the error surfaces to the caller.
/// With `dry_run`, the scan reports projected recoveries without writing.
#[instrument(skip(storage, rules))]
pub async fn resolve_duplicates(
    storage: &Storage,
    rules: &[ScoreRule],
    dry_run: bool,
) -> Result<DedupeReport> {
    let groups = storage.duplicate_name_groups().await?;
    let mut report = DedupeReport {
        groups: groups.len(),
        ..Default::default()
    };

    for group in &groups {
        let plan = plan_merge(group, rules);
        debug!(
            winner = %plan.winner.id,
            losers = plan.loser_ids.len(),
            recovered = plan.fields_recovered,
            "planned merge"
        );

        if !dry_run {
            storage.apply_merge(&plan.winner, &plan.loser_ids).await?;
        }
        report.merged += plan.loser_ids.len();
        report.fields_recovered += plan.fields_recovered;
    }

    info!(
        groups = report.groups,
        merged = report.merged,
        fields_recovered = report.fields_recovered,
        dry_run,
        "duplicate resolution complete"
    );
    Ok(report)
}

/// Compute the merge for one group without touching the store.
///
/// Winner: most non-empty counted fields; ties go to the earliest
/// `created_at`, then lowest id (groups arrive ordered that way, so the
/// first max wins).
pub fn plan_merge(group: &[Lead], rules: &[ScoreRule]) -> MergePlan {
    let winner_idx = elect_winner(group);
    let mut winner = group[winner_idx].clone();
    let mut fields_recovered = 0usize;

    for (idx, loser) in group.iter().enumerate() {
        if idx == winner_idx {
            continue;
        }
        fields_recovered += fill_from_loser(&mut winner, loser);
    }

    if fields_recovered > 0 {
        winner.lead_score = leadflow_scoring::score(&winner, rules);
        winner.updated_at = Utc::now();
    }

    MergePlan {
        winner,
        loser_ids: group
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != winner_idx)
            .map(|(_, lead)| lead.id.clone())
            .collect(),
        fields_recovered,
    }
}

fn elect_winner(group: &[Lead]) -> usize {
    let mut best = 0;
    let mut best_count = field_count(&group[0]);
    for (idx, lead) in group.iter().enumerate().skip(1) {
        let count = field_count(lead);
        if count > best_count {
            best = idx;
            best_count = count;
        }
    }
    best
}

fn field_count(lead: &Lead) -> usize {
    COUNTED_FIELDS
        .iter()
        .filter(|name| {
            lead.rule_value(name)
                .is_some_and(|v| !v.trim().is_empty())
        })
        .count()
}

/// Copy every field the winner lacks from a loser. Returns the number of
/// fields copied (provenance entries don't count).
fn fill_from_loser(winner: &mut Lead, loser: &Lead) -> usize {
    let mut copied = 0usize;

    for field in LeadField::ALL {
        let value = loser.field(field).trim();
        if value.is_empty() || !winner.field(field).trim().is_empty() {
            continue;
        }
        winner.set_field(field, value);
        copied += 1;

        if field.is_tracked() {
            winner.set_provenance(field, loser_provenance(loser, field));
        }
        if field == LeadField::Email {
            winner.email_verified = loser.email_verified;
        }
    }

    if winner.bar_number.trim().is_empty() && !loser.bar_number.trim().is_empty() {
        winner.bar_number = loser.bar_number.trim().to_string();
        copied += 1;
    }
    if winner.detail_url.trim().is_empty() && !loser.detail_url.trim().is_empty() {
        winner.detail_url = loser.detail_url.trim().to_string();
        copied += 1;
    }

    copied
}

/// Provenance for a tracked field taken from a loser: the loser's own
/// provenance entry when present, its originating source otherwise.
fn loser_provenance(loser: &Lead, field: LeadField) -> String {
    match loser.provenance(field) {
        Some(src) if !src.trim().is_empty() => src.trim().to_string(),
        _ if !loser.source.trim().is_empty() => loser.source.trim().to_string(),
        _ => "dedupe".to_string(),
    }
}
