//! Field fusion: merge an incoming field set into a canonical lead under the
//! never-overwrite policy.
//!
//! Fusion only fills gaps. An existing value survives every merge; the
//! incoming value for an occupied field is discarded. Tracked fills record
//! their source in the provenance map, and any fill triggers a score
//! recompute over the merged view so the score always summarizes the fields
//! it claims to. The computation is pure; [`Storage::apply_fusion`] persists
//! the result.
//!
//! [`Storage::apply_fusion`]: leadflow_storage::Storage::apply_fusion

use leadflow_shared::{FieldSet, FusionUpdate, Lead, ScoreRule};

/// Compute the fusion of `incoming` into `existing`.
///
/// Idempotent: applying the resulting update and fusing the same field set
/// again yields an empty update.
pub fn fuse(
    existing: &Lead,
    incoming: &FieldSet,
    source: &str,
    rules: &[ScoreRule],
) -> FusionUpdate {
    let mut update = FusionUpdate::default();

    for (field, value) in incoming {
        let value = value.trim();
        if value.is_empty() || !existing.field(*field).trim().is_empty() {
            continue;
        }
        update.fills.insert(*field, value.to_string());
        if field.is_tracked() {
            update.provenance.insert(*field, source.trim().to_string());
        }
    }

    if !update.fills.is_empty() {
        let mut merged = existing.clone();
        for (field, value) in &update.fills {
            merged.set_field(*field, value.clone());
        }
        update.new_score = Some(leadflow_scoring::score(&merged, rules));
    }

    update
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_shared::LeadField;
    use leadflow_scoring::default_rules;

    fn field_set(pairs: &[(LeadField, &str)]) -> FieldSet {
        pairs
            .iter()
            .map(|(f, v)| (*f, v.to_string()))
            .collect()
    }

    #[test]
    fn fills_only_gaps() {
        let mut existing = Lead::new();
        existing.email = "jane@doe.law".into();

        let incoming = field_set(&[
            (LeadField::Email, "other@x.com"),
            (LeadField::Phone, "512-555-1212"),
        ]);
        let update = fuse(&existing, &incoming, "avvo", &default_rules());

        assert!(!update.fills.contains_key(&LeadField::Email));
        assert_eq!(
            update.fills.get(&LeadField::Phone).map(String::as_str),
            Some("512-555-1212")
        );
    }

    #[test]
    fn never_overwrite_for_every_field() {
        let mut existing = Lead::new();
        for field in LeadField::ALL {
            existing.set_field(field, format!("existing-{field}"));
        }
        let incoming: FieldSet = LeadField::ALL
            .iter()
            .map(|f| (*f, format!("incoming-{f}")))
            .collect();

        let update = fuse(&existing, &incoming, "avvo", &default_rules());
        assert!(update.is_empty());
        assert!(update.new_score.is_none());
    }

    #[test]
    fn provenance_set_only_for_tracked_fills() {
        let existing = Lead::new();
        let incoming = field_set(&[
            (LeadField::Email, "jane@doe.law"),
            (LeadField::FirmName, "Doe LLP"),
        ]);
        let update = fuse(&existing, &incoming, "justia", &default_rules());

        assert_eq!(
            update.provenance.get(&LeadField::Email).map(String::as_str),
            Some("justia")
        );
        assert!(!update.provenance.contains_key(&LeadField::FirmName));
    }

    #[test]
    fn idempotent_second_application_is_empty() {
        let mut lead = Lead::new();
        let incoming = field_set(&[
            (LeadField::Email, "jane@doe.law"),
            (LeadField::Website, "https://doe.law"),
        ]);

        let first = fuse(&lead, &incoming, "avvo", &default_rules());
        assert_eq!(first.fills.len(), 2);
        first.apply_to(&mut lead);

        let second = fuse(&lead, &incoming, "avvo", &default_rules());
        assert!(second.is_empty());
        assert!(second.provenance.is_empty());
        assert!(second.new_score.is_none());
    }

    #[test]
    fn score_recomputed_over_merged_view() {
        let mut existing = Lead::new();
        existing.phone = "512-555-1212".into();
        existing.lead_score = 25;

        let incoming = field_set(&[(LeadField::Email, "jane@doe.law")]);
        let update = fuse(&existing, &incoming, "avvo", &default_rules());
        // phone 25 + email 30
        assert_eq!(update.new_score, Some(55));
    }

    #[test]
    fn whitespace_values_do_not_fill() {
        let existing = Lead::new();
        let incoming = field_set(&[(LeadField::Email, "   ")]);
        let update = fuse(&existing, &incoming, "avvo", &default_rules());
        assert!(update.is_empty());
    }

    #[test]
    fn apply_to_mirrors_update() {
        let mut lead = Lead::new();
        let incoming = field_set(&[(LeadField::Email, "jane@doe.law")]);
        let update = fuse(&lead, &incoming, "avvo", &default_rules());
        update.apply_to(&mut lead);

        assert_eq!(lead.email, "jane@doe.law");
        assert_eq!(lead.email_source, "avvo");
        assert_eq!(lead.lead_score, 30);
    }
}
