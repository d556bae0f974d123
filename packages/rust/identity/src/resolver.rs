//! Identity resolution: decide whether an incoming record refers to a lead
//! already in the store.
//!
//! Matching rules run in fixed priority order, stopping at the first hit.
//! Partial matches (e.g. first name only) are never considered: a false
//! positive silently destroys data under the never-overwrite fusion policy,
//! while a missed merge is recoverable by duplicate resolution.

use leadflow_shared::{RawLead, Result, normalize};
use leadflow_storage::Storage;
use tracing::debug;

/// Resolve a candidate record to an existing lead id, or `None` for new.
///
/// Cascade, strongest signal first:
/// 1. `(bar_number, state)` exact — a regulator-issued ID is unique per jurisdiction
/// 2. `email`, case-folded
/// 3. `(first_name, last_name, city, state)`, case-folded
/// 4. last 10 digits of `phone`, only when the candidate has ≥7 digits
pub async fn resolve(storage: &Storage, candidate: &RawLead) -> Result<Option<String>> {
    let bar = candidate.bar_number.trim();
    let state = candidate.state.trim();
    if !bar.is_empty() && !state.is_empty() {
        if let Some(id) = storage.find_by_bar(bar, state).await? {
            debug!(%id, bar, state, "resolved by bar number");
            return Ok(Some(id));
        }
    }

    let email = normalize::fold(&candidate.email);
    if !email.is_empty() {
        if let Some(id) = storage.find_by_email(&email).await? {
            debug!(%id, %email, "resolved by email");
            return Ok(Some(id));
        }
    }

    let first = normalize::fold(&candidate.first_name);
    let last = normalize::fold(&candidate.last_name);
    let city = normalize::fold(&candidate.city);
    let state_key = normalize::fold(&candidate.state);
    if !first.is_empty() && !last.is_empty() && !city.is_empty() && !state_key.is_empty() {
        if let Some(id) = storage
            .find_by_name_city(&first, &last, &city, &state_key)
            .await?
        {
            debug!(%id, %first, %last, %city, "resolved by name and city");
            return Ok(Some(id));
        }
    }

    if let Some(suffix) = normalize::phone_suffix(&candidate.phone) {
        if let Some(id) = storage.find_by_phone_suffix(&suffix).await? {
            debug!(%id, %suffix, "resolved by phone suffix");
            return Ok(Some(id));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_shared::Lead;
    use uuid::Uuid;

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("lf_resolver_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn stored_lead() -> Lead {
        let mut lead = Lead::new();
        lead.bar_number = "12345".into();
        lead.state = "CA".into();
        lead.first_name = "Jane".into();
        lead.last_name = "Doe".into();
        lead.city = "Oakland".into();
        lead.email = "jane@doe.law".into();
        lead.phone = "415-555-0100".into();
        lead
    }

    #[tokio::test]
    async fn resolves_by_bar_number_first() {
        let storage = test_storage().await;
        let lead = stored_lead();
        storage.insert_lead(&lead).await.expect("insert");

        let candidate = RawLead {
            bar_number: "12345".into(),
            state: "CA".into(),
            // Different email; rule 1 must win before rule 2 runs.
            email: "other@x.com".into(),
            ..Default::default()
        };
        let resolved = resolve(&storage, &candidate).await.expect("resolve");
        assert_eq!(resolved.as_deref(), Some(lead.id.as_str()));
    }

    #[tokio::test]
    async fn email_beats_name_and_city() {
        let storage = test_storage().await;

        // One lead that only matches by email, another only by name/city.
        let mut by_email = Lead::new();
        by_email.first_name = "Janet".into();
        by_email.last_name = "Dorian".into();
        by_email.email = "j@x.com".into();
        storage.insert_lead(&by_email).await.expect("insert");

        let mut by_name = Lead::new();
        by_name.first_name = "Jane".into();
        by_name.last_name = "Doe".into();
        by_name.city = "Austin".into();
        by_name.state = "TX".into();
        storage.insert_lead(&by_name).await.expect("insert");

        let candidate = RawLead {
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            city: "Austin".into(),
            state: "TX".into(),
            email: "J@X.com ".into(),
            ..Default::default()
        };
        let resolved = resolve(&storage, &candidate).await.expect("resolve");
        assert_eq!(resolved.as_deref(), Some(by_email.id.as_str()));
    }

    #[tokio::test]
    async fn phone_formats_all_resolve_to_same_lead() {
        let storage = test_storage().await;
        let mut lead = Lead::new();
        lead.phone = "+1 (415) 555-0100".into();
        storage.insert_lead(&lead).await.expect("insert");

        for phone in ["415-555-0100", "14155550100", "+1 (415) 555-0100"] {
            let candidate = RawLead {
                phone: phone.into(),
                ..Default::default()
            };
            let resolved = resolve(&storage, &candidate).await.expect("resolve");
            assert_eq!(resolved.as_deref(), Some(lead.id.as_str()), "phone {phone}");
        }
    }

    #[tokio::test]
    async fn short_phone_never_matches() {
        let storage = test_storage().await;
        let mut lead = Lead::new();
        lead.phone = "555123".into();
        storage.insert_lead(&lead).await.expect("insert");

        let candidate = RawLead {
            phone: "555123".into(),
            ..Default::default()
        };
        let resolved = resolve(&storage, &candidate).await.expect("resolve");
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn no_signal_resolves_to_new() {
        let storage = test_storage().await;
        storage.insert_lead(&stored_lead()).await.expect("insert");

        let candidate = RawLead {
            title: "Partner".into(),
            ..Default::default()
        };
        let resolved = resolve(&storage, &candidate).await.expect("resolve");
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn name_rule_requires_all_four_parts() {
        let storage = test_storage().await;
        storage.insert_lead(&stored_lead()).await.expect("insert");

        // Name matches but no city: rule 3 must not fire on partial keys.
        let candidate = RawLead {
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            state: "CA".into(),
            ..Default::default()
        };
        let resolved = resolve(&storage, &candidate).await.expect("resolve");
        assert!(resolved.is_none());
    }
}
