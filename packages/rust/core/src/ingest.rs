//! Ingest pipeline: raw scraped records → canonical leads.
//!
//! Each record runs the identity cascade; a hit fuses into the existing
//! lead, a miss inserts a new one. Persistence failures surface to the
//! caller without rolling back records that already landed — retry policy
//! belongs to the caller.

use leadflow_shared::{LeadFlowError, RawLead, Result, ScoreRule};
use leadflow_storage::Storage;
use tracing::{debug, info, instrument};

use crate::fusion;

/// Outcome counters for one ingest batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Records that created a new lead.
    pub inserted: usize,
    /// Records fused into an existing lead with at least one fill.
    pub merged: usize,
    /// Records that resolved to an existing lead but added nothing.
    pub unchanged: usize,
}

/// Ingest a batch of raw records.
#[instrument(skip_all, fields(records = records.len()))]
pub async fn ingest_records(
    storage: &Storage,
    rules: &[ScoreRule],
    records: &[RawLead],
) -> Result<IngestStats> {
    let mut stats = IngestStats::default();

    for raw in records {
        match leadflow_identity::resolve(storage, raw).await? {
            Some(id) => {
                let existing = storage.get_lead(&id).await?.ok_or_else(|| {
                    LeadFlowError::Storage(format!("resolved lead {id} not found"))
                })?;
                let update = fusion::fuse(&existing, &raw.field_set(), &raw.source, rules);
                let changed = !update.is_empty();
                storage.apply_fusion(&id, &update, &raw.source).await?;

                if changed {
                    debug!(lead = %id, fills = update.fills.len(), "fused into existing lead");
                    stats.merged += 1;
                } else {
                    stats.unchanged += 1;
                }
            }
            None => {
                let mut lead = raw.to_lead();
                lead.lead_score = leadflow_scoring::score(&lead, rules);
                storage.insert_lead(&lead).await?;
                if !lead.source.is_empty() {
                    storage.add_attribution(&lead.id, &lead.source).await?;
                }
                debug!(lead = %lead.id, "inserted new lead");
                stats.inserted += 1;
            }
        }
    }

    info!(
        inserted = stats.inserted,
        merged = stats.merged,
        unchanged = stats.unchanged,
        "ingest complete"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_scoring::default_rules;
    use uuid::Uuid;

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("lf_ingest_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    #[tokio::test]
    async fn bar_number_records_converge() {
        let storage = test_storage().await;
        let rules = default_rules();

        let a = RawLead {
            bar_number: "12345".into(),
            state: "CA".into(),
            source: "calbar".into(),
            ..Default::default()
        };
        let b = RawLead {
            bar_number: "12345".into(),
            state: "CA".into(),
            email: "j@x.com".into(),
            source: "justia".into(),
            ..Default::default()
        };

        let stats = ingest_records(&storage, &rules, &[a, b]).await.expect("ingest");
        assert_eq!(
            stats,
            IngestStats {
                inserted: 1,
                merged: 1,
                unchanged: 0
            }
        );

        let leads = storage.list_leads(None).await.expect("list");
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].email, "j@x.com");
        assert_eq!(leads[0].email_source, "justia");

        let sources = storage.list_attributions(&leads[0].id).await.expect("attrs");
        assert_eq!(sources, vec!["calbar".to_string(), "justia".to_string()]);
    }

    #[tokio::test]
    async fn reingesting_same_record_is_unchanged() {
        let storage = test_storage().await;
        let rules = default_rules();

        let record = RawLead {
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            city: "Austin".into(),
            state: "TX".into(),
            email: "jane@doe.law".into(),
            source: "avvo".into(),
            ..Default::default()
        };

        let first = ingest_records(&storage, &rules, std::slice::from_ref(&record))
            .await
            .expect("first");
        assert_eq!(first.inserted, 1);

        let second = ingest_records(&storage, &rules, &[record])
            .await
            .expect("second");
        assert_eq!(
            second,
            IngestStats {
                inserted: 0,
                merged: 0,
                unchanged: 1
            }
        );
        assert_eq!(storage.count_leads().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn no_signal_records_always_insert() {
        let storage = test_storage().await;
        let rules = default_rules();

        let record = RawLead {
            title: "Partner".into(),
            ..Default::default()
        };
        let stats = ingest_records(&storage, &rules, &[record.clone(), record])
            .await
            .expect("ingest");
        assert_eq!(stats.inserted, 2);
    }

    #[tokio::test]
    async fn new_lead_is_scored_at_insert() {
        let storage = test_storage().await;
        let rules = default_rules();

        let record = RawLead {
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            city: "Austin".into(),
            state: "TX".into(),
            email: "jane@doe.law".into(),
            phone: "512-555-1212".into(),
            ..Default::default()
        };
        ingest_records(&storage, &rules, &[record]).await.expect("ingest");

        let leads = storage.list_leads(None).await.expect("list");
        // email 30 + phone 25
        assert_eq!(leads[0].lead_score, 55);
    }
}
