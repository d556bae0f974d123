//! libSQL storage layer for lead records.
//!
//! The [`Storage`] struct wraps a libSQL database holding canonical leads and
//! their source attributions. All SQL lives here; resolver, fusion, and
//! dedupe logic stay pure and call in through typed operations.
//!
//! Mutation granularity follows the single-writer model: one lead's fusion or
//! one merge group per transaction, so a failure mid-batch never rolls back
//! units that already committed.

mod migrations;

use std::path::Path;

use chrono::Utc;
use leadflow_shared::{
    FusionUpdate, Lead, LeadFlowError, LeadField, Result, normalize,
};
use libsql::{Connection, Database, params};

/// Column list shared by every lead SELECT, in [`row_to_lead`] order.
const LEAD_COLUMNS: &str = "id, bar_number, state, first_name, last_name, city, \
     email, phone, website, firm_name, title, practice_area, linkedin_url, bio, \
     email_source, phone_source, website_source, source, detail_url, \
     email_verified, lead_score, created_at, updated_at";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LeadFlowError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| LeadFlowError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| LeadFlowError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode (reporting consumers).
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| LeadFlowError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| LeadFlowError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        LeadFlowError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(LeadFlowError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    async fn exec_batch(&self, sql: &str) -> Result<()> {
        self.conn
            .execute_batch(sql)
            .await
            .map_err(|e| LeadFlowError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lead CRUD
    // -----------------------------------------------------------------------

    /// Insert a new canonical lead.
    pub async fn insert_lead(&self, lead: &Lead) -> Result<()> {
        self.check_writable()?;
        let digits = normalize::phone_digits(&lead.phone);
        let created = lead.created_at.to_rfc3339();
        let updated = lead.updated_at.to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO leads (id, bar_number, state, first_name, last_name, city, \
                 email, phone, phone_digits, website, firm_name, title, practice_area, \
                 linkedin_url, bio, email_source, phone_source, website_source, source, \
                 detail_url, email_verified, lead_score, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, \
                 ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)",
                params![
                    lead.id.as_str(),
                    lead.bar_number.as_str(),
                    lead.state.as_str(),
                    lead.first_name.as_str(),
                    lead.last_name.as_str(),
                    lead.city.as_str(),
                    lead.email.as_str(),
                    lead.phone.as_str(),
                    digits.as_str(),
                    lead.website.as_str(),
                    lead.firm_name.as_str(),
                    lead.title.as_str(),
                    lead.practice_area.as_str(),
                    lead.linkedin_url.as_str(),
                    lead.bio.as_str(),
                    lead.email_source.as_str(),
                    lead.phone_source.as_str(),
                    lead.website_source.as_str(),
                    lead.source.as_str(),
                    lead.detail_url.as_str(),
                    i64::from(lead.email_verified),
                    i64::from(lead.lead_score),
                    created.as_str(),
                    updated.as_str(),
                ],
            )
            .await
            .map_err(|e| LeadFlowError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get a lead by ID.
    pub async fn get_lead(&self, id: &str) -> Result<Option<Lead>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| LeadFlowError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_lead(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(LeadFlowError::Storage(e.to_string())),
        }
    }

    /// List leads, optionally restricted to a minimum score.
    pub async fn list_leads(&self, min_score: Option<u8>) -> Result<Vec<Lead>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {LEAD_COLUMNS} FROM leads \
                     WHERE lead_score >= ?1 ORDER BY created_at, id"
                ),
                params![i64::from(min_score.unwrap_or(0))],
            )
            .await
            .map_err(|e| LeadFlowError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_lead(&row)?);
        }
        Ok(results)
    }

    /// List leads still missing at least one tracked field, oldest first.
    pub async fn list_enrichable(&self, limit: usize) -> Result<Vec<Lead>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {LEAD_COLUMNS} FROM leads \
                     WHERE email = '' OR phone = '' OR website = '' \
                     ORDER BY created_at, id LIMIT ?1"
                ),
                params![limit as i64],
            )
            .await
            .map_err(|e| LeadFlowError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_lead(&row)?);
        }
        Ok(results)
    }

    /// Total number of leads in the store.
    pub async fn count_leads(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM leads", params![])
            .await
            .map_err(|e| LeadFlowError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| LeadFlowError::Storage(e.to_string()))?;
                Ok(count as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(LeadFlowError::Storage(e.to_string())),
        }
    }

    /// Set a lead's score (batch rescoring).
    pub async fn update_score(&self, id: &str, score: u8) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE leads SET lead_score = ?1, updated_at = ?2 WHERE id = ?3",
                params![i64::from(score), now.as_str(), id],
            )
            .await
            .map_err(|e| LeadFlowError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Rewrite a full lead row (merge application).
    async fn update_lead_row(&self, lead: &Lead) -> Result<()> {
        let digits = normalize::phone_digits(&lead.phone);
        let updated = lead.updated_at.to_rfc3339();
        self.conn
            .execute(
                "UPDATE leads SET bar_number = ?1, state = ?2, first_name = ?3, \
                 last_name = ?4, city = ?5, email = ?6, phone = ?7, phone_digits = ?8, \
                 website = ?9, firm_name = ?10, title = ?11, practice_area = ?12, \
                 linkedin_url = ?13, bio = ?14, email_source = ?15, phone_source = ?16, \
                 website_source = ?17, source = ?18, detail_url = ?19, \
                 email_verified = ?20, lead_score = ?21, updated_at = ?22 \
                 WHERE id = ?23",
                params![
                    lead.bar_number.as_str(),
                    lead.state.as_str(),
                    lead.first_name.as_str(),
                    lead.last_name.as_str(),
                    lead.city.as_str(),
                    lead.email.as_str(),
                    lead.phone.as_str(),
                    digits.as_str(),
                    lead.website.as_str(),
                    lead.firm_name.as_str(),
                    lead.title.as_str(),
                    lead.practice_area.as_str(),
                    lead.linkedin_url.as_str(),
                    lead.bio.as_str(),
                    lead.email_source.as_str(),
                    lead.phone_source.as_str(),
                    lead.website_source.as_str(),
                    lead.source.as_str(),
                    lead.detail_url.as_str(),
                    i64::from(lead.email_verified),
                    i64::from(lead.lead_score),
                    updated.as_str(),
                    lead.id.as_str(),
                ],
            )
            .await
            .map_err(|e| LeadFlowError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Resolver lookups
    // -----------------------------------------------------------------------
    //
    // Each lookup returns the oldest matching lead id so repeated resolution
    // of the same candidate lands on the same record.

    /// Exact match on (bar_number, state).
    pub async fn find_by_bar(&self, bar_number: &str, state: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM leads WHERE bar_number = ?1 AND state = ?2 \
                 ORDER BY created_at, id LIMIT 1",
                params![bar_number, state],
            )
            .await
            .map_err(|e| LeadFlowError::Storage(e.to_string()))?;
        first_id(&mut rows).await
    }

    /// Case-insensitive, trimmed email match. Pass a folded value.
    pub async fn find_by_email(&self, folded_email: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM leads WHERE email != '' AND lower(trim(email)) = ?1 \
                 ORDER BY created_at, id LIMIT 1",
                params![folded_email],
            )
            .await
            .map_err(|e| LeadFlowError::Storage(e.to_string()))?;
        first_id(&mut rows).await
    }

    /// Case-insensitive (first_name, last_name, city, state) match. Pass folded values.
    pub async fn find_by_name_city(
        &self,
        first: &str,
        last: &str,
        city: &str,
        state: &str,
    ) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM leads \
                 WHERE lower(trim(first_name)) = ?1 AND lower(trim(last_name)) = ?2 \
                   AND lower(trim(city)) = ?3 AND lower(trim(state)) = ?4 \
                   AND first_name != '' AND last_name != '' \
                 ORDER BY created_at, id LIMIT 1",
                params![first, last, city, state],
            )
            .await
            .map_err(|e| LeadFlowError::Storage(e.to_string()))?;
        first_id(&mut rows).await
    }

    /// Match on the last 10 digits of the stored phone number.
    pub async fn find_by_phone_suffix(&self, suffix: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM leads \
                 WHERE phone_digits != '' AND substr(phone_digits, -10) = ?1 \
                 ORDER BY created_at, id LIMIT 1",
                params![suffix],
            )
            .await
            .map_err(|e| LeadFlowError::Storage(e.to_string()))?;
        first_id(&mut rows).await
    }

    // -----------------------------------------------------------------------
    // Fusion application
    // -----------------------------------------------------------------------

    /// Apply a [`FusionUpdate`] to a lead, plus the source attribution, in one
    /// transaction. An empty update with a source still records attribution.
    pub async fn apply_fusion(
        &self,
        lead_id: &str,
        update: &FusionUpdate,
        source: &str,
    ) -> Result<()> {
        self.check_writable()?;
        let source = source.trim();
        if update.is_empty() && source.is_empty() {
            return Ok(());
        }

        self.exec_batch("BEGIN IMMEDIATE").await?;
        if let Err(e) = self.apply_fusion_body(lead_id, update, source).await {
            let _ = self.exec_batch("ROLLBACK").await;
            return Err(e);
        }
        self.exec_batch("COMMIT").await
    }

    async fn apply_fusion_body(
        &self,
        lead_id: &str,
        update: &FusionUpdate,
        source: &str,
    ) -> Result<()> {
        for (field, value) in &update.fills {
            // Column names come from the closed LeadField vocabulary.
            let sql = format!("UPDATE leads SET {} = ?1 WHERE id = ?2", field.as_str());
            self.conn
                .execute(&sql, params![value.as_str(), lead_id])
                .await
                .map_err(|e| LeadFlowError::Storage(e.to_string()))?;

            if *field == LeadField::Phone {
                let digits = normalize::phone_digits(value);
                self.conn
                    .execute(
                        "UPDATE leads SET phone_digits = ?1 WHERE id = ?2",
                        params![digits.as_str(), lead_id],
                    )
                    .await
                    .map_err(|e| LeadFlowError::Storage(e.to_string()))?;
            }
        }

        for (field, src) in &update.provenance {
            let sql = format!(
                "UPDATE leads SET {}_source = ?1 WHERE id = ?2",
                field.as_str()
            );
            self.conn
                .execute(&sql, params![src.as_str(), lead_id])
                .await
                .map_err(|e| LeadFlowError::Storage(e.to_string()))?;
        }

        if let Some(score) = update.new_score {
            let now = Utc::now().to_rfc3339();
            self.conn
                .execute(
                    "UPDATE leads SET lead_score = ?1, updated_at = ?2 WHERE id = ?3",
                    params![i64::from(score), now.as_str(), lead_id],
                )
                .await
                .map_err(|e| LeadFlowError::Storage(e.to_string()))?;
        }

        if !source.is_empty() {
            self.insert_attribution(lead_id, source).await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Source attribution
    // -----------------------------------------------------------------------

    /// Record that `source` has corroborated a lead (insert-or-ignore).
    pub async fn add_attribution(&self, lead_id: &str, source: &str) -> Result<()> {
        self.check_writable()?;
        self.insert_attribution(lead_id, source).await
    }

    async fn insert_attribution(&self, lead_id: &str, source: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT OR IGNORE INTO lead_sources (lead_id, source, first_seen_at) \
                 VALUES (?1, ?2, ?3)",
                params![lead_id, source, now.as_str()],
            )
            .await
            .map_err(|e| LeadFlowError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Sources that have corroborated a lead.
    pub async fn list_attributions(&self, lead_id: &str) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT source FROM lead_sources WHERE lead_id = ?1 ORDER BY source",
                params![lead_id],
            )
            .await
            .map_err(|e| LeadFlowError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(
                row.get::<String>(0)
                    .map_err(|e| LeadFlowError::Storage(e.to_string()))?,
            );
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Duplicate resolution
    // -----------------------------------------------------------------------

    /// Groups of ≥2 leads sharing a case-folded (first, last, city, state)
    /// key. Leads with any empty key part never group. Each group is ordered
    /// oldest first.
    pub async fn duplicate_name_groups(&self) -> Result<Vec<Vec<Lead>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT lower(trim(first_name)), lower(trim(last_name)), \
                        lower(trim(city)), lower(trim(state)) \
                 FROM leads \
                 WHERE trim(first_name) != '' AND trim(last_name) != '' \
                   AND trim(city) != '' AND trim(state) != '' \
                 GROUP BY 1, 2, 3, 4 \
                 HAVING COUNT(*) > 1",
                params![],
            )
            .await
            .map_err(|e| LeadFlowError::Storage(e.to_string()))?;

        let mut keys: Vec<(String, String, String, String)> = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            keys.push((
                row.get::<String>(0)
                    .map_err(|e| LeadFlowError::Storage(e.to_string()))?,
                row.get::<String>(1)
                    .map_err(|e| LeadFlowError::Storage(e.to_string()))?,
                row.get::<String>(2)
                    .map_err(|e| LeadFlowError::Storage(e.to_string()))?,
                row.get::<String>(3)
                    .map_err(|e| LeadFlowError::Storage(e.to_string()))?,
            ));
        }

        let mut groups = Vec::with_capacity(keys.len());
        for (first, last, city, state) in keys {
            let mut rows = self
                .conn
                .query(
                    &format!(
                        "SELECT {LEAD_COLUMNS} FROM leads \
                         WHERE lower(trim(first_name)) = ?1 AND lower(trim(last_name)) = ?2 \
                           AND lower(trim(city)) = ?3 AND lower(trim(state)) = ?4 \
                         ORDER BY created_at, id"
                    ),
                    params![
                        first.as_str(),
                        last.as_str(),
                        city.as_str(),
                        state.as_str()
                    ],
                )
                .await
                .map_err(|e| LeadFlowError::Storage(e.to_string()))?;

            let mut group = Vec::new();
            while let Ok(Some(row)) = rows.next().await {
                group.push(row_to_lead(&row)?);
            }
            if group.len() > 1 {
                groups.push(group);
            }
        }
        Ok(groups)
    }

    /// Apply one merge group in a single transaction: rewrite the winner row,
    /// re-point the losers' attributions (insert-or-ignore), and delete the
    /// loser rows.
    pub async fn apply_merge(&self, winner: &Lead, loser_ids: &[String]) -> Result<()> {
        self.check_writable()?;

        self.exec_batch("BEGIN IMMEDIATE").await?;
        if let Err(e) = self.apply_merge_body(winner, loser_ids).await {
            let _ = self.exec_batch("ROLLBACK").await;
            return Err(e);
        }
        self.exec_batch("COMMIT").await
    }

    async fn apply_merge_body(&self, winner: &Lead, loser_ids: &[String]) -> Result<()> {
        self.update_lead_row(winner).await?;
        for loser in loser_ids {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO lead_sources (lead_id, source, first_seen_at) \
                     SELECT ?1, source, first_seen_at FROM lead_sources WHERE lead_id = ?2",
                    params![winner.id.as_str(), loser.as_str()],
                )
                .await
                .map_err(|e| LeadFlowError::Storage(e.to_string()))?;
            self.conn
                .execute(
                    "DELETE FROM lead_sources WHERE lead_id = ?1",
                    params![loser.as_str()],
                )
                .await
                .map_err(|e| LeadFlowError::Storage(e.to_string()))?;
            self.conn
                .execute("DELETE FROM leads WHERE id = ?1", params![loser.as_str()])
                .await
                .map_err(|e| LeadFlowError::Storage(e.to_string()))?;
        }
        Ok(())
    }
}

/// Read the single `id` column from the first row, if any.
async fn first_id(rows: &mut libsql::Rows) -> Result<Option<String>> {
    match rows.next().await {
        Ok(Some(row)) => Ok(Some(
            row.get::<String>(0)
                .map_err(|e| LeadFlowError::Storage(e.to_string()))?,
        )),
        Ok(None) => Ok(None),
        Err(e) => Err(LeadFlowError::Storage(e.to_string())),
    }
}

/// Convert a database row (in [`LEAD_COLUMNS`] order) to a [`Lead`].
fn row_to_lead(row: &libsql::Row) -> Result<Lead> {
    fn text(row: &libsql::Row, idx: i32) -> Result<String> {
        row.get::<String>(idx)
            .map_err(|e| LeadFlowError::Storage(e.to_string()))
    }

    let parse_ts = |s: String| {
        chrono::DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .map_err(|e| LeadFlowError::Storage(format!("invalid date: {e}")))
    };

    Ok(Lead {
        id: text(row, 0)?,
        bar_number: text(row, 1)?,
        state: text(row, 2)?,
        first_name: text(row, 3)?,
        last_name: text(row, 4)?,
        city: text(row, 5)?,
        email: text(row, 6)?,
        phone: text(row, 7)?,
        website: text(row, 8)?,
        firm_name: text(row, 9)?,
        title: text(row, 10)?,
        practice_area: text(row, 11)?,
        linkedin_url: text(row, 12)?,
        bio: text(row, 13)?,
        email_source: text(row, 14)?,
        phone_source: text(row, 15)?,
        website_source: text(row, 16)?,
        source: text(row, 17)?,
        detail_url: text(row, 18)?,
        email_verified: row
            .get::<i64>(19)
            .map_err(|e| LeadFlowError::Storage(e.to_string()))?
            != 0,
        lead_score: row
            .get::<i64>(20)
            .map_err(|e| LeadFlowError::Storage(e.to_string()))?
            .clamp(0, 100) as u8,
        created_at: parse_ts(text(row, 21)?)?,
        updated_at: parse_ts(text(row, 22)?)?,
    })
}
