//! SQL migration definitions for the LeadFlow database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as a batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: leads, lead_sources, match-key indexes",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Canonical lead records. Text fields use '' for "absent"; a tracked field
-- and its _source companion are written together or not at all.
CREATE TABLE IF NOT EXISTS leads (
    id             TEXT PRIMARY KEY,
    bar_number     TEXT NOT NULL DEFAULT '',
    state          TEXT NOT NULL DEFAULT '',
    first_name     TEXT NOT NULL DEFAULT '',
    last_name      TEXT NOT NULL DEFAULT '',
    city           TEXT NOT NULL DEFAULT '',
    email          TEXT NOT NULL DEFAULT '',
    phone          TEXT NOT NULL DEFAULT '',
    -- digits-only projection of phone, maintained on every write
    phone_digits   TEXT NOT NULL DEFAULT '',
    website        TEXT NOT NULL DEFAULT '',
    firm_name      TEXT NOT NULL DEFAULT '',
    title          TEXT NOT NULL DEFAULT '',
    practice_area  TEXT NOT NULL DEFAULT '',
    linkedin_url   TEXT NOT NULL DEFAULT '',
    bio            TEXT NOT NULL DEFAULT '',
    email_source   TEXT NOT NULL DEFAULT '',
    phone_source   TEXT NOT NULL DEFAULT '',
    website_source TEXT NOT NULL DEFAULT '',
    source         TEXT NOT NULL DEFAULT '',
    detail_url     TEXT NOT NULL DEFAULT '',
    email_verified INTEGER NOT NULL DEFAULT 0,
    lead_score     INTEGER NOT NULL DEFAULT 0,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

-- Match-key indexes. None of these is UNIQUE: uniqueness is enforced
-- operationally by resolver ordering, not by schema constraints.
CREATE INDEX IF NOT EXISTS idx_leads_bar ON leads(bar_number, state);
CREATE INDEX IF NOT EXISTS idx_leads_email ON leads(email);
CREATE INDEX IF NOT EXISTS idx_leads_name ON leads(last_name, first_name, city, state);
CREATE INDEX IF NOT EXISTS idx_leads_phone_digits ON leads(phone_digits);

-- Source attribution: which sources have corroborated a lead.
CREATE TABLE IF NOT EXISTS lead_sources (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    lead_id       TEXT NOT NULL REFERENCES leads(id) ON DELETE CASCADE,
    source        TEXT NOT NULL,
    first_seen_at TEXT NOT NULL,
    UNIQUE(lead_id, source)
);

CREATE INDEX IF NOT EXISTS idx_lead_sources_lead ON lead_sources(lead_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
