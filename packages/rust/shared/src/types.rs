//! Core domain types for LeadFlow.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LeadFlowError;

/// Current schema version for the lead database.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// LeadField
// ---------------------------------------------------------------------------

/// The closed vocabulary of enrichable lead fields.
///
/// Provider adapters and ingest records may only carry these keys; anything
/// else is rejected at the boundary instead of being iterated blindly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LeadField {
    Email,
    Phone,
    Website,
    FirmName,
    Title,
    PracticeArea,
    LinkedinUrl,
    Bio,
}

impl LeadField {
    /// Every field in the vocabulary, in canonical order.
    pub const ALL: [LeadField; 8] = [
        LeadField::Email,
        LeadField::Phone,
        LeadField::Website,
        LeadField::FirmName,
        LeadField::Title,
        LeadField::PracticeArea,
        LeadField::LinkedinUrl,
        LeadField::Bio,
    ];

    /// The three tracked fields whose origin is recorded via provenance.
    pub const TRACKED: [LeadField; 3] =
        [LeadField::Email, LeadField::Phone, LeadField::Website];

    /// Column/key name for this field.
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadField::Email => "email",
            LeadField::Phone => "phone",
            LeadField::Website => "website",
            LeadField::FirmName => "firm_name",
            LeadField::Title => "title",
            LeadField::PracticeArea => "practice_area",
            LeadField::LinkedinUrl => "linkedin_url",
            LeadField::Bio => "bio",
        }
    }

    /// Whether a fill of this field records provenance.
    pub fn is_tracked(&self) -> bool {
        matches!(self, LeadField::Email | LeadField::Phone | LeadField::Website)
    }
}

impl fmt::Display for LeadField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadField {
    type Err = LeadFlowError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "email" => Ok(LeadField::Email),
            "phone" => Ok(LeadField::Phone),
            "website" => Ok(LeadField::Website),
            "firm_name" => Ok(LeadField::FirmName),
            "title" => Ok(LeadField::Title),
            "practice_area" => Ok(LeadField::PracticeArea),
            "linkedin_url" => Ok(LeadField::LinkedinUrl),
            "bio" => Ok(LeadField::Bio),
            other => Err(LeadFlowError::validation(format!(
                "unknown lead field '{other}'"
            ))),
        }
    }
}

/// A partial set of field values, as returned by provider adapters.
/// Only non-empty values belong in a field set.
pub type FieldSet = BTreeMap<LeadField, String>;

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

/// The canonical contact record for one real-world entity.
///
/// Text fields use the empty string for "absent", matching the store's
/// `NOT NULL DEFAULT ''` columns. A tracked field and its `_source` companion
/// are set together or not at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    /// Unique identifier (UUID v7, time-sortable).
    pub id: String,

    // Identity fields.
    #[serde(default)]
    pub bar_number: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub city: String,

    // Enrichable fields.
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub firm_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub practice_area: String,
    #[serde(default)]
    pub linkedin_url: String,
    #[serde(default)]
    pub bio: String,

    // Provenance for the tracked fields.
    #[serde(default)]
    pub email_source: String,
    #[serde(default)]
    pub phone_source: String,
    #[serde(default)]
    pub website_source: String,

    /// Originating scraper source.
    #[serde(default)]
    pub source: String,
    /// Source-specific detail-page URL, if the originating source has one.
    #[serde(default)]
    pub detail_url: String,

    #[serde(default)]
    pub email_verified: bool,
    /// Quality score, 0–100.
    #[serde(default)]
    pub lead_score: u8,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Create an empty lead with a fresh id and current timestamps.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            bar_number: String::new(),
            state: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            city: String::new(),
            email: String::new(),
            phone: String::new(),
            website: String::new(),
            firm_name: String::new(),
            title: String::new(),
            practice_area: String::new(),
            linkedin_url: String::new(),
            bio: String::new(),
            email_source: String::new(),
            phone_source: String::new(),
            website_source: String::new(),
            source: String::new(),
            detail_url: String::new(),
            email_verified: false,
            lead_score: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Value of an enrichable field.
    pub fn field(&self, field: LeadField) -> &str {
        match field {
            LeadField::Email => &self.email,
            LeadField::Phone => &self.phone,
            LeadField::Website => &self.website,
            LeadField::FirmName => &self.firm_name,
            LeadField::Title => &self.title,
            LeadField::PracticeArea => &self.practice_area,
            LeadField::LinkedinUrl => &self.linkedin_url,
            LeadField::Bio => &self.bio,
        }
    }

    /// Set an enrichable field.
    pub fn set_field(&mut self, field: LeadField, value: impl Into<String>) {
        let value = value.into();
        match field {
            LeadField::Email => self.email = value,
            LeadField::Phone => self.phone = value,
            LeadField::Website => self.website = value,
            LeadField::FirmName => self.firm_name = value,
            LeadField::Title => self.title = value,
            LeadField::PracticeArea => self.practice_area = value,
            LeadField::LinkedinUrl => self.linkedin_url = value,
            LeadField::Bio => self.bio = value,
        }
    }

    /// Provenance entry for a tracked field. `None` for untracked fields.
    pub fn provenance(&self, field: LeadField) -> Option<&str> {
        match field {
            LeadField::Email => Some(&self.email_source),
            LeadField::Phone => Some(&self.phone_source),
            LeadField::Website => Some(&self.website_source),
            _ => None,
        }
    }

    /// Record provenance for a tracked field. No-op for untracked fields.
    pub fn set_provenance(&mut self, field: LeadField, source: impl Into<String>) {
        let source = source.into();
        match field {
            LeadField::Email => self.email_source = source,
            LeadField::Phone => self.phone_source = source,
            LeadField::Website => self.website_source = source,
            _ => {}
        }
    }

    /// Whether at least one tracked field is still missing.
    pub fn needs_enrichment(&self) -> bool {
        LeadField::TRACKED
            .iter()
            .any(|f| self.field(*f).trim().is_empty())
    }

    /// Value lookup for data-driven scoring rules. Covers the enrichable
    /// vocabulary plus identity fields and flags. `None` for unknown names.
    pub fn rule_value(&self, name: &str) -> Option<&str> {
        if let Ok(field) = name.parse::<LeadField>() {
            return Some(self.field(field));
        }
        match name {
            "bar_number" => Some(&self.bar_number),
            "state" => Some(&self.state),
            "first_name" => Some(&self.first_name),
            "last_name" => Some(&self.last_name),
            "city" => Some(&self.city),
            "detail_url" => Some(&self.detail_url),
            "email_verified" => Some(if self.email_verified { "1" } else { "0" }),
            _ => None,
        }
    }

    /// Display name for progress output and logs.
    pub fn display_name(&self) -> String {
        let name = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let name = name.trim();
        if name.is_empty() {
            self.id.clone()
        } else {
            name.to_string()
        }
    }
}

impl Default for Lead {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// RawLead
// ---------------------------------------------------------------------------

/// An incoming record from a scraping source, before identity resolution.
///
/// `deny_unknown_fields` makes the field vocabulary a hard boundary: a record
/// carrying keys outside it fails to parse and is rejected explicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawLead {
    #[serde(default)]
    pub bar_number: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub firm_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub practice_area: String,
    #[serde(default)]
    pub linkedin_url: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub detail_url: String,
    #[serde(default)]
    pub email_verified: bool,
}

impl RawLead {
    /// Non-empty enrichable values, as a [`FieldSet`] for fusion.
    pub fn field_set(&self) -> FieldSet {
        let mut set = FieldSet::new();
        for field in LeadField::ALL {
            let value = match field {
                LeadField::Email => &self.email,
                LeadField::Phone => &self.phone,
                LeadField::Website => &self.website,
                LeadField::FirmName => &self.firm_name,
                LeadField::Title => &self.title,
                LeadField::PracticeArea => &self.practice_area,
                LeadField::LinkedinUrl => &self.linkedin_url,
                LeadField::Bio => &self.bio,
            };
            let value = value.trim();
            if !value.is_empty() {
                set.insert(field, value.to_string());
            }
        }
        set
    }

    /// Build a new canonical lead from this record.
    ///
    /// Tracked fields present at creation get their provenance from the
    /// record's source ("import" when the record carries none), keeping the
    /// field/provenance pairing intact from the first write. The score is not
    /// computed here; the caller owns scoring.
    pub fn to_lead(&self) -> Lead {
        let mut lead = Lead::new();
        lead.bar_number = self.bar_number.trim().to_string();
        lead.state = self.state.trim().to_string();
        lead.first_name = self.first_name.trim().to_string();
        lead.last_name = self.last_name.trim().to_string();
        lead.city = self.city.trim().to_string();
        lead.source = self.source.trim().to_string();
        lead.detail_url = self.detail_url.trim().to_string();
        lead.email_verified = self.email_verified;

        let provenance = if lead.source.is_empty() {
            "import".to_string()
        } else {
            lead.source.clone()
        };

        for (field, value) in self.field_set() {
            lead.set_field(field, value);
            if field.is_tracked() {
                lead.set_provenance(field, provenance.clone());
            }
        }
        lead
    }
}

// ---------------------------------------------------------------------------
// FusionUpdate
// ---------------------------------------------------------------------------

/// The outcome of fusing an incoming field set into an existing lead:
/// gap-filling values, provenance entries for tracked fills, and the
/// recomputed score (present iff any field was filled).
#[derive(Debug, Clone, Default)]
pub struct FusionUpdate {
    pub fills: FieldSet,
    pub provenance: BTreeMap<LeadField, String>,
    pub new_score: Option<u8>,
}

impl FusionUpdate {
    /// Whether the update carries no fills (a no-op apart from attribution).
    pub fn is_empty(&self) -> bool {
        self.fills.is_empty()
    }

    /// Apply the update to an in-memory lead, mirroring what the store does.
    pub fn apply_to(&self, lead: &mut Lead) {
        for (field, value) in &self.fills {
            lead.set_field(*field, value.clone());
        }
        for (field, source) in &self.provenance {
            lead.set_provenance(*field, source.clone());
        }
        if let Some(score) = self.new_score {
            lead.lead_score = score;
            lead.updated_at = Utc::now();
        }
    }
}

// ---------------------------------------------------------------------------
// Scoring rules
// ---------------------------------------------------------------------------

/// Condition a scoring rule applies to its field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    IsNotEmpty,
    #[serde(rename = "equals_1")]
    EqualsOne,
    IsEmpty,
}

/// A single scoring rule. Rules are data, editable in the config file
/// without redeploying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRule {
    /// Lead field name the rule reads (see [`Lead::rule_value`]).
    pub field: String,
    pub condition: Condition,
    pub points: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}
