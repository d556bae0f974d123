//! Application configuration for LeadFlow.
//!
//! User config lives at `~/.leadflow/leadflow.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LeadFlowError, Result};
use crate::types::ScoreRule;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "leadflow.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".leadflow";

// ---------------------------------------------------------------------------
// Config structs (matching leadflow.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Waterfall/provider settings.
    #[serde(default)]
    pub waterfall: WaterfallConfig,

    /// Directory provider endpoints.
    #[serde(default)]
    pub directories: DirectoriesConfig,

    /// Jurisdiction-specific bar registries.
    #[serde(default = "default_registries")]
    pub registries: Vec<RegistryEntry>,

    /// Scoring rule set. Empty = built-in default rules.
    #[serde(default)]
    pub scoring: ScoringConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            defaults: DefaultsConfig::default(),
            waterfall: WaterfallConfig::default(),
            directories: DirectoriesConfig::default(),
            registries: default_registries(),
            scoring: ScoringConfig::default(),
        }
    }
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path to the lead database.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Default batch size for enrichment runs.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            batch_limit: default_batch_limit(),
        }
    }
}

fn default_db_path() -> String {
    "~/.leadflow/leadflow.db".into()
}
fn default_batch_limit() -> usize {
    500
}

/// `[waterfall]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallConfig {
    /// Minimum ms between requests to a single provider.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,

    /// Per-provider overrides of `rate_limit_ms`, keyed by source name.
    #[serde(default)]
    pub rate_limits: std::collections::BTreeMap<String, u64>,
}

impl Default for WaterfallConfig {
    fn default() -> Self {
        Self {
            rate_limit_ms: default_rate_limit(),
            rate_limits: Default::default(),
        }
    }
}

impl WaterfallConfig {
    /// Effective minimum interval for a provider, in ms.
    pub fn rate_limit_for(&self, source: &str) -> u64 {
        self.rate_limits
            .get(source)
            .copied()
            .unwrap_or(self.rate_limit_ms)
    }
}

fn default_rate_limit() -> u64 {
    1500
}

/// `[directories]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoriesConfig {
    #[serde(default = "default_avvo_url")]
    pub avvo_base_url: String,

    #[serde(default = "default_justia_url")]
    pub justia_base_url: String,
}

impl Default for DirectoriesConfig {
    fn default() -> Self {
        Self {
            avvo_base_url: default_avvo_url(),
            justia_base_url: default_justia_url(),
        }
    }
}

fn default_avvo_url() -> String {
    "https://www.avvo.com".into()
}
fn default_justia_url() -> String {
    "https://www.justia.com".into()
}

/// `[[registries]]` entry — a jurisdiction-specific bar registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Source name (e.g. "calbar").
    pub name: String,
    /// Jurisdictions this registry covers (state codes).
    pub states: Vec<String>,
    /// Search endpoint base URL.
    pub base_url: String,
}

fn default_registries() -> Vec<RegistryEntry> {
    vec![
        RegistryEntry {
            name: "calbar".into(),
            states: vec!["CA".into()],
            base_url: "https://apps.calbar.ca.gov".into(),
        },
        RegistryEntry {
            name: "nycourts".into(),
            states: vec!["NY".into()],
            base_url: "https://iapps.courts.state.ny.us".into(),
        },
        RegistryEntry {
            name: "texasbar".into(),
            states: vec!["TX".into()],
            base_url: "https://www.texasbar.com".into(),
        },
    ]
}

/// `[scoring]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Custom rule set; the built-in defaults apply when empty.
    #[serde(default)]
    pub rules: Vec<ScoreRule>,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.leadflow/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LeadFlowError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.leadflow/leadflow.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LeadFlowError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        LeadFlowError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LeadFlowError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LeadFlowError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LeadFlowError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve the configured database path, expanding a leading `~/`.
pub fn resolve_db_path(config: &AppConfig) -> Result<PathBuf> {
    let raw = &config.defaults.db_path;
    if let Some(rest) = raw.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| LeadFlowError::config("could not determine home directory"))?;
        return Ok(home.join(rest));
    }
    Ok(PathBuf::from(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Condition;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("db_path"));
        assert!(toml_str.contains("rate_limit_ms"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.batch_limit, 500);
        assert_eq!(parsed.waterfall.rate_limit_ms, 1500);
    }

    #[test]
    fn rate_limit_override() {
        let toml_str = r#"
[waterfall]
rate_limit_ms = 1000

[waterfall.rate_limits]
avvo = 2500
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.waterfall.rate_limit_for("avvo"), 2500);
        assert_eq!(config.waterfall.rate_limit_for("justia"), 1000);
    }

    #[test]
    fn custom_registries() {
        let toml_str = r#"
[[registries]]
name = "flbar"
states = ["FL"]
base_url = "https://www.floridabar.org"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.registries.len(), 1);
        assert_eq!(config.registries[0].name, "flbar");
    }

    #[test]
    fn default_registries_present_when_unset() {
        let config: AppConfig = toml::from_str("").expect("parse empty");
        assert!(config.registries.iter().any(|r| r.name == "calbar"));
    }

    #[test]
    fn scoring_rules_from_toml() {
        let toml_str = r#"
[[scoring.rules]]
field = "email"
condition = "is_not_empty"
points = 40

[[scoring.rules]]
field = "email_verified"
condition = "equals_1"
points = 20
enabled = false
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.scoring.rules.len(), 2);
        assert_eq!(config.scoring.rules[0].condition, Condition::IsNotEmpty);
        assert!(config.scoring.rules[0].enabled);
        assert_eq!(config.scoring.rules[1].condition, Condition::EqualsOne);
        assert!(!config.scoring.rules[1].enabled);
    }

    #[test]
    fn db_path_expansion() {
        let mut config = AppConfig::default();
        config.defaults.db_path = "/tmp/leads.db".into();
        let path = resolve_db_path(&config).expect("resolve");
        assert_eq!(path, PathBuf::from("/tmp/leads.db"));
    }
}
