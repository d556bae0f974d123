//! Provider adapter trait, registry, and built-in adapters.
//!
//! An adapter wraps one external enrichment provider. Given a lead, it
//! returns the fields it could corroborate — or nothing. "No data found" is
//! `Ok(None)`; an `Err` means transport or parse failure and is the
//! orchestrator's failure-isolation case. Adapters never decide identity or
//! merge questions.

mod avvo;
mod bar_registry;
mod firm_site;
mod justia;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use leadflow_shared::{AppConfig, FieldSet, Lead, LeadFlowError, Result, normalize};

use crate::limiter::RateLimiter;

pub use avvo::AvvoAdapter;
pub use bar_registry::BarRegistryAdapter;
pub use firm_site::FirmSiteAdapter;
pub use justia::JustiaAdapter;

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("LeadFlow/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// One external enrichment provider.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Source identifier, used for provenance and attribution.
    fn name(&self) -> &str;

    /// Jurisdictions (state codes) this provider covers. `None` = nationwide.
    fn jurisdictions(&self) -> Option<&[String]> {
        None
    }

    /// Whether leads originating from this source carry a fetchable
    /// detail-page reference.
    fn supports_profile_fetch(&self) -> bool {
        false
    }

    /// Fetch the lead's own detail page on this provider.
    /// Only meaningful when [`supports_profile_fetch`](Self::supports_profile_fetch) is true.
    async fn fetch_profile(
        &self,
        _lead: &Lead,
        _limiter: &RateLimiter,
    ) -> Result<Option<FieldSet>> {
        Ok(None)
    }

    /// Look the lead up on this provider by its identity fields.
    async fn lookup(&self, lead: &Lead, limiter: &RateLimiter) -> Result<Option<FieldSet>>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Explicit source-name → adapter map, populated once at startup and passed
/// to the orchestrator.
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            adapters: BTreeMap::new(),
        }
    }

    /// Register an adapter under its own name.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    /// Look an adapter up by source name.
    pub fn get(&self, source: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(source).cloned()
    }

    /// Registered source names.
    pub fn names(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    /// Adapters with jurisdiction-restricted coverage (the bar registries).
    pub fn jurisdiction_adapters(&self) -> Vec<Arc<dyn ProviderAdapter>> {
        self.adapters
            .values()
            .filter(|a| a.jurisdictions().is_some())
            .cloned()
            .collect()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the registry of built-in adapters from the application config.
pub fn build_registry(config: &AppConfig) -> Result<AdapterRegistry> {
    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(AvvoAdapter::new(&config.directories.avvo_base_url)?));
    registry.register(Arc::new(JustiaAdapter::new(
        &config.directories.justia_base_url,
    )?));
    for entry in &config.registries {
        registry.register(Arc::new(BarRegistryAdapter::new(entry)?));
    }
    registry.register(Arc::new(FirmSiteAdapter::new()?));
    Ok(registry)
}

// ---------------------------------------------------------------------------
// Shared HTTP + extraction helpers
// ---------------------------------------------------------------------------

/// Build the HTTP client adapters share their settings from.
pub(crate) fn http_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| LeadFlowError::Network(format!("failed to build HTTP client: {e}")))
}

/// GET a URL and return the body, mapping failures to network errors.
pub(crate) async fn get_text(client: &Client, url: &Url) -> Result<String> {
    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| LeadFlowError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(LeadFlowError::Network(format!("{url}: HTTP {status}")));
    }

    response
        .text()
        .await
        .map_err(|e| LeadFlowError::Network(format!("{url}: body read failed: {e}")))
}

/// Collapse an element's text content to a trimmed string.
pub(crate) fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// First `mailto:` address in the document.
pub(crate) fn extract_mailto(doc: &Html) -> Option<String> {
    let sel = Selector::parse(r#"a[href^="mailto:"]"#).unwrap();
    doc.select(&sel).find_map(|el| {
        let href = el.value().attr("href")?;
        let addr = href.trim_start_matches("mailto:");
        // Strip ?subject=... style suffixes
        let addr = addr.split('?').next().unwrap_or(addr).trim();
        if addr.is_empty() {
            None
        } else {
            Some(addr.to_string())
        }
    })
}

/// First `tel:` number in the document.
pub(crate) fn extract_tel(doc: &Html) -> Option<String> {
    let sel = Selector::parse(r#"a[href^="tel:"]"#).unwrap();
    doc.select(&sel).find_map(|el| {
        let href = el.value().attr("href")?;
        let number = href.trim_start_matches("tel:").trim();
        if number.is_empty() {
            None
        } else {
            Some(number.to_string())
        }
    })
}

/// Whether an element's text carries the lead's full name, case-folded.
/// Both name parts must be present; leads without both never match.
pub(crate) fn names_match(lead: &Lead, text: &str) -> bool {
    let first = normalize::fold(&lead.first_name);
    let last = normalize::fold(&lead.last_name);
    if first.is_empty() || last.is_empty() {
        return false;
    }
    let haystack = normalize::fold(text);
    haystack.contains(&first) && haystack.contains(&last)
}

/// Resolve a possibly-relative detail URL against a provider base.
pub(crate) fn resolve_detail_url(base: &Url, detail: &str) -> Result<Url> {
    if detail.starts_with("http://") || detail.starts_with("https://") {
        Url::parse(detail).map_err(|e| LeadFlowError::parse(format!("detail url: {e}")))
    } else {
        base.join(detail)
            .map_err(|e| LeadFlowError::parse(format!("detail url: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailto_extraction_strips_subject() {
        let doc = Html::parse_document(
            r#"<a href="mailto:jane@doe.law?subject=Hello">Email</a>"#,
        );
        assert_eq!(extract_mailto(&doc).as_deref(), Some("jane@doe.law"));
    }

    #[test]
    fn tel_extraction() {
        let doc = Html::parse_document(r#"<a href="tel:+14155550100">Call</a>"#);
        assert_eq!(extract_tel(&doc).as_deref(), Some("+14155550100"));
        let empty = Html::parse_document("<p>no links</p>");
        assert_eq!(extract_tel(&empty), None);
    }

    #[test]
    fn names_match_is_case_folded() {
        let mut lead = Lead::new();
        lead.first_name = "Jane".into();
        lead.last_name = "Doe".into();
        assert!(names_match(&lead, "JANE DOE — Family Law Attorney"));
        assert!(!names_match(&lead, "John Doe"));

        let anonymous = Lead::new();
        assert!(!names_match(&anonymous, "Jane Doe"));
    }

    #[test]
    fn detail_url_resolution() {
        let base = Url::parse("https://www.avvo.com").unwrap();
        let absolute = resolve_detail_url(&base, "https://www.avvo.com/attorneys/1.html")
            .expect("absolute");
        assert_eq!(absolute.as_str(), "https://www.avvo.com/attorneys/1.html");

        let relative = resolve_detail_url(&base, "/attorneys/2.html").expect("relative");
        assert_eq!(relative.as_str(), "https://www.avvo.com/attorneys/2.html");
    }

    #[test]
    fn registry_lookup_by_source() {
        let config = AppConfig::default();
        let registry = build_registry(&config).expect("build");

        assert!(registry.get("avvo").is_some());
        assert!(registry.get("justia").is_some());
        assert!(registry.get("firm-website").is_some());
        assert!(registry.get("unknown-source").is_none());

        // Default config carries the three bar registries.
        assert_eq!(registry.jurisdiction_adapters().len(), 3);
        assert!(registry.get("calbar").is_some());
    }

    #[test]
    fn directory_adapters_support_profile_fetch() {
        let config = AppConfig::default();
        let registry = build_registry(&config).expect("build");
        assert!(registry.get("avvo").unwrap().supports_profile_fetch());
        assert!(registry.get("justia").unwrap().supports_profile_fetch());
        assert!(!registry.get("calbar").unwrap().supports_profile_fetch());
        assert!(!registry.get("firm-website").unwrap().supports_profile_fetch());
    }
}
