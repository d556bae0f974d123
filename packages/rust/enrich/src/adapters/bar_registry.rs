//! Jurisdiction-specific bar registry adapter.
//!
//! One instance per registry, constructed from a `[[registries]]` config
//! entry. Coverage is a list of state codes; the orchestrator only sends a
//! lead here when its jurisdiction matches and the lead did not originate
//! from this registry.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

use leadflow_shared::{FieldSet, Lead, LeadField, LeadFlowError, RegistryEntry, Result};

use super::{ProviderAdapter, element_text, http_client, names_match};
use crate::limiter::RateLimiter;

/// Name-based roster lookup against one state bar registry.
pub struct BarRegistryAdapter {
    name: String,
    states: Vec<String>,
    base_url: Url,
    client: Client,
}

impl BarRegistryAdapter {
    pub fn new(entry: &RegistryEntry) -> Result<Self> {
        let base_url = Url::parse(&entry.base_url).map_err(|e| {
            LeadFlowError::config(format!("registry '{}' base url: {e}", entry.name))
        })?;
        Ok(Self {
            name: entry.name.clone(),
            states: entry.states.iter().map(|s| s.to_uppercase()).collect(),
            base_url,
            client: http_client()?,
        })
    }
}

#[async_trait]
impl ProviderAdapter for BarRegistryAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn jurisdictions(&self) -> Option<&[String]> {
        Some(&self.states)
    }

    async fn lookup(&self, lead: &Lead, limiter: &RateLimiter) -> Result<Option<FieldSet>> {
        if lead.first_name.trim().is_empty() || lead.last_name.trim().is_empty() {
            return Ok(None);
        }

        let mut url = self
            .base_url
            .join("/members/search")
            .map_err(|e| LeadFlowError::parse(format!("registry search url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("last_name", lead.last_name.trim())
            .append_pair("first_name", lead.first_name.trim());

        limiter.acquire().await;
        let body = super::get_text(&self.client, &url).await?;
        Ok(parse_roster(&body, lead))
    }
}

/// Extract contact fields from the first roster row carrying the lead's name.
fn parse_roster(html: &str, lead: &Lead) -> Option<FieldSet> {
    let doc = Html::parse_document(html);
    let record_sel = Selector::parse(".member-record").unwrap();
    let name_sel = Selector::parse(".member-name").unwrap();
    let email_sel = Selector::parse(r#"a[href^="mailto:"]"#).unwrap();
    let phone_sel = Selector::parse(".member-phone").unwrap();
    let website_sel = Selector::parse("a.member-website").unwrap();
    let firm_sel = Selector::parse(".member-firm").unwrap();

    for record in doc.select(&record_sel) {
        let Some(name_el) = record.select(&name_sel).next() else {
            continue;
        };
        if !names_match(lead, &element_text(&name_el)) {
            continue;
        }

        let mut fields = FieldSet::new();
        if let Some(el) = record.select(&email_sel).next() {
            if let Some(href) = el.value().attr("href") {
                let addr = href.trim_start_matches("mailto:").trim();
                if !addr.is_empty() {
                    fields.insert(LeadField::Email, addr.to_string());
                }
            }
        }
        if let Some(el) = record.select(&phone_sel).next() {
            let phone = element_text(&el);
            if !phone.is_empty() {
                fields.insert(LeadField::Phone, phone);
            }
        }
        if let Some(el) = record.select(&website_sel).next() {
            if let Some(href) = el.value().attr("href") {
                fields.insert(LeadField::Website, href.trim().to_string());
            }
        }
        if let Some(el) = record.select(&firm_sel).next() {
            let firm = element_text(&el);
            if !firm.is_empty() {
                fields.insert(LeadField::FirmName, firm);
            }
        }

        return if fields.is_empty() { None } else { Some(fields) };
    }

    None
}
