//! Justia directory adapter.
//!
//! Same capabilities as the Avvo adapter — profile fetch for its own leads,
//! name search for everyone else's — against Justia's markup.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

use leadflow_shared::{FieldSet, Lead, LeadField, LeadFlowError, Result};

use super::{
    ProviderAdapter, element_text, extract_mailto, extract_tel, get_text, http_client,
    names_match, resolve_detail_url,
};
use crate::limiter::RateLimiter;

/// Enriches leads from Justia lawyer profiles and the lawyer search.
pub struct JustiaAdapter {
    client: Client,
    base_url: Url,
}

impl JustiaAdapter {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| LeadFlowError::config(format!("justia base url: {e}")))?;
        Ok(Self {
            client: http_client()?,
            base_url,
        })
    }
}

#[async_trait]
impl ProviderAdapter for JustiaAdapter {
    fn name(&self) -> &str {
        "justia"
    }

    fn supports_profile_fetch(&self) -> bool {
        true
    }

    async fn fetch_profile(
        &self,
        lead: &Lead,
        limiter: &RateLimiter,
    ) -> Result<Option<FieldSet>> {
        let detail = lead.detail_url.trim();
        if detail.is_empty() {
            return Ok(None);
        }
        let url = resolve_detail_url(&self.base_url, detail)?;

        limiter.acquire().await;
        let body = get_text(&self.client, &url).await?;
        Ok(parse_profile(&body))
    }

    async fn lookup(&self, lead: &Lead, limiter: &RateLimiter) -> Result<Option<FieldSet>> {
        if lead.first_name.trim().is_empty() || lead.last_name.trim().is_empty() {
            return Ok(None);
        }

        let mut url = self
            .base_url
            .join("/lawyers/search")
            .map_err(|e| LeadFlowError::parse(format!("search url: {e}")))?;
        url.query_pairs_mut()
            .append_pair(
                "query",
                &format!("{} {}", lead.first_name.trim(), lead.last_name.trim()),
            )
            .append_pair("location", lead.state.trim());

        limiter.acquire().await;
        let body = get_text(&self.client, &url).await?;
        Ok(parse_search(&body, lead))
    }
}

/// Extract contact fields from a Justia profile page.
fn parse_profile(html: &str) -> Option<FieldSet> {
    let doc = Html::parse_document(html);
    let mut fields = FieldSet::new();

    if let Some(email) = extract_mailto(&doc) {
        fields.insert(LeadField::Email, email);
    }
    if let Some(phone) = extract_tel(&doc) {
        fields.insert(LeadField::Phone, phone);
    }

    let website_sel = Selector::parse(r#"a[data-vars-action="website"]"#).unwrap();
    if let Some(el) = doc.select(&website_sel).next() {
        if let Some(href) = el.value().attr("href") {
            fields.insert(LeadField::Website, href.trim().to_string());
        }
    }

    let firm_sel = Selector::parse(".firm-title").unwrap();
    if let Some(el) = doc.select(&firm_sel).next() {
        let firm = element_text(&el);
        if !firm.is_empty() {
            fields.insert(LeadField::FirmName, firm);
        }
    }

    let practice_sel = Selector::parse(".practice-areas").unwrap();
    if let Some(el) = doc.select(&practice_sel).next() {
        let area = element_text(&el);
        if !area.is_empty() {
            fields.insert(LeadField::PracticeArea, area);
        }
    }

    if fields.is_empty() { None } else { Some(fields) }
}

/// Extract contact fields from the first matching lawyer card.
fn parse_search(html: &str, lead: &Lead) -> Option<FieldSet> {
    let doc = Html::parse_document(html);
    let card_sel = Selector::parse(".lawyer-card").unwrap();
    let name_sel = Selector::parse(".lawyer-name").unwrap();
    let phone_sel = Selector::parse(".lawyer-phone").unwrap();
    let website_sel = Selector::parse("a.lawyer-website-link").unwrap();
    let firm_sel = Selector::parse(".lawyer-firm").unwrap();

    for card in doc.select(&card_sel) {
        let Some(name_el) = card.select(&name_sel).next() else {
            continue;
        };
        if !names_match(lead, &element_text(&name_el)) {
            continue;
        }

        let mut fields = FieldSet::new();
        if let Some(el) = card.select(&phone_sel).next() {
            let phone = element_text(&el);
            if !phone.is_empty() {
                fields.insert(LeadField::Phone, phone);
            }
        }
        if let Some(el) = card.select(&website_sel).next() {
            if let Some(href) = el.value().attr("href") {
                fields.insert(LeadField::Website, href.trim().to_string());
            }
        }
        if let Some(el) = card.select(&firm_sel).next() {
            let firm = element_text(&el);
            if !firm.is_empty() {
                fields.insert(LeadField::FirmName, firm);
            }
        }

        return if fields.is_empty() { None } else { Some(fields) };
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE_HTML: &str = r#"<html><body>
        <h1>Jane Doe</h1>
        <div class="firm-title">Doe &amp; Partners LLP</div>
        <div class="practice-areas">Family Law</div>
        <a href="mailto:jane@doe.law">Contact</a>
        <a data-vars-action="website" href="https://doe.law">Firm site</a>
    </body></html>"#;

    const SEARCH_HTML: &str = r#"<html><body>
        <div class="lawyer-card">
            <div class="lawyer-name">Jane Doe</div>
            <div class="lawyer-phone">(512) 555-1212</div>
            <a class="lawyer-website-link" href="https://doe.law">Website</a>
        </div>
    </body></html>"#;

    fn jane() -> Lead {
        let mut lead = Lead::new();
        lead.first_name = "Jane".into();
        lead.last_name = "Doe".into();
        lead.state = "TX".into();
        lead
    }

    #[test]
    fn profile_parse_extracts_fields() {
        let fields = parse_profile(PROFILE_HTML).expect("fields");
        assert_eq!(fields.get(&LeadField::Email).map(String::as_str), Some("jane@doe.law"));
        assert_eq!(
            fields.get(&LeadField::Website).map(String::as_str),
            Some("https://doe.law")
        );
        assert_eq!(
            fields.get(&LeadField::PracticeArea).map(String::as_str),
            Some("Family Law")
        );
    }

    #[test]
    fn search_parse_requires_name_match() {
        assert!(parse_search(SEARCH_HTML, &jane()).is_some());

        let mut other = Lead::new();
        other.first_name = "Alice".into();
        other.last_name = "Jones".into();
        assert!(parse_search(SEARCH_HTML, &other).is_none());
    }

    #[tokio::test]
    async fn lookup_via_mock_server() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/lawyers/search"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(SEARCH_HTML))
            .mount(&server)
            .await;

        let adapter = JustiaAdapter::new(&server.uri()).expect("adapter");
        let limiter = RateLimiter::from_millis(0);
        let fields = adapter
            .lookup(&jane(), &limiter)
            .await
            .expect("lookup")
            .expect("fields");
        assert_eq!(
            fields.get(&LeadField::Phone).map(String::as_str),
            Some("(512) 555-1212")
        );
    }

    #[tokio::test]
    async fn lookup_without_name_is_no_data() {
        let adapter = JustiaAdapter::new("https://www.justia.com").expect("adapter");
        let limiter = RateLimiter::from_millis(0);
        let lead = Lead::new();
        let result = adapter.lookup(&lead, &limiter).await.expect("lookup");
        assert!(result.is_none());
    }
}
