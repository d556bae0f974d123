//! Avvo directory adapter.
//!
//! Avvo is both an originating source (its listing scraper records a
//! detail-page reference) and a cross-reference target for leads that came
//! from elsewhere.

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

/// Enriches leads from Avvo profile pages and name searches.
pub struct AvvoAdapter {
    client: Client,
    base_url: Url,
}

impl AvvoAdapter {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| LeadFlowError::config(format!("avvo base url: {e}")))?;
        Ok(Self {
            client: http_client()?,
            base_url,
        })
    }
}

#[async_trait]
impl ProviderAdapter for AvvoAdapter {
    fn name(&self) -> &str {
        "avvo"
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
            .join("/attorneys/search")
            .map_err(|e| LeadFlowError::parse(format!("search url: {e}")))?;
        url.query_pairs_mut()
            .append_pair(
                "q",
                &format!("{} {}", lead.first_name.trim(), lead.last_name.trim()),
            )
            .append_pair(
                "loc",
                &format!("{}, {}", lead.city.trim(), lead.state.trim()),
            );

        limiter.acquire().await;
        let body = get_text(&self.client, &url).await?;
        Ok(parse_search(&body, lead))
    }
}

/// Extract contact fields from an Avvo profile page.
fn parse_profile(html: &str) -> Option<FieldSet> {
    let doc = Html::parse_document(html);
    let mut fields = FieldSet::new();

    if let Some(email) = extract_mailto(&doc) {
        fields.insert(LeadField::Email, email);
    }
    if let Some(phone) = extract_tel(&doc) {
        fields.insert(LeadField::Phone, phone);
    }

    let website_sel = Selector::parse("a.profile-website").unwrap();
    if let Some(el) = doc.select(&website_sel).next() {
        if let Some(href) = el.value().attr("href") {
            fields.insert(LeadField::Website, href.trim().to_string());
        }
    }

    let firm_sel = Selector::parse(".profile-firm-name").unwrap();
    if let Some(el) = doc.select(&firm_sel).next() {
        let firm = element_text(&el);
        if !firm.is_empty() {
            fields.insert(LeadField::FirmName, firm);
        }
    }

    let headline_sel = Selector::parse(".profile-headline").unwrap();
    if let Some(el) = doc.select(&headline_sel).next() {
        let title = element_text(&el);
        if !title.is_empty() {
            fields.insert(LeadField::Title, title);
        }
    }

    if fields.is_empty() { None } else { Some(fields) }
}

/// Extract contact fields from the first search result card that carries the
/// lead's full name. No name match, no data.
fn parse_search(html: &str, lead: &Lead) -> Option<FieldSet> {
    let doc = Html::parse_document(html);
    let card_sel = Selector::parse(".search-result-lawyer").unwrap();
    let name_sel = Selector::parse(".lawyer-name").unwrap();
    let phone_sel = Selector::parse(".lawyer-phone").unwrap();
    let website_sel = Selector::parse("a.lawyer-website").unwrap();
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
        <div class="profile-headline">Family Law Attorney</div>
        <div class="profile-firm-name">Doe &amp; Partners LLP</div>
        <a href="mailto:jane@doe.law">Email Jane</a>
        <a href="tel:+15125551212">Call</a>
        <a class="profile-website" href="https://doe.law">Website</a>
    </body></html>"#;

    const SEARCH_HTML: &str = r#"<html><body>
        <div class="search-result-lawyer">
            <h3 class="lawyer-name">John Smith</h3>
            <span class="lawyer-phone">555-000-1111</span>
        </div>
        <div class="search-result-lawyer">
            <h3 class="lawyer-name">Jane Doe</h3>
            <span class="lawyer-phone">512-555-1212</span>
            <a class="lawyer-website" href="https://doe.law">doe.law</a>
            <span class="lawyer-firm">Doe &amp; Partners LLP</span>
        </div>
    </body></html>"#;

    fn jane() -> Lead {
        let mut lead = Lead::new();
        lead.first_name = "Jane".into();
        lead.last_name = "Doe".into();
        lead.city = "Austin".into();
        lead.state = "TX".into();
        lead
    }

    #[test]
    fn profile_parse_extracts_contact_fields() {
        let fields = parse_profile(PROFILE_HTML).expect("fields");
        assert_eq!(fields.get(&LeadField::Email).map(String::as_str), Some("jane@doe.law"));
        assert_eq!(
            fields.get(&LeadField::Phone).map(String::as_str),
            Some("+15125551212")
        );
        assert_eq!(
            fields.get(&LeadField::Website).map(String::as_str),
            Some("https://doe.law")
        );
        assert_eq!(
            fields.get(&LeadField::FirmName).map(String::as_str),
            Some("Doe & Partners LLP")
        );
    }

    #[test]
    fn profile_parse_empty_page_is_no_data() {
        assert!(parse_profile("<html><body><p>Not found</p></body></html>").is_none());
    }

    #[test]
    fn search_parse_picks_matching_card() {
        let fields = parse_search(SEARCH_HTML, &jane()).expect("fields");
        assert_eq!(
            fields.get(&LeadField::Phone).map(String::as_str),
            Some("512-555-1212")
        );
        assert_eq!(
            fields.get(&LeadField::Website).map(String::as_str),
            Some("https://doe.law")
        );
    }

    #[test]
    fn search_parse_no_matching_name_is_no_data() {
        let mut other = Lead::new();
        other.first_name = "Alice".into();
        other.last_name = "Jones".into();
        assert!(parse_search(SEARCH_HTML, &other).is_none());
    }

    #[tokio::test]
    async fn fetch_profile_via_mock_server() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/attorneys/jane-doe.html"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(PROFILE_HTML))
            .mount(&server)
            .await;

        let adapter = AvvoAdapter::new(&server.uri()).expect("adapter");
        let limiter = RateLimiter::from_millis(0);

        let mut lead = jane();
        lead.detail_url = "/attorneys/jane-doe.html".into();
        let fields = adapter
            .fetch_profile(&lead, &limiter)
            .await
            .expect("fetch")
            .expect("fields");
        assert_eq!(fields.get(&LeadField::Email).map(String::as_str), Some("jane@doe.law"));
    }

    #[tokio::test]
    async fn fetch_profile_without_detail_url_is_no_data() {
        let adapter = AvvoAdapter::new("https://www.avvo.com").expect("adapter");
        let limiter = RateLimiter::from_millis(0);
        let result = adapter.fetch_profile(&jane(), &limiter).await.expect("fetch");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn lookup_propagates_http_errors() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let adapter = AvvoAdapter::new(&server.uri()).expect("adapter");
        let limiter = RateLimiter::from_millis(0);
        let result = adapter.lookup(&jane(), &limiter).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn lookup_via_mock_server() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/attorneys/search"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(SEARCH_HTML))
            .mount(&server)
            .await;

        let adapter = AvvoAdapter::new(&server.uri()).expect("adapter");
        let limiter = RateLimiter::from_millis(0);
        let fields = adapter
            .lookup(&jane(), &limiter)
            .await
            .expect("lookup")
            .expect("fields");
        assert_eq!(
            fields.get(&LeadField::FirmName).map(String::as_str),
            Some("Doe & Partners LLP")
        );
    }
}
