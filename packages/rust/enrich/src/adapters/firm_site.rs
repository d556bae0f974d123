//! Firm-website email crawl.
//!
//! The last and most expensive waterfall step: for a lead that has a website
//! but no email, fetch the site (and its contact page) and pull an address
//! out of the markup. Addresses on the site's own domain are preferred over
//! whatever else the page happens to embed.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tracing::debug;
use url::Url;

use leadflow_shared::{FieldSet, Lead, LeadField, LeadFlowError, Result};

use super::{ProviderAdapter, get_text, http_client};
use crate::limiter::RateLimiter;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}")
        .expect("valid email regex")
});

/// Address fragments that are never a person's contact email.
const JUNK_MARKERS: &[&str] = &[
    "noreply",
    "no-reply",
    "donotreply",
    "example.",
    "sentry",
    "wixpress",
    "schema.org",
];

/// Image extensions that show up in `src`-like strings the regex can catch.
const JUNK_SUFFIXES: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp"];

/// Crawls a lead's firm website for a contact email.
pub struct FirmSiteAdapter {
    client: Client,
}

impl FirmSiteAdapter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: http_client()?,
        })
    }
}

#[async_trait]
impl ProviderAdapter for FirmSiteAdapter {
    fn name(&self) -> &str {
        "firm-website"
    }

    async fn lookup(&self, lead: &Lead, limiter: &RateLimiter) -> Result<Option<FieldSet>> {
        let website = lead.website.trim();
        if website.is_empty() {
            return Ok(None);
        }
        let url = parse_website(website)?;

        limiter.acquire().await;
        let body = get_text(&self.client, &url).await?;
        let mut emails = extract_emails(&body);

        // The contact page is a guess; a miss there is not a failure.
        if emails.is_empty() {
            if let Ok(contact_url) = url.join("/contact") {
                limiter.acquire().await;
                match get_text(&self.client, &contact_url).await {
                    Ok(contact_body) => emails = extract_emails(&contact_body),
                    Err(e) => {
                        debug!(url = %contact_url, error = %e, "no contact page");
                    }
                }
            }
        }

        Ok(pick_email(&emails, &url).map(|email| {
            let mut fields = FieldSet::new();
            fields.insert(LeadField::Email, email);
            fields
        }))
    }
}

/// Parse a stored website value, defaulting to https for bare hosts.
fn parse_website(website: &str) -> Result<Url> {
    let candidate = if website.starts_with("http://") || website.starts_with("https://") {
        website.to_string()
    } else {
        format!("https://{website}")
    };
    Url::parse(&candidate)
        .map_err(|e| LeadFlowError::parse(format!("website '{website}': {e}")))
}

/// All plausible addresses in a page body, deduplicated, junk filtered.
fn extract_emails(html: &str) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    let mut emails = Vec::new();

    for m in EMAIL_RE.find_iter(html) {
        let email = m.as_str().to_lowercase();
        if JUNK_MARKERS.iter().any(|marker| email.contains(marker)) {
            continue;
        }
        if JUNK_SUFFIXES.iter().any(|suffix| email.ends_with(suffix)) {
            continue;
        }
        if seen.insert(email.clone()) {
            emails.push(email);
        }
    }
    emails
}

/// Prefer an address on the site's own domain; otherwise take the first.
fn pick_email(emails: &[String], site: &Url) -> Option<String> {
    let host = site.host_str()?.trim_start_matches("www.").to_lowercase();
    emails
        .iter()
        .find(|email| email.ends_with(&format!("@{host}")))
        .or_else(|| emails.first())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn website_parsing_adds_scheme() {
        assert_eq!(
            parse_website("doe.law").expect("parse").as_str(),
            "https://doe.law/"
        );
        assert_eq!(
            parse_website("http://doe.law").expect("parse").as_str(),
            "http://doe.law/"
        );
    }

    #[test]
    fn email_extraction_filters_junk() {
        let html = r#"
            <a href="mailto:contact@doe.law">Email us</a>
            <img src="logo@2x.png">
            <span>noreply@mailer.example.com</span>
            <span>partner@doe.law</span>
        "#;
        let emails = extract_emails(html);
        assert_eq!(emails, vec!["contact@doe.law", "partner@doe.law"]);
    }

    #[test]
    fn prefers_site_domain() {
        let site = Url::parse("https://www.doe.law").unwrap();
        let emails = vec![
            "jane@gmail.com".to_string(),
            "contact@doe.law".to_string(),
        ];
        assert_eq!(pick_email(&emails, &site).as_deref(), Some("contact@doe.law"));

        let offsite_only = vec!["jane@gmail.com".to_string()];
        assert_eq!(
            pick_email(&offsite_only, &site).as_deref(),
            Some("jane@gmail.com")
        );
        assert_eq!(pick_email(&[], &site), None);
    }

    fn lead_with_website(website: &str) -> Lead {
        let mut lead = Lead::new();
        lead.website = website.into();
        lead
    }

    #[tokio::test]
    async fn crawl_finds_email_on_homepage() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(
                r#"<html><body><a href="mailto:contact@doe.law">Email</a></body></html>"#,
            ))
            .mount(&server)
            .await;

        let adapter = FirmSiteAdapter::new().expect("adapter");
        let limiter = RateLimiter::from_millis(0);
        let lead = lead_with_website(&server.uri());

        let fields = adapter
            .lookup(&lead, &limiter)
            .await
            .expect("lookup")
            .expect("fields");
        assert_eq!(
            fields.get(&LeadField::Email).map(String::as_str),
            Some("contact@doe.law")
        );
    }

    #[tokio::test]
    async fn crawl_falls_back_to_contact_page() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string("<html><body>Welcome</body></html>"),
            )
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/contact"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(
                r#"<html><body>Reach us at office@doe.law</body></html>"#,
            ))
            .mount(&server)
            .await;

        let adapter = FirmSiteAdapter::new().expect("adapter");
        let limiter = RateLimiter::from_millis(0);
        let lead = lead_with_website(&server.uri());

        let fields = adapter
            .lookup(&lead, &limiter)
            .await
            .expect("lookup")
            .expect("fields");
        assert_eq!(
            fields.get(&LeadField::Email).map(String::as_str),
            Some("office@doe.law")
        );
    }

    #[tokio::test]
    async fn crawl_without_website_is_no_data() {
        let adapter = FirmSiteAdapter::new().expect("adapter");
        let limiter = RateLimiter::from_millis(0);
        let lead = Lead::new();
        assert!(adapter.lookup(&lead, &limiter).await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn missing_contact_page_is_not_an_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string("<html><body>No contact info</body></html>"),
            )
            .mount(&server)
            .await;
        // No /contact mock: wiremock returns 404 for it.

        let adapter = FirmSiteAdapter::new().expect("adapter");
        let limiter = RateLimiter::from_millis(0);
        let lead = lead_with_website(&server.uri());

        let result = adapter.lookup(&lead, &limiter).await.expect("lookup");
        assert!(result.is_none());
    }
}
