//! HTTP client for the Cloud Controller v3 audit event API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};

use crate::config::CloudFoundryConfig;
use crate::error::{Error, Result};
use crate::types::EventPage;

/// Link to the first page of a newest-first audit event scan.
pub fn first_page_link(per_page: u32) -> String {
    format!("/v3/audit_events?order_by=-created_at&per_page={}", per_page)
}

/// Anything that can hand back one page of audit events for a link.
///
/// The link is either the first-page path or a `pagination.next.href` value
/// returned by a previous page.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, link: &str) -> Result<EventPage>;
}

/// Authenticated client for `GET /v3/audit_events`
pub struct AuditEventClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl AuditEventClient {
    /// Create a client that sends `token` as a bearer credential on every request
    pub fn new(config: &CloudFoundryConfig, token: &str) -> Result<Self> {
        let base_url = config
            .url
            .clone()
            .ok_or_else(|| Error::Config("cloud_foundry.url is required".to_string()))?
            .trim_end_matches('/')
            .to_string();

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("bearer {}", token))
                .map_err(|e| Error::Config(format!("invalid access token: {}", e)))?,
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// Absolute links are followed as-is; relative ones hang off the API base URL.
    fn resolve(&self, link: &str) -> String {
        if link.starts_with("http://") || link.starts_with("https://") {
            link.to_string()
        } else {
            format!("{}{}", self.base_url, link)
        }
    }
}

#[async_trait]
impl PageSource for AuditEventClient {
    async fn fetch_page(&self, link: &str) -> Result<EventPage> {
        let url = self.resolve(link);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Api(format!("HTTP request failed: {}", e)))?;

        let status = response.status();

        if status.is_success() {
            response
                .json::<EventPage>()
                .await
                .map_err(|e| Error::Api(format!("failed to parse page {}: {}", url, e)))
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Api(format!("API error ({}): {}", status, error_text)))
        }
    }
}
