//! HTTP client for the Splunk HTTP Event Collector

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Serialize;

use crate::config::ShipperConfig;
use crate::error::{Error, Result};

/// Destination for batches of serialized events.
///
/// A sink reports only whether the whole batch went through; the pipeline
/// never feeds this back upstream.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, batch: &[Vec<u8>]) -> Result<()>;
}

/// HEC envelope for one event
#[derive(Serialize)]
struct HecEvent<'a> {
    event: serde_json::Value,
    sourcetype: &'a str,
}

/// Client for `POST /services/collector/event`
pub struct SplunkClient {
    http_client: reqwest::Client,
    url: String,
    sourcetype: String,
    max_retries: usize,
}

impl SplunkClient {
    /// Create a new Splunk client from configuration
    pub fn new(config: &ShipperConfig) -> Result<Self> {
        let base_url = config
            .url
            .as_deref()
            .ok_or_else(|| Error::Config("shipper.url is required".to_string()))?
            .trim_end_matches('/');
        let token = config
            .token
            .as_deref()
            .ok_or_else(|| Error::Config("shipper.token is required".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Splunk {}", token))
                .map_err(|e| Error::Config(format!("invalid shipper.token: {}", e)))?,
        );

        // One channel per process; HEC uses it to group acknowledgements
        let channel = uuid::Uuid::new_v4().to_string();
        headers.insert(
            "X-Splunk-Request-Channel",
            HeaderValue::from_str(&channel)
                .map_err(|e| Error::Config(format!("invalid request channel: {}", e)))?,
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            url: format!("{}/services/collector/event", base_url),
            sourcetype: config.sourcetype.clone(),
            max_retries: config.max_retries,
        })
    }

    /// Newline-separated HEC envelopes, one per payload.
    ///
    /// Payloads that are not valid JSON are shipped as strings.
    pub fn encode_batch(&self, batch: &[Vec<u8>]) -> Result<String> {
        let mut body = String::new();
        for payload in batch {
            let event = serde_json::from_slice(payload).unwrap_or_else(|_| {
                serde_json::Value::String(String::from_utf8_lossy(payload).into_owned())
            });
            let line = serde_json::to_string(&HecEvent {
                event,
                sourcetype: &self.sourcetype,
            })?;
            if !body.is_empty() {
                body.push('\n');
            }
            body.push_str(&line);
        }
        Ok(body)
    }

    async fn send(&self, body: &str) -> Result<()> {
        let response = self
            .http_client
            .post(&self.url)
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| Error::Shipper(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Shipper(format!("HEC error ({}): {}", status, error_text)))
        }
    }

    /// Send with retry logic
    ///
    /// Retries transient failures (network, 429, 5xx) with exponential backoff.
    async fn send_with_retry(&self, body: &str) -> Result<()> {
        let mut last_error = None;
        let mut delay = Duration::from_millis(500);

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tracing::debug!(
                    "Retrying HEC request (attempt {}/{}), waiting {:?}",
                    attempt + 1,
                    self.max_retries + 1,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_secs(30));
            }

            match self.send(body).await {
                Ok(()) => return Ok(()),
                Err(e) if is_retryable_error(&e) => {
                    tracing::warn!("Transient error shipping events: {}", e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Shipper("max retries exceeded".to_string())))
    }
}

#[async_trait]
impl EventSink for SplunkClient {
    async fn deliver(&self, batch: &[Vec<u8>]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let body = self.encode_batch(batch)?;
        self.send_with_retry(&body).await
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Check if an error is retryable (transient)
fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Shipper(msg) => {
            msg.starts_with("HTTP request failed")
                || msg
                    .strip_prefix("HEC error (")
                    .and_then(|rest| rest.get(..3))
                    .and_then(|code| code.parse::<u16>().ok())
                    .and_then(|code| StatusCode::from_u16(code).ok())
                    .map(is_retryable_status)
                    .unwrap_or(false)
        }
        _ => false,
    }
}
