//! UAA client-credentials authentication
//!
//! The token is fetched once at startup. There is no refresh: if the process
//! outlives the token, collection attempts start failing and the retry budget
//! eventually terminates the process.

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;

use crate::config::UaaConfig;
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// Performs the client-credentials grant and holds the resulting bearer token.
pub struct Authenticator {
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
    http_client: reqwest::Client,
    access_token: Option<String>,
}

impl Authenticator {
    /// Create an authenticator from configuration
    ///
    /// Returns an error if the UAA URL or client credentials are missing.
    pub fn new(config: &UaaConfig) -> Result<Self> {
        let base_url = config
            .url
            .as_deref()
            .ok_or_else(|| Error::Config("uaa.url is required".to_string()))?
            .trim_end_matches('/');
        let client_id = config
            .client_id
            .clone()
            .ok_or_else(|| Error::Config("uaa.client_id is required".to_string()))?;
        let client_secret = config
            .client_secret
            .clone()
            .ok_or_else(|| Error::Config("uaa.client_secret is required".to_string()))?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            token_url: format!("{}/oauth/token", base_url),
            client_id,
            client_secret,
            scope: config.scope.clone(),
            http_client,
            access_token: None,
        })
    }

    /// Exchange the client credentials for a bearer token.
    pub async fn authenticate(&mut self) -> Result<()> {
        let form = [
            ("grant_type", "client_credentials"),
            ("scopes", self.scope.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Auth(format!("unable to perform authentication request: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Auth(format!("unable to read authentication response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::Auth(format!("UAA responded {}: {}", status, body)));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Auth(format!("unable to unmarshal authentication response: {}", e)))?;

        match parsed.access_token {
            Some(token) if !token.is_empty() => {
                tracing::info!(client_id = %self.client_id, "Authenticated against UAA");
                self.access_token = Some(token);
                Ok(())
            }
            _ => Err(Error::Auth(
                "authentication response did not contain an access_token".to_string(),
            )),
        }
    }

    /// The bearer token, or an empty string before a successful `authenticate`.
    pub fn access_token(&self) -> &str {
        self.access_token.as_deref().unwrap_or("")
    }
}
