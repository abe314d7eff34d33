pub mod cache;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::errors::{truncate_detail, RelayError};

pub const DEFAULT_IAM_URL: &str = "https://iam.cloud.ibm.com/identity/token";
pub const APIKEY_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

/// Short-lived bearer token returned by the identity service.
#[derive(Clone)]
pub struct AccessToken {
    pub value: String,
    pub obtained_at: Instant,
    pub expires_in: Option<Duration>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_in: Option<Duration>) -> Self {
        Self {
            value: value.into(),
            obtained_at: Instant::now(),
            expires_in,
        }
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_in.map(|lifetime| self.obtained_at + lifetime)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("obtained_at", &self.obtained_at)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[async_trait]
pub trait TokenSource: Send + Sync {
    fn name(&self) -> &str;
    async fn acquire(&self, api_key: &str) -> Result<AccessToken, RelayError>;
}

/// Exchanges an API key for a bearer token with the IAM `apikey` grant.
#[derive(Clone)]
pub struct IamTokenSource {
    client: reqwest::Client,
    url: String,
}

impl IamTokenSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IamTokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[async_trait]
impl TokenSource for IamTokenSource {
    fn name(&self) -> &str {
        "iam"
    }

    async fn acquire(&self, api_key: &str) -> Result<AccessToken, RelayError> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[("grant_type", APIKEY_GRANT_TYPE), ("apikey", api_key)])
            .send()
            .await
            .map_err(|error| RelayError::Auth {
                status: None,
                body: error.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unreadable identity error body".to_owned());
            return Err(RelayError::Auth {
                status: Some(status.as_u16()),
                body: truncate_detail(&body),
            });
        }

        let parsed: IamTokenResponse = response.json().await.map_err(|error| RelayError::Auth {
            status: Some(status.as_u16()),
            body: format!("malformed token response: {error}"),
        })?;

        let value = parsed
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| RelayError::Auth {
                status: Some(status.as_u16()),
                body: "token response did not contain access_token".to_owned(),
            })?;

        debug!(
            source = self.name(),
            expires_in = parsed.expires_in,
            "access token acquired"
        );
        Ok(AccessToken::new(value, parsed.expires_in.map(Duration::from_secs)))
    }
}
