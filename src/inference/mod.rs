pub mod profile;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{truncate_detail, RelayError};
use profile::{DecodingParameters, InferencePayload, InferenceTarget, ProviderProfile};

/// Issues one inference call per chat message against the configured
/// model-serving endpoint.
#[derive(Clone)]
pub struct InferenceInvoker {
    client: reqwest::Client,
    endpoint: String,
    profile: ProviderProfile,
    decoding: DecodingParameters,
}

impl InferenceInvoker {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        profile: ProviderProfile,
        max_new_tokens: u32,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            profile,
            decoding: DecodingParameters::for_profile(profile, max_new_tokens),
        }
    }

    pub fn profile(&self) -> ProviderProfile {
        self.profile
    }

    pub fn payload_for(&self, message: &str, target: &InferenceTarget<'_>) -> InferencePayload {
        self.profile.build_payload(message, target, &self.decoding)
    }

    pub async fn invoke(
        &self,
        message: &str,
        bearer_token: &str,
        target: &InferenceTarget<'_>,
    ) -> Result<Value, RelayError> {
        let payload = self.payload_for(message, target);
        let body = serde_json::to_vec(&payload)
            .map_err(|error| RelayError::RequestSetup(format!("payload serialization: {error}")))?;

        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(bearer_token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::ACCEPT, "application/json")
            .body(body)
            .build()
            .map_err(|error| RelayError::RequestSetup(error.to_string()))?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unreadable upstream error body".to_owned());
            return Err(map_http_error(status, &body));
        }

        let bytes = response.bytes().await.map_err(map_transport_error)?;
        debug!(
            profile = %self.profile,
            status = status.as_u16(),
            bytes = bytes.len(),
            "inference call completed"
        );

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => Ok(value),
            Err(error) => {
                warn!(error = %error, "inference response is not JSON");
                Ok(Value::Null)
            }
        }
    }
}

fn map_http_error(status: StatusCode, body: &str) -> RelayError {
    RelayError::UpstreamHttp {
        status: status.as_u16(),
        body: truncate_detail(body),
    }
}

fn map_transport_error(error: reqwest::Error) -> RelayError {
    if error.is_builder() {
        return RelayError::RequestSetup(error.to_string());
    }
    if error.is_timeout() {
        return RelayError::UpstreamUnreachable(format!("timed out: {error}"));
    }
    RelayError::UpstreamUnreachable(error.to_string())
}
