use axum::{
    http::{header::ALLOW, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Maximum number of characters of an upstream body carried in an error.
pub const MAX_DETAIL_CHARS: usize = 400;

const CONNECTIVITY_HINT: &str =
    "the inference service could not be reached; check network connectivity, proxy or firewall settings";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("method {0} is not allowed, use POST")]
    MethodNotAllowed(String),
    #[error("request body must be JSON of the form {{\"message\": string}}")]
    InvalidBody,
    #[error("message must be a non-empty string")]
    EmptyMessage,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("token exchange failed: {body}")]
    Auth { status: Option<u16>, body: String },
    #[error("inference service returned status {status}: {body}")]
    UpstreamHttp { status: u16, body: String },
    #[error("inference service unreachable: {0}")]
    UpstreamUnreachable(String),
    #[error("inference request could not be issued: {0}")]
    RequestSetup(String),
}

impl RelayError {
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Validation(_) => "validation_error",
            RelayError::Configuration(_) => "configuration_error",
            RelayError::Auth { .. } => "auth_error",
            RelayError::UpstreamHttp { .. } => "upstream_http_error",
            RelayError::UpstreamUnreachable(_) => "upstream_unreachable_error",
            RelayError::RequestSetup(_) => "request_setup_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Validation(ValidationError::MethodNotAllowed(_)) => {
                StatusCode::METHOD_NOT_ALLOWED
            }
            RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::UpstreamHttp { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|code| code.is_client_error() || code.is_server_error())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            RelayError::Configuration(_)
            | RelayError::Auth { .. }
            | RelayError::UpstreamUnreachable(_)
            | RelayError::RequestSetup(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn into_body(self) -> ErrorBody {
        let kind = self.kind().to_owned();
        match self {
            RelayError::Validation(error) => ErrorBody::new(error.to_string(), kind),
            RelayError::Configuration(message) => {
                ErrorBody::new("server is not configured", kind).with_details(message)
            }
            RelayError::Auth { status, body } => {
                let mut payload =
                    ErrorBody::new("failed to authenticate with the identity service", kind)
                        .with_details(body);
                payload.status = status;
                payload
            }
            RelayError::UpstreamHttp { status, body } => {
                let mut payload = ErrorBody::new("inference service returned an error", kind)
                    .with_details(body);
                payload.status = Some(status);
                payload
            }
            RelayError::UpstreamUnreachable(message) => {
                ErrorBody::new(CONNECTIVITY_HINT, kind).with_details(message)
            }
            RelayError::RequestSetup(message) => {
                ErrorBody::new("failed to build the inference request", kind).with_details(message)
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorBody {
    fn new(error: impl Into<String>, kind: String) -> Self {
        Self {
            error: error.into(),
            kind,
            details: None,
            status: None,
        }
    }

    fn with_details(mut self, details: String) -> Self {
        if !details.is_empty() {
            self.details = Some(details);
        }
        self
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let method_not_allowed =
            matches!(self, RelayError::Validation(ValidationError::MethodNotAllowed(_)));
        let mut response = (status, Json(self.into_body())).into_response();
        if method_not_allowed {
            apply_header(response.headers_mut(), ALLOW.as_str(), "POST");
        }
        response
    }
}

pub fn apply_header(headers: &mut HeaderMap, name: &str, value: &str) {
    let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
        return;
    };
    let Ok(header_value) = HeaderValue::from_str(value) else {
        return;
    };
    headers.insert(header_name, header_value);
}

pub fn truncate_detail(body: &str) -> String {
    body.chars().take(MAX_DETAIL_CHARS).collect()
}
