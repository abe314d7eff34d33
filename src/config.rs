use std::{env, time::Duration};

use tracing::warn;

use crate::{
    errors::RelayError,
    identity::DEFAULT_IAM_URL,
    inference::profile::{InferenceTarget, ProviderProfile},
};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_NEW_TOKENS: u32 = 500;

/// Relay settings, read once at startup.
///
/// Credentials stay optional here: a relay without them still starts and
/// answers every chat request with a configuration error.
#[derive(Clone)]
pub struct RelayConfig {
    pub api_key: Option<String>,
    pub project_id: Option<String>,
    pub port: u16,
    pub profile: ProviderProfile,
    pub model_id: String,
    pub inference_url: String,
    pub iam_url: String,
    pub upstream_timeout: Duration,
    pub max_new_tokens: u32,
    pub token_cache: bool,
}

/// Validated per-request view of the secrets.
#[derive(Clone, Copy)]
pub struct Credentials<'a> {
    pub api_key: &'a str,
    pub target: InferenceTarget<'a>,
}

impl RelayConfig {
    pub fn for_profile(profile: ProviderProfile) -> Self {
        Self {
            api_key: None,
            project_id: None,
            port: DEFAULT_PORT,
            profile,
            model_id: profile.default_model_id().to_owned(),
            inference_url: profile.default_inference_url().to_owned(),
            iam_url: DEFAULT_IAM_URL.to_owned(),
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            token_cache: false,
        }
    }

    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |names: &[&str]| {
            names.iter().find_map(|name| {
                lookup(*name)
                    .map(|value| value.trim().to_owned())
                    .filter(|value| !value.is_empty())
            })
        };

        let profile = match read(&["RELAY_PROFILE"]) {
            Some(value) => value.parse::<ProviderProfile>()?,
            None => ProviderProfile::Chat,
        };

        let mut config = Self::for_profile(profile);
        config.api_key = read(&["IBM_API_KEY", "WATSONX_API_KEY"]);
        config.project_id = read(&["IBM_PROJECT_ID", "WATSONX_PROJECT_ID"]);
        config.port = parse_or("PORT", read(&["PORT"]), DEFAULT_PORT);
        if let Some(model_id) = read(&["RELAY_MODEL_ID"]) {
            config.model_id = model_id;
        }
        if let Some(url) = read(&["RELAY_INFERENCE_URL"]) {
            config.inference_url = url;
        }
        if let Some(url) = read(&["IBM_IAM_URL"]) {
            config.iam_url = url;
        }
        config.upstream_timeout = Duration::from_secs(parse_or(
            "RELAY_UPSTREAM_TIMEOUT_SECS",
            read(&["RELAY_UPSTREAM_TIMEOUT_SECS"]),
            DEFAULT_UPSTREAM_TIMEOUT.as_secs(),
        ));
        config.max_new_tokens = parse_or(
            "RELAY_MAX_NEW_TOKENS",
            read(&["RELAY_MAX_NEW_TOKENS"]),
            DEFAULT_MAX_NEW_TOKENS,
        );
        config.token_cache = read(&["RELAY_TOKEN_CACHE"])
            .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);

        Ok(config)
    }

    pub fn credentials(&self) -> Result<Credentials<'_>, RelayError> {
        let api_key = non_empty(self.api_key.as_deref()).ok_or_else(|| {
            RelayError::Configuration("IBM_API_KEY is not set".to_owned())
        })?;
        let project_id = non_empty(self.project_id.as_deref()).ok_or_else(|| {
            RelayError::Configuration("IBM_PROJECT_ID is not set".to_owned())
        })?;

        Ok(Credentials {
            api_key,
            target: InferenceTarget {
                model_id: &self.model_id,
                project_id,
            },
        })
    }

    pub fn missing_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if non_empty(self.api_key.as_deref()).is_none() {
            missing.push("IBM_API_KEY");
        }
        if non_empty(self.project_id.as_deref()).is_none() {
            missing.push("IBM_PROJECT_ID");
        }
        missing
    }
}

impl std::fmt::Debug for Credentials<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("target", &self.target)
            .finish()
    }
}

impl std::fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("project_id", &self.project_id)
            .field("port", &self.port)
            .field("profile", &self.profile)
            .field("model_id", &self.model_id)
            .field("inference_url", &self.inference_url)
            .field("iam_url", &self.iam_url)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("max_new_tokens", &self.max_new_tokens)
            .field("token_cache", &self.token_cache)
            .finish()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn parse_or<T>(name: &str, value: Option<String>, default: T) -> T
where
    T: std::str::FromStr,
{
    let Some(raw) = value else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!(setting = name, value = %raw, "unparseable setting, using default");
            default
        }
    }
}
