use std::{fmt, str::FromStr};

use serde::Serialize;

pub const SYSTEM_PREAMBLE: &str = "You are a helpful, concise assistant. Answer the user's question clearly. \
If you do not know the answer, say so instead of making one up.";

pub const USER_MARKER: &str = "Human:";
pub const ASSISTANT_MARKER: &str = "Assistant:";

const COMPLETION_STOP_SEQUENCES: &[&str] = &["\n\nHuman:", "Human:"];

/// Upstream API shape targeted by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderProfile {
    /// `messages: [{role, content}]` request, `choices[...]` response.
    Chat,
    /// `input` prompt string request, `results[...]` response.
    Completion,
}

impl ProviderProfile {
    pub fn name(self) -> &'static str {
        match self {
            ProviderProfile::Chat => "chat",
            ProviderProfile::Completion => "completion",
        }
    }

    pub fn default_model_id(self) -> &'static str {
        match self {
            ProviderProfile::Chat => "ibm/granite-3-8b-instruct",
            ProviderProfile::Completion => "ibm/granite-13b-chat-v2",
        }
    }

    pub fn default_inference_url(self) -> &'static str {
        match self {
            ProviderProfile::Chat => {
                "https://us-south.ml.cloud.ibm.com/ml/v1/text/chat?version=2023-05-29"
            }
            ProviderProfile::Completion => {
                "https://us-south.ml.cloud.ibm.com/ml/v1/text/generation?version=2023-05-29"
            }
        }
    }

    pub fn stop_sequences(self) -> Vec<String> {
        match self {
            ProviderProfile::Chat => Vec::new(),
            ProviderProfile::Completion => COMPLETION_STOP_SEQUENCES
                .iter()
                .map(|stop| (*stop).to_owned())
                .collect(),
        }
    }

    pub fn build_payload(
        self,
        message: &str,
        target: &InferenceTarget<'_>,
        decoding: &DecodingParameters,
    ) -> InferencePayload {
        let model_id = target.model_id.to_owned();
        let project_id = target.project_id.to_owned();
        match self {
            ProviderProfile::Chat => InferencePayload::Chat {
                model_id,
                project_id,
                messages: vec![
                    PayloadMessage {
                        role: "system",
                        content: SYSTEM_PREAMBLE.to_owned(),
                    },
                    PayloadMessage {
                        role: "user",
                        content: message.to_owned(),
                    },
                ],
                max_tokens: decoding.max_new_tokens,
                temperature: decoding.temperature,
                stop: decoding.stop_sequences.clone(),
            },
            ProviderProfile::Completion => InferencePayload::Completion {
                model_id,
                project_id,
                input: completion_prompt(message),
                parameters: decoding.clone(),
            },
        }
    }
}

impl fmt::Display for ProviderProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderProfile {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "chat" => Ok(ProviderProfile::Chat),
            "completion" | "generation" | "text" => Ok(ProviderProfile::Completion),
            other => Err(format!(
                "unknown provider profile {other:?}, expected \"chat\" or \"completion\""
            )),
        }
    }
}

/// Model and project the payload is addressed to.
#[derive(Debug, Clone, Copy)]
pub struct InferenceTarget<'a> {
    pub model_id: &'a str,
    pub project_id: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodingParameters {
    pub decoding_method: &'static str,
    pub max_new_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
}

impl DecodingParameters {
    pub fn for_profile(profile: ProviderProfile, max_new_tokens: u32) -> Self {
        Self {
            decoding_method: "greedy",
            max_new_tokens,
            temperature: 0.7,
            stop_sequences: profile.stop_sequences(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayloadMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InferencePayload {
    Chat {
        model_id: String,
        project_id: String,
        messages: Vec<PayloadMessage>,
        max_tokens: u32,
        temperature: f32,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        stop: Vec<String>,
    },
    Completion {
        model_id: String,
        project_id: String,
        input: String,
        parameters: DecodingParameters,
    },
}

fn completion_prompt(message: &str) -> String {
    format!("{SYSTEM_PREAMBLE}\n\n{USER_MARKER} {message}\n\n{ASSISTANT_MARKER}")
}
