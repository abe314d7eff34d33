use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
}

impl ChatRequest {
    /// Parses an inbound body and returns its message; anything but a JSON
    /// object with a non-blank `message` string is rejected.
    pub fn from_body(body: &[u8]) -> Result<String, ValidationError> {
        let request: ChatRequest =
            serde_json::from_slice(body).map_err(|_| ValidationError::InvalidBody)?;
        request.into_message()
    }

    pub fn into_message(self) -> Result<String, ValidationError> {
        self.message
            .filter(|message| !message.trim().is_empty())
            .ok_or(ValidationError::EmptyMessage)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: usize,
    pub message: AssistantMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub content: String,
    pub role: String,
}

impl ChatResponse {
    pub fn assistant(content: String) -> Self {
        Self {
            choices: vec![ChatChoice {
                index: 0,
                message: AssistantMessage {
                    content,
                    role: "assistant".to_owned(),
                },
            }],
        }
    }
}
