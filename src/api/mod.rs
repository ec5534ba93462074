//! Wire payloads for the Ollama-style HTTP API.
//!
//! Everything here mirrors the JSON the server speaks. Types the rest of the
//! crate reasons about (stream events, conversation turns) live in
//! [`crate::core`] and are converted from these at the edge.

use serde::{Deserialize, Serialize};

pub mod models;

/// Path of the chat completion endpoint, relative to the configured base URL.
pub const CHAT_ENDPOINT: &str = "chat";
/// Path of the model directory endpoint, relative to the configured base URL.
pub const TAGS_ENDPOINT: &str = "tags";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the conversation history sent with a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

/// The `message` object of a streamed chat record.
///
/// Minimal records such as `{"message":{"content":"He"},"done":false}` omit
/// the role, so it defaults to `assistant`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponseMessage {
    #[serde(default = "default_delta_role")]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl Default for ChatResponseMessage {
    fn default() -> Self {
        Self {
            role: default_delta_role(),
            content: String::new(),
        }
    }
}

fn default_delta_role() -> String {
    Role::Assistant.as_str().to_string()
}

/// One NDJSON record of a streamed `/chat` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub message: ChatResponseMessage,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub done_reason: Option<String>,
    pub total_duration: Option<u64>,
    pub load_duration: Option<u64>,
    pub prompt_eval_count: Option<u64>,
    pub prompt_eval_duration: Option<u64>,
    pub eval_count: Option<u64>,
    pub eval_duration: Option<u64>,
    /// Set when the server aborts generation mid-stream.
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDetails {
    #[serde(default)]
    pub parent_model: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub families: Option<Vec<String>>,
    #[serde(default)]
    pub parameter_size: Option<String>,
    #[serde(default)]
    pub quantization_level: Option<String>,
}

/// A model the server has available, as reported by the directory endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub modified_at: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub details: ModelDetails,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelsResponse {
    #[serde(default)]
    pub models: Option<Vec<ModelInfo>>,
}

impl ModelsResponse {
    /// A missing or `null` `models` field is an empty directory. Entries
    /// without a name cannot be selected and are dropped.
    pub fn into_models(self) -> Vec<ModelInfo> {
        let mut models = self.models.unwrap_or_default();
        models.retain(|model| !model.name.trim().is_empty());
        models
    }
}
