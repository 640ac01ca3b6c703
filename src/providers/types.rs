use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Message, ProviderId};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Quota exceeded: {}", .detail.as_deref().unwrap_or("no detail"))]
    QuotaExceeded { detail: Option<String> },

    #[error("HTTP {status}: {}", .detail.as_deref().unwrap_or("Unknown error"))]
    Rejected { status: u16, detail: Option<String> },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

// --- Request types ---

#[derive(Clone, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub provider: ProviderId,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for ChatRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatRequest")
            .field("messages", &format!("[{} messages]", self.messages.len()))
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Clone, Serialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub provider: ProviderId,
    pub size: String,
    pub n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for ImageRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageRequest")
            .field("prompt", &self.prompt)
            .field("provider", &self.provider)
            .field("size", &self.size)
            .field("n", &self.n)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

// --- Response types ---

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub message: ReplyMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplyMessage {
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageResponse {
    pub images: Vec<GeneratedImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedImage {
    pub url: String,
}

/// Error body returned by the backend on any non-2xx status.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub app_name: String,
    pub app_name_en: String,
    #[serde(default)]
    pub daily_free_limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Usage {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_zh: Option<String>,
}

/// Provider name to available models, as returned by `/api/models`.
pub type ModelListing = BTreeMap<String, Vec<ModelInfo>>;
