//! Scripted `ChatBackend` for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::traits::ChatBackend;
use super::types::{
    AppConfig, BackendError, ChatRequest, ChatResponse, GeneratedImage, ImageRequest,
    ImageResponse, ModelListing, ReplyMessage, Usage,
};

#[derive(Default)]
pub struct ScriptedBackend {
    chat_replies: Mutex<VecDeque<Result<ChatResponse, BackendError>>>,
    image_replies: Mutex<VecDeque<Result<ImageResponse, BackendError>>>,
    usage: Mutex<Option<Usage>>,
    models: Option<ModelListing>,
    config: Option<AppConfig>,
    chat_gate: Option<Arc<Notify>>,
    image_gate: Option<Arc<Notify>>,
    pub chat_requests: Mutex<Vec<ChatRequest>>,
    pub image_requests: Mutex<Vec<ImageRequest>>,
    pub usage_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, content: &str) -> Self {
        self.chat_replies.lock().unwrap().push_back(Ok(ChatResponse {
            message: ReplyMessage {
                content: content.to_string(),
            },
        }));
        self
    }

    pub fn chat_error(self, err: BackendError) -> Self {
        self.chat_replies.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn image(self, url: &str) -> Self {
        self.image_replies.lock().unwrap().push_back(Ok(ImageResponse {
            images: vec![GeneratedImage {
                url: url.to_string(),
            }],
        }));
        self
    }

    pub fn image_error(self, err: BackendError) -> Self {
        self.image_replies.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn usage(self, usage: Usage) -> Self {
        *self.usage.lock().unwrap() = Some(usage);
        self
    }

    pub fn models(mut self, models: ModelListing) -> Self {
        self.models = Some(models);
        self
    }

    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Hold every chat request until the returned gate is notified.
    pub fn gate_chat(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.chat_gate = Some(gate.clone());
        (self, gate)
    }

    pub fn gate_images(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.image_gate = Some(gate.clone());
        (self, gate)
    }

    pub fn chat_request_count(&self) -> usize {
        self.chat_requests.lock().unwrap().len()
    }

    pub fn image_request_count(&self) -> usize {
        self.image_requests.lock().unwrap().len()
    }
}

fn unreachable_backend() -> BackendError {
    BackendError::NetworkError("connection refused".to_string())
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn app_config(&self) -> Result<AppConfig, BackendError> {
        self.config.clone().ok_or_else(unreachable_backend)
    }

    async fn list_models(&self) -> Result<ModelListing, BackendError> {
        self.models.clone().ok_or_else(unreachable_backend)
    }

    async fn usage(&self) -> Result<Usage, BackendError> {
        self.usage_calls.fetch_add(1, Ordering::SeqCst);
        (*self.usage.lock().unwrap()).ok_or_else(unreachable_backend)
    }

    async fn send_chat(&self, request: ChatRequest) -> Result<ChatResponse, BackendError> {
        self.chat_requests.lock().unwrap().push(request);
        if let Some(gate) = &self.chat_gate {
            gate.notified().await;
        }
        let next = self.chat_replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(unreachable_backend()))
    }

    async fn generate_image(&self, request: ImageRequest) -> Result<ImageResponse, BackendError> {
        self.image_requests.lock().unwrap().push(request);
        if let Some(gate) = &self.image_gate {
            gate.notified().await;
        }
        let next = self.image_replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(unreachable_backend()))
    }
}
