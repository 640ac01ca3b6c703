use async_trait::async_trait;

use super::types::{
    AppConfig, BackendError, ChatRequest, ChatResponse, ImageRequest, ImageResponse,
    ModelListing, Usage,
};

/// The chat backend's HTTP surface.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn app_config(&self) -> Result<AppConfig, BackendError>;

    async fn list_models(&self) -> Result<ModelListing, BackendError>;

    async fn usage(&self) -> Result<Usage, BackendError>;

    async fn send_chat(&self, request: ChatRequest) -> Result<ChatResponse, BackendError>;

    async fn generate_image(&self, request: ImageRequest) -> Result<ImageResponse, BackendError>;
}
