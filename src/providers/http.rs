use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::traits::ChatBackend;
use super::types::{
    AppConfig, BackendError, ChatRequest, ChatResponse, ErrorResponse, ImageRequest,
    ImageResponse, ModelListing, Usage,
};

/// `ChatBackend` over HTTP. No client-side timeout is set; the backend bounds
/// request latency.
pub struct HttpBackend {
    client: Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(mut base_url: Url) -> Self {
        // `Url::join` replaces the last path segment unless the base ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            client: Client::new(),
            base_url,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::NetworkError(format!("Invalid endpoint {}: {}", path, e)))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let url = self.endpoint(path)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BackendError::NetworkError(e.to_string()))?;
        Self::read_json(response).await
    }

    async fn post<B: serde::Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, BackendError> {
        let url = self.endpoint(path)?;
        let response = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::NetworkError(e.to_string()))?;
        Self::read_json(response).await
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::NetworkError(e.to_string()))?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(BackendError::QuotaExceeded {
                detail: Self::parse_detail(&body),
            });
        }

        if !status.is_success() {
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                detail: Self::parse_detail(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }

    fn parse_detail(body: &str) -> Option<String> {
        serde_json::from_str::<ErrorResponse>(body)
            .ok()
            .and_then(|e| e.detail)
            .filter(|d| !d.is_empty())
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn app_config(&self) -> Result<AppConfig, BackendError> {
        self.get("api/config").await
    }

    async fn list_models(&self) -> Result<ModelListing, BackendError> {
        self.get("api/models").await
    }

    async fn usage(&self) -> Result<Usage, BackendError> {
        self.get("api/usage").await
    }

    async fn send_chat(&self, request: ChatRequest) -> Result<ChatResponse, BackendError> {
        tracing::debug!("POST api/chat {:?}", request);
        self.post("api/chat", &request).await
    }

    async fn generate_image(&self, request: ImageRequest) -> Result<ImageResponse, BackendError> {
        tracing::debug!("POST api/generate-image {:?}", request);
        self.post("api/generate-image", &request).await
    }
}
