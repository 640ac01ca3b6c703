use std::sync::Arc;

use crate::config::{IMAGE_COUNT, IMAGE_SIZE};
use crate::models::ProviderId;
use crate::providers::{BackendError, ChatBackend, ImageRequest};
use crate::services::chat::{SendOptions, SkipReason};
use crate::services::inflight::{ExchangeState, InFlight};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    Ignored(SkipReason),
    Generated(Vec<String>),
    Failed { error: String },
}

/// Runs image generation requests. Has its own busy flag, so an image can be
/// generated while a chat reply is pending.
pub struct ImagePipeline {
    backend: Arc<dyn ChatBackend>,
    in_flight: InFlight,
}

impl ImagePipeline {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            in_flight: InFlight::new(),
        }
    }

    pub fn state(&self) -> ExchangeState {
        self.in_flight.state()
    }

    pub async fn generate<F>(
        &self,
        prompt: &str,
        provider: ProviderId,
        options: &SendOptions,
        on_started: F,
    ) -> ImageOutcome
    where
        F: FnOnce() + Send,
    {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return ImageOutcome::Ignored(SkipReason::Empty);
        }

        let Some(_guard) = self.in_flight.try_begin() else {
            tracing::debug!("Image generation already in flight, ignoring request");
            return ImageOutcome::Ignored(SkipReason::Busy);
        };

        on_started();

        let request = ImageRequest {
            prompt: prompt.to_string(),
            provider,
            size: IMAGE_SIZE.to_string(),
            n: IMAGE_COUNT,
            api_key: options.api_key.clone().filter(|k| !k.is_empty()),
        };

        match self.backend.generate_image(request).await {
            Ok(response) => {
                let urls: Vec<String> = response.images.into_iter().map(|i| i.url).collect();
                tracing::info!("Generated {} images with {}", urls.len(), provider.as_str());
                ImageOutcome::Generated(urls)
            }
            Err(e) => {
                tracing::error!("Image generation failed: {}", e);
                let error = match e {
                    BackendError::Rejected { detail, .. }
                    | BackendError::QuotaExceeded { detail } => format!(
                        "Error: {}",
                        detail.as_deref().unwrap_or("Failed to generate image")
                    ),
                    BackendError::NetworkError(msg) | BackendError::InvalidResponse(msg) => {
                        format!("Error: {}", msg)
                    }
                };
                ImageOutcome::Failed { error }
            }
        }
    }
}
