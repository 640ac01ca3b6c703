use super::traits::ChatBackend;
use super::types::{ModelInfo, ModelListing};
use crate::config::Language;
use crate::models::ProviderId;

/// Models offered per provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCatalog {
    listing: ModelListing,
}

impl ModelCatalog {
    pub fn new(listing: ModelListing) -> Self {
        Self { listing }
    }

    /// Fetch the catalog, falling back to a built-in minimal one when the
    /// backend can't be reached.
    pub async fn fetch(backend: &dyn ChatBackend) -> Self {
        match backend.list_models().await {
            Ok(listing) => Self::new(listing),
            Err(e) => {
                tracing::error!("Failed to load models: {}", e);
                Self::fallback()
            }
        }
    }

    pub fn fallback() -> Self {
        let mut listing = ModelListing::new();
        listing.insert(
            ProviderId::Aliyun.as_str().to_string(),
            vec![ModelInfo {
                id: "qwen-plus".to_string(),
                name: "Qwen Plus".to_string(),
                name_zh: Some("通义千问 Plus".to_string()),
            }],
        );
        listing.insert(
            ProviderId::OpenAi.as_str().to_string(),
            vec![ModelInfo {
                id: "gpt-3.5-turbo".to_string(),
                name: "GPT-3.5 Turbo".to_string(),
                name_zh: None,
            }],
        );
        Self::new(listing)
    }

    pub fn models_for(&self, provider: ProviderId) -> &[ModelInfo] {
        self.listing
            .get(provider.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn default_model(&self, provider: ProviderId) -> Option<&ModelInfo> {
        self.models_for(provider).first()
    }

    pub fn contains(&self, provider: ProviderId, model_id: &str) -> bool {
        self.models_for(provider).iter().any(|m| m.id == model_id)
    }
}

impl ModelInfo {
    pub fn display_name(&self, language: Language) -> &str {
        match (language, self.name_zh.as_deref()) {
            (Language::Zh, Some(zh)) => zh,
            _ => &self.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_catalog() {
        let catalog = ModelCatalog::fallback();
        assert_eq!(catalog.default_model(ProviderId::Aliyun).unwrap().id, "qwen-plus");
        assert_eq!(catalog.default_model(ProviderId::OpenAi).unwrap().id, "gpt-3.5-turbo");
        assert!(catalog.contains(ProviderId::OpenAi, "gpt-3.5-turbo"));
        assert!(!catalog.contains(ProviderId::OpenAi, "qwen-plus"));
    }

    #[test]
    fn test_unknown_provider_has_no_models() {
        let catalog = ModelCatalog::new(ModelListing::new());
        assert!(catalog.models_for(ProviderId::Aliyun).is_empty());
        assert!(catalog.default_model(ProviderId::Aliyun).is_none());
    }

    #[test]
    fn test_display_name_prefers_chinese_when_available() {
        let catalog = ModelCatalog::fallback();
        let qwen = catalog.default_model(ProviderId::Aliyun).unwrap();
        assert_eq!(qwen.display_name(Language::Zh), "通义千问 Plus");
        assert_eq!(qwen.display_name(Language::En), "Qwen Plus");

        let gpt = catalog.default_model(ProviderId::OpenAi).unwrap();
        assert_eq!(gpt.display_name(Language::Zh), "GPT-3.5 Turbo");
    }
}
