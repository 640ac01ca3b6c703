use crate::config::DEFAULT_DAILY_FREE_LIMIT;
use crate::providers::types::{AppConfig, Usage};
use crate::providers::ChatBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaLevel {
    Normal,
    Low,
    Exhausted,
}

impl QuotaLevel {
    /// `Low` once a fifth or less of the daily limit remains.
    pub fn classify(usage: &Usage) -> Self {
        if usage.remaining == 0 {
            QuotaLevel::Exhausted
        } else if u64::from(usage.remaining) * 5 <= u64::from(usage.limit) {
            QuotaLevel::Low
        } else {
            QuotaLevel::Normal
        }
    }
}

/// Shared-key usage. Returns `None` when a personal key is configured (the
/// quota doesn't apply) or the backend can't report it.
pub async fn refresh_usage(backend: &dyn ChatBackend, api_key: Option<&str>) -> Option<Usage> {
    if api_key.is_some_and(|k| !k.is_empty()) {
        return None;
    }
    match backend.usage().await {
        Ok(usage) => Some(usage),
        Err(e) => {
            tracing::error!("Failed to fetch usage: {}", e);
            None
        }
    }
}

/// Backend branding and limits, with local defaults when unavailable.
pub async fn load_app_config(backend: &dyn ChatBackend) -> AppConfig {
    match backend.app_config().await {
        Ok(mut config) => {
            if config.daily_free_limit == 0 {
                config.daily_free_limit = DEFAULT_DAILY_FREE_LIMIT;
            }
            config
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            AppConfig {
                app_name: crate::config::APP_NAME.to_string(),
                app_name_en: crate::config::APP_NAME.to_string(),
                daily_free_limit: DEFAULT_DAILY_FREE_LIMIT,
            }
        }
    }
}
