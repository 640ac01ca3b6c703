use anyhow::Result;

use super::database::Database;
use crate::models::ProviderId;

pub const KEY_CHAT_HISTORY: &str = "chatHistory";
pub const KEY_CUSTOM_API_KEY: &str = "customApiKey";
pub const KEY_THEME: &str = "theme";
pub const KEY_SELECTED_PROVIDER: &str = "selectedProvider";
pub const KEY_SELECTED_MODEL: &str = "selectedModel";

#[derive(Debug, Clone, PartialEq)]
pub struct AppSettings {
    pub color_scheme: ColorScheme,
    pub provider: ProviderId,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorScheme {
    Light,
    Dark,
}

impl ColorScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorScheme::Light => "light",
            ColorScheme::Dark => "dark",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "light" => Some(ColorScheme::Light),
            "dark" => Some(ColorScheme::Dark),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ColorScheme::Light => ColorScheme::Dark,
            ColorScheme::Dark => ColorScheme::Light,
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            color_scheme: ColorScheme::Dark,
            provider: ProviderId::Aliyun,
            model: None,
        }
    }
}

pub struct SettingsService;

impl SettingsService {
    pub async fn load(db: &Database) -> AppSettings {
        let defaults = AppSettings::default();

        let color_scheme = match db.get_setting(KEY_THEME).await {
            Ok(Some(s)) => ColorScheme::from_str(&s).unwrap_or(defaults.color_scheme),
            _ => defaults.color_scheme,
        };
        let provider = match db.get_setting(KEY_SELECTED_PROVIDER).await {
            Ok(Some(s)) => ProviderId::from_str(&s).unwrap_or(defaults.provider),
            _ => defaults.provider,
        };
        let model = db
            .get_setting(KEY_SELECTED_MODEL)
            .await
            .ok()
            .flatten()
            .filter(|m| !m.is_empty());

        AppSettings {
            color_scheme,
            provider,
            model,
        }
    }

    pub async fn save_color_scheme(db: &Database, scheme: ColorScheme) -> Result<()> {
        db.set_setting(KEY_THEME, scheme.as_str()).await
    }

    pub async fn save_selection(db: &Database, provider: ProviderId, model: &str) -> Result<()> {
        db.set_setting(KEY_SELECTED_PROVIDER, provider.as_str()).await?;
        db.set_setting(KEY_SELECTED_MODEL, model).await
    }

    /// The personal API key, if one is configured. An empty stored value
    /// means the backend's shared key applies.
    pub async fn load_api_key(db: &Database) -> Option<String> {
        match db.get_setting(KEY_CUSTOM_API_KEY).await {
            Ok(Some(key)) if !key.trim().is_empty() => Some(key),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Failed to read API key: {}", e);
                None
            }
        }
    }

    /// Saving a blank key stores an empty string, which reverts to the
    /// backend's shared key.
    pub async fn save_api_key(db: &Database, key: &str) -> Result<()> {
        db.set_setting(KEY_CUSTOM_API_KEY, key.trim()).await
    }
}
