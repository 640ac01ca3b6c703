use std::path::PathBuf;

use anyhow::{Context, Result};
use url::Url;

pub const APP_NAME: &str = "Multi-Cloud Chat";

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";

/// Sessions kept in the persisted history.
pub const MAX_SESSIONS: usize = 50;
/// Characters of the first user message used as a session title.
pub const TITLE_MAX_CHARS: usize = 30;
pub const DEFAULT_TITLE: &str = "New Chat";

pub const CHAT_TEMPERATURE: f64 = 0.7;
pub const CHAT_MAX_TOKENS: u32 = 2000;

pub const IMAGE_SIZE: &str = "1024x1024";
pub const IMAGE_COUNT: u32 = 1;

pub const DEFAULT_DAILY_FREE_LIMIT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    En,
    Zh,
}

impl Language {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "en" => Some(Language::En),
            "zh" | "zh-cn" | "zh_cn" => Some(Language::Zh),
            _ => None,
        }
    }
}

/// Runtime settings resolved from the environment at startup.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub backend_url: Url,
    pub language: Language,
    pub db_path: PathBuf,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        let raw_url = std::env::var("MULTICHAT_BACKEND_URL")
            .unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string());
        let backend_url = Url::parse(&raw_url)
            .with_context(|| format!("Invalid MULTICHAT_BACKEND_URL: {}", raw_url))?;

        let language = std::env::var("MULTICHAT_LANG")
            .ok()
            .and_then(|s| Language::from_str(&s))
            .unwrap_or(Language::En);

        Ok(Self {
            backend_url,
            language,
            db_path: Self::db_path()?,
        })
    }

    fn db_path() -> Result<PathBuf> {
        let data_dir = match std::env::var("XDG_DATA_HOME") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => {
                let home = std::env::var("HOME").context("HOME not set")?;
                PathBuf::from(home).join(".local/share")
            }
        };
        Ok(data_dir.join("multichat").join("multichat.db"))
    }
}
