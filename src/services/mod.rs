pub mod chat;
pub mod conversation;
pub mod database;
pub mod image;
pub mod inflight;
pub mod markdown;
pub mod quota;
pub mod sessions;
pub mod settings;

pub use database::Database;
pub use settings::SettingsService;
