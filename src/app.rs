use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;

use crate::config::Language;
use crate::models::{Message, ProviderId, Session, Transcript};
use crate::providers::types::{AppConfig, Usage};
use crate::providers::{ChatBackend, ModelCatalog};
use crate::services::chat::{ChatPipeline, ChatTarget, SendOptions, SendOutcome, SkipReason};
use crate::services::image::{ImageOutcome, ImagePipeline};
use crate::services::inflight::ExchangeState;
use crate::services::quota;
use crate::services::sessions::{RemoveOutcome, SessionStore};
use crate::services::settings::{AppSettings, ColorScheme};
use crate::services::{Database, SettingsService};

/// Sidebar entry for a saved session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            title: session.title.clone(),
            updated_at: session.updated_at,
        }
    }
}

/// State changes pushed to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    TranscriptChanged(Vec<Message>),
    SessionsChanged {
        sessions: Vec<SessionSummary>,
        active_id: Option<String>,
    },
    ExchangeStarted,
    ExchangeFinished,
    /// The shared quota ran out. The presentation should offer to set a
    /// personal API key.
    QuotaExceeded(String),
    ImageStarted,
    ImagesGenerated(Vec<String>),
    ImageFailed(String),
    UsageUpdated(Option<Usage>),
    SelectionChanged {
        provider: ProviderId,
        model: String,
    },
    ThemeChanged(ColorScheme),
    Notice(String),
}

#[derive(Debug, Clone)]
struct Selection {
    provider: ProviderId,
    model: String,
    api_key: Option<String>,
    color_scheme: ColorScheme,
}

/// Root context: owns the session store, the working transcript and both
/// exchange pipelines. Shared behind `Arc` so chat and image requests can
/// run as separate tasks.
pub struct App {
    db: Database,
    backend: Arc<dyn ChatBackend>,
    store: SessionStore,
    transcript: Transcript,
    chat: ChatPipeline,
    images: ImagePipeline,
    catalog: ModelCatalog,
    app_config: AppConfig,
    language: Language,
    selection: Mutex<Selection>,
    events: UnboundedSender<AppEvent>,
}

impl App {
    pub async fn new(
        db: Database,
        backend: Arc<dyn ChatBackend>,
        language: Language,
        events: UnboundedSender<AppEvent>,
    ) -> Self {
        let app_config = quota::load_app_config(backend.as_ref()).await;
        let catalog = ModelCatalog::fetch(backend.as_ref()).await;
        let settings = SettingsService::load(&db).await;
        let api_key = SettingsService::load_api_key(&db).await;
        let store = SessionStore::load(db.clone()).await;

        let model = Self::resolve_model(&catalog, &settings);
        tracing::info!(
            "Starting with {}/{} ({} saved sessions)",
            settings.provider.as_str(),
            model,
            store.list().await.len()
        );

        Self {
            db,
            chat: ChatPipeline::new(backend.clone()),
            images: ImagePipeline::new(backend.clone()),
            backend,
            store,
            transcript: Transcript::new(),
            catalog,
            app_config,
            language,
            selection: Mutex::new(Selection {
                provider: settings.provider,
                model,
                api_key,
                color_scheme: settings.color_scheme,
            }),
            events,
        }
    }

    /// The saved model if the catalog still lists it, else the provider's
    /// first model. Empty when the catalog has none for the provider.
    fn resolve_model(catalog: &ModelCatalog, settings: &AppSettings) -> String {
        match &settings.model {
            Some(model) if catalog.contains(settings.provider, model) => model.clone(),
            _ => match catalog.default_model(settings.provider) {
                Some(model) => model.id.clone(),
                None => {
                    tracing::warn!("No models listed for {}", settings.provider.as_str());
                    String::new()
                }
            },
        }
    }

    fn selection(&self) -> MutexGuard<'_, Selection> {
        self.selection.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: AppEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Event receiver dropped");
        }
    }

    async fn emit_sessions(&self) {
        let sessions = self.store.list().await.iter().map(SessionSummary::from).collect();
        let active_id = self.store.active_id().await;
        self.emit(AppEvent::SessionsChanged {
            sessions,
            active_id,
        });
    }

    fn emit_transcript(&self) {
        self.emit(AppEvent::TranscriptChanged(self.transcript.snapshot()));
    }

    // --- Queries ---

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn app_config(&self) -> &AppConfig {
        &self.app_config
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn display_name(&self) -> &str {
        match self.language {
            Language::Zh => &self.app_config.app_name,
            Language::En => &self.app_config.app_name_en,
        }
    }

    pub fn target(&self) -> ChatTarget {
        let selection = self.selection();
        ChatTarget {
            provider: selection.provider,
            model: selection.model.clone(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.selection().api_key.is_some()
    }

    pub fn color_scheme(&self) -> ColorScheme {
        self.selection().color_scheme
    }

    #[cfg(test)]
    pub fn transcript(&self) -> Vec<Message> {
        self.transcript.snapshot()
    }

    pub fn is_replying(&self) -> bool {
        self.chat.state() == ExchangeState::Sending
    }

    pub fn is_generating_image(&self) -> bool {
        self.images.state() == ExchangeState::Sending
    }

    pub async fn sessions(&self) -> Vec<SessionSummary> {
        self.store.list().await.iter().map(SessionSummary::from).collect()
    }

    fn missing_model_notice(&self) -> Option<String> {
        let target = self.target();
        target.model.is_empty().then(|| {
            format!(
                "No model available for {}. Pick one with /provider or /model <id>.",
                target.provider.display_name()
            )
        })
    }

    fn options(&self) -> SendOptions {
        SendOptions {
            api_key: self.selection().api_key.clone(),
        }
    }

    // --- Commands ---

    /// Push the initial state to the presentation layer.
    pub async fn start(&self) {
        if let Some(notice) = self.missing_model_notice() {
            self.emit(AppEvent::Notice(notice));
        }
        self.emit_transcript();
        self.emit_sessions().await;
        self.refresh_usage().await;
    }

    pub async fn new_chat(&self) {
        self.store.create_new().await;
        self.transcript.clear();
        self.emit_transcript();
        self.emit_sessions().await;
    }

    pub async fn select_session(&self, id: &str) {
        let Some(messages) = self.store.select(id).await else {
            tracing::debug!("Ignoring selection of unknown session {}", id);
            return;
        };
        self.transcript.replace(messages);
        self.emit_transcript();
        self.emit_sessions().await;
    }

    pub async fn delete_session(&self, id: &str) {
        match self.store.remove(id).await {
            Ok(RemoveOutcome::Removed { was_active: true }) => self.new_chat().await,
            Ok(RemoveOutcome::Removed { was_active: false }) => self.emit_sessions().await,
            Ok(RemoveOutcome::NotFound) => {}
            Err(e) => {
                tracing::error!("Failed to delete session: {:#}", e);
                self.emit(AppEvent::Notice(format!("Failed to delete chat: {}", e)));
            }
        }
    }

    pub async fn send_message(&self, text: &str) -> SendOutcome {
        let target = self.target();
        let options = self.options();

        let outcome = self
            .chat
            .send(&self.transcript, &self.store, text, &target, &options, || {
                self.emit_transcript();
                self.emit(AppEvent::ExchangeStarted);
            })
            .await;

        match &outcome {
            SendOutcome::Ignored(SkipReason::Busy) => {
                tracing::debug!("Send ignored while a reply is pending");
            }
            SendOutcome::Ignored(SkipReason::Empty) => {}
            SendOutcome::Ignored(SkipReason::NoModel) => {
                if let Some(notice) = self.missing_model_notice() {
                    self.emit(AppEvent::Notice(notice));
                }
            }
            SendOutcome::Replied { .. } => {
                self.emit_transcript();
                self.emit_sessions().await;
                self.refresh_usage().await;
                self.emit(AppEvent::ExchangeFinished);
            }
            SendOutcome::QuotaExceeded { detail } => {
                self.emit(AppEvent::QuotaExceeded(detail.clone()));
                self.emit(AppEvent::ExchangeFinished);
            }
            SendOutcome::Failed { .. } => {
                self.emit_transcript();
                self.emit(AppEvent::ExchangeFinished);
            }
        }

        outcome
    }

    pub async fn generate_image(&self, prompt: &str, provider: ProviderId) -> ImageOutcome {
        let options = self.options();
        let outcome = self
            .images
            .generate(prompt, provider, &options, || self.emit(AppEvent::ImageStarted))
            .await;

        match &outcome {
            ImageOutcome::Generated(urls) => self.emit(AppEvent::ImagesGenerated(urls.clone())),
            ImageOutcome::Failed { error } => self.emit(AppEvent::ImageFailed(error.clone())),
            ImageOutcome::Ignored(_) => {}
        }
        outcome
    }

    /// Store a personal API key. An empty key reverts to the backend default.
    pub async fn set_api_key(&self, key: &str) {
        if let Err(e) = SettingsService::save_api_key(&self.db, key).await {
            tracing::error!("Failed to save API key: {:#}", e);
            self.emit(AppEvent::Notice(format!("Failed to save API key: {}", e)));
            return;
        }

        let key = key.trim();
        self.selection().api_key = (!key.is_empty()).then(|| key.to_string());
        self.emit(AppEvent::Notice(if key.is_empty() {
            "Using the shared API key".to_string()
        } else {
            "Personal API key saved".to_string()
        }));
        self.refresh_usage().await;
    }

    pub async fn set_provider(&self, provider: ProviderId) {
        let Some(model) = self.catalog.default_model(provider).map(|m| m.id.clone()) else {
            self.emit(AppEvent::Notice(format!(
                "No models available for {}",
                provider.display_name()
            )));
            return;
        };
        self.apply_selection(provider, model).await;
    }

    pub async fn set_model(&self, model_id: &str) {
        let provider = self.selection().provider;
        if !self.catalog.contains(provider, model_id) {
            self.emit(AppEvent::Notice(format!(
                "Unknown model {} for {}",
                model_id,
                provider.as_str()
            )));
            return;
        }
        self.apply_selection(provider, model_id.to_string()).await;
    }

    async fn apply_selection(&self, provider: ProviderId, model: String) {
        {
            let mut selection = self.selection();
            selection.provider = provider;
            selection.model = model.clone();
        }
        if let Err(e) = SettingsService::save_selection(&self.db, provider, &model).await {
            tracing::warn!("Failed to save model selection: {:#}", e);
        }
        self.emit(AppEvent::SelectionChanged { provider, model });
    }

    pub async fn toggle_theme(&self) {
        let scheme = {
            let mut selection = self.selection();
            selection.color_scheme = selection.color_scheme.toggled();
            selection.color_scheme
        };
        if let Err(e) = SettingsService::save_color_scheme(&self.db, scheme).await {
            tracing::warn!("Failed to save theme: {:#}", e);
        }
        self.emit(AppEvent::ThemeChanged(scheme));
    }

    pub async fn refresh_usage(&self) {
        let api_key = self.selection().api_key.clone();
        let usage = quota::refresh_usage(self.backend.as_ref(), api_key.as_deref()).await;
        self.emit(AppEvent::UsageUpdated(usage));
    }
}
