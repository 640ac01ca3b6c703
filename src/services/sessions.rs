use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::conversation::derive_title;
use super::database::Database;
use super::settings::KEY_CHAT_HISTORY;
use crate::config::MAX_SESSIONS;
use crate::models::{Message, Session};

/// Result of deleting a session from the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The session was deleted. When `was_active` is set the caller should
    /// switch the display to a fresh empty session.
    Removed { was_active: bool },
    NotFound,
}

#[derive(Debug, Default)]
struct StoreState {
    sessions: Vec<Session>,
    active_id: Option<String>,
}

/// Owns the saved chat sessions and the pointer to the one on screen.
///
/// The state lock is held across the persistence write, so writes land in
/// mutation order and the stored history always matches the last completed
/// mutation.
pub struct SessionStore {
    db: Database,
    state: Mutex<StoreState>,
}

impl SessionStore {
    pub async fn load(db: Database) -> Self {
        let sessions = match db.get_setting(KEY_CHAT_HISTORY).await {
            Ok(Some(json)) => match serde_json::from_str::<Vec<Session>>(&json) {
                Ok(mut sessions) => {
                    sessions.truncate(MAX_SESSIONS);
                    sessions
                }
                Err(e) => {
                    tracing::warn!("Discarding unreadable chat history: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::error!("Failed to load chat history: {}", e);
                Vec::new()
            }
        };

        tracing::debug!("Loaded {} saved sessions", sessions.len());

        Self {
            db,
            state: Mutex::new(StoreState {
                sessions,
                active_id: None,
            }),
        }
    }

    /// Point at a new, unsaved session. Nothing is written until the first
    /// exchange is committed.
    pub async fn create_new(&self) {
        self.state.lock().await.active_id = None;
    }

    /// Save the working message list into the active session and return the
    /// id of the session it landed in. An empty list is ignored.
    #[cfg(test)]
    pub async fn commit(&self, messages: &[Message]) -> Result<Option<String>> {
        let mut state = self.state.lock().await;
        let origin = state.active_id.clone();
        self.save(&mut state, origin.as_deref(), messages, true).await
    }

    /// Save an exchange into the session it was started from. `origin` is the
    /// active id captured when the exchange began; `None` or an id that no
    /// longer exists saves a new session. With `activate`, a new session
    /// becomes active only if the pointer still equals `origin`.
    pub async fn commit_to(
        &self,
        origin: Option<&str>,
        messages: &[Message],
        activate: bool,
    ) -> Result<Option<String>> {
        let mut state = self.state.lock().await;
        self.save(&mut state, origin, messages, activate).await
    }

    async fn save(
        &self,
        state: &mut StoreState,
        origin: Option<&str>,
        messages: &[Message],
        activate: bool,
    ) -> Result<Option<String>> {
        if messages.is_empty() {
            return Ok(None);
        }

        let now = Utc::now();
        let title = derive_title(messages);

        let existing = origin.and_then(|id| state.sessions.iter().position(|s| s.id == id));

        let id = match existing {
            Some(idx) => {
                let mut session = state.sessions.remove(idx);
                session.messages = messages.to_vec();
                session.title = title;
                session.updated_at = now;
                let id = session.id.clone();
                state.sessions.insert(0, session);
                id
            }
            None => {
                if let Some(stale) = origin {
                    tracing::warn!("Session {} no longer exists, saving as new", stale);
                }
                let id = Self::fresh_id(&state.sessions);
                state.sessions.insert(
                    0,
                    Session {
                        id: id.clone(),
                        title,
                        messages: messages.to_vec(),
                        created_at: now,
                        updated_at: now,
                    },
                );
                if activate && state.active_id.as_deref() == origin {
                    state.active_id = Some(id.clone());
                }
                id
            }
        };

        if state.sessions.len() > MAX_SESSIONS {
            for evicted in state.sessions.drain(MAX_SESSIONS..) {
                tracing::debug!("Evicting session {} from history", evicted.id);
            }
        }

        self.persist(&state.sessions).await?;
        Ok(Some(id))
    }

    /// Make `id` the active session and return a copy of its messages.
    /// Unknown ids leave everything unchanged.
    pub async fn select(&self, id: &str) -> Option<Vec<Message>> {
        let mut state = self.state.lock().await;
        let messages = state
            .sessions
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.messages.clone())?;
        state.active_id = Some(id.to_string());
        Some(messages)
    }

    pub async fn remove(&self, id: &str) -> Result<RemoveOutcome> {
        let mut state = self.state.lock().await;
        let Some(idx) = state.sessions.iter().position(|s| s.id == id) else {
            return Ok(RemoveOutcome::NotFound);
        };
        state.sessions.remove(idx);

        let was_active = state.active_id.as_deref() == Some(id);
        if was_active {
            state.active_id = None;
        }

        self.persist(&state.sessions).await?;
        Ok(RemoveOutcome::Removed { was_active })
    }

    pub async fn list(&self) -> Vec<Session> {
        self.state.lock().await.sessions.clone()
    }

    pub async fn active_id(&self) -> Option<String> {
        self.state.lock().await.active_id.clone()
    }

    async fn persist(&self, sessions: &[Session]) -> Result<()> {
        let json = serde_json::to_string(sessions).context("Failed to serialize chat history")?;
        self.db
            .set_setting(KEY_CHAT_HISTORY, &json)
            .await
            .context("Failed to save chat history")
    }

    fn fresh_id(sessions: &[Session]) -> String {
        loop {
            let id = Uuid::now_v7().to_string();
            if !sessions.iter().any(|s| s.id == id) {
                return id;
            }
        }
    }
}
