use std::sync::Arc;

use crate::config::{CHAT_MAX_TOKENS, CHAT_TEMPERATURE};
use crate::models::{Message, ProviderId, Transcript};
use crate::providers::{BackendError, ChatBackend, ChatRequest};
use crate::services::inflight::{ExchangeState, InFlight};
use crate::services::sessions::SessionStore;

pub const DEFAULT_QUOTA_NOTICE: &str =
    "Daily free quota exceeded. Please provide your own API key.";

/// Provider and model a message is sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTarget {
    pub provider: ProviderId,
    pub model: String,
}

#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Personal API key. `None` means the backend's shared key and quota.
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Empty,
    Busy,
    /// The catalog had no model for the selected provider.
    NoModel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Nothing was appended and no request was made.
    Ignored(SkipReason),
    /// The reply was appended and the exchange committed. `session_id` is
    /// `None` only when saving the history failed.
    Replied {
        session_id: Option<String>,
        content: String,
    },
    /// The shared quota is used up. Only the user message was appended.
    QuotaExceeded { detail: String },
    /// An inline error message was appended in place of a reply.
    Failed { error: String },
}

/// Runs chat exchanges against the backend, one at a time.
pub struct ChatPipeline {
    backend: Arc<dyn ChatBackend>,
    in_flight: InFlight,
}

impl ChatPipeline {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            in_flight: InFlight::new(),
        }
    }

    pub fn state(&self) -> ExchangeState {
        self.in_flight.state()
    }

    /// Run one exchange. `on_started` fires once the user message has been
    /// appended and the request is about to go out.
    pub async fn send<F>(
        &self,
        transcript: &Transcript,
        store: &SessionStore,
        text: &str,
        target: &ChatTarget,
        options: &SendOptions,
        on_started: F,
    ) -> SendOutcome
    where
        F: FnOnce() + Send,
    {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Ignored(SkipReason::Empty);
        }
        if target.model.is_empty() {
            tracing::warn!("No model selected for {}", target.provider.as_str());
            return SendOutcome::Ignored(SkipReason::NoModel);
        }

        let Some(_guard) = self.in_flight.try_begin() else {
            tracing::debug!("Chat exchange already in flight, ignoring send");
            return SendOutcome::Ignored(SkipReason::Busy);
        };

        // Where the reply belongs, even if the user switches chats meanwhile.
        let origin = store.active_id().await;
        transcript.push(Message::user(text));
        let generation = transcript.generation();
        on_started();

        let sent = transcript.snapshot();
        let request = build_request(sent.clone(), target, options);
        tracing::info!(
            "Sending {} messages to {}/{}",
            request.messages.len(),
            target.provider.as_str(),
            target.model
        );

        match self.backend.send_chat(request).await {
            Ok(response) => {
                let content = response.message.content;
                let reply = Message::assistant(content.clone());

                let (messages, on_screen) =
                    match transcript.push_if_current(generation, reply.clone()) {
                        Some(messages) => (messages, true),
                        None => {
                            tracing::info!("Chat changed while waiting, saving reply to its origin");
                            let mut messages = sent;
                            messages.push(reply);
                            (messages, false)
                        }
                    };

                let session_id = match store
                    .commit_to(origin.as_deref(), &messages, on_screen)
                    .await
                {
                    Ok(id) => id,
                    Err(e) => {
                        tracing::error!("Failed to save chat: {:#}", e);
                        None
                    }
                };

                SendOutcome::Replied {
                    session_id,
                    content,
                }
            }
            Err(BackendError::QuotaExceeded { detail }) => {
                tracing::warn!("Chat quota exceeded");
                SendOutcome::QuotaExceeded {
                    detail: detail.unwrap_or_else(|| DEFAULT_QUOTA_NOTICE.to_string()),
                }
            }
            Err(e) => {
                tracing::error!("Chat exchange failed: {}", e);
                let error = error_text(&e);
                if transcript
                    .push_if_current(generation, Message::assistant(error.clone()))
                    .is_none()
                {
                    tracing::debug!("Chat changed while waiting, dropping inline error");
                }
                SendOutcome::Failed { error }
            }
        }
    }
}

/// Build the request body for the current message list.
pub fn build_request(
    messages: Vec<Message>,
    target: &ChatTarget,
    options: &SendOptions,
) -> ChatRequest {
    ChatRequest {
        messages,
        provider: target.provider,
        model: target.model.clone(),
        temperature: CHAT_TEMPERATURE,
        max_tokens: CHAT_MAX_TOKENS,
        api_key: options.api_key.clone().filter(|k| !k.is_empty()),
    }
}

/// Inline error text for a failed exchange. Backend-reported detail wins;
/// local failures carry their own description.
fn error_text(err: &BackendError) -> String {
    match err {
        BackendError::Rejected { detail, .. } | BackendError::QuotaExceeded { detail } => {
            format!("Error: {}", detail.as_deref().unwrap_or("Unknown error"))
        }
        BackendError::NetworkError(msg) | BackendError::InvalidResponse(msg) => {
            format!("Error: {}", msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::providers::testing::ScriptedBackend;
    use crate::services::database::Database;

    fn target() -> ChatTarget {
        ChatTarget {
            provider: ProviderId::Aliyun,
            model: "qwen-plus".to_string(),
        }
    }

    async fn store() -> SessionStore {
        SessionStore::load(Database::new_in_memory().unwrap()).await
    }

    #[tokio::test]
    async fn test_first_send_creates_session() {
        let backend = Arc::new(ScriptedBackend::new().reply("Hi!"));
        let pipeline = ChatPipeline::new(backend.clone());
        let transcript = Transcript::new();
        let store = store().await;

        let outcome = pipeline
            .send(&transcript, &store, "Hello", &target(), &SendOptions::default(), || {})
            .await;

        let (session_id, content) = match outcome {
            SendOutcome::Replied {
                session_id,
                content,
            } => (session_id, content),
            other => panic!("expected reply, got {:?}", other),
        };
        assert_eq!(content, "Hi!");
        assert_eq!(
            transcript.snapshot(),
            vec![Message::user("Hello"), Message::assistant("Hi!")]
        );

        let sessions = store.list().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(Some(sessions[0].id.clone()), session_id);
        assert_eq!(sessions[0].title, "Hello");
        assert_eq!(pipeline.state(), ExchangeState::Idle);
    }

    #[tokio::test]
    async fn test_request_carries_full_history_and_fixed_params() {
        let backend = Arc::new(ScriptedBackend::new().reply("one").reply("two"));
        let pipeline = ChatPipeline::new(backend.clone());
        let transcript = Transcript::new();
        let store = store().await;
        let options = SendOptions {
            api_key: Some("sk-user".to_string()),
        };

        pipeline.send(&transcript, &store, "first", &target(), &options, || {}).await;
        pipeline.send(&transcript, &store, "  second  ", &target(), &options, || {}).await;

        let requests = backend.chat_requests.lock().unwrap();
        let last = &requests[1];
        assert_eq!(last.messages.len(), 3);
        assert_eq!(last.messages[2], Message::user("second"));
        assert_eq!(last.temperature, 0.7);
        assert_eq!(last.max_tokens, 2000);
        assert_eq!(last.api_key.as_deref(), Some("sk-user"));
        drop(requests);

        // Both exchanges land in the same session.
        let sessions = store.list().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].messages.len(), 4);
    }

    #[tokio::test]
    async fn test_empty_input_is_ignored() {
        let backend = Arc::new(ScriptedBackend::new());
        let pipeline = ChatPipeline::new(backend.clone());
        let transcript = Transcript::new();
        let store = store().await;

        let outcome = pipeline
            .send(&transcript, &store, "   \n", &target(), &SendOptions::default(), || {})
            .await;

        assert_eq!(outcome, SendOutcome::Ignored(SkipReason::Empty));
        assert!(transcript.is_empty());
        assert_eq!(backend.chat_request_count(), 0);
    }

    #[tokio::test]
    async fn test_quota_exceeded_keeps_only_user_message() {
        let backend = Arc::new(ScriptedBackend::new().chat_error(BackendError::QuotaExceeded {
            detail: Some("Daily free quota exceeded (10/10)".to_string()),
        }));
        let pipeline = ChatPipeline::new(backend);
        let transcript = Transcript::new();
        let store = store().await;

        let outcome = pipeline
            .send(&transcript, &store, "test", &target(), &SendOptions::default(), || {})
            .await;

        assert_eq!(
            outcome,
            SendOutcome::QuotaExceeded {
                detail: "Daily free quota exceeded (10/10)".to_string()
            }
        );
        assert_eq!(transcript.snapshot(), vec![Message::user("test")]);
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_quota_without_detail_uses_default_notice() {
        let backend = Arc::new(
            ScriptedBackend::new().chat_error(BackendError::QuotaExceeded { detail: None }),
        );
        let pipeline = ChatPipeline::new(backend);
        let transcript = Transcript::new();

        let outcome = pipeline
            .send(&transcript, &store().await, "x", &target(), &SendOptions::default(), || {})
            .await;

        assert_eq!(
            outcome,
            SendOutcome::QuotaExceeded {
                detail: DEFAULT_QUOTA_NOTICE.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_backend_error_recorded_inline() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .chat_error(BackendError::Rejected {
                    status: 500,
                    detail: Some("Request failed".to_string()),
                })
                .chat_error(BackendError::Rejected {
                    status: 502,
                    detail: None,
                }),
        );
        let pipeline = ChatPipeline::new(backend);
        let transcript = Transcript::new();
        let store = store().await;

        pipeline.send(&transcript, &store, "a", &target(), &SendOptions::default(), || {}).await;
        pipeline.send(&transcript, &store, "b", &target(), &SendOptions::default(), || {}).await;

        let messages = transcript.snapshot();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], Message::user("a"));
        assert_eq!(messages[1], Message::assistant("Error: Request failed"));
        assert_eq!(messages[3], Message::assistant("Error: Unknown error"));
        // Failed exchanges are not saved.
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_uses_local_error_text() {
        let backend = Arc::new(ScriptedBackend::new().chat_error(BackendError::NetworkError(
            "error sending request".to_string(),
        )));
        let pipeline = ChatPipeline::new(backend);
        let transcript = Transcript::new();

        let outcome = pipeline
            .send(&transcript, &store().await, "hi", &target(), &SendOptions::default(), || {})
            .await;

        assert_eq!(
            outcome,
            SendOutcome::Failed {
                error: "Error: error sending request".to_string()
            }
        );
        let last = transcript.snapshot().pop().unwrap();
        assert_eq!(last.role, Role::Assistant);
        // The optimistic user message is never rolled back.
        assert_eq!(transcript.snapshot()[0], Message::user("hi"));
    }

    #[tokio::test]
    async fn test_send_while_in_flight_is_rejected() {
        let (backend, gate) = ScriptedBackend::new().reply("late").gate_chat();
        let backend = Arc::new(backend);
        let pipeline = Arc::new(ChatPipeline::new(backend.clone()));
        let transcript = Transcript::new();
        let store = Arc::new(store().await);

        let first = {
            let pipeline = pipeline.clone();
            let transcript = transcript.clone();
            let store = store.clone();
            tokio::spawn(async move {
                pipeline
                    .send(&transcript, &store, "first", &target(), &SendOptions::default(), || {})
                    .await
            })
        };

        while backend.chat_request_count() == 0 {
            tokio::task::yield_now().await;
        }

        // The user message is visible before any response arrives.
        assert_eq!(transcript.snapshot(), vec![Message::user("first")]);
        assert_eq!(pipeline.state(), ExchangeState::Sending);

        let second = pipeline
            .send(&transcript, &store, "second", &target(), &SendOptions::default(), || {})
            .await;
        assert_eq!(second, SendOutcome::Ignored(SkipReason::Busy));
        assert_eq!(transcript.len(), 1);

        gate.notify_one();
        let outcome = first.await.unwrap();
        assert!(matches!(outcome, SendOutcome::Replied { .. }));
        assert_eq!(transcript.len(), 2);
        assert_eq!(backend.chat_request_count(), 1);
        assert_eq!(pipeline.state(), ExchangeState::Idle);
    }

    #[tokio::test]
    async fn test_reply_after_switching_chats_goes_to_origin() {
        let (backend, gate) = ScriptedBackend::new().reply("one").reply("late").gate_chat();
        let backend = Arc::new(backend);
        let pipeline = Arc::new(ChatPipeline::new(backend.clone()));
        let transcript = Transcript::new();
        let store = Arc::new(store().await);

        gate.notify_one();
        let SendOutcome::Replied {
            session_id: Some(origin),
            ..
        } = pipeline
            .send(&transcript, &store, "one", &target(), &SendOptions::default(), || {})
            .await
        else {
            panic!("first exchange should be saved");
        };

        let pending = {
            let pipeline = pipeline.clone();
            let transcript = transcript.clone();
            let store = store.clone();
            tokio::spawn(async move {
                pipeline
                    .send(&transcript, &store, "two", &target(), &SendOptions::default(), || {})
                    .await
            })
        };
        while backend.chat_request_count() < 2 {
            tokio::task::yield_now().await;
        }

        // The user starts a new chat before the reply arrives.
        store.create_new().await;
        transcript.clear();

        gate.notify_one();
        let outcome = pending.await.unwrap();
        assert_eq!(
            outcome,
            SendOutcome::Replied {
                session_id: Some(origin.clone()),
                content: "late".to_string()
            }
        );

        assert!(transcript.is_empty());
        assert!(store.active_id().await.is_none());
        let sessions = store.list().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, origin);
        assert_eq!(sessions[0].messages.len(), 4);
        assert_eq!(sessions[0].messages[3], Message::assistant("late"));
    }

    #[tokio::test]
    async fn test_missing_model_blocks_send() {
        let backend = Arc::new(ScriptedBackend::new().reply("unused"));
        let pipeline = ChatPipeline::new(backend.clone());
        let transcript = Transcript::new();
        let no_model = ChatTarget {
            provider: ProviderId::OpenAi,
            model: String::new(),
        };

        let outcome = pipeline
            .send(&transcript, &store().await, "hi", &no_model, &SendOptions::default(), || {})
            .await;

        assert_eq!(outcome, SendOutcome::Ignored(SkipReason::NoModel));
        assert!(transcript.is_empty());
        assert_eq!(backend.chat_request_count(), 0);
    }

    #[test]
    fn test_blank_api_key_not_sent() {
        let options = SendOptions {
            api_key: Some(String::new()),
        };
        let request = build_request(vec![Message::user("x")], &target(), &options);
        assert!(request.api_key.is_none());
    }
}
