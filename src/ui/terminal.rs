use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Datelike, Utc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use crate::app::{App, AppEvent, SessionSummary};
use crate::config::Language;
use crate::models::{Message, ProviderId, Role};
use crate::providers::types::Usage;
use crate::services::markdown::render_markdown;
use crate::services::quota::QuotaLevel;
use crate::ui::commands::{self, Command, SessionRef, HELP};

const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const GREEN: &str = "\x1b[32m";
const BLUE: &str = "\x1b[34m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Turns app state into terminal text.
pub struct TerminalView {
    ansi: bool,
    language: Language,
    // Last session list shown, so `/open 2` resolves against what the user saw.
    listed: Vec<SessionSummary>,
    active_id: Option<String>,
}

impl TerminalView {
    pub fn new(ansi: bool, language: Language) -> Self {
        Self {
            ansi,
            language,
            listed: Vec::new(),
            active_id: None,
        }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.ansi {
            format!("{}{}{}", color, text, RESET)
        } else {
            text.to_string()
        }
    }

    pub fn render_message(&self, message: &Message) -> String {
        match message.role {
            Role::User => format!("{} {}", self.paint(BLUE, "you >"), message.content),
            Role::Assistant => format!(
                "{}\n{}",
                self.paint(GREEN, "assistant >"),
                render_markdown(&message.content, self.ansi)
            ),
        }
    }

    pub fn render_transcript(&self, messages: &[Message]) -> String {
        if messages.is_empty() {
            return self.paint(DIM, "(new chat)");
        }
        messages
            .iter()
            .map(|m| self.render_message(m))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn thinking(&self) -> String {
        self.paint(DIM, "assistant is thinking ...")
    }

    pub fn remember_sessions(&mut self, sessions: Vec<SessionSummary>, active_id: Option<String>) {
        self.listed = sessions;
        self.active_id = active_id;
    }

    pub fn resolve(&self, session: &SessionRef) -> Option<String> {
        match session {
            SessionRef::Index(n) => self.listed.get(n - 1).map(|s| s.id.clone()),
            SessionRef::Id(id) => Some(id.clone()),
        }
    }

    pub fn render_sessions(&self) -> String {
        if self.listed.is_empty() {
            return self.paint(DIM, "No saved chats");
        }

        let mut out = String::new();
        let mut current_group = "";
        for (i, session) in self.listed.iter().enumerate() {
            let group = date_group(&session.updated_at);
            if group != current_group {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(&self.paint(DIM, group));
                out.push('\n');
                current_group = group;
            }
            let marker = if self.active_id.as_deref() == Some(session.id.as_str()) {
                "*"
            } else {
                " "
            };
            out.push_str(&format!("{} {:>2}. {}\n", marker, i + 1, session.title));
        }
        out.trim_end().to_string()
    }

    pub fn render_usage(&self, usage: Option<&Usage>) -> Option<String> {
        let usage = usage?;
        let text = format!("Free quota: {}/{}", usage.used, usage.limit);
        Some(match QuotaLevel::classify(usage) {
            QuotaLevel::Exhausted => self.paint(RED, &text),
            QuotaLevel::Low => self.paint(YELLOW, &text),
            QuotaLevel::Normal => text,
        })
    }

    pub fn render_models(&self, app: &App) -> String {
        let target = app.target();
        let models = app.catalog().models_for(target.provider);
        if models.is_empty() {
            return self.paint(DIM, "No models available");
        }
        models
            .iter()
            .map(|m| {
                let marker = if m.id == target.model { "*" } else { " " };
                format!("{} {} ({})", marker, m.id, m.display_name(self.language))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Classify a timestamp into a date group label.
fn date_group(dt: &DateTime<Utc>) -> &'static str {
    let today = Utc::now().date_naive();
    let date = dt.date_naive();

    if date == today {
        "Today"
    } else if Some(date) == today.pred_opt() {
        "Yesterday"
    } else if date.iso_week() == today.iso_week() {
        "This Week"
    } else {
        "Older"
    }
}

/// Read commands from stdin and print state changes until `/quit`, end of
/// input, or Ctrl-C.
pub async fn run(
    app: Arc<App>,
    mut events: UnboundedReceiver<AppEvent>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut view = TerminalView::new(std::io::stdout().is_terminal(), app.language());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        });
    }

    let target = app.target();
    println!("{}", app.display_name());
    println!(
        "{}",
        view.paint(
            DIM,
            &format!(
                "{} / {} ({} theme, {} free messages a day) - type /help for commands",
                target.provider.as_str(),
                target.model,
                app.color_scheme().as_str(),
                app.app_config().daily_free_limit
            )
        )
    );
    app.start().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let Some(command) = commands::parse(&line) else { continue };
                if !dispatch(&app, &mut view, command).await {
                    break;
                }
            }
            Some(event) = events.recv() => render_event(&app, &mut view, event),
        }
    }

    tracing::debug!("Terminal loop finished");
    Ok(())
}

/// Returns `false` when the user asked to quit.
async fn dispatch(app: &Arc<App>, view: &mut TerminalView, command: Command) -> bool {
    match command {
        Command::Send(_) if app.is_replying() => {
            println!("{}", view.paint(DIM, "Still waiting for the previous reply"));
        }
        Command::Image { .. } if app.is_generating_image() => {
            println!("{}", view.paint(DIM, "An image is already being generated"));
        }
        Command::Send(text) => {
            let app = app.clone();
            tokio::spawn(async move {
                app.send_message(&text).await;
            });
        }
        Command::Image { provider, prompt } => {
            let app = app.clone();
            let provider = provider.unwrap_or(ProviderId::OpenAi);
            tokio::spawn(async move {
                app.generate_image(&prompt, provider).await;
            });
        }
        Command::NewChat => app.new_chat().await,
        Command::List => {
            view.remember_sessions(app.sessions().await, view.active_id.clone());
            println!("{}", view.render_sessions());
        }
        Command::Open(session) => match view.resolve(&session) {
            Some(id) => app.select_session(&id).await,
            None => println!("No such chat"),
        },
        Command::Delete(session) => match view.resolve(&session) {
            Some(id) => app.delete_session(&id).await,
            None => println!("No such chat"),
        },
        Command::SetKey(key) => app.set_api_key(&key).await,
        Command::Provider(provider) => app.set_provider(provider).await,
        Command::Model(model) => app.set_model(&model).await,
        Command::Models => println!("{}", view.render_models(app)),
        Command::Usage => app.refresh_usage().await,
        Command::Theme => app.toggle_theme().await,
        Command::Help => println!("{}", HELP),
        Command::Quit => return false,
        Command::Invalid(message) => println!("{}", message),
    }
    true
}

fn render_event(app: &App, view: &mut TerminalView, event: AppEvent) {
    match event {
        AppEvent::TranscriptChanged(messages) => {
            println!("\n{}", view.render_transcript(&messages));
        }
        AppEvent::SessionsChanged {
            sessions,
            active_id,
        } => view.remember_sessions(sessions, active_id),
        AppEvent::ExchangeStarted => println!("{}", view.thinking()),
        AppEvent::ExchangeFinished => {}
        AppEvent::QuotaExceeded(detail) => {
            println!("{}", view.paint(RED, &detail));
            if !app.has_api_key() {
                println!("Set a personal API key with /key <api-key> to keep chatting.");
            }
        }
        AppEvent::ImageStarted => println!("{}", view.paint(DIM, "Generating image ...")),
        AppEvent::ImagesGenerated(urls) => {
            for url in urls {
                println!("image: {}", url);
            }
        }
        AppEvent::ImageFailed(error) => println!("{}", view.paint(RED, &error)),
        AppEvent::UsageUpdated(usage) => {
            if let Some(line) = view.render_usage(usage.as_ref()) {
                println!("{}", line);
            }
        }
        AppEvent::SelectionChanged { provider, model } => {
            println!("Using {} / {}", provider.as_str(), model);
        }
        AppEvent::ThemeChanged(scheme) => println!("Theme: {}", scheme.as_str()),
        AppEvent::Notice(message) => println!("{}", message),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn summary(id: &str, title: &str, updated_at: DateTime<Utc>) -> SessionSummary {
        SessionSummary {
            id: id.to_string(),
            title: title.to_string(),
            updated_at,
        }
    }

    #[test]
    fn test_transcript_plain_rendering() {
        let view = TerminalView::new(false, Language::En);
        let rendered = view.render_transcript(&[
            Message::user("**not markdown**"),
            Message::assistant("**bold** reply"),
        ]);
        assert_eq!(
            rendered,
            "you > **not markdown**\n\nassistant >\nbold reply"
        );
        assert_eq!(view.render_transcript(&[]), "(new chat)");
    }

    #[test]
    fn test_session_list_groups_and_indexes() {
        let mut view = TerminalView::new(false, Language::En);
        let now = Utc::now();
        view.remember_sessions(
            vec![
                summary("a", "Hello", now),
                summary("b", "Old chat", now - Duration::days(30)),
            ],
            Some("a".to_string()),
        );

        let rendered = view.render_sessions();
        assert!(rendered.starts_with("Today\n*  1. Hello"));
        assert!(rendered.contains("Older\n   2. Old chat"));

        assert_eq!(view.resolve(&SessionRef::Index(2)).as_deref(), Some("b"));
        assert_eq!(view.resolve(&SessionRef::Index(3)), None);
        assert_eq!(
            view.resolve(&SessionRef::Id("zzz".to_string())).as_deref(),
            Some("zzz")
        );
    }

    #[test]
    fn test_usage_colored_by_level() {
        let view = TerminalView::new(true, Language::En);
        let low = Usage {
            used: 9,
            limit: 10,
            remaining: 1,
        };
        assert!(view.render_usage(Some(&low)).unwrap().starts_with(YELLOW));
        assert!(view.render_usage(None).is_none());

        let plain = TerminalView::new(false, Language::En);
        assert_eq!(plain.render_usage(Some(&low)).unwrap(), "Free quota: 9/10");
    }
}
