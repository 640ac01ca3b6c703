use crate::models::ProviderId;

/// A session picked either by its position in the last listing (1-based) or
/// by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRef {
    Index(usize),
    Id(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    NewChat,
    List,
    Open(SessionRef),
    Delete(SessionRef),
    Image {
        provider: Option<ProviderId>,
        prompt: String,
    },
    SetKey(String),
    Provider(ProviderId),
    Model(String),
    Models,
    Usage,
    Theme,
    Help,
    Quit,
    Invalid(String),
}

pub const HELP: &str = "\
Type a message and press Enter to send it.

  /new                      start a new chat
  /list                     show saved chats
  /open <n|id>              open a saved chat
  /delete <n|id>            delete a saved chat
  /image [provider] <text>  generate an image
  /key [api-key]            set a personal API key (empty to clear)
  /provider <aliyun|openai> switch provider
  /model <id>               switch model
  /models                   list models for the current provider
  /usage                    show the shared-key quota
  /theme                    toggle light/dark
  /help                     show this help
  /quit                     exit";

pub fn parse(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Some(Command::Send(line.to_string()));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    let command = match name {
        "new" => Command::NewChat,
        "list" | "ls" => Command::List,
        "open" => match session_ref(arg) {
            Some(r) => Command::Open(r),
            None => Command::Invalid("usage: /open <n|id>".to_string()),
        },
        "delete" | "rm" => match session_ref(arg) {
            Some(r) => Command::Delete(r),
            None => Command::Invalid("usage: /delete <n|id>".to_string()),
        },
        "image" | "img" => parse_image(arg),
        "key" => Command::SetKey(arg.to_string()),
        "provider" => match ProviderId::from_str(arg) {
            Some(p) => Command::Provider(p),
            None => Command::Invalid(format!(
                "unknown provider: {} (expected one of: {})",
                arg,
                ProviderId::ALL.map(|p| p.as_str()).join(", ")
            )),
        },
        "model" if !arg.is_empty() => Command::Model(arg.to_string()),
        "model" => Command::Invalid("usage: /model <id>".to_string()),
        "models" => Command::Models,
        "usage" => Command::Usage,
        "theme" => Command::Theme,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => Command::Invalid(format!("unknown command: /{}", other)),
    };
    Some(command)
}

fn session_ref(arg: &str) -> Option<SessionRef> {
    if arg.is_empty() {
        return None;
    }
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Some(SessionRef::Index(n)),
        _ => Some(SessionRef::Id(arg.to_string())),
    }
}

fn parse_image(arg: &str) -> Command {
    let (provider, prompt) = match arg.split_once(char::is_whitespace) {
        Some((first, rest)) => match ProviderId::from_str(first) {
            Some(p) => (Some(p), rest.trim()),
            None => (None, arg),
        },
        None => (None, arg),
    };
    if prompt.is_empty() {
        return Command::Invalid("usage: /image [provider] <prompt>".to_string());
    }
    Command::Image {
        provider,
        prompt: prompt.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_sent() {
        assert_eq!(parse("  hello there "), Some(Command::Send("hello there".to_string())));
        assert_eq!(parse("   "), None);
    }

    #[test]
    fn test_session_refs() {
        assert_eq!(parse("/open 2"), Some(Command::Open(SessionRef::Index(2))));
        assert_eq!(
            parse("/delete 0192b1c4-aaaa"),
            Some(Command::Delete(SessionRef::Id("0192b1c4-aaaa".to_string())))
        );
        assert!(matches!(parse("/open"), Some(Command::Invalid(_))));
        assert_eq!(
            parse("/open 0"),
            Some(Command::Open(SessionRef::Id("0".to_string())))
        );
    }

    #[test]
    fn test_image_provider_prefix() {
        assert_eq!(
            parse("/image openai a red fox"),
            Some(Command::Image {
                provider: Some(ProviderId::OpenAi),
                prompt: "a red fox".to_string()
            })
        );
        assert_eq!(
            parse("/image a red fox"),
            Some(Command::Image {
                provider: None,
                prompt: "a red fox".to_string()
            })
        );
        assert!(matches!(parse("/image openai"), Some(Command::Image { provider: None, .. })));
        assert!(matches!(parse("/image"), Some(Command::Invalid(_))));
    }

    #[test]
    fn test_settings_commands() {
        assert_eq!(parse("/key"), Some(Command::SetKey(String::new())));
        assert_eq!(parse("/key sk-abc"), Some(Command::SetKey("sk-abc".to_string())));
        assert_eq!(parse("/provider openai"), Some(Command::Provider(ProviderId::OpenAi)));
        assert_eq!(
            parse("/provider gemini"),
            Some(Command::Invalid(
                "unknown provider: gemini (expected one of: aliyun, openai)".to_string()
            ))
        );
        assert_eq!(parse("/model qwen-max"), Some(Command::Model("qwen-max".to_string())));
        assert_eq!(parse("/bogus"), Some(Command::Invalid("unknown command: /bogus".to_string())));
    }
}
