//! Platform-neutral command model and parsing.
//!
//! Platform adapters decode the wire payload into a [`RawCommand`]; the
//! functions here turn that into an [`InboundCommand`] the dispatcher can
//! handle without knowing which chat platform it came from.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

/// Chat platform a command arrived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Slack,
    Teams,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Slack => "slack",
            Platform::Teams => "teams",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recognized command verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Help,
    Thanks,
    Give,
    Balance,
}

impl Verb {
    /// Case-insensitive verb lookup. Accepts a leading slash.
    pub fn from_token(token: &str) -> Option<Verb> {
        match token.trim_start_matches('/').to_ascii_lowercase().as_str() {
            "help" => Some(Verb::Help),
            "thanks" => Some(Verb::Thanks),
            "give" => Some(Verb::Give),
            "balance" => Some(Verb::Balance),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Help => "help",
            Verb::Thanks => "thanks",
            Verb::Give => "give",
            Verb::Balance => "balance",
        }
    }
}

/// One inbound slash-command delivery as the platform adapter saw it,
/// before neutral parsing.
///
/// `command` is the slash-command name (e.g. `/thanks`) where the platform
/// supplies one; `None` means the verb is the first whitespace-delimited
/// token of `text` (Teams messages, and the legacy `/rewardstation` form).
#[derive(Debug, Clone)]
pub struct RawCommand {
    pub command: Option<String>,
    pub text: String,
    pub actor_id: String,
    pub channel_id: String,
    pub response_url: Option<String>,
    pub trigger_id: Option<String>,
}

/// A fully parsed command. Immutable after parsing, discarded after dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCommand {
    pub platform: Platform,
    pub verb: Verb,
    pub actor_id: String,
    pub target_mention: Option<String>,
    pub free_text: String,
    pub channel_id: String,
    pub response_callback_url: Option<String>,
    pub trigger_id: Option<String>,
}

/// Submission of the interactive give form, after the platform adapter has
/// unpacked the wire payload. Points are validated at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GiveSubmission {
    pub platform: Platform,
    pub actor_id: String,
    pub recipient_id: String,
    pub points: i64,
    pub behavior_tags: Vec<String>,
    pub message: String,
    pub channel_id: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("command text has no user mention")]
    MissingRecipient,
    #[error("command text has no message after the mention")]
    MissingMessage,
    #[error("unknown command verb: {0}")]
    UnknownCommand(String),
    #[error("payload could not be decoded: {0}")]
    MalformedPayload(String),
}

impl ParseError {
    /// Usage text shown (ephemerally) to the requester.
    pub fn user_message(&self) -> String {
        match self {
            ParseError::MissingRecipient => {
                "Please mention a user with @username\n\nExample: `/thanks @sarah \"Great job!\"`"
                    .to_string()
            }
            ParseError::MissingMessage => {
                "Please include a message\n\nExample: `/thanks @sarah \"Great job on the presentation!\"`"
                    .to_string()
            }
            ParseError::UnknownCommand(verb) => format!(
                "Unknown command: `{verb}`\n\nValid commands: `/help`, `/thanks`, `/give`, `/balance`"
            ),
            ParseError::MalformedPayload(_) => {
                "Could not read that command. Please try again.".to_string()
            }
        }
    }
}

static SLACK_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<@([A-Za-z0-9]+)(?:\|[^>]*)?>").unwrap());
static TEAMS_MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"<at>([^<>]+)</at>").unwrap());

/// Find the first user mention in `text` and return its user ID plus the
/// remainder of the text after the mention token.
pub fn split_mention(platform: Platform, text: &str) -> Option<(String, &str)> {
    let re = match platform {
        Platform::Slack => &SLACK_MENTION,
        Platform::Teams => &TEAMS_MENTION,
    };
    let caps = re.captures(text)?;
    let whole = caps.get(0)?;
    let id = caps.get(1)?.as_str().trim().to_string();
    if id.is_empty() {
        return None;
    }
    Some((id, &text[whole.end()..]))
}

/// Strip matching leading/trailing quote characters.
pub fn strip_quotes(s: &str) -> &str {
    s.trim_matches(|c| c == '"' || c == '\'')
}

/// Parse a raw delivery into a platform-neutral command.
///
/// Verb recognition is case-insensitive. The legacy combined form
/// (`/rewardstation thanks @user "msg"`, or a bare Teams text blob) takes
/// the verb from the first token of the text.
pub fn parse(platform: Platform, raw: &RawCommand) -> Result<InboundCommand, ParseError> {
    let text = raw.text.trim();

    let legacy = match raw.command.as_deref() {
        None => true,
        Some(cmd) => cmd
            .trim_start_matches('/')
            .eq_ignore_ascii_case("rewardstation"),
    };

    let (verb_token, args) = if legacy {
        let mut parts = text.splitn(2, char::is_whitespace);
        let head = parts.next().unwrap_or("");
        let rest = parts.next().unwrap_or("").trim();
        if head.is_empty() {
            ("help".to_string(), String::new())
        } else {
            (head.to_string(), rest.to_string())
        }
    } else {
        (raw.command.clone().unwrap_or_default(), text.to_string())
    };

    let verb = Verb::from_token(&verb_token).ok_or_else(|| {
        ParseError::UnknownCommand(verb_token.trim_start_matches('/').to_string())
    })?;

    let (target_mention, free_text) = match verb {
        Verb::Thanks => {
            let (id, rest) =
                split_mention(platform, &args).ok_or(ParseError::MissingRecipient)?;
            let message = strip_quotes(rest.trim()).trim().to_string();
            if message.is_empty() {
                return Err(ParseError::MissingMessage);
            }
            (Some(id), message)
        }
        Verb::Give => match split_mention(platform, &args) {
            // Recipient here is a convenience; the interactive form collects it.
            Some((id, rest)) => (Some(id), strip_quotes(rest.trim()).trim().to_string()),
            None => (None, args),
        },
        Verb::Help | Verb::Balance => (None, args),
    };

    Ok(InboundCommand {
        platform,
        verb,
        actor_id: raw.actor_id.clone(),
        target_mention,
        free_text,
        channel_id: raw.channel_id.clone(),
        response_callback_url: raw.response_url.clone(),
        trigger_id: raw.trigger_id.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(command: Option<&str>, text: &str) -> RawCommand {
        RawCommand {
            command: command.map(String::from),
            text: text.to_string(),
            actor_id: "U1000".to_string(),
            channel_id: "C2000".to_string(),
            response_url: None,
            trigger_id: None,
        }
    }

    #[test]
    fn test_thanks_with_slack_mention() {
        let cmd = parse(Platform::Slack, &raw(Some("/thanks"), "<@U42> \"nice work\"")).unwrap();
        assert_eq!(cmd.verb, Verb::Thanks);
        assert_eq!(cmd.target_mention.as_deref(), Some("U42"));
        assert_eq!(cmd.free_text, "nice work");
    }

    #[test]
    fn test_legacy_combined_form() {
        let cmd = parse(
            Platform::Slack,
            &raw(Some("/rewardstation"), "thanks <@U42> \"nice work\""),
        )
        .unwrap();
        assert_eq!(cmd.verb, Verb::Thanks);
        assert_eq!(cmd.target_mention.as_deref(), Some("U42"));
        assert_eq!(cmd.free_text, "nice work");
    }

    #[test]
    fn test_mention_with_handle_suffix() {
        let cmd = parse(
            Platform::Slack,
            &raw(Some("/thanks"), "<@U42|sarah> great presentation"),
        )
        .unwrap();
        assert_eq!(cmd.target_mention.as_deref(), Some("U42"));
        assert_eq!(cmd.free_text, "great presentation");
    }

    #[test]
    fn test_teams_mention_syntax() {
        let cmd = parse(Platform::Teams, &raw(None, "thanks <at>jane</at> great work")).unwrap();
        assert_eq!(cmd.verb, Verb::Thanks);
        assert_eq!(cmd.target_mention.as_deref(), Some("jane"));
        assert_eq!(cmd.free_text, "great work");
    }

    #[test]
    fn test_missing_recipient() {
        let err = parse(Platform::Slack, &raw(Some("/thanks"), "no mention here")).unwrap_err();
        assert_eq!(err, ParseError::MissingRecipient);
    }

    #[test]
    fn test_malformed_mention_is_missing_recipient() {
        let err = parse(Platform::Slack, &raw(Some("/thanks"), "@sarah plain at-sign")).unwrap_err();
        assert_eq!(err, ParseError::MissingRecipient);
    }

    #[test]
    fn test_missing_message() {
        let err = parse(Platform::Slack, &raw(Some("/thanks"), "<@U42> \"\"")).unwrap_err();
        assert_eq!(err, ParseError::MissingMessage);
    }

    #[test]
    fn test_unknown_verb_carries_original() {
        let err = parse(Platform::Slack, &raw(Some("/promote"), "")).unwrap_err();
        assert_eq!(err, ParseError::UnknownCommand("promote".to_string()));
    }

    #[test]
    fn test_verb_is_case_insensitive() {
        let cmd = parse(Platform::Slack, &raw(Some("/THANKS"), "<@U42> thanks a lot")).unwrap();
        assert_eq!(cmd.verb, Verb::Thanks);
    }

    #[test]
    fn test_legacy_empty_text_defaults_to_help() {
        let cmd = parse(Platform::Slack, &raw(Some("/rewardstation"), "")).unwrap();
        assert_eq!(cmd.verb, Verb::Help);
    }

    #[test]
    fn test_give_without_mention_is_accepted() {
        let cmd = parse(Platform::Slack, &raw(Some("/give"), "")).unwrap();
        assert_eq!(cmd.verb, Verb::Give);
        assert!(cmd.target_mention.is_none());
    }

    #[test]
    fn test_parse_is_idempotent() {
        let payload = raw(Some("/thanks"), "<@U42> \"nice work\"");
        let first = parse(Platform::Slack, &payload).unwrap();
        let second = parse(Platform::Slack, &payload).unwrap();
        assert_eq!(first, second);
    }
}
