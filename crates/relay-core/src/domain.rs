use std::{fmt, sync::OnceLock};

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::{errors::Error, Result};

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// A channel as written in configuration: numeric id or public username.
///
/// Usernames are stored lowercased; Telegram treats them case-insensitively.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChannelRef {
    Id(ChatId),
    Username(String),
}

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:https?://)?(?:www\.)?(?:t|telegram)\.me/(?:s/)?@?([A-Za-z0-9_]+)/?$")
            .expect("valid regex")
    })
}

fn username_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]{3,31}$").expect("valid regex"))
}

impl ChannelRef {
    /// Accepts `-100123`, `@name`, `name`, `t.me/name` and `https://t.me/s/name`.
    pub fn parse(raw: &str) -> Result<Self> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(Error::InvalidChannel("empty channel reference".to_string()));
        }

        if let Ok(id) = s.parse::<i64>() {
            return Ok(Self::Id(ChatId(id)));
        }

        let name = match link_re().captures(s) {
            Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or_default(),
            None => s.strip_prefix('@').unwrap_or(s),
        };

        if !username_re().is_match(name) {
            return Err(Error::InvalidChannel(raw.to_string()));
        }

        Ok(Self::Username(name.to_lowercase()))
    }

    pub fn matches(&self, chat_id: ChatId, username: Option<&str>) -> bool {
        match self {
            Self::Id(id) => *id == chat_id,
            Self::Username(name) => username
                .map(|u| u.trim_start_matches('@').eq_ignore_ascii_case(name))
                .unwrap_or(false),
        }
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", id.0),
            Self::Username(name) => write!(f, "@{name}"),
        }
    }
}

/// The set of channels the relay listens to.
#[derive(Clone, Debug, Default)]
pub struct SourceFilter {
    sources: Vec<ChannelRef>,
}

impl SourceFilter {
    pub fn new(sources: Vec<ChannelRef>) -> Self {
        Self { sources }
    }

    pub fn matches(&self, chat_id: ChatId, username: Option<&str>) -> bool {
        self.sources.iter().any(|s| s.matches(chat_id, username))
    }
}

/// Coarse media classification of an incoming post.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaType {
    Photo,
    /// Files, videos, audio, voice notes and animations.
    Document,
    Other,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Photo => "photo",
            Self::Document => "document",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// Attachment of a post, as far as the relay cares.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaDescriptor {
    pub kind: MediaType,
    pub file_id: String,
    pub unique_id: String,
    /// Size declared by the platform (0 when unknown).
    pub size: u64,
    pub file_name: Option<String>,
}

impl MediaDescriptor {
    /// Stable textual form used in message fingerprints.
    pub fn describe(&self) -> String {
        format!("{}:{}:{}", self.kind, self.unique_id, self.size)
    }

    /// File name used for the temp download. Bot API photos are always JPEG.
    pub fn file_name_hint(&self) -> String {
        if let Some(name) = self.file_name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }
        match self.kind {
            MediaType::Photo => "photo.jpg".to_string(),
            MediaType::Document => "document.bin".to_string(),
            MediaType::Other => "media.bin".to_string(),
        }
    }
}

/// Platform-neutral view of an incoming channel post.
#[derive(Clone, Debug)]
pub struct RelayMessage {
    pub chat_id: ChatId,
    pub chat_title: Option<String>,
    pub chat_username: Option<String>,
    pub message_id: MessageId,
    pub date: DateTime<Utc>,
    /// Message text, or the caption for media posts.
    pub text: Option<String>,
    pub media: Option<MediaDescriptor>,
    /// Joins, pins, title changes and other non-content events.
    pub service: bool,
}

impl RelayMessage {
    /// Human label for logs.
    pub fn source_label(&self) -> String {
        self.chat_title
            .clone()
            .or_else(|| self.chat_username.as_ref().map(|u| format!("@{u}")))
            .unwrap_or_else(|| self.chat_id.0.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_channel_spellings() {
        let want = ChannelRef::Username("medach".to_string());
        for raw in [
            "medach",
            "@medach",
            "https://t.me/medach",
            "http://t.me/medach/",
            "t.me/medach",
            "https://t.me/s/medach",
            "https://telegram.me/Medach",
        ] {
            assert_eq!(ChannelRef::parse(raw).unwrap(), want, "input: {raw}");
        }

        assert_eq!(
            ChannelRef::parse(" -1001234567890 ").unwrap(),
            ChannelRef::Id(ChatId(-1001234567890))
        );
    }

    #[test]
    fn rejects_bad_channel_refs() {
        assert!(ChannelRef::parse("").is_err());
        assert!(ChannelRef::parse("@ab").is_err());
        assert!(ChannelRef::parse("https://example.com/medach").is_err());
        assert!(ChannelRef::parse("has space").is_err());
    }

    #[test]
    fn channel_ref_display_round_trips() {
        let c = ChannelRef::parse("@DrButriy").unwrap();
        assert_eq!(c.to_string(), "@drbutriy");
        assert_eq!(ChannelRef::parse(&c.to_string()).unwrap(), c);
    }

    #[test]
    fn source_filter_matches_by_id_or_username() {
        let f = SourceFilter::new(vec![
            ChannelRef::parse("@medach").unwrap(),
            ChannelRef::parse("-100500").unwrap(),
        ]);

        assert!(f.matches(ChatId(-1), Some("MEDACH")));
        assert!(f.matches(ChatId(-100500), None));
        assert!(!f.matches(ChatId(-1), Some("other_chan")));
        assert!(!f.matches(ChatId(-1), None));
    }

    #[test]
    fn file_name_hint_defaults_by_kind() {
        let mut m = MediaDescriptor {
            kind: MediaType::Photo,
            file_id: "f".to_string(),
            unique_id: "u".to_string(),
            size: 10,
            file_name: None,
        };
        assert_eq!(m.file_name_hint(), "photo.jpg");

        m.file_name = Some("scan.PNG".to_string());
        assert_eq!(m.file_name_hint(), "scan.PNG");
    }
}
