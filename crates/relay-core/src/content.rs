//! Message content extraction.

use crate::domain::{MediaType, RelayMessage};

/// What the relay will forward for a post.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Content {
    pub text: Option<String>,
    pub has_photo: bool,
    pub media_type: Option<MediaType>,
}

pub fn extract_content(msg: &RelayMessage) -> Content {
    let text = msg.text.clone().filter(|t| !t.is_empty());
    let media_type = msg.media.as_ref().map(|m| m.kind);

    Content {
        text,
        has_photo: media_type == Some(MediaType::Photo),
        media_type,
    }
}

/// Service events and posts with neither text nor a photo are not relayed.
pub fn should_process(msg: &RelayMessage) -> bool {
    if msg.service {
        return false;
    }
    let content = extract_content(msg);
    content.text.is_some() || content.has_photo
}

/// Fit `text` into a media caption of at most `max_len` characters.
pub fn create_caption(text: &str, max_len: usize) -> String {
    if text.is_empty() {
        return String::new();
    }
    if text.chars().count() <= max_len {
        return text.to_string();
    }

    let mut out = text
        .chars()
        .take(max_len.saturating_sub(3))
        .collect::<String>();
    out.push_str("...");
    out
}
