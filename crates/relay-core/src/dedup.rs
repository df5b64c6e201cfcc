use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::domain::RelayMessage;

pub const DEFAULT_CAPACITY: usize = 10_000;

/// Digest identifying a post for deduplication.
///
/// Built from chat id, message id, timestamp, text and media descriptor, so a
/// redelivered update maps to the same fingerprint.
pub fn fingerprint(msg: &RelayMessage) -> String {
    let mut data = format!(
        "{}_{}_{}",
        msg.chat_id.0,
        msg.message_id.0,
        msg.date.to_rfc3339()
    );
    if let Some(text) = &msg.text {
        data.push_str(text);
    }
    if let Some(media) = &msg.media {
        data.push_str(&media.describe());
    }

    let digest = Sha256::digest(data.as_bytes());
    to_hex(&digest)
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Bounded set of already relayed fingerprints.
///
/// Once the set grows past `threshold` it is cleared wholesale; the relay only
/// promises at-most-once forwarding within that horizon.
#[derive(Clone, Debug)]
pub struct DedupSet {
    seen: HashSet<String>,
    threshold: usize,
}

impl DedupSet {
    pub fn new(threshold: usize) -> Self {
        Self {
            seen: HashSet::new(),
            threshold,
        }
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.seen.contains(fingerprint)
    }

    /// Record a fingerprint. Returns `true` when this insert cleared the set.
    pub fn insert(&mut self, fingerprint: String) -> bool {
        self.seen.insert(fingerprint);
        if self.seen.len() > self.threshold {
            self.seen.clear();
            return true;
        }
        false
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for DedupSet {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatId, MediaDescriptor, MediaType, MessageId};
    use chrono::{TimeZone, Utc};

    fn msg(id: i32, text: &str) -> RelayMessage {
        RelayMessage {
            chat_id: ChatId(-1001),
            chat_title: None,
            chat_username: None,
            message_id: MessageId(id),
            date: Utc.with_ymd_and_hms(2025, 9, 1, 12, 0, 0).unwrap(),
            text: Some(text.to_string()),
            media: None,
            service: false,
        }
    }

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        let a = fingerprint(&msg(1, "hello"));
        assert_eq!(a, fingerprint(&msg(1, "hello")));
        assert_eq!(a.len(), 64);

        assert_ne!(a, fingerprint(&msg(2, "hello")));
        assert_ne!(a, fingerprint(&msg(1, "hello!")));

        let mut with_media = msg(1, "hello");
        with_media.media = Some(MediaDescriptor {
            kind: MediaType::Photo,
            file_id: "file".to_string(),
            unique_id: "uniq".to_string(),
            size: 1234,
            file_name: None,
        });
        assert_ne!(a, fingerprint(&with_media));
    }

    #[test]
    fn fingerprint_ignores_chat_title() {
        let a = msg(7, "x");
        let mut b = a.clone();
        b.chat_title = Some("renamed".to_string());
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn set_clears_past_threshold() {
        let mut set = DedupSet::new(3);
        assert!(!set.insert("a".to_string()));
        assert!(!set.insert("b".to_string()));
        assert!(!set.insert("b".to_string()));
        assert!(!set.insert("c".to_string()));
        assert_eq!(set.len(), 3);
        assert!(set.contains("a"));

        assert!(set.insert("d".to_string()));
        assert!(set.is_empty());
        assert!(!set.contains("a"));
    }
}
