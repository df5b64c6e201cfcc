//! Mapping Telegram updates onto the relay's message model.

use teloxide::types::{FileMeta, MediaKind, Message, MessageKind};

use relay_core::domain::{ChatId, MediaDescriptor, MediaType, MessageId, RelayMessage};

pub fn to_relay_message(msg: &Message) -> RelayMessage {
    RelayMessage {
        chat_id: ChatId(msg.chat.id.0),
        chat_title: msg.chat.title().map(|s| s.to_string()),
        chat_username: msg.chat.username().map(|s| s.to_string()),
        message_id: MessageId(msg.id.0),
        date: msg.date,
        text: msg.text().or_else(|| msg.caption()).map(|s| s.to_string()),
        media: media_descriptor(msg),
        service: !matches!(msg.kind, MessageKind::Common(_)),
    }
}

fn describe(kind: MediaType, file: &FileMeta, file_name: Option<&String>) -> MediaDescriptor {
    MediaDescriptor {
        kind,
        file_id: file.id.clone(),
        unique_id: file.unique_id.clone(),
        size: file.size as u64,
        file_name: file_name.cloned(),
    }
}

fn media_descriptor(msg: &Message) -> Option<MediaDescriptor> {
    let MessageKind::Common(common) = &msg.kind else {
        return None;
    };

    let descriptor = match &common.media_kind {
        MediaKind::Text(_) => return None,
        // Telegram lists sizes smallest first; relay the largest.
        MediaKind::Photo(p) => describe(MediaType::Photo, &p.photo.last()?.file, None),
        MediaKind::Document(d) => describe(
            MediaType::Document,
            &d.document.file,
            d.document.file_name.as_ref(),
        ),
        MediaKind::Video(v) => describe(
            MediaType::Document,
            &v.video.file,
            v.video.file_name.as_ref(),
        ),
        MediaKind::Animation(a) => describe(
            MediaType::Document,
            &a.animation.file,
            a.animation.file_name.as_ref(),
        ),
        MediaKind::Audio(a) => describe(
            MediaType::Document,
            &a.audio.file,
            a.audio.file_name.as_ref(),
        ),
        MediaKind::Voice(v) => describe(MediaType::Document, &v.voice.file, None),
        MediaKind::VideoNote(v) => describe(MediaType::Document, &v.video_note.file, None),
        MediaKind::Sticker(s) => describe(MediaType::Other, &s.sticker.file, None),
        _ => MediaDescriptor {
            kind: MediaType::Other,
            file_id: String::new(),
            unique_id: String::new(),
            size: 0,
            file_name: None,
        },
    };

    Some(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn channel() -> serde_json::Value {
        json!({
            "id": -1001234567890i64,
            "type": "channel",
            "title": "Med News",
            "username": "mednews"
        })
    }

    fn parse(v: serde_json::Value) -> Message {
        serde_json::from_value(v).expect("valid telegram message json")
    }

    #[test]
    fn maps_text_channel_post() {
        let msg = parse(json!({
            "message_id": 42,
            "date": 1_756_000_000,
            "chat": channel(),
            "text": "Breaking news"
        }));

        let m = to_relay_message(&msg);
        assert_eq!(m.chat_id, ChatId(-1001234567890));
        assert_eq!(m.chat_title.as_deref(), Some("Med News"));
        assert_eq!(m.chat_username.as_deref(), Some("mednews"));
        assert_eq!(m.message_id, MessageId(42));
        assert_eq!(m.date, Utc.timestamp_opt(1_756_000_000, 0).unwrap());
        assert_eq!(m.text.as_deref(), Some("Breaking news"));
        assert!(m.media.is_none());
        assert!(!m.service);
    }

    #[test]
    fn maps_photo_post_to_largest_size() {
        let msg = parse(json!({
            "message_id": 43,
            "date": 1_756_000_100,
            "chat": channel(),
            "caption": "Look at this",
            "photo": [
                { "file_id": "small", "file_unique_id": "s1", "file_size": 1200, "width": 90, "height": 90 },
                { "file_id": "large", "file_unique_id": "l1", "file_size": 64000, "width": 1280, "height": 1280 }
            ]
        }));

        let m = to_relay_message(&msg);
        assert_eq!(m.text.as_deref(), Some("Look at this"));
        let media = m.media.expect("photo media");
        assert_eq!(media.kind, MediaType::Photo);
        assert_eq!(media.file_id, "large");
        assert_eq!(media.unique_id, "l1");
        assert_eq!(media.size, 64000);
        assert_eq!(media.file_name_hint(), "photo.jpg");
    }

    #[test]
    fn maps_document_post() {
        let msg = parse(json!({
            "message_id": 44,
            "date": 1_756_000_200,
            "chat": channel(),
            "document": {
                "file_id": "doc",
                "file_unique_id": "d1",
                "file_size": 2048,
                "file_name": "report.pdf",
                "mime_type": "application/pdf"
            }
        }));

        let m = to_relay_message(&msg);
        let media = m.media.expect("document media");
        assert_eq!(media.kind, MediaType::Document);
        assert_eq!(media.file_name.as_deref(), Some("report.pdf"));
        assert!(m.text.is_none());
    }
}
