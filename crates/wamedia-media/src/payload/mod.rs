//! Evolution API webhook payload types.
//!
//! Only the fields the ingest path reads are modelled; everything else is
//! ignored. All fields are optional because Evolution v1 and v2 disagree on
//! which ones are present.

mod lenient;


pub use lenient::bytes_to_base64;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wamedia_core::error::WamediaError;
use wamedia_core::media::MediaKind;

use lenient::lenient_u64;

/// Wrapper messages are unwrapped at most this many levels deep.
const MAX_WRAPPER_DEPTH: usize = 4;

/// Top-level webhook envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub instance: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, alias = "date_time")]
    pub date_time: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default, alias = "server_url")]
    pub server_url: Option<String>,
    #[serde(default)]
    pub apikey: Option<String>,
}

/// Normalize an event name: `MESSAGES_UPSERT` → `messages.upsert`.
pub fn normalize_event(event: &str) -> String {
    event.trim().to_ascii_lowercase().replace('_', ".")
}

impl WebhookEnvelope {
    pub fn parse(body: &[u8]) -> Result<Self, WamediaError> {
        serde_json::from_slice(body)
            .map_err(|e| WamediaError::Payload(format!("invalid webhook body: {e}")))
    }

    pub fn is_messages_upsert(&self) -> bool {
        normalize_event(&self.event) == "messages.upsert"
    }

    /// Messages carried in `data`, which may be a single object, an array,
    /// or an object with a `messages` array.
    pub fn messages(&self) -> Result<Vec<MessageData>, WamediaError> {
        let items: Vec<&Value> = match &self.data {
            Value::Null => Vec::new(),
            Value::Array(items) => items.iter().collect(),
            Value::Object(map) => match map.get("messages") {
                Some(Value::Array(items)) if !map.contains_key("key") => items.iter().collect(),
                _ => vec![&self.data],
            },
            other => {
                return Err(WamediaError::Payload(format!(
                    "unexpected data type in webhook: {other}"
                )))
            }
        };
        items
            .into_iter()
            .map(|v| {
                MessageData::deserialize(v)
                    .map_err(|e| WamediaError::Payload(format!("invalid message: {e}")))
            })
            .collect()
    }
}

/// One message in a `messages.upsert` event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    #[serde(default)]
    pub key: MessageKey,
    #[serde(default)]
    pub push_name: Option<String>,
    #[serde(default)]
    pub message: Option<MessageContent>,
    #[serde(default)]
    pub message_type: Option<String>,
    /// Seconds since epoch.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub message_timestamp: Option<u64>,
}

impl MessageData {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.message_timestamp?).ok()?;
        Utc.timestamp_opt(secs, 0).single()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    #[serde(default)]
    pub remote_jid: String,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub participant: Option<String>,
}

/// The `message` object: text, one media sub-message, or a wrapper.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContent {
    #[serde(default)]
    pub conversation: Option<String>,
    #[serde(default)]
    pub extended_text_message: Option<ExtendedText>,
    #[serde(default)]
    pub image_message: Option<MediaMessage>,
    #[serde(default)]
    pub video_message: Option<MediaMessage>,
    #[serde(default)]
    pub audio_message: Option<MediaMessage>,
    #[serde(default)]
    pub document_message: Option<MediaMessage>,
    #[serde(default)]
    pub sticker_message: Option<MediaMessage>,
    #[serde(default)]
    pub document_with_caption_message: Option<Box<WrappedMessage>>,
    #[serde(default)]
    pub ephemeral_message: Option<Box<WrappedMessage>>,
    #[serde(default)]
    pub view_once_message: Option<Box<WrappedMessage>>,
    #[serde(default)]
    pub view_once_message_v2: Option<Box<WrappedMessage>>,
    /// Decrypted media, present when the instance has "webhook base64" on.
    #[serde(default)]
    pub base64: Option<String>,
    /// Evolution-hosted copy, present when the instance has S3 enabled.
    #[serde(default)]
    pub media_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedText {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedMessage {
    #[serde(default)]
    pub message: Option<MessageContent>,
}

/// Image/video/audio/document/sticker sub-message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMessage {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub base64: Option<String>,
    #[serde(default)]
    pub jpeg_thumbnail: Option<Value>,
    #[serde(default)]
    pub thumbnail: Option<Value>,
    #[serde(default)]
    pub media_key: Option<Value>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub file_length: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub seconds: Option<u64>,
    #[serde(default)]
    pub ptt: Option<bool>,
    #[serde(default)]
    pub direct_path: Option<String>,
}

impl MessageContent {
    /// Follow ephemeral / view-once / document-with-caption wrappers down to
    /// the message that carries content.
    pub fn unwrap_inner(&self) -> &MessageContent {
        let mut current = self;
        for _ in 0..MAX_WRAPPER_DEPTH {
            let next = [
                &current.ephemeral_message,
                &current.view_once_message,
                &current.view_once_message_v2,
                &current.document_with_caption_message,
            ]
            .into_iter()
            .flatten()
            .find_map(|w| w.message.as_ref());
            match next {
                Some(inner) => current = inner,
                None => break,
            }
        }
        current
    }

    /// Plain text body, if this is a text message.
    pub fn text(&self) -> Option<&str> {
        let inner = self.unwrap_inner();
        inner
            .conversation
            .as_deref()
            .or_else(|| {
                inner
                    .extended_text_message
                    .as_ref()
                    .and_then(|e| e.text.as_deref())
            })
            .filter(|t| !t.is_empty())
    }

    /// First media sub-message, in the order image, video, audio, document,
    /// sticker.
    pub fn media(&self) -> Option<(MediaKind, &MediaMessage)> {
        let inner = self.unwrap_inner();
        [
            (MediaKind::Image, &inner.image_message),
            (MediaKind::Video, &inner.video_message),
            (MediaKind::Audio, &inner.audio_message),
            (MediaKind::Document, &inner.document_message),
            (MediaKind::Sticker, &inner.sticker_message),
        ]
        .into_iter()
        .find_map(|(kind, m)| m.as_ref().map(|m| (kind, m)))
    }

    /// Inline base64 on the outer or unwrapped message.
    pub fn message_base64(&self) -> Option<&str> {
        self.base64
            .as_deref()
            .or_else(|| self.unwrap_inner().base64.as_deref())
            .filter(|b| !b.trim().is_empty())
    }

    /// Evolution-hosted media URL on the outer or unwrapped message.
    pub fn message_media_url(&self) -> Option<&str> {
        self.media_url
            .as_deref()
            .or_else(|| self.unwrap_inner().media_url.as_deref())
            .filter(|u| !u.trim().is_empty())
    }
}

impl MediaMessage {
    /// Thumbnail as base64, from `jpegThumbnail` or `thumbnail`.
    pub fn thumbnail_base64(&self) -> Option<String> {
        self.jpeg_thumbnail
            .as_ref()
            .and_then(bytes_to_base64)
            .or_else(|| self.thumbnail.as_ref().and_then(bytes_to_base64))
    }

    pub fn media_key_base64(&self) -> Option<String> {
        self.media_key.as_ref().and_then(bytes_to_base64)
    }
}
