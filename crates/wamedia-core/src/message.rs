use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::media::{MediaKind, MediaSource};

/// Outcome of re-hosting the media part of a message.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaStatus {
    /// Text message, nothing to store.
    #[default]
    None,
    /// Full media re-hosted.
    Stored,
    /// Only the inline JPEG preview could be re-hosted.
    Thumbnail,
    /// Nothing usable; the record holds a placeholder.
    Failed,
}

impl MediaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Stored => "stored",
            Self::Thumbnail => "thumbnail",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for MediaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "stored" => Ok(Self::Stored),
            "thumbnail" => Ok(Self::Thumbnail),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown media status '{other}'")),
        }
    }
}

/// One row of the `messages` collection as the UI reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: Uuid,
    /// Evolution instance name.
    pub instance: String,
    /// Chat JID (`5511999887766@s.whatsapp.net`, `...@g.us`).
    pub remote_jid: String,
    /// WhatsApp message id; unique per instance.
    pub message_id: String,
    pub from_me: bool,
    pub push_name: Option<String>,
    pub kind: MediaKind,
    /// Text body, re-hosted media URL, or a placeholder.
    pub content: String,
    pub caption: Option<String>,
    pub mimetype: Option<String>,
    pub media_source: Option<MediaSource>,
    pub media_status: MediaStatus,
    pub storage_key: Option<String>,
    /// Hex SHA-256 of the stored bytes.
    pub sha256: Option<String>,
    pub size: Option<u64>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl MessageRecord {
    /// Start a record for a message with only its identity filled in.
    pub fn new(instance: &str, remote_jid: &str, message_id: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            instance: instance.to_string(),
            remote_jid: remote_jid.to_string(),
            message_id: message_id.to_string(),
            from_me: false,
            push_name: None,
            kind: MediaKind::Text,
            content: String::new(),
            caption: None,
            mimetype: None,
            media_source: None,
            media_status: MediaStatus::None,
            storage_key: None,
            sha256: None,
            size: None,
            error: None,
            timestamp,
        }
    }

    /// Whether the chat is a group (`@g.us`).
    pub fn is_group(&self) -> bool {
        self.remote_jid.ends_with("@g.us")
    }
}
