//! Media reference extraction: pick the one source of bytes to trust.
//!
//! Priority, first usable wins:
//!
//! 1. inline `base64` (already decrypted by Evolution)
//! 2. a `url` that is not WhatsApp ciphertext
//! 3. the inline JPEG thumbnail
//! 4. the `.enc` URL itself, flagged as likely undecodable
//!
//! `.enc` URLs serve AES-CBC ciphertext keyed by the message's `mediaKey`.
//! Downloading one yields bytes that no signature check will accept.


use serde::Serialize;
use tracing::debug;
use url::Url;
use wamedia_core::media::{MediaKind, MediaSource};

use crate::classify::is_whatsapp_cdn;
use crate::data_uri::DataUri;
use crate::mime::{default_mime, mime_essence};
use crate::payload::{MediaMessage, MessageContent};

/// Thumbnails embedded by WhatsApp are always JPEG.
const THUMBNAIL_MIME: &str = "image/jpeg";

/// The chosen source for a message's media bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaReference {
    pub kind: MediaKind,
    pub source: MediaSource,
    /// A data-URI for inline sources, otherwise an absolute URL.
    pub location: String,
    /// Declared MIME essence (or the per-kind default).
    pub mimetype: String,
    pub file_name: Option<String>,
    pub caption: Option<String>,
    /// Base64 `mediaKey`, kept for diagnostics; nothing decrypts with it.
    pub media_key: Option<String>,
    /// The original `.enc` URL, when the message had one.
    pub encrypted_url: Option<String>,
    /// Set for raw `.enc` URLs: downloading will return ciphertext.
    pub likely_undecodable: bool,
}

impl MediaReference {
    pub fn is_inline(&self) -> bool {
        self.location.starts_with("data:")
    }
}

/// WhatsApp ciphertext URL: path ends in `.enc`, or a WhatsApp CDN URL with
/// `mms3=true`.
pub fn is_encrypted_url(url: &str) -> bool {
    let url = url.trim();
    let Ok(parsed) = Url::parse(url) else {
        let path = url.split(['?', '#']).next().unwrap_or("");
        return path.to_ascii_lowercase().ends_with(".enc");
    };
    if parsed.path().to_ascii_lowercase().ends_with(".enc") {
        return true;
    }
    let on_cdn = parsed
        .host_str()
        .map(|h| is_whatsapp_cdn(&h.to_ascii_lowercase()))
        .unwrap_or(false);
    on_cdn && parsed.query_pairs().any(|(k, v)| k == "mms3" && v == "true")
}

/// Choose a source for the first media sub-message of `content`.
pub fn extract_from_message(content: &MessageContent) -> Option<MediaReference> {
    let (kind, media) = content.media()?;
    extract_reference(
        kind,
        media,
        content.message_base64(),
        content.message_media_url(),
    )
}

/// Choose a source for one media sub-message.
///
/// `message_base64` and `message_media_url` are the message-level fields
/// Evolution adds next to the sub-message. Returns `None` when the payload
/// carries nothing usable.
pub fn extract_reference(
    kind: MediaKind,
    media: &MediaMessage,
    message_base64: Option<&str>,
    message_media_url: Option<&str>,
) -> Option<MediaReference> {
    let mimetype = media
        .mimetype
        .as_deref()
        .map(mime_essence)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| default_mime(kind).to_string());

    let url = media.url.as_deref().and_then(usable_url);
    let encrypted_url = url.filter(|u| is_encrypted_url(u)).map(str::to_string);

    let reference = |source: MediaSource, location: String, mimetype: String| MediaReference {
        kind,
        source,
        location,
        mimetype,
        file_name: media.file_name.clone().filter(|f| !f.is_empty()),
        caption: media.caption.clone().filter(|c| !c.is_empty()),
        media_key: media.media_key_base64(),
        encrypted_url: encrypted_url.clone(),
        likely_undecodable: source == MediaSource::EncryptedUrl,
    };

    let inline = media
        .base64
        .as_deref()
        .filter(|b| !b.trim().is_empty())
        .or(message_base64);
    if let Some(b64) = inline {
        let location = match DataUri::parse(b64) {
            Some(_) => b64.trim().to_string(),
            None => DataUri::from_base64(&mimetype, b64),
        };
        return Some(reference(MediaSource::InlineBase64, location, mimetype));
    }

    let direct = url
        .filter(|u| !is_encrypted_url(u))
        .or_else(|| {
            message_media_url
                .and_then(usable_url)
                .filter(|u| !is_encrypted_url(u))
        });
    if let Some(u) = direct {
        return Some(reference(MediaSource::DirectUrl, u.to_string(), mimetype));
    }

    if let Some(thumb) = media.thumbnail_base64() {
        let location = DataUri::from_base64(THUMBNAIL_MIME, &thumb);
        return Some(reference(
            MediaSource::Thumbnail,
            location,
            THUMBNAIL_MIME.to_string(),
        ));
    }

    if let Some(enc) = encrypted_url.clone() {
        debug!("only an encrypted url is available for {kind} media");
        return Some(reference(MediaSource::EncryptedUrl, enc, mimetype));
    }

    None
}

fn usable_url(url: &str) -> Option<&str> {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        Some(url)
    } else {
        None
    }
}
