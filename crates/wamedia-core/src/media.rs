//! Closed set of media kinds and where each one comes from.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a message carries, as far as the UI is concerned.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
}

impl MediaKind {
    pub const ALL: [MediaKind; 6] = [
        MediaKind::Text,
        MediaKind::Image,
        MediaKind::Video,
        MediaKind::Audio,
        MediaKind::Document,
        MediaKind::Sticker,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Sticker => "sticker",
        }
    }

    /// Object storage prefix for this kind. Text is never stored.
    pub fn storage_prefix(&self) -> Option<&'static str> {
        match self {
            Self::Text => None,
            Self::Image => Some("images"),
            Self::Video => Some("videos"),
            Self::Audio => Some("audios"),
            Self::Document => Some("documents"),
            Self::Sticker => Some("stickers"),
        }
    }

    /// Placeholder shown in place of media that could not be re-hosted.
    pub fn placeholder(&self) -> &'static str {
        match self {
            Self::Text => "",
            Self::Image => "[Imagem]",
            Self::Video => "[Vídeo]",
            Self::Audio => "[Áudio]",
            Self::Document => "[Documento]",
            Self::Sticker => "[Sticker]",
        }
    }

    /// Whether the bytes of this kind are expected to carry an image signature.
    pub fn is_image_like(&self) -> bool {
        matches!(self, Self::Image | Self::Sticker)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MediaKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown media kind '{s}'"))
    }
}

/// Which field of the webhook payload the bytes were taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaSource {
    /// Inline `base64` already decrypted by Evolution.
    InlineBase64,
    /// Plain `url` that is not WhatsApp ciphertext.
    DirectUrl,
    /// `jpegThumbnail` / `thumbnail` preview, always JPEG.
    Thumbnail,
    /// WhatsApp `.enc` URL. Ciphertext without the media key.
    EncryptedUrl,
    /// Decrypted by Evolution's `getBase64FromMediaMessage`.
    EvolutionDecrypted,
}

impl MediaSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InlineBase64 => "inline_base64",
            Self::DirectUrl => "direct_url",
            Self::Thumbnail => "thumbnail",
            Self::EncryptedUrl => "encrypted_url",
            Self::EvolutionDecrypted => "evolution_decrypted",
        }
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inline_base64" => Ok(Self::InlineBase64),
            "direct_url" => Ok(Self::DirectUrl),
            "thumbnail" => Ok(Self::Thumbnail),
            "encrypted_url" => Ok(Self::EncryptedUrl),
            "evolution_decrypted" => Ok(Self::EvolutionDecrypted),
            other => Err(format!("unknown media source '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in MediaKind::ALL {
            assert_eq!(kind.as_str().parse::<MediaKind>().unwrap(), kind);
        }
        assert_eq!("IMAGE".parse::<MediaKind>().unwrap(), MediaKind::Image);
        assert!("gif".parse::<MediaKind>().is_err());
    }

    #[test]
    fn test_text_has_no_prefix() {
        assert_eq!(MediaKind::Text.storage_prefix(), None);
        assert_eq!(MediaKind::Audio.storage_prefix(), Some("audios"));
    }

    #[test]
    fn test_kind_serde_is_lowercase() {
        let json = serde_json::to_string(&MediaKind::Sticker).unwrap();
        assert_eq!(json, "\"sticker\"");
    }

    #[test]
    fn test_source_from_str() {
        assert_eq!(
            "encrypted_url".parse::<MediaSource>().unwrap(),
            MediaSource::EncryptedUrl
        );
        assert!("bogus".parse::<MediaSource>().is_err());
    }
}
