//! Byte-signature sniffing.
//!
//! The declared `mimetype` of WhatsApp media is frequently wrong, and URLs
//! that point at ciphertext or at an error page still return `200 OK`. The
//! leading bytes are the only thing that can be trusted.

use serde::Serialize;
use wamedia_core::media::MediaKind;

/// Image formats recognized by [`detect_image_format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    Bmp,
}

impl ImageFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
            Self::Bmp => "image/bmp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Bmp => "bmp",
        }
    }
}

/// Non-image container recognized by [`sniff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MediaFormat {
    pub mime: &'static str,
    pub extension: &'static str,
    pub kind: MediaKind,
}

const OGG: MediaFormat = MediaFormat {
    mime: "audio/ogg",
    extension: "ogg",
    kind: MediaKind::Audio,
};
const MP3: MediaFormat = MediaFormat {
    mime: "audio/mpeg",
    extension: "mp3",
    kind: MediaKind::Audio,
};
const WAV: MediaFormat = MediaFormat {
    mime: "audio/wav",
    extension: "wav",
    kind: MediaKind::Audio,
};
const M4A: MediaFormat = MediaFormat {
    mime: "audio/mp4",
    extension: "m4a",
    kind: MediaKind::Audio,
};
const MP4: MediaFormat = MediaFormat {
    mime: "video/mp4",
    extension: "mp4",
    kind: MediaKind::Video,
};
const MOV: MediaFormat = MediaFormat {
    mime: "video/quicktime",
    extension: "mov",
    kind: MediaKind::Video,
};
const THREE_GP: MediaFormat = MediaFormat {
    mime: "video/3gpp",
    extension: "3gp",
    kind: MediaKind::Video,
};
const WEBM: MediaFormat = MediaFormat {
    mime: "video/webm",
    extension: "webm",
    kind: MediaKind::Video,
};
const PDF: MediaFormat = MediaFormat {
    mime: "application/pdf",
    extension: "pdf",
    kind: MediaKind::Document,
};
const ZIP: MediaFormat = MediaFormat {
    mime: "application/zip",
    extension: "zip",
    kind: MediaKind::Document,
};

/// What a buffer turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Sniffed {
    Image { format: ImageFormat },
    Media { format: MediaFormat },
    /// HTML, XML or a JSON error body: the upstream URL served an error page.
    ErrorPage,
    Empty,
    Unknown,
}

impl Sniffed {
    pub fn mime(&self) -> Option<&'static str> {
        match self {
            Self::Image { format } => Some(format.mime()),
            Self::Media { format } => Some(format.mime),
            _ => None,
        }
    }

    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Self::Image { format } => Some(format.extension()),
            Self::Media { format } => Some(format.extension),
            _ => None,
        }
    }

    pub fn is_recognized(&self) -> bool {
        matches!(self, Self::Image { .. } | Self::Media { .. })
    }
}

/// Detect an image format from its magic number.
///
/// Checks JPEG, PNG, GIF, WEBP and BMP in that order. HTML/XML error pages,
/// ciphertext and everything else yield `None`.
pub fn detect_image_format(buf: &[u8]) -> Option<ImageFormat> {
    if buf.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(ImageFormat::Jpeg)
    } else if buf.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        Some(ImageFormat::Png)
    } else if buf.starts_with(b"GIF") {
        Some(ImageFormat::Gif)
    } else if buf.len() >= 12 && buf.starts_with(b"RIFF") && &buf[8..12] == b"WEBP" {
        Some(ImageFormat::Webp)
    } else if buf.starts_with(b"BM") {
        Some(ImageFormat::Bmp)
    } else {
        None
    }
}

/// Full sniff: images first, then audio/video/document containers, then the
/// error-page check.
pub fn sniff(buf: &[u8]) -> Sniffed {
    if buf.is_empty() {
        return Sniffed::Empty;
    }
    if let Some(format) = detect_image_format(buf) {
        return Sniffed::Image { format };
    }
    if let Some(format) = detect_media_format(buf) {
        return Sniffed::Media { format };
    }
    if looks_like_error_page(buf) {
        return Sniffed::ErrorPage;
    }
    Sniffed::Unknown
}

fn detect_media_format(buf: &[u8]) -> Option<MediaFormat> {
    if buf.starts_with(b"OggS") {
        return Some(OGG);
    }
    if buf.starts_with(b"ID3") {
        return Some(MP3);
    }
    if buf.len() >= 12 && buf.starts_with(b"RIFF") && &buf[8..12] == b"WAVE" {
        return Some(WAV);
    }
    if buf.len() >= 12 && &buf[4..8] == b"ftyp" {
        let brand = &buf[8..12];
        return Some(match brand {
            b"M4A " | b"M4B " => M4A,
            b"qt  " => MOV,
            _ if brand.starts_with(b"3g") => THREE_GP,
            _ => MP4,
        });
    }
    if buf.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some(WEBM);
    }
    if buf.starts_with(b"%PDF-") {
        return Some(PDF);
    }
    if buf.starts_with(b"PK\x03\x04") {
        return Some(ZIP);
    }
    if is_mpeg_frame_header(buf) {
        return Some(MP3);
    }
    None
}

/// Bare MPEG audio frame header (no ID3 tag). Reserved version, layer,
/// bitrate and sample-rate values are rejected so random bytes rarely pass.
fn is_mpeg_frame_header(buf: &[u8]) -> bool {
    let &[0xFF, b1, b2, ..] = buf else {
        return false;
    };
    let sync = b1 & 0xE0 == 0xE0;
    let version = (b1 >> 3) & 0x03;
    let layer = (b1 >> 1) & 0x03;
    let bitrate = b2 >> 4;
    let sample_rate = (b2 >> 2) & 0x03;
    sync && version != 0b01 && layer != 0b00 && bitrate != 0x0F && bitrate != 0 && sample_rate != 0b11
}

/// HTML/XML markup or a JSON `{"error": ...}` body, after skipping a UTF-8
/// BOM and leading whitespace.
pub fn looks_like_error_page(buf: &[u8]) -> bool {
    let buf = buf.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(buf);
    let start = buf
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(buf.len());
    let head: Vec<u8> = buf[start..]
        .iter()
        .take(64)
        .map(|b| b.to_ascii_lowercase())
        .collect();

    const MARKUP: &[&[u8]] = &[b"<!doctype", b"<html", b"<?xml", b"<error", b"<head", b"<body"];
    if MARKUP.iter().any(|m| head.starts_with(m)) {
        return true;
    }
    head.starts_with(b"{") && head.windows(7).any(|w| w == b"\"error\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(prefix: &[u8]) -> Vec<u8> {
        let mut v = prefix.to_vec();
        v.resize(32, 0);
        v
    }

    #[test]
    fn test_detects_each_image_format() {
        let mut webp = b"RIFF\x24\x00\x00\x00WEBPVP8 ".to_vec();
        webp.resize(32, 0);
        let cases = [
            (padded(&[0xFF, 0xD8, 0xFF, 0xE0]), ImageFormat::Jpeg, "jpg"),
            (padded(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A]), ImageFormat::Png, "png"),
            (padded(b"GIF89a"), ImageFormat::Gif, "gif"),
            (webp, ImageFormat::Webp, "webp"),
            (padded(b"BM\x36\x00"), ImageFormat::Bmp, "bmp"),
        ];
        for (buf, expected, ext) in cases {
            let got = detect_image_format(&buf).unwrap();
            assert_eq!(got, expected);
            assert_eq!(got.extension(), ext);
        }
    }

    #[test]
    fn test_none_on_text_and_html() {
        assert_eq!(detect_image_format(b"hello world"), None);
        assert_eq!(
            detect_image_format(b"<!DOCTYPE html><html><body>Not Found</body></html>"),
            None
        );
        assert_eq!(detect_image_format(b"<?xml version=\"1.0\"?><Error/>"), None);
        assert_eq!(detect_image_format(&[]), None);
    }

    #[test]
    fn test_riff_without_webp_marker_is_not_webp() {
        let mut wav = b"RIFF\x24\x00\x00\x00WAVEfmt ".to_vec();
        wav.resize(32, 0);
        assert_eq!(detect_image_format(&wav), None);
        assert_eq!(sniff(&wav).extension(), Some("wav"));
    }

    #[test]
    fn test_sniff_flags_error_pages() {
        assert_eq!(sniff(b"\xEF\xBB\xBF  \n<HTML><head>"), Sniffed::ErrorPage);
        assert_eq!(
            sniff(b"<?xml version='1.0'?><Error><Code>AccessDenied</Code></Error>"),
            Sniffed::ErrorPage
        );
        assert_eq!(
            sniff(br#"{"error": {"code": 404, "message": "Not Found."}}"#),
            Sniffed::ErrorPage
        );
        assert_eq!(sniff(br#"{"ok": true}"#), Sniffed::Unknown);
    }

    #[test]
    fn test_sniff_media_containers() {
        assert_eq!(sniff(&padded(b"OggS\x00\x02")).mime(), Some("audio/ogg"));
        assert_eq!(sniff(&padded(b"ID3\x04")).mime(), Some("audio/mpeg"));
        assert_eq!(
            sniff(&padded(b"\x00\x00\x00\x18ftypmp42")).mime(),
            Some("video/mp4")
        );
        assert_eq!(
            sniff(&padded(b"\x00\x00\x00\x1cftypM4A ")).extension(),
            Some("m4a")
        );
        assert_eq!(
            sniff(&padded(b"\x00\x00\x00\x14ftyp3gp4")).extension(),
            Some("3gp")
        );
        assert_eq!(sniff(&padded(b"%PDF-1.7")).extension(), Some("pdf"));
        assert_eq!(
            sniff(&padded(&[0x1A, 0x45, 0xDF, 0xA3])).mime(),
            Some("video/webm")
        );
    }

    #[test]
    fn test_bare_mpeg_frame_needs_valid_header() {
        // MPEG-1 layer III, 128 kbit/s, 44.1 kHz.
        assert_eq!(sniff(&padded(&[0xFF, 0xFB, 0x90, 0x64])).mime(), Some("audio/mpeg"));
        // Sync bits alone are not enough.
        assert_eq!(sniff(&padded(&[0xFF, 0xE9, 0x90, 0x00])), Sniffed::Unknown);
        assert_eq!(sniff(&padded(&[0xFF, 0xF9, 0x90, 0x00])), Sniffed::Unknown);
        assert_eq!(sniff(&padded(&[0xFF, 0xFB, 0xF0, 0x00])), Sniffed::Unknown);
        assert_eq!(sniff(&padded(&[0xFF, 0xFB, 0x9C, 0x00])), Sniffed::Unknown);
        assert_eq!(sniff(&[0xFF, 0xFB]), Sniffed::Unknown);
    }

    #[test]
    fn test_sniff_ciphertext_is_unknown() {
        // Typical start of a WhatsApp .enc payload: high-entropy bytes.
        let enc = [0x3C_u8 ^ 0x5A, 0x91, 0x07, 0xE2, 0x4B, 0x18, 0xC3, 0x6D];
        assert_eq!(sniff(&enc), Sniffed::Unknown);
        assert!(!sniff(&enc).is_recognized());
        assert_eq!(sniff(&[]), Sniffed::Empty);
    }
}
