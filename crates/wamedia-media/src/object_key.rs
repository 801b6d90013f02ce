//! Object keys for re-hosted media:
//! `{images|audios|videos|documents|stickers}/{instance}/{YYYY}/{MM}/{message_id}.{ext}`.

use chrono::{DateTime, Datelike, Utc};
use wamedia_core::media::MediaKind;

/// Build the storage key for a message's media. `None` for text.
pub fn object_key(
    kind: MediaKind,
    instance: &str,
    timestamp: DateTime<Utc>,
    message_id: &str,
    extension: &str,
) -> Option<String> {
    let prefix = kind.storage_prefix()?;
    let ext: String = extension
        .trim_start_matches('.')
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    let ext = if ext.is_empty() { "bin".to_string() } else { ext };

    Some(format!(
        "{prefix}/{}/{:04}/{:02}/{}.{ext}",
        sanitize_segment(instance),
        timestamp.year(),
        timestamp.month(),
        sanitize_segment(message_id),
    ))
}

/// Keep `[A-Za-z0-9._-]`, replace everything else with `_`, and never
/// produce `.`/`..` or an empty segment.
fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn may_2024() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 14, 3, 22).unwrap()
    }

    #[test]
    fn test_key_layout() {
        let key = object_key(MediaKind::Audio, "vendas", may_2024(), "3EB0C767D26A", "ogg");
        assert_eq!(key.as_deref(), Some("audios/vendas/2024/05/3EB0C767D26A.ogg"));
    }

    #[test]
    fn test_text_has_no_key() {
        assert!(object_key(MediaKind::Text, "vendas", may_2024(), "X", "txt").is_none());
    }

    #[test]
    fn test_segments_are_sanitized() {
        let key = object_key(MediaKind::Image, "../etc", may_2024(), "a/b c", ".JPG").unwrap();
        assert_eq!(key, "images/_etc/2024/05/a_b_c.jpg");

        let key = object_key(MediaKind::Document, "  ", may_2024(), "..", "").unwrap();
        assert_eq!(key, "documents/unknown/2024/05/unknown.bin");
    }
}
