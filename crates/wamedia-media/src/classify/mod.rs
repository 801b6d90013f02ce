//! Content-type classifier.
//!
//! Maps whatever ended up in a message's `content` field (a data-URI, a
//! storage URL, a CDN URL, a placeholder token, raw base64, or plain text)
//! to a [`MediaKind`]. Rules are tried in a fixed order and the first match
//! wins:
//!
//! 1. data-URI prefix
//! 2. known storage host path (`/videos/`, `/audios/`, ...) or extension
//! 3. WhatsApp CDN host → image
//! 4. any `http` URL → extension table, default document
//! 5. placeholder tokens (`[Imagem]`, emoji markers)
//! 6. long string without whitespace → image (raw base64)
//! 7. text

mod tables;


use tables::{kind_for_extension, PATH_SEGMENTS, PLACEHOLDERS};
use url::Url;
use wamedia_core::media::MediaKind;

/// Hosts whose object paths carry the media kind.
pub const DEFAULT_STORAGE_HOSTS: &[&str] =
    &["firebasestorage.googleapis.com", "storage.googleapis.com"];

/// Minimum length for the raw-base64 heuristic.
const RAW_BASE64_MIN_LEN: usize = 100;

/// Classify with the default storage hosts.
pub fn classify(content: &str) -> MediaKind {
    Classifier::default().classify(content)
}

/// Classifier with a configurable set of known storage hosts.
#[derive(Debug, Clone)]
pub struct Classifier {
    storage_hosts: Vec<String>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            storage_hosts: DEFAULT_STORAGE_HOSTS.iter().map(|h| h.to_string()).collect(),
        }
    }
}

impl Classifier {
    /// Defaults plus extra hosts (e.g. the MinIO public host).
    pub fn with_hosts<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut classifier = Self::default();
        for host in extra {
            let host = host.as_ref().trim().to_ascii_lowercase();
            if !host.is_empty() && !classifier.storage_hosts.contains(&host) {
                classifier.storage_hosts.push(host);
            }
        }
        classifier
    }

    pub fn storage_hosts(&self) -> &[String] {
        &self.storage_hosts
    }

    pub fn classify(&self, content: &str) -> MediaKind {
        let content = content.trim();
        if content.is_empty() {
            return MediaKind::Text;
        }

        if let Some(kind) = classify_data_uri(content) {
            return kind;
        }

        if let Some(host) = http_host(content) {
            if self.is_storage_host(&host) {
                if let Some(kind) = classify_storage_path(content) {
                    return kind;
                }
            }
            if is_whatsapp_cdn(&host) {
                return MediaKind::Image;
            }
        }

        if content.starts_with("http") {
            return trailing_extension(content)
                .and_then(|ext| kind_for_extension(&ext))
                .unwrap_or(MediaKind::Document);
        }

        if let Some(kind) = classify_placeholder(content) {
            return kind;
        }

        if content.len() >= RAW_BASE64_MIN_LEN && !content.chars().any(char::is_whitespace) {
            return MediaKind::Image;
        }

        MediaKind::Text
    }

    fn is_storage_host(&self, host: &str) -> bool {
        self.storage_hosts.iter().any(|h| h == host)
    }
}

fn classify_data_uri(content: &str) -> Option<MediaKind> {
    let head: String = content.chars().take(32).collect::<String>().to_ascii_lowercase();
    if !head.starts_with("data:") {
        return None;
    }
    let kind = if head.starts_with("data:image/webp") {
        MediaKind::Sticker
    } else if head.starts_with("data:image/") {
        MediaKind::Image
    } else if head.starts_with("data:video/") {
        MediaKind::Video
    } else if head.starts_with("data:audio/") {
        MediaKind::Audio
    } else {
        // application/*, text/*, or no MIME at all: an inline file.
        MediaKind::Document
    };
    Some(kind)
}

fn classify_storage_path(content: &str) -> Option<MediaKind> {
    let path = decode_slashes(strip_query(content));
    let lower = path.to_ascii_lowercase();
    PATH_SEGMENTS
        .iter()
        .find(|(segment, _)| lower.contains(segment))
        .map(|(_, kind)| *kind)
        .or_else(|| trailing_extension(content).and_then(|ext| kind_for_extension(&ext)))
}

fn classify_placeholder(content: &str) -> Option<MediaKind> {
    PLACEHOLDERS
        .iter()
        .find(|(token, _)| content.starts_with(token))
        .map(|(_, kind)| *kind)
}

fn http_host(content: &str) -> Option<String> {
    let url = Url::parse(content).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.host_str().map(|h| h.to_ascii_lowercase())
}

/// `mmg.whatsapp.net`, `media-gru1-1.cdn.whatsapp.net`, ...
pub(crate) fn is_whatsapp_cdn(host: &str) -> bool {
    host == "whatsapp.net" || host.ends_with(".whatsapp.net")
}

fn strip_query(s: &str) -> &str {
    let s = s.split('#').next().unwrap_or(s);
    s.split('?').next().unwrap_or(s)
}

/// Firebase object names encode `/` as `%2F` (or `%252F` when mangled).
fn decode_slashes(s: &str) -> String {
    s.replace("%252F", "/")
        .replace("%252f", "/")
        .replace("%2F", "/")
        .replace("%2f", "/")
}

/// Lowercased extension of the last path segment, ignoring query and
/// fragment. `None` when the segment has no plausible extension.
pub(crate) fn trailing_extension(s: &str) -> Option<String> {
    let path = decode_slashes(strip_query(s));
    let last = path.rsplit('/').next()?;
    let (_, ext) = last.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
