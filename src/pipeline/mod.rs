//! Webhook ingest pipeline.
//!
//! For each `messages.upsert` message: pick a media reference, obtain the
//! bytes, check they are what they claim to be, re-host them, and record the
//! message. Media that cannot be re-hosted is recorded with a placeholder so
//! the conversation still reads correctly.


use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};
use wamedia_core::{
    error::WamediaError,
    media::{MediaKind, MediaSource},
    message::{MediaStatus, MessageRecord},
    traits::{MediaDecrypter, MediaStore},
};
use wamedia_media::{
    data_uri::decode_base64,
    extract_from_message, fix_malformed_url,
    mime::{default_mime, extension_for_mime, mime_essence, mime_for_extension},
    object_key,
    payload::{MessageData, WebhookEnvelope},
    sniff, DataUri, MediaReference, Sniffed,
};
use wamedia_memory::Store;

use crate::fetch::Fetcher;

pub(crate) const ERR_NO_SOURCE: &str = "no usable media reference in payload";
pub(crate) const ERR_EMPTY: &str = "media body is empty";
pub(crate) const ERR_ERROR_PAGE: &str = "upstream returned an error page";
pub(crate) const ERR_NOT_IMAGE: &str = "not a recognizable image (likely encrypted)";
pub(crate) const ERR_ENCRYPTED: &str = "encrypted media could not be decrypted";

/// What happened to one message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutcome {
    pub message_id: String,
    pub kind: MediaKind,
    pub status: MediaStatus,
    pub source: Option<MediaSource>,
    /// Text body, stored URL, or placeholder.
    pub content: String,
    pub error: Option<String>,
}

impl IngestOutcome {
    fn from_record(record: &MessageRecord) -> Self {
        Self {
            message_id: record.message_id.clone(),
            kind: record.kind,
            status: record.media_status,
            source: record.media_source,
            content: record.content.clone(),
            error: record.error.clone(),
        }
    }

    /// Bytes were re-hosted (full media or thumbnail).
    pub fn is_stored(&self) -> bool {
        matches!(self.status, MediaStatus::Stored | MediaStatus::Thumbnail)
    }

    pub fn is_failed(&self) -> bool {
        self.status == MediaStatus::Failed
    }
}

/// Bytes ready for upload, before verification.
struct Obtained {
    bytes: Vec<u8>,
    mimetype: String,
    source: MediaSource,
    file_name: Option<String>,
}

/// Verified bytes with their final type.
struct Verified {
    mimetype: String,
    extension: String,
}

/// Runs webhook envelopes through extraction, download, sniffing, upload and
/// recording.
pub struct Ingestor {
    media: Arc<dyn MediaStore>,
    records: Store,
    fetcher: Arc<dyn Fetcher>,
    decrypter: Option<Arc<dyn MediaDecrypter>>,
}

impl Ingestor {
    pub fn new(
        media: Arc<dyn MediaStore>,
        records: Store,
        fetcher: Arc<dyn Fetcher>,
        decrypter: Option<Arc<dyn MediaDecrypter>>,
    ) -> Self {
        Self {
            media,
            records,
            fetcher,
            decrypter,
        }
    }

    pub fn records(&self) -> &Store {
        &self.records
    }

    pub fn media_store(&self) -> &dyn MediaStore {
        self.media.as_ref()
    }

    /// Process every message in the envelope, one at a time.
    ///
    /// Media failures become `failed` outcomes; only record-store errors and
    /// malformed `data` abort the call.
    pub async fn ingest(
        &self,
        envelope: &WebhookEnvelope,
    ) -> Result<Vec<IngestOutcome>, WamediaError> {
        if !envelope.is_messages_upsert() {
            debug!("ignoring event '{}'", envelope.event);
            return Ok(Vec::new());
        }

        let messages = envelope.messages()?;
        let mut outcomes = Vec::with_capacity(messages.len());
        for message in &messages {
            if message.key.id.is_empty() {
                warn!("skipping message without key.id in instance {}", envelope.instance);
                continue;
            }
            if let Some(outcome) = self.ingest_message(&envelope.instance, message).await? {
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    async fn ingest_message(
        &self,
        instance: &str,
        message: &MessageData,
    ) -> Result<Option<IngestOutcome>, WamediaError> {
        let Some(content) = message.message.as_ref() else {
            debug!("message {} has no content, skipping", message.key.id);
            return Ok(None);
        };

        let timestamp = message.timestamp().unwrap_or_else(Utc::now);
        let mut record =
            MessageRecord::new(instance, &message.key.remote_jid, &message.key.id, timestamp);
        record.from_me = message.key.from_me;
        record.push_name = message.push_name.clone().filter(|n| !n.is_empty());

        if let Some((kind, media)) = content.media() {
            record.kind = kind;
            record.caption = media.caption.clone().filter(|c| !c.is_empty());
            let reference = extract_from_message(content);
            self.ingest_media(&mut record, reference.as_ref()).await;
        } else if let Some(text) = content.text() {
            record.content = text.to_string();
        } else {
            debug!(
                "message {} carries neither text nor media ({:?}), skipping",
                message.key.id, message.message_type
            );
            return Ok(None);
        }

        let id = self.records.upsert_message(&record).await?;
        record.id = id;
        Ok(Some(IngestOutcome::from_record(&record)))
    }

    /// Fill the media fields of `record`, as stored or as a placeholder.
    async fn ingest_media(&self, record: &mut MessageRecord, reference: Option<&MediaReference>) {
        let kind = record.kind;

        let result = async {
            let (obtained, verified) = self
                .acquire(&record.instance, &record.message_id, kind, reference)
                .await?;
            let key = object_key(
                kind,
                &record.instance,
                record.timestamp,
                &record.message_id,
                &verified.extension,
            )
            .ok_or_else(|| WamediaError::Storage(format!("no storage prefix for {kind}")))?;
            let stored = self
                .media
                .put(&key, &obtained.bytes, &verified.mimetype)
                .await?;
            let sha256 = hex::encode(Sha256::digest(&obtained.bytes));
            Ok::<_, WamediaError>((obtained.source, verified, stored, sha256))
        }
        .await;

        match result {
            Ok((source, verified, stored, sha256)) => {
                info!(
                    "stored {kind} {} from {source} at {} ({} bytes)",
                    record.message_id, stored.key, stored.size
                );
                record.content = stored.url;
                record.mimetype = Some(verified.mimetype);
                record.media_source = Some(source);
                record.media_status = if source == MediaSource::Thumbnail {
                    MediaStatus::Thumbnail
                } else {
                    MediaStatus::Stored
                };
                record.storage_key = Some(stored.key);
                record.sha256 = Some(sha256);
                record.size = Some(stored.size);
            }
            Err(e) => {
                let reason = failure_reason(&e);
                warn!(
                    "media for {} in {} not stored: {reason}",
                    record.message_id, record.instance
                );
                record.content = kind.placeholder().to_string();
                record.mimetype = reference.map(|r| r.mimetype.clone());
                record.media_source = reference.map(|r| r.source);
                record.media_status = MediaStatus::Failed;
                record.error = Some(reason);
            }
        }
    }

    /// Get verified bytes for a message. Evolution is asked to decrypt first
    /// when the payload only offers a thumbnail or ciphertext; if that fails
    /// or yields unusable bytes, the local reference is used instead.
    async fn acquire(
        &self,
        instance: &str,
        message_id: &str,
        kind: MediaKind,
        reference: Option<&MediaReference>,
    ) -> Result<(Obtained, Verified), WamediaError> {
        let wants_decryption = matches!(
            reference.map(|r| r.source),
            None | Some(MediaSource::Thumbnail) | Some(MediaSource::EncryptedUrl)
        );

        if wants_decryption {
            if let Some(decrypter) = &self.decrypter {
                let decrypted = self
                    .decrypted(decrypter.as_ref(), instance, message_id, kind, reference)
                    .await
                    .and_then(|obtained| {
                        let verified = verify(kind, &obtained)?;
                        Ok((obtained, verified))
                    });
                match decrypted {
                    Ok(pair) => return Ok(pair),
                    Err(e) => warn!("evolution could not decrypt {message_id}: {e}"),
                }
            }
        }

        let reference = reference.ok_or_else(|| WamediaError::Fetch(ERR_NO_SOURCE.into()))?;
        let obtained = self.obtain(message_id, reference).await?;
        let verified = verify(kind, &obtained)?;
        Ok((obtained, verified))
    }

    async fn decrypted(
        &self,
        decrypter: &dyn MediaDecrypter,
        instance: &str,
        message_id: &str,
        kind: MediaKind,
        reference: Option<&MediaReference>,
    ) -> Result<Obtained, WamediaError> {
        let media = decrypter.decrypt_media(instance, message_id).await?;
        let bytes = decode_base64(&media.base64)?;
        let mimetype = media
            .mimetype
            .as_deref()
            .map(mime_essence)
            .filter(|m| !m.is_empty())
            .or_else(|| reference.map(|r| r.mimetype.clone()))
            .unwrap_or_else(|| default_mime(kind).to_string());
        debug!("evolution decrypted {message_id}: {} bytes", bytes.len());
        Ok(Obtained {
            bytes,
            mimetype,
            source: MediaSource::EvolutionDecrypted,
            file_name: media
                .file_name
                .or_else(|| reference.and_then(|r| r.file_name.clone())),
        })
    }

    /// Raw bytes for a reference found in the payload itself.
    async fn obtain(
        &self,
        message_id: &str,
        reference: &MediaReference,
    ) -> Result<Obtained, WamediaError> {
        let bytes = if reference.is_inline() {
            DataUri::parse(&reference.location)
                .ok_or_else(|| WamediaError::Payload("malformed inline data-URI".into()))?
                .decode_payload()?
        } else {
            let url = fix_malformed_url(&reference.location);
            if url != reference.location {
                debug!("repaired url for {message_id}: {url}");
            }
            self.fetcher.fetch(&url).await?.bytes
        };

        Ok(Obtained {
            bytes,
            mimetype: reference.mimetype.clone(),
            source: reference.source,
            file_name: reference.file_name.clone(),
        })
    }
}

/// Check the bytes against their signature. A detected format wins over the
/// declared MIME type.
fn verify(kind: MediaKind, obtained: &Obtained) -> Result<Verified, WamediaError> {
    let declared = mime_essence(&obtained.mimetype);
    let sniffed = match sniff(&obtained.bytes) {
        // Markup and OOXML documents are legitimate attachments.
        Sniffed::ErrorPage if kind == MediaKind::Document && is_markup_mime(&declared) => {
            Sniffed::Unknown
        }
        Sniffed::Media { format } if format.mime == "application/zip" && is_zip_container(&declared) => {
            Sniffed::Unknown
        }
        other => other,
    };
    match sniffed {
        Sniffed::Empty => Err(WamediaError::Fetch(ERR_EMPTY.into())),
        Sniffed::ErrorPage => Err(WamediaError::Fetch(ERR_ERROR_PAGE.into())),
        Sniffed::Media { .. } if kind.is_image_like() => {
            Err(WamediaError::Fetch(ERR_NOT_IMAGE.into()))
        }
        // Ciphertext can look like a container of the wrong kind.
        Sniffed::Media { format }
            if obtained.source == MediaSource::EncryptedUrl && format.kind != kind =>
        {
            Err(WamediaError::Fetch(ERR_ENCRYPTED.into()))
        }
        sniffed @ (Sniffed::Image { .. } | Sniffed::Media { .. }) => {
            let (mime, ext) = match (sniffed.mime(), sniffed.extension()) {
                (Some(m), Some(e)) => (m, e),
                _ => return Err(WamediaError::Fetch(ERR_NOT_IMAGE.into())),
            };
            if mime != declared {
                info!("detected {mime} overrides declared {declared}");
            }
            Ok(Verified {
                mimetype: mime.to_string(),
                extension: ext.to_string(),
            })
        }
        Sniffed::Unknown if kind.is_image_like() => {
            Err(WamediaError::Fetch(ERR_NOT_IMAGE.into()))
        }
        Sniffed::Unknown if obtained.source == MediaSource::EncryptedUrl => {
            Err(WamediaError::Fetch(ERR_ENCRYPTED.into()))
        }
        Sniffed::Unknown => {
            // Unrecognized containers (docx, csv, ...) keep the declared type.
            let extension = extension_for_mime(&declared)
                .filter(|e| *e != "bin")
                .map(str::to_string)
                .or_else(|| obtained.file_name.as_deref().and_then(file_extension))
                .unwrap_or_else(|| "bin".to_string());
            let mimetype = if declared.is_empty() || declared == "application/octet-stream" {
                mime_for_extension(&extension)
                    .unwrap_or(default_mime(kind))
                    .to_string()
            } else {
                declared
            };
            Ok(Verified {
                mimetype,
                extension,
            })
        }
    }
}

fn is_markup_mime(mime: &str) -> bool {
    matches!(
        mime,
        "text/html" | "application/xhtml+xml" | "text/xml" | "application/xml" | "application/json"
    )
}

/// Formats that are ZIP archives on disk but should keep their own type.
fn is_zip_container(mime: &str) -> bool {
    matches!(extension_for_mime(mime), Some("docx" | "xlsx" | "pptx"))
}

/// Extension of a file name, if it has a short alphanumeric one.
fn file_extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    let ok = !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    ok.then(|| ext.to_ascii_lowercase())
}

/// Error text stored on the record: the bare reason for fetch failures, the
/// full error otherwise.
fn failure_reason(e: &WamediaError) -> String {
    match e {
        WamediaError::Fetch(msg) => msg.clone(),
        other => other.to_string(),
    }
}

/// Counts reported back to the webhook caller.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub processed: usize,
    pub stored: usize,
    pub failed: usize,
}

impl IngestSummary {
    pub fn from_outcomes(outcomes: &[IngestOutcome]) -> Self {
        Self {
            processed: outcomes.len(),
            stored: outcomes.iter().filter(|o| o.is_stored()).count(),
            failed: outcomes.iter().filter(|o| o.is_failed()).count(),
        }
    }
}
