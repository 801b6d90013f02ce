//! Offline diagnostics behind the `classify`, `repair-url`, `inspect` and
//! `extract` subcommands. Nothing here touches the network or the stores.

use serde_json::{json, Value};
use std::path::Path;
use wamedia_core::error::WamediaError;
use wamedia_media::{
    extract_from_message, fix_malformed_url, needs_repair, payload::WebhookEnvelope, sniff,
    Classifier, MediaReference,
};

/// Longest data-URI shown verbatim in `extract` output.
const MAX_LOCATION_PREVIEW: usize = 96;

pub fn classify_report(classifier: &Classifier, content: &str) -> Value {
    json!({ "kind": classifier.classify(content) })
}

pub fn repair_report(url: &str) -> Value {
    json!({
        "input": url,
        "repaired": fix_malformed_url(url),
        "changed": needs_repair(url),
    })
}

/// Sniff a local file's leading bytes.
pub fn inspect_file(path: &Path) -> Result<Value, WamediaError> {
    let bytes = std::fs::read(path)?;
    let sniffed = sniff(&bytes);
    Ok(json!({
        "file": path.display().to_string(),
        "size": bytes.len(),
        "sniffed": sniffed,
        "mime": sniffed.mime(),
        "extension": sniffed.extension(),
    }))
}

/// Run the extractor over every message in a saved webhook body.
pub fn extract_file(path: &Path) -> Result<Value, WamediaError> {
    let body = std::fs::read(path)?;
    let envelope = WebhookEnvelope::parse(&body)?;
    let messages = envelope
        .messages()?
        .iter()
        .map(|m| {
            let content = m.message.as_ref();
            let text = content.and_then(|c| c.text());
            let reference = content.and_then(extract_from_message);
            json!({
                "message_id": m.key.id,
                "remote_jid": m.key.remote_jid,
                "text": text,
                "media": reference.as_ref().map(summarize),
            })
        })
        .collect::<Vec<_>>();

    Ok(json!({
        "event": envelope.event,
        "instance": envelope.instance,
        "messages": messages,
    }))
}

fn summarize(r: &MediaReference) -> Value {
    let location = if r.is_inline() && r.location.len() > MAX_LOCATION_PREVIEW {
        let cut = r
            .location
            .char_indices()
            .nth(MAX_LOCATION_PREVIEW)
            .map(|(i, _)| i)
            .unwrap_or(r.location.len());
        format!("{}... ({} chars)", &r.location[..cut], r.location.len())
    } else {
        r.location.clone()
    };
    json!({
        "kind": r.kind,
        "source": r.source,
        "mimetype": r.mimetype,
        "location": location,
        "file_name": r.file_name,
        "likely_undecodable": r.likely_undecodable,
    })
}
