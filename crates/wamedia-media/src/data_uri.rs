//! `data:<mime>[;params][;base64],<payload>` parsing and encoding.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use wamedia_core::error::WamediaError;

use crate::mime::mime_essence;

/// Base64 decoder that accepts payloads with or without `=` padding.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A parsed data-URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    /// MIME essence, lowercased. `text/plain` when the URI declares none.
    pub mime: String,
    pub is_base64: bool,
    pub payload: String,
}

impl DataUri {
    /// Parse a data-URI. `None` when `input` is not one.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let prefix = input.get(..5)?;
        if !prefix.eq_ignore_ascii_case("data:") {
            return None;
        }
        let (header, payload) = input[5..].split_once(',')?;
        let mut params = header.split(';');
        let mime = mime_essence(params.next().unwrap_or(""));
        let is_base64 = params.any(|p| p.trim().eq_ignore_ascii_case("base64"));

        Some(Self {
            mime: if mime.is_empty() {
                "text/plain".to_string()
            } else {
                mime
            },
            is_base64,
            payload: payload.to_string(),
        })
    }

    /// Build `data:<mime>;base64,<payload>` from raw bytes.
    pub fn encode(mime: &str, bytes: &[u8]) -> String {
        format!("data:{};base64,{}", mime_essence(mime), STANDARD.encode(bytes))
    }

    /// Wrap an already base64-encoded payload.
    pub fn from_base64(mime: &str, base64: &str) -> String {
        format!("data:{};base64,{}", mime_essence(mime), base64.trim())
    }

    /// Decode the payload into bytes.
    pub fn decode_payload(&self) -> Result<Vec<u8>, WamediaError> {
        if self.is_base64 {
            decode_base64(&self.payload)
        } else {
            Ok(urlencoding::decode_binary(self.payload.as_bytes()).into_owned())
        }
    }
}

/// Decode standard or URL-safe base64, ignoring whitespace and padding.
pub fn decode_base64(input: &str) -> Result<Vec<u8>, WamediaError> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    LENIENT
        .decode(&cleaned)
        .or_else(|_| LENIENT_URL_SAFE.decode(&cleaned))
        .map_err(|e| WamediaError::Payload(format!("invalid base64 payload: {e}")))
}

/// Encode bytes as standard base64.
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
