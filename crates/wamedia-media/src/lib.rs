//! # wamedia-media
//!
//! The decision logic for inbound WhatsApp media: which reference in an
//! Evolution webhook to trust, what kind of media it is, what its bytes
//! really are, and where it should be stored.

pub mod classify;
pub mod data_uri;
pub mod extract;
pub mod mime;
pub mod object_key;
pub mod payload;
pub mod signature;
pub mod url_repair;

pub use classify::{classify, Classifier};
pub use data_uri::DataUri;
pub use extract::{extract_from_message, extract_reference, is_encrypted_url, MediaReference};
pub use object_key::object_key;
pub use signature::{detect_image_format, sniff, ImageFormat, MediaFormat, Sniffed};
pub use url_repair::{fix_malformed_url, needs_repair};
