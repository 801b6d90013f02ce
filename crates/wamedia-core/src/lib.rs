//! # wamedia-core
//!
//! Core types, traits, configuration, and error handling shared by the
//! wamedia crates.

pub mod config;
pub mod error;
pub mod media;
pub mod message;
pub mod traits;

pub use config::shellexpand;
