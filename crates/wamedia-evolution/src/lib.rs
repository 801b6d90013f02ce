//! # wamedia-evolution
//!
//! Evolution API REST client: server-side media decryption and instance
//! connection state.

pub mod client;

pub use client::{ConnectionState, EvolutionClient};
