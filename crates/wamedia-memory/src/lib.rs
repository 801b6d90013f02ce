//! # wamedia-memory
//!
//! Message records for wamedia (SQLite-backed).

pub mod store;

pub use store::Store;
