//! Shared helpers

pub mod hashing;

pub use hashing::{content_id, corpus_cache_key};
