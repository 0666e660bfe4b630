//! eifmap: map free-text activities to emission impact factors
//!
//! Item descriptions are embedded and matched against a reference catalog
//! (process-level impact factors or NAICS industry codes), then the shortlist
//! is reranked by a language model under a strict structured-output contract.
//! Batch runs checkpoint every result so an interrupted run resumes cleanly.

pub mod batch;
pub mod cli;
pub mod config;
pub mod domain;
pub mod embed;
pub mod llm;
pub mod normalize;
pub mod prompts;
pub mod rank;
pub mod rerank;
pub mod source;
pub mod utils;
