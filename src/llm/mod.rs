//! Language-model access: backends, conversation sessions, output contracts.

use crate::domain::{LlmBackend, RunConfig};
use anyhow::{Context, Result};
use std::sync::Arc;

pub mod anthropic;
pub mod client;
pub mod contract;
pub mod literal;
pub mod openai;
pub mod session;

pub use anthropic::AnthropicCompleter;
pub use client::{Answer, AskOptions, ReasoningClient};
pub use contract::{AskError, ContractError, OutputContract, Record, Validator};
pub use openai::OpenAiCompleter;
pub use session::{ChatMessage, Conversation, Role};

/// Capability: continue a conversation.
pub trait Completer: Send + Sync {
    fn model_id(&self) -> &str;

    fn complete(&self, system: &str, history: &[ChatMessage]) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionSettings {
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self { temperature: 0.0, max_tokens: 4096 }
    }
}

/// Select the LLM backend named in the configuration.
pub fn build_completer(config: &RunConfig) -> Result<Arc<dyn Completer>> {
    let settings =
        CompletionSettings { temperature: config.temperature, max_tokens: config.max_tokens };
    match config.llm_backend {
        LlmBackend::Anthropic => {
            let api_key = std::env::var("ANTHROPIC_API_KEY")
                .context("ANTHROPIC_API_KEY must be set for the anthropic backend")?;
            Ok(Arc::new(AnthropicCompleter::new(
                api_key,
                config.llm_base_url.clone(),
                config.llm_model.clone(),
                settings,
            )?))
        }
        LlmBackend::OpenAi => {
            let api_key = std::env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY must be set for the openai backend")?;
            Ok(Arc::new(OpenAiCompleter::new(
                api_key,
                config.llm_base_url.clone(),
                config.llm_model.clone(),
                settings,
            )?))
        }
    }
}
