//! Ask a model for an answer under an output contract, retrying with feedback.

use super::contract::{AskError, ContractError, OutputContract, Record, Validator};
use super::literal::parse_record_list;
use super::session::Conversation;
use super::Completer;
use crate::prompts;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct AskOptions {
    /// Additional attempts after the first.
    pub retries: usize,
    /// Keep the session history instead of starting fresh.
    pub retain_context: bool,
}

impl Default for AskOptions {
    fn default() -> Self {
        Self { retries: 2, retain_context: false }
    }
}

impl AskOptions {
    pub fn with_retries(retries: usize) -> Self {
        Self { retries, ..Self::default() }
    }

    pub fn retain_context(mut self, retain: bool) -> Self {
        self.retain_context = retain;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Text(String),
    Records(Vec<Record>),
}

/// Where the retry loop stands between attempts.
enum AttemptState {
    First,
    Retry { attempt: usize, last: ContractError },
}

pub struct ReasoningClient {
    completer: Arc<dyn Completer>,
    system_prompt: String,
}

impl ReasoningClient {
    pub fn new(completer: Arc<dyn Completer>) -> Self {
        Self { completer, system_prompt: prompts::SYSTEM_PROMPT.to_string() }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn model_id(&self) -> &str {
        self.completer.model_id()
    }

    /// One turn. Transport failures are logged and yield an empty string;
    /// the unanswered user turn is removed so the history stays alternating.
    pub fn chat(&self, session: &mut Conversation, text: &str) -> String {
        session.push_user(text);
        match self.completer.complete(&self.system_prompt, session.messages()) {
            Ok(reply) if reply.trim().is_empty() => {
                warn!("Model {} returned an empty reply", self.completer.model_id());
                session.discard_unanswered();
                String::new()
            }
            Ok(reply) => {
                session.push_assistant(reply.clone());
                reply
            }
            Err(err) => {
                warn!("Completion request failed, returning empty response: {:#}", err);
                session.discard_unanswered();
                String::new()
            }
        }
    }

    pub fn ask(
        &self,
        session: &mut Conversation,
        prompt: &str,
        contract: OutputContract,
        options: AskOptions,
        validator: Option<Validator<'_>>,
    ) -> Result<Answer, AskError> {
        self.ask_with(session, prompt, options, |raw| match contract {
            OutputContract::PlainText => accept_text(raw).map(Answer::Text),
            OutputContract::StructuredList => accept_records(raw, validator).map(Answer::Records),
        })
    }

    pub fn ask_text(
        &self,
        session: &mut Conversation,
        prompt: &str,
        options: AskOptions,
    ) -> Result<String, AskError> {
        self.ask_with(session, prompt, options, accept_text)
    }

    pub fn ask_records(
        &self,
        session: &mut Conversation,
        prompt: &str,
        options: AskOptions,
        validator: Validator<'_>,
    ) -> Result<Vec<Record>, AskError> {
        self.ask_with(session, prompt, options, |raw| accept_records(raw, Some(validator)))
    }

    fn ask_with<T>(
        &self,
        session: &mut Conversation,
        prompt: &str,
        options: AskOptions,
        accept: impl Fn(&str) -> Result<T, ContractError>,
    ) -> Result<T, AskError> {
        if !options.retain_context {
            session.reset();
        }

        let mut state = AttemptState::First;
        loop {
            let (attempt, text) = match &state {
                AttemptState::First => (1, prompt.to_string()),
                AttemptState::Retry { attempt, last } => {
                    (*attempt, prompts::retry_prompt(&last.to_string(), prompt))
                }
            };

            let raw = self.chat(session, &text);
            let error = match accept(&raw) {
                Ok(answer) => {
                    debug!("Accepted response on attempt {}", attempt);
                    return Ok(answer);
                }
                Err(error) => error,
            };

            warn!("Attempt {} rejected: {}. Raw response: {:?}", attempt, error, raw);
            if attempt > options.retries {
                return Err(AskError::Exhausted { attempts: attempt, last: error, raw });
            }
            state = AttemptState::Retry { attempt: attempt + 1, last: error };
        }
    }
}

fn accept_text(raw: &str) -> Result<String, ContractError> {
    match raw.trim() {
        "" => Err(ContractError::Empty),
        text => Ok(text.to_string()),
    }
}

fn accept_records(
    raw: &str,
    validator: Option<Validator<'_>>,
) -> Result<Vec<Record>, ContractError> {
    if raw.trim().is_empty() {
        return Err(ContractError::Empty);
    }
    let records = parse_record_list(raw).map_err(|err| ContractError::Parse(err.to_string()))?;
    if let Some(validate) = validator {
        validate(&records)?;
    }
    Ok(records)
}
