//! Industry-code matching: one model call over the NAICS shortlist, then a vote tally.

use super::rules::{tally_votes, CodeVote};
use super::{blank_activity, listing, RerankContext, RerankOutcome, Reranker};
use crate::domain::{
    ActivityRecord, EioCatalog, MatchResult, NaicsEntry, Pick, ReviewOption, TaskKind,
};
use crate::llm::contract::{record_code, require_exact_keys, ContractError};
use crate::llm::{Conversation, Record};
use crate::prompts;
use anyhow::Result;
use serde_json::json;
use std::collections::HashSet;
use tracing::{info, warn};

const RESPONSE_KEYS: [&str; 3] = ["naics_code", "justification", "naics_title"];

pub struct EioReranker {
    catalog: EioCatalog,
    context: RerankContext,
}

impl EioReranker {
    pub fn new(catalog: EioCatalog, context: RerankContext) -> Self {
        Self { catalog, context }
    }

    fn details(entry: &NaicsEntry) -> Vec<(String, String)> {
        TaskKind::Eio
            .summary_keys()
            .iter()
            .map(|key| {
                let value = match *key {
                    "naics_code" => entry.code.clone(),
                    "naics_title" => entry.title.clone(),
                    "co2e_per_dollar" => entry.co2e_per_dollar.to_string(),
                    "bea_code" => entry.bea_code.clone(),
                    _ => String::new(),
                };
                (key.to_string(), value)
            })
            .collect()
    }

    fn pick_for(&self, vote: &CodeVote) -> Pick {
        let found = self.catalog.find_code(&vote.code);
        Pick {
            index: found.map(|(i, _)| i),
            label: Some(found.map(|(_, e)| e.title.clone()).unwrap_or_else(|| vote.title.clone())),
            code: Some(vote.code.clone()),
            justification: vote.justification.clone(),
        }
    }
}

impl Reranker for EioReranker {
    fn kind(&self) -> TaskKind {
        TaskKind::Eio
    }

    fn rerank(&self, activity: &ActivityRecord) -> Result<RerankOutcome> {
        if let Some(outcome) = blank_activity(activity) {
            return Ok(outcome);
        }
        let mut session = Conversation::new();
        let (paraphrase, description) =
            self.context.describe(&mut session, activity, prompts::EIO_PARAPHRASE);
        let shortlist = self.context.shortlist(&description)?;

        let mut offered_codes = HashSet::new();
        let mut rows = Vec::with_capacity(shortlist.len());
        for candidate in &shortlist {
            let Some(entry) = self.catalog.get(candidate.index) else {
                continue;
            };
            offered_codes.insert(entry.code.clone());
            rows.push(json!({
                "naics_title": entry.title,
                "naics description": entry.description,
                "naics_code": entry.code,
            }));
        }
        let prompt = prompts::render(prompts::EIO_RERANK, &description, &listing(rows));

        let validator = |records: &[Record]| -> Result<(), ContractError> {
            if records.is_empty() {
                return Err(ContractError::Validation("the list is empty".to_string()));
            }
            require_exact_keys(records, &RESPONSE_KEYS)?;
            for record in records {
                match record_code(record, "naics_code") {
                    Some(code) if offered_codes.contains(&code) => {}
                    Some(code) => {
                        return Err(ContractError::Validation(format!(
                            "naics_code {code} is not one of the offered codes"
                        )))
                    }
                    None => {
                        return Err(ContractError::Validation(
                            "every entry needs a naics_code".to_string(),
                        ))
                    }
                }
            }
            Ok(())
        };

        let records = match self.context.client.ask_records(
            &mut session,
            &prompt,
            self.context.ask_options(),
            &validator,
        ) {
            Ok(records) => records,
            Err(err) => {
                warn!("No NAICS match for {}: {}", activity.id, err);
                return Ok(RerankOutcome::NoMatch { reason: err.to_string() });
            }
        };
        info!("NAICS reranked: {:?}", records);

        let votes = tally_votes(&records, "naics_code", "naics_title");
        let Some(best) = votes.first() else {
            return Ok(RerankOutcome::NoMatch { reason: "empty NAICS ranking".to_string() });
        };
        let Some((_, entry)) = self.catalog.find_code(&best.code) else {
            warn!("NAICS code {} is not in the catalog", best.code);
            return Ok(RerankOutcome::NoMatch {
                reason: format!("NAICS code {} is not in the catalog", best.code),
            });
        };

        let details = Self::details(entry);
        let picks: Vec<Pick> = votes.iter().map(|v| self.pick_for(v)).collect();
        let alternatives = picks
            .iter()
            .map(|p| {
                let label = p.label.clone().unwrap_or_default();
                ReviewOption::new(label, p.code.clone().unwrap_or_default())
            })
            .collect();
        Ok(RerankOutcome::Matched(MatchResult {
            kind: TaskKind::Eio,
            paraphrase,
            picks,
            details,
            alternatives,
        }))
    }
}
