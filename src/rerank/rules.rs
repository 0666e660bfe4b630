//! Deterministic post-processing of model picks.
//!
//! The prompts already ask for these rules; they are enforced here again so a
//! model that ignores them cannot change the outcome.

use crate::domain::Pick;
use crate::llm::{contract::record_code, contract::record_str, Record};
use std::collections::HashSet;

/// Maximum picks kept for the process variant.
pub const MAX_PROCESS_PICKS: usize = 2;
/// Maximum unique codes kept for the industry variant.
pub const MAX_EIO_CODES: usize = 5;

/// An offered stage-two candidate: catalog index and category name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offered<'a> {
    pub index: usize,
    pub name: &'a str,
}

/// Apply, in order: dedup to first occurrence, the null-match policy, the
/// organic rule, market-over-production precedence, and the two-pick cap.
pub fn apply_process_rules(query: &str, picks: Vec<Pick>, offered: &[Offered<'_>]) -> Vec<Pick> {
    let picks = dedup_first(picks);
    let picks = null_policy(picks);
    let picks = prefer_non_organic(query, picks);
    let mut picks = prefer_market(query, picks, offered);
    picks.truncate(MAX_PROCESS_PICKS);
    picks
}

/// Drop repeated selections. Two picks are the same when they share an index or a label.
pub fn dedup_first(picks: Vec<Pick>) -> Vec<Pick> {
    let mut indices = HashSet::new();
    let mut labels = HashSet::new();
    let mut none_seen = false;
    picks
        .into_iter()
        .filter(|pick| match pick.index {
            None => !std::mem::replace(&mut none_seen, true),
            Some(index) => {
                let label = pick.label.clone().unwrap_or_default();
                let fresh_index = indices.insert(index);
                let fresh_label = label.is_empty() || labels.insert(label);
                fresh_index && fresh_label
            }
        })
        .collect()
}

/// A null sentinel never sits next to a real match; with no match exactly one null remains.
pub fn null_policy(picks: Vec<Pick>) -> Vec<Pick> {
    if picks.iter().any(|p| !p.is_none()) {
        return picks.into_iter().filter(|p| !p.is_none()).collect();
    }
    picks.into_iter().take(1).collect()
}

/// Move organic picks behind conventional ones unless the query asks for organic.
/// Relative order within each group is kept.
pub fn prefer_non_organic(query: &str, picks: Vec<Pick>) -> Vec<Pick> {
    if query.to_lowercase().contains("organic") {
        return picks;
    }
    let (organic, mut conventional): (Vec<Pick>, Vec<Pick>) =
        picks.into_iter().partition(|pick| pick.label.as_deref().is_some_and(is_organic));
    conventional.extend(organic);
    conventional
}

/// Put the same-topic "market for" entry ahead of a "production" best pick.
/// Conventional markets are chosen over organic ones unless the query asks for organic.
pub fn prefer_market(query: &str, mut picks: Vec<Pick>, offered: &[Offered<'_>]) -> Vec<Pick> {
    let Some(best) = picks.first() else {
        return picks;
    };
    let Some(topic) = best.label.as_deref().and_then(production_topic) else {
        return picks;
    };
    let markets: Vec<&Offered<'_>> = offered
        .iter()
        .filter(|c| market_topic(c.name).as_deref() == Some(topic.as_str()))
        .collect();
    let wants_organic = query.to_lowercase().contains("organic");
    let Some(market) = markets
        .iter()
        .find(|c| wants_organic || !is_organic(c.name))
        .or_else(|| markets.first())
        .copied()
    else {
        return picks;
    };

    let production_name = best.label.clone().unwrap_or_default();
    let promoted = match picks.iter().position(|p| p.index == Some(market.index)) {
        Some(pos) => picks.remove(pos),
        None => Pick {
            index: Some(market.index),
            label: Some(market.name.to_string()),
            code: None,
            justification: format!(
                "'{}' covers the same product as '{}'; market activities take precedence \
                 over production activities.",
                market.name, production_name
            ),
        },
    };
    picks.insert(0, promoted);
    picks
}

fn is_organic(name: &str) -> bool {
    tokens(name).any(|t| t == "organic")
}

fn tokens(name: &str) -> impl Iterator<Item = String> + '_ {
    name.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Topic of a market activity: "market for grape, table" -> "grape".
pub fn market_topic(name: &str) -> Option<String> {
    let lower = name.trim().to_lowercase();
    let rest = lower.strip_prefix("market for ")?;
    let head = rest.split(',').next().unwrap_or(rest).trim();
    (!head.is_empty()).then(|| head.to_string())
}

/// Topic of a production activity: "grape production, x" or "production of grape" -> "grape".
pub fn production_topic(name: &str) -> Option<String> {
    let lower = name.trim().to_lowercase();
    let head = lower.split(',').next().unwrap_or(&lower).trim();
    let topic = if let Some(rest) = head.strip_prefix("production of ") {
        rest
    } else {
        head.strip_suffix(" production")?
    };
    let topic = topic.trim();
    (!topic.is_empty()).then(|| topic.to_string())
}

/// One industry code after vote counting.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeVote {
    pub code: String,
    pub title: String,
    pub justification: String,
    pub votes: usize,
    first_position: usize,
}

/// Group records by code, order by votes then first appearance, keep the top five.
pub fn tally_votes(records: &[Record], code_key: &str, title_key: &str) -> Vec<CodeVote> {
    let mut tally: Vec<CodeVote> = Vec::new();
    for (position, record) in records.iter().enumerate() {
        let Some(code) = record_code(record, code_key) else {
            continue;
        };
        match tally.iter_mut().find(|v| v.code == code) {
            Some(vote) => vote.votes += 1,
            None => tally.push(CodeVote {
                code,
                title: record_str(record, title_key).unwrap_or_default(),
                justification: record_str(record, "justification").unwrap_or_default(),
                votes: 1,
                first_position: position,
            }),
        }
    }
    tally.sort_by(|a, b| b.votes.cmp(&a.votes).then(a.first_position.cmp(&b.first_position)));
    tally.truncate(MAX_EIO_CODES);
    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pick(index: Option<usize>, label: &str) -> Pick {
        Pick {
            index,
            label: (!label.is_empty()).then(|| label.to_string()),
            code: None,
            justification: format!("because {label}"),
        }
    }

    fn labels(picks: &[Pick]) -> Vec<Option<&str>> {
        picks.iter().map(|p| p.label.as_deref()).collect()
    }

    #[test]
    fn market_outranks_production_with_qualifiers() {
        let offered = [
            Offered { index: 3, name: "grape production, table grape, irrigated, fresh" },
            Offered { index: 8, name: "market for grape" },
        ];
        let picks = vec![pick(Some(3), offered[0].name), pick(Some(8), offered[1].name)];
        let out = apply_process_rules("table grape", picks, &offered);
        assert_eq!(out[0].index, Some(8));
        assert_eq!(out[1].index, Some(3));
        assert_eq!(out[0].justification, "because market for grape");
    }

    #[test]
    fn market_is_inserted_when_model_omits_it() {
        let offered = [
            Offered { index: 1, name: "production of grape" },
            Offered { index: 2, name: "market for grape, organic" },
            Offered { index: 5, name: "market for grape" },
        ];
        let out = apply_process_rules("table grape", vec![pick(Some(1), offered[0].name)], &offered);
        assert_eq!(labels(&out), vec![Some("market for grape"), Some("production of grape")]);
        assert!(out[0].justification.contains("take precedence"));
    }

    #[test]
    fn unrelated_market_does_not_displace_production() {
        let offered = [
            Offered { index: 0, name: "tomato production, fresh grade" },
            Offered { index: 1, name: "market for grape" },
        ];
        let out = apply_process_rules("tomato", vec![pick(Some(0), offered[0].name)], &offered);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].index, Some(0));
    }

    #[test]
    fn null_never_accompanies_a_match() {
        let picks = vec![pick(None, ""), pick(Some(4), "market for maize grain")];
        let out = apply_process_rules("popcorn", picks, &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].index, Some(4));
    }

    #[test]
    fn no_match_collapses_to_single_sentinel() {
        let out = apply_process_rules("hot salsa", vec![pick(None, ""), pick(None, "")], &[]);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_none());
    }

    #[test]
    fn duplicates_resolve_to_first_occurrence() {
        let picks = vec![
            pick(Some(2), "market for milk"),
            pick(Some(9), "market for milk"),
            pick(Some(2), "market for milk"),
            pick(Some(4), "market for cheese"),
        ];
        let out = dedup_first(picks);
        assert_eq!(out.iter().map(|p| p.index).collect::<Vec<_>>(), vec![Some(2), Some(4)]);
    }

    #[test]
    fn organic_variant_is_deprioritized() {
        let offered = [
            Offered { index: 0, name: "market for maize grain, organic" },
            Offered { index: 1, name: "market for maize grain" },
        ];
        let picks = vec![pick(Some(0), offered[0].name), pick(Some(1), offered[1].name)];
        let out = apply_process_rules("popped popcorn", picks.clone(), &offered);
        assert_eq!(out.iter().map(|p| p.index).collect::<Vec<_>>(), vec![Some(1), Some(0)]);
        assert_eq!(labels(&out)[0], Some("market for maize grain"));

        let kept = apply_process_rules("organic popcorn kernels", picks, &offered);
        assert_eq!(kept[0].index, Some(0));
    }

    #[test]
    fn organic_reorder_is_stable() {
        let picks = vec![
            pick(Some(0), "market for milk, organic"),
            pick(Some(1), "market for cheese"),
            pick(Some(2), "market for butter, organic"),
            pick(Some(3), "market for cream"),
        ];
        let out = prefer_non_organic("dairy", picks);
        assert_eq!(
            out.iter().map(|p| p.index).collect::<Vec<_>>(),
            vec![Some(1), Some(3), Some(0), Some(2)]
        );
    }

    #[test]
    fn picks_are_capped_at_two() {
        let picks = (0..4).map(|i| pick(Some(i), &format!("market for item {i}"))).collect();
        assert_eq!(apply_process_rules("item", picks, &[]).len(), 2);
    }

    #[test]
    fn topics_are_extracted() {
        assert_eq!(market_topic("Market for tomato, fresh grade").as_deref(), Some("tomato"));
        assert_eq!(production_topic("tomato production, fresh grade").as_deref(), Some("tomato"));
        assert_eq!(production_topic("production of polypropylene").as_deref(), Some("polypropylene"));
        assert_eq!(production_topic("market for tomato"), None);
        assert_eq!(market_topic("tomato production"), None);
    }

    #[test]
    fn votes_order_by_count_then_first_position() {
        let records: Vec<Record> = [
            json!({"naics_code": 111219, "naics_title": "Cabbage", "justification": "a"}),
            json!({"naics_code": "311330", "naics_title": "Nuts", "justification": "b"}),
            json!({"naics_code": 311330, "naics_title": "Nuts again", "justification": "c"}),
            json!({"naics_code": null, "naics_title": "", "justification": "d"}),
            json!({"naics_code": 311999, "naics_title": "Almond", "justification": "e"}),
        ]
        .into_iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect();

        let votes = tally_votes(&records, "naics_code", "naics_title");
        let codes: Vec<&str> = votes.iter().map(|v| v.code.as_str()).collect();
        assert_eq!(codes, vec!["311330", "111219", "311999"]);
        assert_eq!(votes[0].votes, 2);
        assert_eq!(votes[0].justification, "b");
    }

    #[test]
    fn votes_keep_at_most_five_codes() {
        let records: Vec<Record> = (0..8)
            .map(|i| json!({"naics_code": i, "naics_title": "t", "justification": "j"}))
            .map(|v| v.as_object().cloned().unwrap())
            .collect();
        assert_eq!(tally_votes(&records, "naics_code", "naics_title").len(), MAX_EIO_CODES);
    }
}
