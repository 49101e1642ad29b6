use anyhow::Result;
use std::sync::Arc;

use crate::core::store::SessionStore;

const SNIPPET_LEN: usize = 160;

#[derive(Debug, Clone, serde::Serialize)]
pub struct RetrievalHit {
    pub kind: &'static str,
    pub key: String,
    pub snippet: String,
    pub score: usize,
}

/// Store-backed capability behind the `retrieve` tool: case-insensitive
/// term scoring over the event's active facts and recent cards.
pub struct Retrieval {
    store: Arc<SessionStore>,
}

impl Retrieval {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    pub async fn retrieve(
        &self,
        event_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>> {
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits = Vec::new();

        for fact in self.store.list_active_facts(event_id).await? {
            let haystack = format!("{} {}", fact.key, fact.value).to_lowercase();
            let score = score_terms(&haystack, &terms);
            if score > 0 {
                hits.push(RetrievalHit {
                    kind: "fact",
                    key: fact.key,
                    snippet: truncate(&fact.value),
                    score,
                });
            }
        }

        for card in self.store.list_cards_for_event(event_id, 100).await? {
            let body = card.body.or(card.label).unwrap_or_default();
            let haystack = format!("{} {}", card.concept_label, body).to_lowercase();
            let score = score_terms(&haystack, &terms);
            if score > 0 {
                hits.push(RetrievalHit {
                    kind: "card",
                    key: card.concept_id,
                    snippet: truncate(&body),
                    score,
                });
            }
        }

        hits.sort_by(|a, b| b.score.cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }
}

fn score_terms(haystack: &str, terms: &[String]) -> usize {
    terms
        .iter()
        .filter(|term| haystack.contains(term.as_str()))
        .count()
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= SNIPPET_LEN {
        text.to_string()
    } else {
        let cut: String = text.chars().take(SNIPPET_LEN).collect();
        format!("{}…", cut)
    }
}
