use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    AgentHandler, DomainEvent, FactClaim, HandlerOutcome, answer_retrieve, parse_json_block,
};
use crate::core::provider::protocol::ClientMessage;
use crate::core::retrieval::Retrieval;
use crate::core::store::types::SessionRole;

/// Facts are addressed by a stable snake_case key so near-identical claims
/// merge instead of piling up.
pub fn normalize_fact_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_sep = true;
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

#[derive(serde::Deserialize)]
struct FactsPayload {
    facts: Vec<FactClaim>,
}

/// Decodes extracted fact claims off the facts channel (realtime transport
/// mode). The stateless path reuses the same payload shape via the router.
pub struct FactsHandler {
    event_id: String,
    buffer: Mutex<String>,
    retrieval: Arc<Retrieval>,
}

impl FactsHandler {
    pub fn new(event_id: String, retrieval: Arc<Retrieval>) -> Self {
        Self {
            event_id,
            buffer: Mutex::new(String::new()),
            retrieval,
        }
    }
}

#[async_trait]
impl AgentHandler for FactsHandler {
    fn role(&self) -> SessionRole {
        SessionRole::Facts
    }

    async fn on_text_delta(&self, delta: &str, _seq: Option<i64>) -> HandlerOutcome {
        self.buffer.lock().await.push_str(delta);
        HandlerOutcome::empty()
    }

    async fn on_text_done(&self, text: &str, seq: Option<i64>) -> HandlerOutcome {
        let accumulated = std::mem::take(&mut *self.buffer.lock().await);
        let source = if text.is_empty() { &accumulated } else { text };

        let Some(raw) = parse_json_block(source) else {
            debug!("Dropping facts fragment without a parseable payload");
            return HandlerOutcome::empty();
        };
        let payload: FactsPayload = match serde_json::from_value(raw) {
            Ok(p) => p,
            Err(e) => {
                debug!("Dropping malformed facts payload: {}", e);
                return HandlerOutcome::empty();
            }
        };

        let claims: Vec<FactClaim> = payload
            .facts
            .into_iter()
            .map(|claim| FactClaim {
                key: normalize_fact_key(&claim.key),
                ..claim
            })
            .filter(|claim| !claim.key.is_empty())
            .collect();

        if claims.is_empty() {
            return HandlerOutcome::empty();
        }

        let through_seq = seq.unwrap_or(0);
        HandlerOutcome {
            checkpoint: seq,
            events: vec![DomainEvent::Facts {
                claims,
                through_seq,
            }],
        }
    }

    async fn on_tool_call(
        &self,
        call_id: &str,
        name: &str,
        args: &serde_json::Value,
    ) -> ClientMessage {
        answer_retrieve(&self.retrieval, &self.event_id, call_id, name, args).await
    }
}
