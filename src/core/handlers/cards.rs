use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    AgentHandler, CardPayload, DomainEvent, HandlerOutcome, answer_retrieve, parse_json_block,
};
use crate::core::provider::protocol::ClientMessage;
use crate::core::retrieval::Retrieval;
use crate::core::store::types::SessionRole;

/// Decodes card emissions off the cards channel. Selection, validation and
/// persistence happen downstream; this handler only turns channel text into
/// candidates and answers retrieval calls.
pub struct CardsHandler {
    event_id: String,
    buffer: Mutex<String>,
    retrieval: Arc<Retrieval>,
}

impl CardsHandler {
    pub fn new(event_id: String, retrieval: Arc<Retrieval>) -> Self {
        Self {
            event_id,
            buffer: Mutex::new(String::new()),
            retrieval,
        }
    }
}

#[async_trait]
impl AgentHandler for CardsHandler {
    fn role(&self) -> SessionRole {
        SessionRole::Cards
    }

    async fn on_text_delta(&self, delta: &str, _seq: Option<i64>) -> HandlerOutcome {
        self.buffer.lock().await.push_str(delta);
        HandlerOutcome::empty()
    }

    async fn on_text_done(&self, text: &str, seq: Option<i64>) -> HandlerOutcome {
        let accumulated = std::mem::take(&mut *self.buffer.lock().await);
        let source = if text.is_empty() { &accumulated } else { text };

        let Some(raw) = parse_json_block(source) else {
            debug!("Dropping cards fragment without a parseable payload");
            return HandlerOutcome::empty();
        };
        let payload: CardPayload = match serde_json::from_value(raw) {
            Ok(p) => p,
            Err(e) => {
                debug!("Dropping malformed card payload: {}", e);
                return HandlerOutcome::empty();
            }
        };

        HandlerOutcome {
            checkpoint: seq,
            events: vec![DomainEvent::CardCandidate(payload)],
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
