use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::debug;

use super::{AgentHandler, DomainEvent, HandlerOutcome, parse_json_block};
use crate::core::store::types::SessionRole;
use crate::core::templates::types::TriggerContext;

const WINDOW_CAP: usize = 50;
const FACTS_WINDOW_EVERY: usize = 5;
const FACTS_WINDOW_SEGMENTS: usize = 10;

#[derive(serde::Deserialize)]
struct TranscriptPayload {
    #[serde(default)]
    seq: Option<i64>,
    segment: String,
    #[serde(default)]
    triggers: Vec<TriggerContext>,
}

#[derive(Default)]
struct RollingState {
    buffer: String,
    window: VecDeque<(i64, String)>,
    segments_since_facts: usize,
}

/// Consumes the live transcript stream: keeps a rolling window of processed
/// segments, surfaces card-emission triggers, and periodically cuts a text
/// window for fact extraction.
pub struct TranscriptHandler {
    state: Mutex<RollingState>,
}

impl TranscriptHandler {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RollingState::default()),
        }
    }
}

impl Default for TranscriptHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentHandler for TranscriptHandler {
    fn role(&self) -> SessionRole {
        SessionRole::Transcript
    }

    async fn on_text_delta(&self, delta: &str, _seq: Option<i64>) -> HandlerOutcome {
        let mut state = self.state.lock().await;
        state.buffer.push_str(delta);
        HandlerOutcome::empty()
    }

    async fn on_text_done(&self, text: &str, seq: Option<i64>) -> HandlerOutcome {
        let mut state = self.state.lock().await;

        let accumulated = std::mem::take(&mut state.buffer);
        let source = if text.is_empty() { &accumulated } else { text };

        let Some(raw) = parse_json_block(source) else {
            debug!("Dropping transcript fragment without a parseable payload");
            return HandlerOutcome::empty();
        };
        let payload: TranscriptPayload = match serde_json::from_value(raw) {
            Ok(p) => p,
            Err(e) => {
                debug!("Dropping malformed transcript payload: {}", e);
                return HandlerOutcome::empty();
            }
        };

        let seq = payload.seq.or(seq).unwrap_or(0);

        state.window.push_back((seq, payload.segment));
        while state.window.len() > WINDOW_CAP {
            state.window.pop_front();
        }
        state.segments_since_facts += 1;

        let mut events: Vec<DomainEvent> = payload
            .triggers
            .into_iter()
            .map(DomainEvent::Trigger)
            .collect();

        if state.segments_since_facts >= FACTS_WINDOW_EVERY {
            state.segments_since_facts = 0;
            let window_text: Vec<&str> = state
                .window
                .iter()
                .rev()
                .take(FACTS_WINDOW_SEGMENTS)
                .map(|(_, s)| s.as_str())
                .collect();
            let text = window_text
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            events.push(DomainEvent::FactsWindow {
                text,
                through_seq: seq,
            });
        }

        HandlerOutcome {
            checkpoint: Some(seq),
            events,
        }
    }
}
