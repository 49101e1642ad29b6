mod cards;
mod facts;
mod transcript;

pub use cards::CardsHandler;
pub use facts::{FactsHandler, normalize_fact_key};
pub use transcript::TranscriptHandler;

use async_trait::async_trait;
use tracing::warn;

use crate::core::provider::protocol::{ChannelEvent, ClientMessage, error_tool_result};
use crate::core::retrieval::Retrieval;
use crate::core::store::types::SessionRole;
use crate::core::templates::types::TriggerContext;

/// A parsed card emission as it comes off the channel, before template
/// selection and shape validation.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CardPayload {
    pub concept_id: String,
    pub concept_label: String,
    pub card_type: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub visual_request: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct FactClaim {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub confidence: f64,
}

/// What a handler hands back to the plumbing around it. Handlers never touch
/// checkpoint or session rows themselves; the read pump applies these.
#[derive(Debug, Default)]
pub struct HandlerOutcome {
    pub checkpoint: Option<i64>,
    pub events: Vec<DomainEvent>,
}

impl HandlerOutcome {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
pub enum DomainEvent {
    Trigger(TriggerContext),
    CardCandidate(CardPayload),
    Facts {
        claims: Vec<FactClaim>,
        through_seq: i64,
    },
    /// A window of recent transcript text ready for stateless fact
    /// extraction.
    FactsWindow {
        text: String,
        through_seq: i64,
    },
    /// Token/runtime metrics reported by the provider at response end.
    Usage(serde_json::Value),
}

/// Role state machine over inbound channel events. One handler instance per
/// live session adapter.
#[async_trait]
pub trait AgentHandler: Send + Sync {
    fn role(&self) -> SessionRole;

    async fn on_text_delta(&self, _delta: &str, _seq: Option<i64>) -> HandlerOutcome {
        HandlerOutcome::empty()
    }

    async fn on_text_done(&self, text: &str, seq: Option<i64>) -> HandlerOutcome;

    /// Must produce a tool result for the same channel, even on internal
    /// error, so the remote conversation is never left waiting.
    async fn on_tool_call(
        &self,
        call_id: &str,
        name: &str,
        args: &serde_json::Value,
    ) -> ClientMessage {
        error_tool_result(call_id, &format!("tool '{}' is not available for this role", name))
    }

    async fn on_response_done(&self, usage: Option<&serde_json::Value>) -> HandlerOutcome {
        match usage {
            Some(usage) => HandlerOutcome {
                checkpoint: None,
                events: vec![DomainEvent::Usage(usage.clone())],
            },
            None => HandlerOutcome::empty(),
        }
    }
}

/// Map one decoded channel event onto the handler. Tool calls are returned
/// separately so the pump can answer on the same connection.
pub async fn dispatch_event(
    handler: &dyn AgentHandler,
    event: ChannelEvent,
) -> (HandlerOutcome, Option<ClientMessage>) {
    match event {
        ChannelEvent::TextDelta { delta, seq } => (handler.on_text_delta(&delta, seq).await, None),
        ChannelEvent::TextDone { text, seq } => (handler.on_text_done(&text, seq).await, None),
        ChannelEvent::ToolCallDone {
            call_id,
            name,
            arguments,
        } => {
            let result = handler.on_tool_call(&call_id, &name, &arguments).await;
            (HandlerOutcome::empty(), Some(result))
        }
        ChannelEvent::ResponseDone { usage } => {
            (handler.on_response_done(usage.as_ref()).await, None)
        }
        ChannelEvent::Error { message, code } => {
            warn!(
                "Provider error on {} channel: {} (code {:?})",
                handler.role().as_str(),
                message,
                code
            );
            (HandlerOutcome::empty(), None)
        }
        ChannelEvent::Unknown => (HandlerOutcome::empty(), None),
    }
}

/// Shared `retrieve(query, top_k)` answering path. Failures are folded into
/// an error-carrying result rather than propagated.
pub async fn answer_retrieve(
    retrieval: &Retrieval,
    event_id: &str,
    call_id: &str,
    name: &str,
    args: &serde_json::Value,
) -> ClientMessage {
    if name != "retrieve" {
        return error_tool_result(call_id, &format!("unknown tool '{}'", name));
    }

    let query = args.get("query").and_then(|v| v.as_str()).unwrap_or("");
    let top_k = args
        .get("top_k")
        .and_then(|v| v.as_u64())
        .unwrap_or(5)
        .min(25) as usize;

    if query.is_empty() {
        return error_tool_result(call_id, "retrieve requires a non-empty query");
    }

    match retrieval.retrieve(event_id, query, top_k).await {
        Ok(hits) => ClientMessage::ToolResult {
            call_id: call_id.to_string(),
            output: serde_json::json!({ "results": hits }),
        },
        Err(e) => {
            warn!("Retrieval failed for '{}': {}", query, e);
            error_tool_result(call_id, "retrieval backend error")
        }
    }
}

/// Extract the first balanced JSON object from free-form model text. The
/// provider interleaves prose and payloads; anything unparseable is the
/// caller's cue to drop the fragment.
pub fn parse_json_block(text: &str) -> Option<serde_json::Value> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..=start + offset];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests;
