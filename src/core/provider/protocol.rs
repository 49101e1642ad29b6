use serde::{Deserialize, Serialize};
use tracing::debug;

/// Inbound side of the duplex channel. The provider's wire payloads are
/// validated here, at the boundary, before any domain logic sees them;
/// unrecognized kinds land in `Unknown` and are skipped, never a type error.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelEvent {
    TextDelta {
        delta: String,
        #[serde(default)]
        seq: Option<i64>,
    },
    TextDone {
        text: String,
        #[serde(default)]
        seq: Option<i64>,
    },
    ToolCallDone {
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: serde_json::Value,
    },
    ResponseDone {
        #[serde(default)]
        usage: Option<serde_json::Value>,
    },
    Error {
        message: String,
        #[serde(default)]
        code: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Parse one wire frame. Malformed frames map to `None` (log-and-skip); the
/// session must keep running regardless of what the provider sends.
pub fn decode_event(raw: &str) -> Option<ChannelEvent> {
    match serde_json::from_str::<ChannelEvent>(raw) {
        Ok(ChannelEvent::Unknown) => {
            debug!("Skipping unrecognized channel event kind");
            None
        }
        Ok(event) => Some(event),
        Err(e) => {
            debug!("Dropping malformed channel frame: {}", e);
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputModality {
    Text,
    Audio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// The once-per-connection session configuration payload. Instructions are an
/// opaque payload as far as the orchestration layer is concerned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub model: String,
    pub instructions: String,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    pub modality: OutputModality,
    pub max_output_tokens: u32,
}

/// Outbound side of the duplex channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SessionConfig(SessionConfig),
    /// Conversation input forwarded into the remote session.
    Input { text: String },
    /// Answer to a tool invocation; must reference the originating call.
    ToolResult {
        call_id: String,
        output: serde_json::Value,
    },
}

/// Build a tool result that carries an explicit error instead of starving the
/// remote conversation of a response.
pub fn error_tool_result(call_id: &str, message: &str) -> ClientMessage {
    ClientMessage::ToolResult {
        call_id: call_id.to_string(),
        output: serde_json::json!({ "error": message, "results": [] }),
    }
}
