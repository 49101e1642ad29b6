use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    Card,
    FactUpdate,
    AgentSessionEnrichment,
    Heartbeat,
    Connected,
}

impl PushKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PushKind::Card => "card",
            PushKind::FactUpdate => "fact_update",
            PushKind::AgentSessionEnrichment => "agent_session_enrichment",
            PushKind::Heartbeat => "heartbeat",
            PushKind::Connected => "connected",
        }
    }
}

/// Fan-out point for card/fact/status payloads to whatever front-end
/// transport is attached. The envelope shape is stable; the transport is the
/// web interface's concern.
#[derive(Clone)]
pub struct PushHub {
    tx: broadcast::Sender<String>,
}

impl PushHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn publish(&self, kind: PushKind, event_id: &str, payload: serde_json::Value) {
        let envelope = serde_json::json!({
            "type": kind.as_str(),
            "event_id": event_id,
            "payload": payload,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        let _ = self.tx.send(envelope.to_string()); // Ignored if no receivers
    }
}
