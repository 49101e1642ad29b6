pub mod health;
mod router;

pub use router::EventRouter;

use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::core::config::ProviderConfig;
use crate::core::handlers::{AgentHandler, CardsHandler, FactsHandler, TranscriptHandler};
use crate::core::provider::protocol::{OutputModality, SessionConfig, ToolSpec};
use crate::core::provider::realtime::{Connector, is_terminal_connect_error};
use crate::core::provider::stateless::StatelessClient;
use crate::core::push::{PushHub, PushKind};
use crate::core::retrieval::Retrieval;
use crate::core::session::{SessionAdapter, SessionSnapshot};
use crate::core::store::SessionStore;
use crate::core::store::types::{AgentRecord, AgentStatus, SessionRole, SessionStatus, Transport};
use crate::core::templates::TemplateRegistry;

const TRANSCRIPT_INSTRUCTIONS: &str = "Consume the live event audio and emit, per processed \
segment, a JSON object {\"seq\": n, \"segment\": text, \"triggers\": [...]} where triggers \
describe concepts worth a contextual card.";

const CARDS_INSTRUCTIONS: &str = "You receive trigger contexts for a live event. For each, decide \
whether a contextual card is warranted and respond with a JSON object {\"concept_id\", \
\"concept_label\", \"card_type\", \"body\", \"label\", \"visual_request\"}. Use the retrieve \
tool to ground content in known facts.";

const FACTS_INSTRUCTIONS: &str = "You receive transcript windows for a live event. Extract \
durable factual claims and respond with a JSON object {\"facts\": [{\"key\", \"value\", \
\"confidence\"}]}. Reuse keys for claims about the same subject.";

fn retrieve_tool() -> ToolSpec {
    ToolSpec {
        name: "retrieve".to_string(),
        description: "Look up known facts and prior cards for this event".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "top_k": { "type": "integer", "minimum": 1, "maximum": 25 }
            },
            "required": ["query"]
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeStatus {
    Running,
    Paused,
    Stopped,
}

impl RuntimeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RuntimeStatus::Running => "running",
            RuntimeStatus::Paused => "paused",
            RuntimeStatus::Stopped => "stopped",
        }
    }
}

/// The in-memory bundle of live adapters for one event. Never persisted;
/// destroyed with the process, which is exactly why the health poller exists.
#[derive(Clone)]
pub struct EventRuntime {
    pub event_id: String,
    pub agent_id: String,
    pub status: RuntimeStatus,
    pub adapters: HashMap<SessionRole, Arc<SessionAdapter>>,
    pub router: Arc<EventRouter>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RuntimeSnapshot {
    pub event_id: String,
    pub status: RuntimeStatus,
    pub sessions: Vec<SessionSnapshot>,
}

/// Process-wide owner of live event runtimes. Injectable, not a singleton:
/// tests instantiate isolated registries.
///
/// All transitions initiated here are idempotent, so the health poller and
/// user triggers can race each other without duplicating connections.
pub struct RuntimeRegistry {
    runtimes: Mutex<HashMap<String, EventRuntime>>,
    store: Arc<SessionStore>,
    push: PushHub,
    templates: Arc<TemplateRegistry>,
    connector: Arc<dyn Connector>,
    stateless: Arc<StatelessClient>,
    retrieval: Arc<Retrieval>,
    provider: ProviderConfig,
}

impl RuntimeRegistry {
    pub fn new(
        store: Arc<SessionStore>,
        push: PushHub,
        templates: Arc<TemplateRegistry>,
        connector: Arc<dyn Connector>,
        stateless: Arc<StatelessClient>,
        provider: ProviderConfig,
    ) -> Self {
        let retrieval = Arc::new(Retrieval::new(store.clone()));
        Self {
            runtimes: Mutex::new(HashMap::new()),
            store,
            push,
            templates,
            connector,
            stateless,
            retrieval,
            provider,
        }
    }

    pub fn store(&self) -> Arc<SessionStore> {
        self.store.clone()
    }

    /// Pure lookup; `None` when no runtime exists for the event.
    pub async fn get_runtime(&self, event_id: &str) -> Option<EventRuntime> {
        self.runtimes.lock().await.get(event_id).cloned()
    }

    pub async fn snapshot(&self, event_id: &str) -> Option<RuntimeSnapshot> {
        let runtime = self.get_runtime(event_id).await?;
        let mut sessions = Vec::new();
        for adapter in runtime.adapters.values() {
            sessions.push(adapter.status().await);
        }
        sessions.sort_by_key(|s| s.role.as_str());
        Some(RuntimeSnapshot {
            event_id: runtime.event_id,
            status: runtime.status,
            sessions,
        })
    }

    /// Build or rebuild the runtime for an event. Idempotent per role: an
    /// already-connected role is left alone, so overlapping poller ticks and
    /// user triggers cannot stack duplicate connections.
    ///
    /// Per-role connect failures are isolated; one role failing never stops
    /// the other two from starting. Only top-level store failures propagate.
    pub async fn start_event(&self, event_id: &str, agent_id: &str) -> Result<()> {
        let agent = self.resolve_agent(event_id, agent_id).await?;

        let mut sessions = self.store.get_sessions_for_event(event_id).await?;
        if sessions.is_empty() {
            self.seed_sessions(event_id, &agent.agent_id).await?;
            sessions = self.store.get_sessions_for_event(event_id).await?;
        }

        let mut runtimes = self.runtimes.lock().await;
        let runtime = runtimes.entry(event_id.to_string()).or_insert_with(|| {
            let router = Arc::new(EventRouter::new(
                event_id.to_string(),
                self.store.clone(),
                self.push.clone(),
                self.templates.clone(),
                self.stateless.clone(),
                self.stateless_model(&agent),
            ));
            EventRuntime {
                event_id: event_id.to_string(),
                agent_id: agent.agent_id.clone(),
                status: RuntimeStatus::Stopped,
                adapters: HashMap::new(),
                router,
            }
        });

        for row in &sessions {
            if row.status != SessionStatus::Active.as_str() {
                continue;
            }
            let Some(role) = row.role_enum() else {
                warn!("Session row with unknown role '{}', skipping", row.role);
                continue;
            };
            // Stateless sessions hold no persistent connection; nothing to
            // construct for them.
            if row.transport_enum() != Some(Transport::Realtime) {
                continue;
            }

            if let Some(adapter) = runtime.adapters.get(&role) {
                if adapter.is_active().await {
                    continue;
                }
                match adapter.resume().await {
                    Ok(()) => {
                        self.note_connected(event_id, role, adapter).await;
                        continue;
                    }
                    Err(e) => {
                        warn!(
                            "Resume failed for {}/{}: {}",
                            event_id,
                            role.as_str(),
                            e
                        );
                        if is_terminal_connect_error(&e) {
                            self.mark_session_error(event_id, role).await;
                        }
                        continue;
                    }
                }
            }

            let adapter = Arc::new(SessionAdapter::new(
                event_id.to_string(),
                role,
                self.connector.clone(),
                self.session_config(role, &agent),
                self.handler_for(role, event_id),
                runtime.router.clone(),
            ));

            match adapter.connect().await {
                Ok(psid) => {
                    if let Err(e) = self.store.record_connection(event_id, role, &psid).await {
                        warn!("Connection bookkeeping failed: {}", e);
                    }
                    runtime.router.register_sender(role, adapter.sender()).await;
                    runtime.adapters.insert(role, adapter);
                }
                Err(e) => {
                    warn!(
                        "Connect failed for {}/{}: {}",
                        event_id,
                        role.as_str(),
                        e
                    );
                    if is_terminal_connect_error(&e) {
                        self.mark_session_error(event_id, role).await;
                    }
                    // Role left absent; the health poller retries on its
                    // normal cadence.
                }
            }
        }

        runtime.status = RuntimeStatus::Running;
        let agent_id = runtime.agent_id.clone();
        drop(runtimes);

        if let Err(e) = self
            .store
            .update_agent_status(&agent_id, AgentStatus::Active)
            .await
        {
            warn!("Agent status update failed: {}", e);
        }
        if let Err(e) = self.store.update_agent_stage(&agent_id, Some("live")).await {
            warn!("Agent stage update failed: {}", e);
        }
        self.push.publish(
            PushKind::Connected,
            event_id,
            serde_json::json!({ "status": "running" }),
        );
        info!("Runtime running for event {}", event_id);
        Ok(())
    }

    pub async fn pause_event(&self, event_id: &str) -> Result<()> {
        {
            let mut runtimes = self.runtimes.lock().await;
            if let Some(runtime) = runtimes.get_mut(event_id) {
                for adapter in runtime.adapters.values() {
                    adapter.pause().await;
                }
                runtime.status = RuntimeStatus::Paused;
            }
        }

        for role in SessionRole::ALL {
            if let Ok(Some(row)) = self.store.get_session(event_id, role).await
                && row.status == SessionStatus::Active.as_str()
                && let Err(e) = self
                    .store
                    .update_session_status(event_id, role, SessionStatus::Paused)
                    .await
            {
                warn!("Session pause update failed: {}", e);
            }
        }
        if let Some(agent) = self.store.get_agent_for_event(event_id).await? {
            self.store
                .update_agent_status(&agent.agent_id, AgentStatus::Paused)
                .await?;
        }

        self.push.publish(
            PushKind::AgentSessionEnrichment,
            event_id,
            serde_json::json!({ "status": "paused" }),
        );
        info!("Event {} paused", event_id);
        Ok(())
    }

    pub async fn resume_event(&self, event_id: &str) -> Result<()> {
        for role in SessionRole::ALL {
            if let Ok(Some(row)) = self.store.get_session(event_id, role).await
                && row.status == SessionStatus::Paused.as_str()
                && let Err(e) = self
                    .store
                    .update_session_status(event_id, role, SessionStatus::Active)
                    .await
            {
                warn!("Session resume update failed: {}", e);
            }
        }

        let existing = self.get_runtime(event_id).await;
        match existing {
            Some(runtime) => {
                for (role, adapter) in &runtime.adapters {
                    match adapter.resume().await {
                        Ok(()) => self.note_connected(event_id, *role, adapter).await,
                        Err(e) => warn!(
                            "Resume failed for {}/{}: {}",
                            event_id,
                            role.as_str(),
                            e
                        ),
                    }
                }
                let mut runtimes = self.runtimes.lock().await;
                if let Some(rt) = runtimes.get_mut(event_id) {
                    rt.status = RuntimeStatus::Running;
                }
                if let Some(agent) = self.store.get_agent_for_event(event_id).await? {
                    self.store
                        .update_agent_status(&agent.agent_id, AgentStatus::Active)
                        .await?;
                }
            }
            None => {
                // Process restarted while paused; rebuild from the store.
                let agent = self
                    .store
                    .get_agent_for_event(event_id)
                    .await?
                    .ok_or_else(|| anyhow!("no agent for event {}", event_id))?;
                self.start_event(event_id, &agent.agent_id).await?;
            }
        }

        self.push.publish(
            PushKind::AgentSessionEnrichment,
            event_id,
            serde_json::json!({ "status": "running" }),
        );
        info!("Event {} resumed", event_id);
        Ok(())
    }

    /// Tear down the runtime and clear the registry entry. Session rows move
    /// to closed; checkpoints stay put for a later restart.
    pub async fn close_event(&self, event_id: &str) -> Result<()> {
        let removed = self.runtimes.lock().await.remove(event_id);
        if let Some(runtime) = removed {
            for (role, adapter) in &runtime.adapters {
                adapter.close().await;
                runtime.router.deregister_sender(*role).await;
            }
        }

        for role in SessionRole::ALL {
            if let Ok(Some(row)) = self.store.get_session(event_id, role).await
                && row.status != SessionStatus::Error.as_str()
                && let Err(e) = self
                    .store
                    .update_session_status(event_id, role, SessionStatus::Closed)
                    .await
            {
                warn!("Session close update failed: {}", e);
            }
        }
        if let Some(agent) = self.store.get_agent_for_event(event_id).await? {
            self.store
                .update_agent_status(&agent.agent_id, AgentStatus::Ended)
                .await?;
            self.store
                .update_agent_stage(&agent.agent_id, Some("post_event"))
                .await?;
        }

        info!("Event {} closed", event_id);
        Ok(())
    }

    async fn resolve_agent(&self, event_id: &str, agent_id: &str) -> Result<AgentRecord> {
        if let Some(agent) = self.store.get_agent(agent_id).await? {
            return Ok(agent);
        }
        if let Some(agent) = self.store.get_agent_for_event(event_id).await? {
            return Ok(agent);
        }
        self.store
            .create_agent(
                agent_id,
                event_id,
                &self.provider.realtime_model,
                &self.provider.stateless_model,
            )
            .await?;
        self.store
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| anyhow!("agent {} vanished after create", agent_id))
    }

    async fn seed_sessions(&self, event_id: &str, agent_id: &str) -> Result<()> {
        self.store
            .create_session(event_id, agent_id, SessionRole::Transcript, Transport::Realtime)
            .await?;
        self.store
            .create_session(event_id, agent_id, SessionRole::Cards, Transport::Realtime)
            .await?;
        self.store
            .create_session(event_id, agent_id, SessionRole::Facts, Transport::Stateless)
            .await?;
        Ok(())
    }

    async fn note_connected(&self, event_id: &str, role: SessionRole, adapter: &SessionAdapter) {
        let snapshot = adapter.status().await;
        if let Some(psid) = snapshot.provider_session_id
            && let Err(e) = self.store.record_connection(event_id, role, &psid).await
        {
            warn!("Connection bookkeeping failed: {}", e);
        }
    }

    async fn mark_session_error(&self, event_id: &str, role: SessionRole) {
        if let Err(e) = self
            .store
            .update_session_status(event_id, role, SessionStatus::Error)
            .await
        {
            warn!("Session error-status update failed: {}", e);
        }
    }

    fn stateless_model(&self, agent: &AgentRecord) -> String {
        if agent.stateless_model.is_empty() {
            self.provider.stateless_model.clone()
        } else {
            agent.stateless_model.clone()
        }
    }

    fn session_config(&self, role: SessionRole, agent: &AgentRecord) -> SessionConfig {
        let model = if agent.realtime_model.is_empty() {
            self.provider.realtime_model.clone()
        } else {
            agent.realtime_model.clone()
        };
        let (instructions, tools) = match role {
            SessionRole::Transcript => (TRANSCRIPT_INSTRUCTIONS, Vec::new()),
            SessionRole::Cards => (CARDS_INSTRUCTIONS, vec![retrieve_tool()]),
            SessionRole::Facts => (FACTS_INSTRUCTIONS, vec![retrieve_tool()]),
        };
        SessionConfig {
            model,
            instructions: instructions.to_string(),
            tools,
            modality: OutputModality::Text,
            max_output_tokens: self.provider.max_output_tokens,
        }
    }

    fn handler_for(&self, role: SessionRole, event_id: &str) -> Arc<dyn AgentHandler> {
        match role {
            SessionRole::Transcript => Arc::new(TranscriptHandler::new()),
            SessionRole::Cards => Arc::new(CardsHandler::new(
                event_id.to_string(),
                self.retrieval.clone(),
            )),
            SessionRole::Facts => Arc::new(FactsHandler::new(
                event_id.to_string(),
                self.retrieval.clone(),
            )),
        }
    }
}

#[cfg(test)]
mod tests;
