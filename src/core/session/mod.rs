use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::handlers::{AgentHandler, HandlerOutcome, dispatch_event};
use crate::core::provider::protocol::{ClientMessage, SessionConfig};
use crate::core::provider::realtime::{ChannelState, Connector, DuplexConn};
use crate::core::store::types::SessionRole;

const OUTBOUND_BUFFER: usize = 64;

/// Inbound silence longer than this while active means the socket died
/// without a close frame; the pump tears the connection down itself.
pub const HEARTBEAT_STALE_SECS: u64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterState {
    Disconnected,
    Connecting,
    Active,
    Paused,
    Closing,
    Error,
}

impl AdapterState {
    pub fn as_str(self) -> &'static str {
        match self {
            AdapterState::Disconnected => "disconnected",
            AdapterState::Connecting => "connecting",
            AdapterState::Active => "active",
            AdapterState::Paused => "paused",
            AdapterState::Closing => "closing",
            AdapterState::Error => "error",
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionSnapshot {
    pub role: SessionRole,
    pub adapter_state: AdapterState,
    pub channel_state: ChannelState,
    pub is_active: bool,
    pub provider_session_id: Option<String>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

/// Applies handler outcomes: checkpoints, domain routing, pushes. Owned by
/// the orchestration layer so handlers and adapters stay free of durable
/// writes.
#[async_trait]
pub trait OutcomeRouter: Send + Sync {
    async fn route(&self, event_id: &str, role: SessionRole, outcome: HandlerOutcome);
}

struct Shared {
    state: Mutex<AdapterState>,
    channel_state: Mutex<ChannelState>,
    provider_session_id: Mutex<Option<String>>,
    last_activity: Mutex<Option<DateTime<Utc>>>,
}

/// Wraps one live duplex connection for a (event, role) pair.
///
/// State machine: disconnected → connecting → active ⇄ paused → closing →
/// disconnected, with error reachable from anywhere. `resume` re-runs the
/// connect sequence and is safe to call repeatedly: any prior socket is torn
/// down before a new one is opened.
pub struct SessionAdapter {
    pub role: SessionRole,
    pub event_id: String,
    connector: Arc<dyn Connector>,
    config: SessionConfig,
    handler: Arc<dyn AgentHandler>,
    router: Arc<dyn OutcomeRouter>,
    shared: Arc<Shared>,
    cancel: Mutex<Option<CancellationToken>>,
    out_tx: mpsc::Sender<ClientMessage>,
    out_rx: Arc<Mutex<mpsc::Receiver<ClientMessage>>>,
}

impl SessionAdapter {
    pub fn new(
        event_id: String,
        role: SessionRole,
        connector: Arc<dyn Connector>,
        config: SessionConfig,
        handler: Arc<dyn AgentHandler>,
        router: Arc<dyn OutcomeRouter>,
    ) -> Self {
        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_BUFFER);
        Self {
            role,
            event_id,
            connector,
            config,
            handler,
            router,
            shared: Arc::new(Shared {
                state: Mutex::new(AdapterState::Disconnected),
                channel_state: Mutex::new(ChannelState::Closed),
                provider_session_id: Mutex::new(None),
                last_activity: Mutex::new(None),
            }),
            cancel: Mutex::new(None),
            out_tx,
            out_rx: Arc::new(Mutex::new(out_rx)),
        }
    }

    /// Clone of the persistent outbound handle; survives reconnects.
    pub fn sender(&self) -> mpsc::Sender<ClientMessage> {
        self.out_tx.clone()
    }

    pub async fn status(&self) -> SessionSnapshot {
        let adapter_state = *self.shared.state.lock().await;
        SessionSnapshot {
            role: self.role,
            adapter_state,
            channel_state: *self.shared.channel_state.lock().await,
            is_active: adapter_state == AdapterState::Active,
            provider_session_id: self.shared.provider_session_id.lock().await.clone(),
            last_activity_at: *self.shared.last_activity.lock().await,
        }
    }

    pub async fn is_active(&self) -> bool {
        *self.shared.state.lock().await == AdapterState::Active
    }

    /// Run the connect sequence. No-op when already active. Any previous
    /// pump/socket is cancelled first, so repeated health-poll retries cannot
    /// stack duplicate connections.
    pub async fn connect(&self) -> Result<String> {
        {
            let state = self.shared.state.lock().await;
            if *state == AdapterState::Active {
                let psid = self.shared.provider_session_id.lock().await.clone();
                return Ok(psid.unwrap_or_default());
            }
        }

        *self.shared.state.lock().await = AdapterState::Connecting;
        self.teardown().await;

        let conn = match self.connector.open(&self.config).await {
            Ok(conn) => conn,
            Err(e) => {
                *self.shared.state.lock().await = AdapterState::Error;
                return Err(e);
            }
        };

        let psid = conn.provider_session_id().to_string();
        *self.shared.provider_session_id.lock().await = Some(psid.clone());
        *self.shared.channel_state.lock().await = ChannelState::Open;
        *self.shared.last_activity.lock().await = Some(Utc::now());

        let cancel = CancellationToken::new();
        *self.cancel.lock().await = Some(cancel.clone());
        self.spawn_pump(conn, cancel);

        *self.shared.state.lock().await = AdapterState::Active;
        info!(
            "Session {}/{} connected (provider session {})",
            self.event_id,
            self.role.as_str(),
            psid
        );
        Ok(psid)
    }

    /// Stop dispatching without discarding the provider-side session; the
    /// socket stays open and inbound events are dropped by the pump.
    pub async fn pause(&self) {
        let mut state = self.shared.state.lock().await;
        if *state == AdapterState::Active {
            *state = AdapterState::Paused;
        }
    }

    /// Active ⇒ no-op. Paused with a live channel ⇒ flip back. Anything else
    /// ⇒ full connect sequence (internally reconnects).
    pub async fn resume(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock().await;
            match *state {
                AdapterState::Active => return Ok(()),
                AdapterState::Paused => {
                    if *self.shared.channel_state.lock().await == ChannelState::Open {
                        *state = AdapterState::Active;
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        self.connect().await.map(|_| ())
    }

    pub async fn close(&self) {
        *self.shared.state.lock().await = AdapterState::Closing;
        self.teardown().await;
        *self.shared.state.lock().await = AdapterState::Disconnected;
    }

    async fn teardown(&self) {
        if let Some(cancel) = self.cancel.lock().await.take() {
            cancel.cancel();
        }
        *self.shared.channel_state.lock().await = ChannelState::Closed;
    }

    fn spawn_pump(&self, mut conn: Box<dyn DuplexConn>, cancel: CancellationToken) {
        let shared = self.shared.clone();
        let handler = self.handler.clone();
        let router = self.router.clone();
        let out_rx = self.out_rx.clone();
        let event_id = self.event_id.clone();
        let role = self.role;

        tokio::spawn(async move {
            // Exclusive for this pump's lifetime; a successor pump waits here
            // until the cancelled one unwinds.
            let mut out_rx = out_rx.lock().await;
            let stale_after = std::time::Duration::from_secs(HEARTBEAT_STALE_SECS);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        conn.close().await;
                        break;
                    }
                    maybe_msg = out_rx.recv() => {
                        let Some(msg) = maybe_msg else { break };
                        if let Err(e) = conn.send(&msg).await {
                            // Write-path failure: mark the channel closed but
                            // leave the declared state alone; the read path or
                            // the staleness check below confirms the death.
                            warn!("Send failed on {}/{}: {}", event_id, role.as_str(), e);
                            *shared.channel_state.lock().await = ChannelState::Closed;
                        }
                    }
                    event = conn.next_event() => {
                        let Some(event) = event else {
                            Self::note_channel_death(&shared, &event_id, role).await;
                            break;
                        };
                        // Re-check after the suspension point: a close racing
                        // this event must win.
                        if cancel.is_cancelled() {
                            conn.close().await;
                            break;
                        }
                        *shared.last_activity.lock().await = Some(Utc::now());
                        if *shared.state.lock().await == AdapterState::Paused {
                            continue;
                        }
                        let (outcome, tool_result) = dispatch_event(handler.as_ref(), event).await;
                        if let Some(msg) = tool_result
                            && let Err(e) = conn.send(&msg).await
                        {
                            warn!(
                                "Tool result send failed on {}/{}: {}",
                                event_id,
                                role.as_str(),
                                e
                            );
                            *shared.channel_state.lock().await = ChannelState::Closed;
                        }
                        router.route(&event_id, role, outcome).await;
                    }
                    _ = tokio::time::sleep(stale_after) => {
                        let stale = shared
                            .last_activity
                            .lock()
                            .await
                            .map(|t| Utc::now() - t > chrono::Duration::from_std(stale_after).unwrap_or_default())
                            .unwrap_or(true);
                        if stale && *shared.state.lock().await == AdapterState::Active {
                            warn!(
                                "No inbound traffic on {}/{} for {}s, tearing down",
                                event_id,
                                role.as_str(),
                                HEARTBEAT_STALE_SECS
                            );
                            conn.close().await;
                            Self::note_channel_death(&shared, &event_id, role).await;
                            break;
                        }
                    }
                }
            }
        });
    }

    async fn note_channel_death(shared: &Shared, event_id: &str, role: SessionRole) {
        *shared.channel_state.lock().await = ChannelState::Closed;
        let mut state = shared.state.lock().await;
        // A deliberate close/pause keeps its state; only an active adapter
        // is demoted, which is what re-arms the health poller's resume.
        if *state == AdapterState::Active {
            *state = AdapterState::Disconnected;
            warn!("Channel closed underneath {}/{}", event_id, role.as_str());
        }
    }
}

#[cfg(test)]
mod tests;
