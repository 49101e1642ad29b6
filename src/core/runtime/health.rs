use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info, warn};

use crate::core::provider::realtime::{ChannelState, is_terminal_connect_error};
use crate::core::push::{PushHub, PushKind};
use crate::core::store::types::{AgentStatus, SessionRecord, SessionStatus};

use super::RuntimeRegistry;

/// Fixed-interval reconciliation between the durable session store and the
/// in-memory runtime registry.
///
/// A poll, not an event reaction: the failure modes it guards against
/// (process restart, silent socket death) produce no events. Both corrective
/// paths funnel through the registry's idempotent `start_event`/`resume`, so
/// overlapping ticks and user triggers are safe.
pub struct HealthPoller {
    registry: Arc<RuntimeRegistry>,
    push: PushHub,
    in_flight: AtomicBool,
}

impl HealthPoller {
    pub fn new(registry: Arc<RuntimeRegistry>, push: PushHub) -> Arc<Self> {
        Arc::new(Self {
            registry,
            push,
            in_flight: AtomicBool::new(false),
        })
    }

    pub async fn attach(self: &Arc<Self>, scheduler: &JobScheduler, interval_secs: u64) -> anyhow::Result<()> {
        let expr = format!("1/{} * * * * *", interval_secs.clamp(1, 59));
        let poller = self.clone();
        let job = Job::new_async(expr.as_str(), move |_uuid, mut _l| {
            let poller = poller.clone();
            Box::pin(async move {
                poller.tick().await;
            })
        })?;
        scheduler.add(job).await?;
        info!("Health poller attached ({}s interval)", interval_secs);
        Ok(())
    }

    /// One reconciliation pass. Never returns an error: store unavailability
    /// and per-event failures are logged and retried on the next tick.
    pub async fn tick(&self) {
        // Non-reentrant: a slow pass must not overlap the next firing.
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("Skipping health tick, previous pass still running");
            return;
        }

        let store = self.registry.store();
        let rows = match store.list_active_realtime_sessions().await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Health tick store query failed: {}", e);
                self.in_flight.store(false, Ordering::SeqCst);
                return;
            }
        };

        let mut by_event: BTreeMap<String, Vec<SessionRecord>> = BTreeMap::new();
        for row in rows {
            by_event.entry(row.event_id.clone()).or_default().push(row);
        }

        for (event_id, rows) in by_event {
            // Re-read the agent immediately before acting: a concurrent
            // user-triggered pause wins, we skip rather than fight it.
            let agent = match store.get_agent_for_event(&event_id).await {
                Ok(Some(agent)) => agent,
                Ok(None) => {
                    debug!("Active sessions without an agent for {}, skipping", event_id);
                    continue;
                }
                Err(e) => {
                    warn!("Agent lookup failed for {}: {}", event_id, e);
                    continue;
                }
            };
            if agent.status != AgentStatus::Active.as_str() {
                debug!(
                    "Agent for {} is '{}', leaving its sessions alone",
                    event_id, agent.status
                );
                continue;
            }

            self.reconcile_event(&event_id, &agent.agent_id, &rows).await;
        }

        self.in_flight.store(false, Ordering::SeqCst);
    }

    async fn reconcile_event(&self, event_id: &str, agent_id: &str, rows: &[SessionRecord]) {
        let Some(runtime) = self.registry.get_runtime(event_id).await else {
            // Process restart: the store says active, nothing lives in
            // memory. Rebuild from scratch.
            info!("No runtime for active event {}, rebuilding", event_id);
            if let Err(e) = self.registry.start_event(event_id, agent_id).await {
                warn!("Rebuild failed for {}: {}", event_id, e);
            }
            return;
        };

        let missing_role = rows.iter().any(|row| {
            row.role_enum()
                .map(|role| !runtime.adapters.contains_key(&role))
                .unwrap_or(false)
        });
        if missing_role {
            // Same create path as the trigger entry point: start_event is
            // idempotent per role, so this cannot duplicate the roles that
            // are already wired.
            if let Err(e) = self.registry.start_event(event_id, agent_id).await {
                warn!("Role rebuild failed for {}: {}", event_id, e);
            }
        }

        for row in rows {
            let Some(role) = row.role_enum() else { continue };
            let Some(adapter) = self
                .registry
                .get_runtime(event_id)
                .await
                .and_then(|rt| rt.adapters.get(&role).cloned())
            else {
                continue;
            };

            let snapshot = adapter.status().await;
            if snapshot.channel_state != ChannelState::Closed {
                continue;
            }

            if snapshot.is_active {
                // Declared mismatch: the adapter claims active over a closed
                // channel. Its internal heartbeat is expected to confirm and
                // correct this; racing it here risks duplicate sockets.
                warn!(
                    "{}/{} reports an active adapter over a closed channel, deferring",
                    event_id,
                    role.as_str()
                );
                continue;
            }

            debug!("Resuming {}/{} after channel loss", event_id, role.as_str());
            match adapter.resume().await {
                Ok(()) => {
                    let snapshot = adapter.status().await;
                    if let Some(psid) = snapshot.provider_session_id
                        && let Err(e) = self
                            .registry
                            .store()
                            .record_connection(event_id, role, &psid)
                            .await
                    {
                        warn!("Connection bookkeeping failed: {}", e);
                    }
                }
                Err(e) => {
                    warn!("Resume failed for {}/{}: {}", event_id, role.as_str(), e);
                    if is_terminal_connect_error(&e)
                        && let Err(e) = self
                            .registry
                            .store()
                            .update_session_status(event_id, role, SessionStatus::Error)
                            .await
                    {
                        warn!("Session error-status update failed: {}", e);
                    }
                }
            }
        }

        self.push.publish(
            PushKind::Heartbeat,
            event_id,
            serde_json::json!({ "reconciled_roles": rows.len() }),
        );
    }
}
