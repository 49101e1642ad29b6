use std::sync::Arc;
use std::time::Duration;

use crate::core::provider::protocol::ClientMessage;
use crate::core::provider::realtime::ChannelState;
use crate::core::provider::testing::{MockConnector, MockFrame};
use crate::core::push::PushHub;
use crate::core::runtime::RuntimeStatus;
use crate::core::runtime::health::HealthPoller;
use crate::core::store::SessionStore;
use crate::core::store::types::{AgentStatus, SessionRole, Transport};

use super::{test_registry, test_registry_with};

#[tokio::test]
async fn tick_rebuilds_runtime_lost_to_a_restart() {
    let connector = MockConnector::new();
    let store = Arc::new(SessionStore::open_in_memory().unwrap());
    let push = PushHub::new(64);

    // Durable state says the event is live; nothing exists in memory, as
    // after a process restart.
    store.create_agent("agent-1", "evt-1", "", "").await.unwrap();
    store
        .update_agent_status("agent-1", AgentStatus::Active)
        .await
        .unwrap();
    store
        .create_session("evt-1", "agent-1", SessionRole::Transcript, Transport::Realtime)
        .await
        .unwrap();
    store
        .create_session("evt-1", "agent-1", SessionRole::Cards, Transport::Realtime)
        .await
        .unwrap();
    store
        .create_session("evt-1", "agent-1", SessionRole::Facts, Transport::Stateless)
        .await
        .unwrap();

    let registry = test_registry_with(connector.clone(), store, push.clone());
    assert!(registry.get_runtime("evt-1").await.is_none());

    let poller = HealthPoller::new(registry.clone(), push);
    poller.tick().await;

    let runtime = registry.get_runtime("evt-1").await.expect("rebuilt runtime");
    assert_eq!(runtime.status, RuntimeStatus::Running);
    assert_eq!(runtime.adapters.len(), 2);
    assert_eq!(connector.open_count(), 2);
}

#[tokio::test]
async fn tick_skips_events_whose_agent_is_not_active() {
    let connector = MockConnector::new();
    let store = Arc::new(SessionStore::open_in_memory().unwrap());
    let push = PushHub::new(64);

    // Session rows still say active, but a concurrent pause already moved the
    // agent; the poller must not fight it.
    store.create_agent("agent-1", "evt-1", "", "").await.unwrap();
    store
        .update_agent_status("agent-1", AgentStatus::Paused)
        .await
        .unwrap();
    store
        .create_session("evt-1", "agent-1", SessionRole::Transcript, Transport::Realtime)
        .await
        .unwrap();

    let registry = test_registry_with(connector.clone(), store, push.clone());
    let poller = HealthPoller::new(registry.clone(), push);
    poller.tick().await;

    assert!(registry.get_runtime("evt-1").await.is_none());
    assert_eq!(connector.open_count(), 0);
}

#[tokio::test]
async fn closed_inactive_adapter_gets_exactly_one_resume_per_tick() {
    let connector = MockConnector::new();
    // First connection in role order is cards; it dies immediately. The
    // transcript connection stays open and silent.
    connector.push_script(vec![MockFrame::Close]).await;
    let push = PushHub::new(64);
    let registry = test_registry_with(
        connector.clone(),
        Arc::new(SessionStore::open_in_memory().unwrap()),
        push.clone(),
    );

    registry.start_event("evt-1", "agent-1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let runtime = registry.get_runtime("evt-1").await.unwrap();
    let cards = runtime.adapters.get(&SessionRole::Cards).unwrap().clone();
    let snapshot = cards.status().await;
    assert_eq!(snapshot.channel_state, ChannelState::Closed);
    assert!(!snapshot.is_active);

    let poller = HealthPoller::new(registry.clone(), push);
    poller.tick().await;
    assert_eq!(connector.open_count(), 3);
    assert!(cards.is_active().await);

    // A healthy adapter is left alone on the next tick: no reconnect backlog.
    poller.tick().await;
    assert_eq!(connector.open_count(), 3);

    // The reconnect was recorded against the session row.
    let row = registry
        .store()
        .get_session("evt-1", SessionRole::Cards)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.connection_count, 2);
}

#[tokio::test]
async fn closed_but_reportedly_active_adapter_is_deferred() {
    let connector = MockConnector::new();
    let push = PushHub::new(64);
    let registry = test_registry_with(
        connector.clone(),
        Arc::new(SessionStore::open_in_memory().unwrap()),
        push.clone(),
    );

    registry.start_event("evt-1", "agent-1").await.unwrap();

    // Kill the write path only: the channel looks closed while the adapter
    // still declares itself active.
    connector
        .fail_sends
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let runtime = registry.get_runtime("evt-1").await.unwrap();
    let cards = runtime.adapters.get(&SessionRole::Cards).unwrap().clone();
    cards
        .sender()
        .send(ClientMessage::Input {
            text: "probe".to_string(),
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = cards.status().await;
    assert_eq!(snapshot.channel_state, ChannelState::Closed);
    assert!(snapshot.is_active);

    // The poller logs and defers instead of racing the adapter's own
    // detection; no new connection is opened.
    let poller = HealthPoller::new(registry.clone(), push);
    poller.tick().await;
    assert_eq!(connector.open_count(), 2);
}

#[tokio::test]
async fn checkpoints_survive_reconnect_cycles_without_regressing() {
    let connector = MockConnector::new();
    let registry = test_registry(connector.clone());

    registry.start_event("evt-1", "agent-1").await.unwrap();
    let store = registry.store();
    store
        .advance_checkpoint("evt-1", SessionRole::Transcript, 40)
        .await
        .unwrap();

    // Simulated replay after several resume/reconnect cycles: stale sequence
    // numbers arrive again and must not move the low-water-mark backward.
    for stale in [12, 40, 7] {
        store
            .advance_checkpoint("evt-1", SessionRole::Transcript, stale)
            .await
            .unwrap();
    }
    store
        .advance_checkpoint("evt-1", SessionRole::Transcript, 41)
        .await
        .unwrap();

    assert_eq!(
        store
            .get_checkpoint("evt-1", SessionRole::Transcript)
            .await
            .unwrap(),
        41
    );
}
