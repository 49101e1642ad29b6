use std::time::Duration;

use crate::core::provider::testing::MockConnector;
use crate::core::runtime::RuntimeStatus;
use crate::core::store::types::{SessionRole, SessionStatus};

use super::test_registry;

#[tokio::test]
async fn start_event_twice_yields_one_adapter_per_active_role() {
    let connector = MockConnector::new();
    let registry = test_registry(connector.clone());

    registry.start_event("evt-1", "agent-1").await.unwrap();
    registry.start_event("evt-1", "agent-1").await.unwrap();

    let runtime = registry.get_runtime("evt-1").await.expect("runtime");
    assert_eq!(runtime.status, RuntimeStatus::Running);
    assert_eq!(runtime.adapters.len(), 2);
    // Two realtime roles, one socket each, no duplicates from the second call.
    assert_eq!(connector.open_count(), 2);
    assert_eq!(connector.live_count(), 2);
}

#[tokio::test]
async fn stateless_role_gets_no_persistent_adapter() {
    let connector = MockConnector::new();
    let registry = test_registry(connector.clone());

    registry.start_event("evt-1", "agent-1").await.unwrap();

    let runtime = registry.get_runtime("evt-1").await.expect("runtime");
    assert!(runtime.adapters.contains_key(&SessionRole::Transcript));
    assert!(runtime.adapters.contains_key(&SessionRole::Cards));
    assert!(!runtime.adapters.contains_key(&SessionRole::Facts));

    // The facts row exists and is active; it simply has no connection.
    let facts = registry
        .store()
        .get_session("evt-1", SessionRole::Facts)
        .await
        .unwrap()
        .expect("facts session row");
    assert_eq!(facts.status, "active");
    assert_eq!(facts.transport, "stateless");
}

#[tokio::test]
async fn per_role_connect_failure_does_not_abort_the_others() {
    let connector = MockConnector::new();
    // First open attempt (cards, in role order) fails transiently.
    connector
        .fail_next_open
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let registry = test_registry(connector.clone());

    registry.start_event("evt-1", "agent-1").await.unwrap();

    let runtime = registry.get_runtime("evt-1").await.expect("runtime");
    assert_eq!(runtime.status, RuntimeStatus::Running);
    assert_eq!(runtime.adapters.len(), 1);
    assert!(runtime.adapters.contains_key(&SessionRole::Transcript));

    // A transient failure must not flip the row to error; the poller retries.
    let cards = registry
        .store()
        .get_session("evt-1", SessionRole::Cards)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cards.status, "active");

    // The same idempotent entry point heals the missing role.
    registry.start_event("evt-1", "agent-1").await.unwrap();
    let runtime = registry.get_runtime("evt-1").await.expect("runtime");
    assert_eq!(runtime.adapters.len(), 2);
}

#[tokio::test]
async fn pause_then_resume_round_trips_store_and_runtime() {
    let connector = MockConnector::new();
    let registry = test_registry(connector.clone());

    registry.start_event("evt-1", "agent-1").await.unwrap();
    registry.pause_event("evt-1").await.unwrap();

    let runtime = registry.get_runtime("evt-1").await.expect("runtime");
    assert_eq!(runtime.status, RuntimeStatus::Paused);
    for role in [SessionRole::Transcript, SessionRole::Cards, SessionRole::Facts] {
        let row = registry
            .store()
            .get_session("evt-1", role)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, SessionStatus::Paused.as_str());
    }
    let agent = registry
        .store()
        .get_agent("agent-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(agent.status, "paused");

    registry.resume_event("evt-1").await.unwrap();
    let runtime = registry.get_runtime("evt-1").await.expect("runtime");
    assert_eq!(runtime.status, RuntimeStatus::Running);
    // Paused adapters had live channels; resuming them reconnects nothing.
    assert_eq!(connector.open_count(), 2);

    let agent = registry
        .store()
        .get_agent("agent-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(agent.status, "active");
}

#[tokio::test]
async fn close_event_clears_the_registry_entry() {
    let connector = MockConnector::new();
    let registry = test_registry(connector.clone());

    registry.start_event("evt-1", "agent-1").await.unwrap();
    registry
        .store()
        .advance_checkpoint("evt-1", SessionRole::Transcript, 42)
        .await
        .unwrap();

    registry.close_event("evt-1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(registry.get_runtime("evt-1").await.is_none());
    assert_eq!(connector.live_count(), 0);

    // Checkpoints survive a close; a later restart resumes where it left off.
    assert_eq!(
        registry
            .store()
            .get_checkpoint("evt-1", SessionRole::Transcript)
            .await
            .unwrap(),
        42
    );
}
