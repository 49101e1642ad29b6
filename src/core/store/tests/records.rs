use crate::core::store::SessionStore;
use crate::core::store::cards::{NewCard, card_shape_violation};
use crate::core::store::types::{CardType, SessionRole, SessionStatus, Transport};

fn store() -> SessionStore {
    SessionStore::open_in_memory().expect("in-memory store")
}

#[tokio::test]
async fn on_disk_store_creates_its_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested");
    let store = SessionStore::new(&path).await.unwrap();
    assert!(store.db_path().exists());
}

#[tokio::test]
async fn checkpoint_never_regresses() {
    let store = store();
    let role = SessionRole::Transcript;

    assert_eq!(store.advance_checkpoint("evt", role, 5).await.unwrap(), 5);
    // A replayed segment after reconnect must not move the mark backward.
    assert_eq!(store.advance_checkpoint("evt", role, 3).await.unwrap(), 5);
    assert_eq!(store.advance_checkpoint("evt", role, 5).await.unwrap(), 5);
    assert_eq!(store.advance_checkpoint("evt", role, 9).await.unwrap(), 9);
    assert_eq!(store.get_checkpoint("evt", role).await.unwrap(), 9);
}

#[tokio::test]
async fn checkpoints_are_independent_per_role() {
    let store = store();
    store
        .advance_checkpoint("evt", SessionRole::Transcript, 10)
        .await
        .unwrap();
    store
        .advance_checkpoint("evt", SessionRole::Facts, 4)
        .await
        .unwrap();

    assert_eq!(
        store.get_checkpoint("evt", SessionRole::Transcript).await.unwrap(),
        10
    );
    assert_eq!(store.get_checkpoint("evt", SessionRole::Facts).await.unwrap(), 4);
    assert_eq!(store.get_checkpoint("evt", SessionRole::Cards).await.unwrap(), 0);
}

#[tokio::test]
async fn fact_upsert_merges_by_key_instead_of_duplicating() {
    let store = store();

    let first = store
        .upsert_fact("evt", "speaker_name", "Dr. Chen", 0.7, 3, "facts")
        .await
        .unwrap();
    let second = store
        .upsert_fact("evt", "speaker_name", "Dr. Alice Chen", 0.9, 8, "facts")
        .await
        .unwrap();

    assert_eq!(first.fact_id, second.fact_id);
    assert_eq!(second.value, "Dr. Alice Chen");
    assert_eq!(second.last_seen_seq, 8);

    let facts = store.list_active_facts("evt").await.unwrap();
    assert_eq!(facts.len(), 1);
}

#[tokio::test]
async fn fact_mutations_leave_an_audit_trail() {
    let store = store();
    store
        .upsert_fact("evt", "venue", "Hall B", 0.8, 1, "facts")
        .await
        .unwrap();
    store
        .upsert_fact("evt", "venue", "Hall C", 0.9, 2, "facts")
        .await
        .unwrap();
    store.deactivate_fact("evt", "venue", "facts").await.unwrap();
    store
        .upsert_fact("evt", "venue", "Hall D", 0.9, 3, "facts")
        .await
        .unwrap();

    let trail = store.list_fact_audit("evt").await.unwrap();
    let actions: Vec<&str> = trail.iter().map(|a| a.action.as_str()).collect();
    assert_eq!(actions, vec!["create", "update", "deactivate", "reactivate"]);
    assert!(trail[1].before_json.is_some());
    assert!(trail.iter().all(|a| a.actor == "facts"));
}

#[tokio::test]
async fn fact_deactivate_then_upsert_reactivates() {
    let store = store();
    store
        .upsert_fact("evt", "venue", "Hall B", 0.8, 1, "facts")
        .await
        .unwrap();
    assert!(store.deactivate_fact("evt", "venue", "facts").await.unwrap());
    assert!(store.list_active_facts("evt").await.unwrap().is_empty());

    let revived = store
        .upsert_fact("evt", "venue", "Hall C", 0.9, 5, "facts")
        .await
        .unwrap();
    assert!(revived.active);
    assert_eq!(store.list_active_facts("evt").await.unwrap().len(), 1);
}

#[test]
fn card_shape_rules_per_type() {
    // text: body only
    assert!(card_shape_violation(CardType::Text, Some("b"), None, None).is_none());
    assert!(card_shape_violation(CardType::Text, None, None, None).is_some());
    assert!(card_shape_violation(CardType::Text, Some("b"), Some("l"), None).is_some());
    assert!(card_shape_violation(CardType::Text, Some("b"), None, Some("v")).is_some());

    // text_visual: body and label
    assert!(card_shape_violation(CardType::TextVisual, Some("b"), Some("l"), None).is_none());
    assert!(card_shape_violation(CardType::TextVisual, Some("b"), None, None).is_some());

    // visual: visual request, no body
    assert!(card_shape_violation(CardType::Visual, None, None, Some("v")).is_none());
    assert!(card_shape_violation(CardType::Visual, Some("b"), None, Some("v")).is_some());
    assert!(card_shape_violation(CardType::Visual, None, None, None).is_some());
}

#[tokio::test]
async fn malformed_card_is_rejected_before_persistence() {
    let store = store();
    let result = store
        .insert_card(
            NewCard {
                event_id: "evt",
                concept_id: "c1",
                concept_label: "Vector clock",
                template_id: "definition",
                card_type: CardType::Text,
                body: None,
                label: Some("stray label".to_string()),
                visual_request: None,
            },
            "cards",
        )
        .await;
    assert!(result.is_err());
    assert!(store.list_cards_for_event("evt", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn well_formed_card_persists_with_audit() {
    let store = store();
    let rec = store
        .insert_card(
            NewCard {
                event_id: "evt",
                concept_id: "c1",
                concept_label: "Vector clock",
                template_id: "definition",
                card_type: CardType::Text,
                body: Some("A logical clock for partial ordering.".to_string()),
                label: None,
                visual_request: None,
            },
            "cards",
        )
        .await
        .unwrap();
    assert_eq!(rec.card_type, "text");
    assert!(rec.active);

    assert_eq!(store.count_cards_for_concept("evt", "c1").await.unwrap(), 1);
    assert_eq!(
        store.list_card_ids_for_concept("evt", "c1").await.unwrap(),
        vec![rec.card_id.clone()]
    );

    assert!(store.deactivate_card(&rec.card_id, "cards").await.unwrap());
    assert_eq!(store.count_cards_for_concept("evt", "c1").await.unwrap(), 0);
}

#[tokio::test]
async fn active_realtime_query_excludes_stateless_and_paused() {
    let store = store();
    store.create_agent("agent-1", "evt", "rt-model", "sl-model").await.unwrap();
    store
        .create_session("evt", "agent-1", SessionRole::Transcript, Transport::Realtime)
        .await
        .unwrap();
    store
        .create_session("evt", "agent-1", SessionRole::Cards, Transport::Realtime)
        .await
        .unwrap();
    store
        .create_session("evt", "agent-1", SessionRole::Facts, Transport::Stateless)
        .await
        .unwrap();

    store
        .update_session_status("evt", SessionRole::Cards, SessionStatus::Paused)
        .await
        .unwrap();

    let rows = store.list_active_realtime_sessions().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].role, "transcript");
}

#[tokio::test]
async fn record_connection_bumps_counter_and_identity() {
    let store = store();
    store.create_agent("agent-1", "evt", "", "").await.unwrap();
    store
        .create_session("evt", "agent-1", SessionRole::Transcript, Transport::Realtime)
        .await
        .unwrap();

    store
        .record_connection("evt", SessionRole::Transcript, "prov-1")
        .await
        .unwrap();
    store
        .record_connection("evt", SessionRole::Transcript, "prov-2")
        .await
        .unwrap();

    let row = store
        .get_session("evt", SessionRole::Transcript)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.connection_count, 2);
    assert_eq!(row.provider_session_id.as_deref(), Some("prov-2"));
    assert!(row.last_connected_at.is_some());
}
