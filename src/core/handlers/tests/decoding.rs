use std::sync::Arc;

use crate::core::handlers::{
    AgentHandler, CardsHandler, DomainEvent, FactsHandler, TranscriptHandler, normalize_fact_key,
    parse_json_block,
};
use crate::core::provider::protocol::ClientMessage;
use crate::core::retrieval::Retrieval;
use crate::core::store::SessionStore;

fn retrieval() -> Arc<Retrieval> {
    Arc::new(Retrieval::new(Arc::new(
        SessionStore::open_in_memory().unwrap(),
    )))
}

#[test]
fn parse_json_block_finds_embedded_object() {
    let text = "Here is the payload: {\"a\": 1, \"b\": \"with } brace\"} trailing prose";
    let value = parse_json_block(text).expect("object");
    assert_eq!(value["a"], 1);
    assert_eq!(value["b"], "with } brace");
}

#[test]
fn parse_json_block_rejects_garbage() {
    assert!(parse_json_block("no object here").is_none());
    assert!(parse_json_block("{unterminated").is_none());
    assert!(parse_json_block("{\"broken\": }").is_none());
}

#[test]
fn fact_keys_normalize_to_snake_case() {
    assert_eq!(normalize_fact_key("Speaker Name"), "speaker_name");
    assert_eq!(normalize_fact_key("  Q&A start time! "), "q_a_start_time");
    assert_eq!(normalize_fact_key("already_snake"), "already_snake");
    assert_eq!(normalize_fact_key("---"), "");
}

#[tokio::test]
async fn transcript_segment_yields_checkpoint_and_triggers() {
    let handler = TranscriptHandler::new();
    let payload = r#"{"seq": 7, "segment": "welcome everyone", "triggers": [
        {"concept_id": "c1", "concept_label": "Vector clock", "match_source": "glossary"}
    ]}"#;

    let outcome = handler.on_text_done(payload, None).await;
    assert_eq!(outcome.checkpoint, Some(7));
    assert_eq!(outcome.events.len(), 1);
    match &outcome.events[0] {
        DomainEvent::Trigger(cx) => assert_eq!(cx.concept_id, "c1"),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn transcript_drops_malformed_fragment_without_checkpoint() {
    let handler = TranscriptHandler::new();
    let outcome = handler.on_text_done("not a payload at all", Some(9)).await;
    assert!(outcome.checkpoint.is_none());
    assert!(outcome.events.is_empty());
}

#[tokio::test]
async fn transcript_accumulates_deltas_until_done() {
    let handler = TranscriptHandler::new();
    handler.on_text_delta("{\"seq\": 2, \"segment\"", None).await;
    handler.on_text_delta(": \"split frame\"}", None).await;

    let outcome = handler.on_text_done("", None).await;
    assert_eq!(outcome.checkpoint, Some(2));
}

#[tokio::test]
async fn transcript_cuts_facts_window_every_five_segments() {
    let handler = TranscriptHandler::new();
    let mut windows = 0;
    for seq in 1..=10 {
        let payload = format!("{{\"seq\": {}, \"segment\": \"segment {}\"}}", seq, seq);
        let outcome = handler.on_text_done(&payload, None).await;
        windows += outcome
            .events
            .iter()
            .filter(|e| matches!(e, DomainEvent::FactsWindow { .. }))
            .count();
    }
    assert_eq!(windows, 2);
}

#[tokio::test]
async fn cards_handler_emits_candidate() {
    let handler = CardsHandler::new("evt".to_string(), retrieval());
    let payload = r#"{"concept_id": "c1", "concept_label": "Vector clock",
        "card_type": "text", "body": "A logical clock."}"#;

    let outcome = handler.on_text_done(payload, Some(4)).await;
    assert_eq!(outcome.checkpoint, Some(4));
    match &outcome.events[0] {
        DomainEvent::CardCandidate(card) => {
            assert_eq!(card.concept_id, "c1");
            assert_eq!(card.body.as_deref(), Some("A logical clock."));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn facts_handler_normalizes_and_filters_claims() {
    let handler = FactsHandler::new("evt".to_string(), retrieval());
    let payload = r#"{"facts": [
        {"key": "Speaker Name", "value": "Dr. Chen", "confidence": 0.9},
        {"key": "???", "value": "dropped for empty key"}
    ]}"#;

    let outcome = handler.on_text_done(payload, Some(12)).await;
    match &outcome.events[0] {
        DomainEvent::Facts { claims, through_seq } => {
            assert_eq!(*through_seq, 12);
            assert_eq!(claims.len(), 1);
            assert_eq!(claims[0].key, "speaker_name");
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn unknown_tool_is_answered_with_error_result() {
    let handler = FactsHandler::new("evt".to_string(), retrieval());
    let result = handler
        .on_tool_call("call-9", "unknown_capability", &serde_json::json!({}))
        .await;

    match result {
        ClientMessage::ToolResult { call_id, output } => {
            assert_eq!(call_id, "call-9");
            assert!(output.get("error").is_some());
            assert_eq!(output["results"], serde_json::json!([]));
        }
        other => panic!("unexpected message {:?}", other),
    }
}

#[tokio::test]
async fn retrieve_tool_returns_scored_hits() {
    let store = Arc::new(SessionStore::open_in_memory().unwrap());
    store
        .upsert_fact("evt", "venue", "The keynote is in Hall B", 0.9, 1, "facts")
        .await
        .unwrap();
    let handler = CardsHandler::new("evt".to_string(), Arc::new(Retrieval::new(store)));

    let result = handler
        .on_tool_call(
            "call-1",
            "retrieve",
            &serde_json::json!({ "query": "keynote hall", "top_k": 3 }),
        )
        .await;

    match result {
        ClientMessage::ToolResult { call_id, output } => {
            assert_eq!(call_id, "call-1");
            let hits = output["results"].as_array().expect("results array");
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0]["key"], "venue");
        }
        other => panic!("unexpected message {:?}", other),
    }
}
