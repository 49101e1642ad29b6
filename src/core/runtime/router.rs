use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::core::handlers::{
    CardPayload, DomainEvent, FactClaim, HandlerOutcome, normalize_fact_key,
};
use crate::core::provider::protocol::ClientMessage;
use crate::core::provider::stateless::StatelessClient;
use crate::core::push::{PushHub, PushKind};
use crate::core::session::OutcomeRouter;
use crate::core::store::SessionStore;
use crate::core::store::cards::NewCard;
use crate::core::store::types::{CardType, SessionRole, SessionStatus, Transport};
use crate::core::templates::TemplateRegistry;
use crate::core::templates::types::TriggerContext;

const PENDING_TRIGGER_CAP: usize = 32;

const FACTS_EXTRACTION_INSTRUCTIONS: &str = "Extract durable factual claims from the transcript \
window. Respond with a JSON object: {\"facts\": [{\"key\": snake_case_identifier, \"value\": \
claim text, \"confidence\": 0.0-1.0}]}. Reuse keys for claims about the same subject.";

/// Per-event plumbing between handlers and the durable stores: checkpoints,
/// trigger forwarding, template selection, fact merging, push fanout.
///
/// The single writer discipline lives here: handlers emit domain events, the
/// router is the only path from those events to checkpoint/fact/card rows.
pub struct EventRouter {
    event_id: String,
    store: Arc<SessionStore>,
    push: PushHub,
    templates: Arc<TemplateRegistry>,
    stateless: Arc<StatelessClient>,
    stateless_model: String,
    senders: Mutex<HashMap<SessionRole, mpsc::Sender<ClientMessage>>>,
    pending_triggers: Mutex<VecDeque<TriggerContext>>,
}

impl EventRouter {
    pub fn new(
        event_id: String,
        store: Arc<SessionStore>,
        push: PushHub,
        templates: Arc<TemplateRegistry>,
        stateless: Arc<StatelessClient>,
        stateless_model: String,
    ) -> Self {
        Self {
            event_id,
            store,
            push,
            templates,
            stateless,
            stateless_model,
            senders: Mutex::new(HashMap::new()),
            pending_triggers: Mutex::new(VecDeque::new()),
        }
    }

    /// (Re)register a role's outbound handle. Called whenever the registry
    /// wires or rebuilds an adapter.
    pub async fn register_sender(&self, role: SessionRole, sender: mpsc::Sender<ClientMessage>) {
        self.senders.lock().await.insert(role, sender);
    }

    pub async fn deregister_sender(&self, role: SessionRole) {
        self.senders.lock().await.remove(&role);
    }

    async fn send_to(&self, role: SessionRole, text: String) {
        let sender = self.senders.lock().await.get(&role).cloned();
        match sender {
            Some(tx) => {
                if tx.send(ClientMessage::Input { text }).await.is_err() {
                    warn!(
                        "Outbound queue for {}/{} is gone",
                        self.event_id,
                        role.as_str()
                    );
                }
            }
            None => debug!(
                "No live {} channel for event {}, dropping forward",
                role.as_str(),
                self.event_id
            ),
        }
    }

    async fn on_trigger(&self, mut cx: TriggerContext) {
        if !cx.is_well_formed() {
            debug!("Skipping malformed trigger for event {}", self.event_id);
            return;
        }

        // Prior-card context comes from the durable record, not from whatever
        // the transcript model happened to claim.
        match self
            .store
            .list_card_ids_for_concept(&self.event_id, &cx.concept_id)
            .await
        {
            Ok(ids) => cx.prior_card_ids = ids,
            Err(e) => warn!("Prior-card lookup failed: {}", e),
        }

        {
            let mut pending = self.pending_triggers.lock().await;
            pending.push_back(cx.clone());
            while pending.len() > PENDING_TRIGGER_CAP {
                pending.pop_front();
            }
        }

        match serde_json::to_string(&cx) {
            Ok(json) => self.send_to(SessionRole::Cards, json).await,
            Err(e) => warn!("Trigger serialization failed: {}", e),
        }
    }

    async fn take_pending_trigger(&self, concept_id: &str) -> Option<TriggerContext> {
        let mut pending = self.pending_triggers.lock().await;
        if let Some(pos) = pending.iter().position(|cx| cx.concept_id == concept_id) {
            return pending.remove(pos);
        }
        pending.pop_front()
    }

    async fn on_card_candidate(&self, payload: CardPayload) {
        if CardType::from_card_type(&payload.card_type).is_none() {
            warn!(
                "Dropping card candidate with unknown card_type '{}'",
                payload.card_type
            );
            return;
        }

        let Some(cx) = self.take_pending_trigger(&payload.concept_id).await else {
            debug!(
                "Card candidate for '{}' without a trigger context, suppressing",
                payload.concept_id
            );
            return;
        };

        let Some(selection) = self.templates.select(&cx) else {
            info!(
                "No eligible template for '{}', suppressing emission",
                cx.concept_label
            );
            return;
        };
        let plan = TemplateRegistry::plan(&selection);

        let card = NewCard {
            event_id: &self.event_id,
            concept_id: &payload.concept_id,
            concept_label: &payload.concept_label,
            template_id: plan.template_id,
            card_type: plan.card_type,
            body: payload.body,
            label: payload.label,
            visual_request: payload.visual_request,
        };

        match self.store.insert_card(card, "cards").await {
            Ok(rec) => {
                info!(
                    "Card emitted for '{}' via template '{}' ({})",
                    rec.concept_label, rec.template_id, selection.reason
                );
                match serde_json::to_value(&rec) {
                    Ok(json) => self.push.publish(PushKind::Card, &self.event_id, json),
                    Err(e) => warn!("Card serialization failed: {}", e),
                }
            }
            Err(e) => warn!("Card rejected: {}", e),
        }
    }

    async fn apply_facts(&self, claims: Vec<FactClaim>, through_seq: i64) {
        for claim in claims {
            match self
                .store
                .upsert_fact(
                    &self.event_id,
                    &claim.key,
                    &claim.value,
                    claim.confidence,
                    through_seq,
                    "facts",
                )
                .await
            {
                Ok(rec) => match serde_json::to_value(&rec) {
                    Ok(json) => self.push.publish(PushKind::FactUpdate, &self.event_id, json),
                    Err(e) => warn!("Fact serialization failed: {}", e),
                },
                Err(e) => warn!("Fact upsert failed for '{}': {}", claim.key, e),
            }
        }
    }

    async fn on_facts_window(&self, text: String, through_seq: i64) {
        let session = match self
            .store
            .get_session(&self.event_id, SessionRole::Facts)
            .await
        {
            Ok(Some(s)) => s,
            Ok(None) => {
                debug!("No facts session for event {}", self.event_id);
                return;
            }
            Err(e) => {
                warn!("Facts session lookup failed: {}", e);
                return;
            }
        };
        if session.status != SessionStatus::Active.as_str() {
            return;
        }

        match session.transport_enum() {
            Some(Transport::Realtime) => {
                self.send_to(SessionRole::Facts, text).await;
            }
            Some(Transport::Stateless) => {
                self.extract_stateless(&text, through_seq).await;
            }
            None => warn!(
                "Facts session for {} has unknown transport '{}'",
                self.event_id, session.transport
            ),
        }
    }

    async fn extract_stateless(&self, window: &str, through_seq: i64) {
        let response = match self
            .stateless
            .complete(&self.stateless_model, FACTS_EXTRACTION_INSTRUCTIONS, window)
            .await
        {
            Ok(v) => v,
            Err(e) => {
                warn!("Stateless fact extraction failed: {}", e);
                return;
            }
        };

        let claims: Vec<FactClaim> = match response.get("facts") {
            Some(list) => match serde_json::from_value::<Vec<FactClaim>>(list.clone()) {
                Ok(claims) => claims
                    .into_iter()
                    .map(|c| FactClaim {
                        key: normalize_fact_key(&c.key),
                        ..c
                    })
                    .filter(|c| !c.key.is_empty())
                    .collect(),
                Err(e) => {
                    warn!("Dropping malformed stateless facts payload: {}", e);
                    return;
                }
            },
            None => {
                debug!("Stateless extraction returned no facts field");
                return;
            }
        };

        self.apply_facts(claims, through_seq).await;

        if let Err(e) = self
            .store
            .advance_checkpoint(&self.event_id, SessionRole::Facts, through_seq)
            .await
        {
            warn!("Facts checkpoint advance failed: {}", e);
        }
    }

    async fn on_usage(&self, role: SessionRole, usage: serde_json::Value) {
        if let Err(e) = self
            .store
            .update_session_metrics(&self.event_id, role, &usage.to_string())
            .await
        {
            warn!("Metrics update failed for {}: {}", role.as_str(), e);
        }
        self.push.publish(
            PushKind::AgentSessionEnrichment,
            &self.event_id,
            serde_json::json!({ "role": role.as_str(), "usage": usage }),
        );
    }
}

#[async_trait]
impl OutcomeRouter for EventRouter {
    async fn route(&self, event_id: &str, role: SessionRole, outcome: HandlerOutcome) {
        if let Some(seq) = outcome.checkpoint
            && let Err(e) = self.store.advance_checkpoint(event_id, role, seq).await
        {
            warn!(
                "Checkpoint advance failed for {}/{}: {}",
                event_id,
                role.as_str(),
                e
            );
        }

        for event in outcome.events {
            match event {
                DomainEvent::Trigger(cx) => self.on_trigger(cx).await,
                DomainEvent::CardCandidate(payload) => self.on_card_candidate(payload).await,
                DomainEvent::Facts {
                    claims,
                    through_seq,
                } => self.apply_facts(claims, through_seq).await,
                DomainEvent::FactsWindow { text, through_seq } => {
                    self.on_facts_window(text, through_seq).await
                }
                DomainEvent::Usage(usage) => self.on_usage(role, usage).await,
            }
        }
    }
}
