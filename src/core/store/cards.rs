use anyhow::{Result, anyhow};
use rusqlite::params;

use super::SessionStore;
use super::types::{CardRecord, CardType};

fn map_card_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CardRecord> {
    Ok(CardRecord {
        card_id: row.get(0)?,
        event_id: row.get(1)?,
        concept_id: row.get(2)?,
        concept_label: row.get(3)?,
        template_id: row.get(4)?,
        card_type: row.get(5)?,
        body: row.get(6)?,
        label: row.get(7)?,
        visual_request: row.get(8)?,
        active: row.get::<_, i64>(9)? != 0,
        created_at: row.get(10)?,
    })
}

const CARD_COLUMNS: &str = "card_id, event_id, concept_id, concept_label, template_id, \
     card_type, body, label, visual_request, active, created_at";

/// Which of {body, label, visual_request} must be present vs null is fixed by
/// the card type. Returns the violated rule, or None for a well-formed card.
pub fn card_shape_violation(
    card_type: CardType,
    body: Option<&str>,
    label: Option<&str>,
    visual_request: Option<&str>,
) -> Option<&'static str> {
    match card_type {
        CardType::Text => {
            if body.is_none() {
                Some("text card requires a body")
            } else if label.is_some() || visual_request.is_some() {
                Some("text card must not carry a label or visual request")
            } else {
                None
            }
        }
        CardType::TextVisual => {
            if body.is_none() || label.is_none() {
                Some("text_visual card requires body and label")
            } else {
                None
            }
        }
        CardType::Visual => {
            if visual_request.is_none() {
                Some("visual card requires a visual request")
            } else if body.is_some() {
                Some("visual card must not carry a body")
            } else {
                None
            }
        }
    }
}

pub struct NewCard<'a> {
    pub event_id: &'a str,
    pub concept_id: &'a str,
    pub concept_label: &'a str,
    pub template_id: &'a str,
    pub card_type: CardType,
    pub body: Option<String>,
    pub label: Option<String>,
    pub visual_request: Option<String>,
}

impl SessionStore {
    /// Persist an emitted card. Shape violations are rejected here, before
    /// anything reaches the table, so no malformed card is ever observable
    /// by the front end.
    pub async fn insert_card(&self, card: NewCard<'_>, actor: &str) -> Result<CardRecord> {
        if let Some(violation) = card_shape_violation(
            card.card_type,
            card.body.as_deref(),
            card.label.as_deref(),
            card.visual_request.as_deref(),
        ) {
            return Err(anyhow!(
                "card rejected for concept '{}': {}",
                card.concept_id,
                violation
            ));
        }

        let card_id = uuid::Uuid::new_v4().to_string();
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO cards
                (card_id, event_id, concept_id, concept_label, template_id, card_type,
                 body, label, visual_request, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1)",
            params![
                card_id,
                card.event_id,
                card.concept_id,
                card.concept_label,
                card.template_id,
                card.card_type.as_str(),
                card.body,
                card.label,
                card.visual_request
            ],
        )?;

        let rec = db.query_row(
            &format!("SELECT {CARD_COLUMNS} FROM cards WHERE card_id = ?1"),
            params![card_id],
            map_card_row,
        )?;

        db.execute(
            "INSERT INTO card_audit (card_id, event_id, action, before_json, after_json, actor)
             VALUES (?1, ?2, 'create', NULL, ?3, ?4)",
            params![card_id, card.event_id, serde_json::to_string(&rec)?, actor],
        )?;

        Ok(rec)
    }

    pub async fn deactivate_card(&self, card_id: &str, actor: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let existing = {
            let mut stmt = db.prepare(&format!(
                "SELECT {CARD_COLUMNS} FROM cards WHERE card_id = ?1 AND active = 1 LIMIT 1"
            ))?;
            let mut rows = stmt.query(params![card_id])?;
            match rows.next()? {
                Some(row) => Some(map_card_row(row)?),
                None => None,
            }
        };
        let Some(prev) = existing else {
            return Ok(false);
        };

        db.execute(
            "UPDATE cards SET active = 0 WHERE card_id = ?1",
            params![card_id],
        )?;
        db.execute(
            "INSERT INTO card_audit (card_id, event_id, action, before_json, after_json, actor)
             VALUES (?1, ?2, 'deactivate', ?3, NULL, ?4)",
            params![card_id, prev.event_id, serde_json::to_string(&prev)?, actor],
        )?;
        Ok(true)
    }

    pub async fn list_cards_for_event(&self, event_id: &str, limit: usize) -> Result<Vec<CardRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {CARD_COLUMNS} FROM cards
             WHERE event_id = ?1 AND active = 1 ORDER BY created_at DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![event_id, limit as i64], map_card_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub async fn list_card_ids_for_concept(
        &self,
        event_id: &str,
        concept_id: &str,
    ) -> Result<Vec<String>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT card_id FROM cards
             WHERE event_id = ?1 AND concept_id = ?2 AND active = 1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![event_id, concept_id], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Feeds the summary template's "has prior related cards" predicate.
    pub async fn count_cards_for_concept(&self, event_id: &str, concept_id: &str) -> Result<i64> {
        let db = self.db.lock().await;
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM cards WHERE event_id = ?1 AND concept_id = ?2 AND active = 1",
            params![event_id, concept_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
