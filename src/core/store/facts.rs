use anyhow::Result;
use rusqlite::params;

use super::SessionStore;
use super::types::{AuditRecord, FactRecord};

fn map_fact_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FactRecord> {
    Ok(FactRecord {
        fact_id: row.get(0)?,
        event_id: row.get(1)?,
        key: row.get(2)?,
        value: row.get(3)?,
        confidence: row.get(4)?,
        last_seen_seq: row.get(5)?,
        active: row.get::<_, i64>(6)? != 0,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

const FACT_COLUMNS: &str =
    "fact_id, event_id, key, value, confidence, last_seen_seq, active, created_at, updated_at";

impl SessionStore {
    /// Merge a claim by its stable snake_case key. An existing row is updated
    /// in place (reactivating it if it had been deactivated) rather than
    /// duplicated; every mutation leaves an audit row with before/after
    /// payloads and the acting role.
    pub async fn upsert_fact(
        &self,
        event_id: &str,
        key: &str,
        value: &str,
        confidence: f64,
        seen_seq: i64,
        actor: &str,
    ) -> Result<FactRecord> {
        let db = self.db.lock().await;

        let existing = {
            let mut stmt = db.prepare(&format!(
                "SELECT {FACT_COLUMNS} FROM facts WHERE event_id = ?1 AND key = ?2 LIMIT 1"
            ))?;
            let mut rows = stmt.query(params![event_id, key])?;
            match rows.next()? {
                Some(row) => Some(map_fact_row(row)?),
                None => None,
            }
        };

        let (fact_id, action, before_json) = match &existing {
            Some(prev) => (
                prev.fact_id.clone(),
                if prev.active { "update" } else { "reactivate" },
                Some(serde_json::to_string(prev)?),
            ),
            None => (uuid::Uuid::new_v4().to_string(), "create", None),
        };

        if existing.is_some() {
            db.execute(
                "UPDATE facts SET value = ?1, confidence = ?2,
                    last_seen_seq = MAX(last_seen_seq, ?3),
                    active = 1, updated_at = CURRENT_TIMESTAMP
                 WHERE fact_id = ?4",
                params![value, confidence, seen_seq, fact_id],
            )?;
        } else {
            db.execute(
                "INSERT INTO facts (fact_id, event_id, key, value, confidence, last_seen_seq, active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
                params![fact_id, event_id, key, value, confidence, seen_seq],
            )?;
        }

        let rec = db.query_row(
            &format!("SELECT {FACT_COLUMNS} FROM facts WHERE fact_id = ?1"),
            params![fact_id],
            map_fact_row,
        )?;

        db.execute(
            "INSERT INTO fact_audit (fact_id, event_id, action, before_json, after_json, actor)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                fact_id,
                event_id,
                action,
                before_json,
                serde_json::to_string(&rec)?,
                actor
            ],
        )?;

        Ok(rec)
    }

    pub async fn deactivate_fact(&self, event_id: &str, key: &str, actor: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let existing = {
            let mut stmt = db.prepare(&format!(
                "SELECT {FACT_COLUMNS} FROM facts WHERE event_id = ?1 AND key = ?2 AND active = 1 LIMIT 1"
            ))?;
            let mut rows = stmt.query(params![event_id, key])?;
            match rows.next()? {
                Some(row) => Some(map_fact_row(row)?),
                None => None,
            }
        };
        let Some(prev) = existing else {
            return Ok(false);
        };

        db.execute(
            "UPDATE facts SET active = 0, updated_at = CURRENT_TIMESTAMP WHERE fact_id = ?1",
            params![prev.fact_id],
        )?;
        db.execute(
            "INSERT INTO fact_audit (fact_id, event_id, action, before_json, after_json, actor)
             VALUES (?1, ?2, 'deactivate', ?3, NULL, ?4)",
            params![prev.fact_id, event_id, serde_json::to_string(&prev)?, actor],
        )?;
        Ok(true)
    }

    pub async fn list_fact_audit(&self, event_id: &str) -> Result<Vec<AuditRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, fact_id, event_id, action, before_json, after_json, actor, created_at
             FROM fact_audit WHERE event_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![event_id], |row| {
            Ok(AuditRecord {
                id: row.get(0)?,
                subject_id: row.get(1)?,
                event_id: row.get(2)?,
                action: row.get(3)?,
                before_json: row.get(4)?,
                after_json: row.get(5)?,
                actor: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub async fn list_active_facts(&self, event_id: &str) -> Result<Vec<FactRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {FACT_COLUMNS} FROM facts
             WHERE event_id = ?1 AND active = 1 ORDER BY updated_at DESC"
        ))?;
        let rows = stmt.query_map(params![event_id], map_fact_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
