use anyhow::Result;
use rusqlite::params;

use super::SessionStore;
use super::types::SessionRole;

impl SessionStore {
    /// Compare-and-only-advance upsert. A resumed session replaying already
    /// processed segments can call this with a stale sequence number and the
    /// low-water-mark never regresses.
    pub async fn advance_checkpoint(
        &self,
        event_id: &str,
        role: SessionRole,
        seq: i64,
    ) -> Result<i64> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO checkpoints (event_id, role, last_seq_processed)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (event_id, role) DO UPDATE SET
                last_seq_processed = MAX(last_seq_processed, excluded.last_seq_processed),
                updated_at = CURRENT_TIMESTAMP",
            params![event_id, role.as_str(), seq],
        )?;
        let current: i64 = db.query_row(
            "SELECT last_seq_processed FROM checkpoints WHERE event_id = ?1 AND role = ?2",
            params![event_id, role.as_str()],
            |row| row.get(0),
        )?;
        Ok(current)
    }

    pub async fn get_checkpoint(&self, event_id: &str, role: SessionRole) -> Result<i64> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT last_seq_processed FROM checkpoints WHERE event_id = ?1 AND role = ?2 LIMIT 1",
        )?;
        let mut rows = stmt.query(params![event_id, role.as_str()])?;
        if let Some(row) = rows.next()? {
            Ok(row.get(0)?)
        } else {
            Ok(0)
        }
    }
}
