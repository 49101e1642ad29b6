use anyhow::Result;
use rusqlite::params;

use super::SessionStore;
use super::types::{AgentRecord, AgentStatus, SessionRecord, SessionRole, SessionStatus, Transport};

fn map_agent_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentRecord> {
    Ok(AgentRecord {
        agent_id: row.get(0)?,
        event_id: row.get(1)?,
        status: row.get(2)?,
        stage: row.get(3)?,
        realtime_model: row.get(4)?,
        stateless_model: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn map_session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        session_id: row.get(0)?,
        event_id: row.get(1)?,
        agent_id: row.get(2)?,
        role: row.get(3)?,
        transport: row.get(4)?,
        status: row.get(5)?,
        provider_session_id: row.get(6)?,
        connection_count: row.get(7)?,
        last_connected_at: row.get(8)?,
        metrics_json: row.get(9)?,
    })
}

const SESSION_COLUMNS: &str = "session_id, event_id, agent_id, role, transport, status, \
     provider_session_id, connection_count, last_connected_at, metrics_json";

impl SessionStore {
    pub async fn create_agent(
        &self,
        agent_id: &str,
        event_id: &str,
        realtime_model: &str,
        stateless_model: &str,
    ) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT OR IGNORE INTO agents (agent_id, event_id, status, realtime_model, stateless_model)
             VALUES (?1, ?2, 'idle', ?3, ?4)",
            params![agent_id, event_id, realtime_model, stateless_model],
        )?;
        Ok(())
    }

    pub async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT agent_id, event_id, status, stage, realtime_model, stateless_model, created_at, updated_at
             FROM agents WHERE agent_id = ?1 LIMIT 1",
        )?;
        let mut rows = stmt.query(params![agent_id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(map_agent_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub async fn get_agent_for_event(&self, event_id: &str) -> Result<Option<AgentRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT agent_id, event_id, status, stage, realtime_model, stateless_model, created_at, updated_at
             FROM agents WHERE event_id = ?1 LIMIT 1",
        )?;
        let mut rows = stmt.query(params![event_id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(map_agent_row(row)?))
        } else {
            Ok(None)
        }
    }

    // Narrow column update: never touches stage/models so concurrent writers
    // of those columns are not clobbered.
    pub async fn update_agent_status(&self, agent_id: &str, status: AgentStatus) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE agents SET status = ?1, updated_at = CURRENT_TIMESTAMP WHERE agent_id = ?2",
            params![status.as_str(), agent_id],
        )?;
        Ok(rows > 0)
    }

    pub async fn update_agent_stage(&self, agent_id: &str, stage: Option<&str>) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE agents SET stage = ?1, updated_at = CURRENT_TIMESTAMP WHERE agent_id = ?2",
            params![stage, agent_id],
        )?;
        Ok(rows > 0)
    }

    pub async fn create_session(
        &self,
        event_id: &str,
        agent_id: &str,
        role: SessionRole,
        transport: Transport,
    ) -> Result<String> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO agent_sessions (session_id, event_id, agent_id, role, transport, status)
             VALUES (?1, ?2, ?3, ?4, ?5, 'active')
             ON CONFLICT (event_id, role) DO UPDATE SET
                transport = excluded.transport,
                status = 'active',
                updated_at = CURRENT_TIMESTAMP",
            params![session_id, event_id, agent_id, role.as_str(), transport.as_str()],
        )?;
        Ok(session_id)
    }

    pub async fn get_session(
        &self,
        event_id: &str,
        role: SessionRole,
    ) -> Result<Option<SessionRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM agent_sessions WHERE event_id = ?1 AND role = ?2 LIMIT 1"
        ))?;
        let mut rows = stmt.query(params![event_id, role.as_str()])?;
        if let Some(row) = rows.next()? {
            Ok(Some(map_session_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub async fn get_sessions_for_event(&self, event_id: &str) -> Result<Vec<SessionRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM agent_sessions WHERE event_id = ?1 ORDER BY role ASC"
        ))?;
        let rows = stmt.query_map(params![event_id], map_session_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// The health poller's reconciliation query: sessions that claim a live
    /// persistent connection. Stateless sessions have no connection to lose
    /// and are deliberately excluded.
    pub async fn list_active_realtime_sessions(&self) -> Result<Vec<SessionRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM agent_sessions
             WHERE status = 'active' AND transport = 'realtime'
             ORDER BY event_id ASC, role ASC"
        ))?;
        let rows = stmt.query_map([], map_session_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub async fn update_session_status(
        &self,
        event_id: &str,
        role: SessionRole,
        status: SessionStatus,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE agent_sessions SET status = ?1, updated_at = CURRENT_TIMESTAMP
             WHERE event_id = ?2 AND role = ?3",
            params![status.as_str(), event_id, role.as_str()],
        )?;
        Ok(rows > 0)
    }

    /// Records a successful (re)connect: bumps the connection counter and
    /// stamps the provider-side session identity.
    pub async fn record_connection(
        &self,
        event_id: &str,
        role: SessionRole,
        provider_session_id: &str,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE agent_sessions SET
                provider_session_id = ?1,
                connection_count = connection_count + 1,
                last_connected_at = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
             WHERE event_id = ?2 AND role = ?3",
            params![provider_session_id, event_id, role.as_str()],
        )?;
        Ok(rows > 0)
    }

    // Metrics live in their own column so a metrics write can never clobber a
    // concurrent status transition.
    pub async fn update_session_metrics(
        &self,
        event_id: &str,
        role: SessionRole,
        metrics_json: &str,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE agent_sessions SET metrics_json = ?1, updated_at = CURRENT_TIMESTAMP
             WHERE event_id = ?2 AND role = ?3",
            params![metrics_json, event_id, role.as_str()],
        )?;
        Ok(rows > 0)
    }
}
