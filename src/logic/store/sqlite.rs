//! SQLite Session Store
//!
//! Durable implementation of the store contract. One connection behind a
//! mutex; every contract operation is a single statement.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use uuid::Uuid;

use super::types::{BehaviorDraft, BehaviorEvent, EventType, SessionStatus, ThreatLevel};
use super::{SessionStore, StoreError};
use crate::logic::intel::{SkillTrust, TrustLevel};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    session_id  TEXT PRIMARY KEY,
    agent_id    TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'active',
    started_at  TEXT NOT NULL,
    ended_at    TEXT
);
CREATE TABLE IF NOT EXISTS behavior_events (
    event_id         TEXT PRIMARY KEY,
    session_id       TEXT NOT NULL,
    agent_id         TEXT NOT NULL,
    event_type       TEXT NOT NULL,
    timestamp        TEXT NOT NULL,
    details          TEXT NOT NULL,
    threat_level     INTEGER NOT NULL,
    threat_signature TEXT,
    blocked          INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_session ON behavior_events(session_id, threat_level);
CREATE TABLE IF NOT EXISTS skill_trust (
    skill_id               TEXT PRIMARY KEY,
    skill_name             TEXT NOT NULL,
    publisher              TEXT NOT NULL,
    trust_level            INTEGER NOT NULL,
    certified_at           TEXT,
    last_audit_at          TEXT,
    threat_history         INTEGER NOT NULL,
    behavioral_fingerprint TEXT NOT NULL
);
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (and migrate) a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Ephemeral store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

// Row tuple used while converting outside the rusqlite closure.
type EventRow = (String, String, String, String, String, String, u8, Option<String>, bool);

fn event_from_row(row: EventRow) -> Result<BehaviorEvent, StoreError> {
    let (event_id, session_id, agent_id, event_type, timestamp, details, level, signature, blocked) = row;
    Ok(BehaviorEvent {
        event_id,
        session_id,
        agent_id,
        event_type: EventType::from_str(&event_type)
            .ok_or_else(|| StoreError::Invalid(format!("event_type '{}'", event_type)))?,
        timestamp: parse_timestamp(&timestamp)?,
        details: serde_json::from_str::<Value>(&details)
            .map_err(|e| StoreError::Invalid(format!("details json: {}", e)))?,
        threat_level: ThreatLevel::from_ordinal(level)
            .ok_or_else(|| StoreError::Invalid(format!("threat_level {}", level)))?,
        threat_signature: signature,
        blocked,
    })
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Invalid(format!("timestamp '{}': {}", s, e)))
}

impl SessionStore for SqliteStore {
    fn record_behavior(&self, draft: BehaviorDraft) -> Result<BehaviorEvent, StoreError> {
        let conn = self.conn.lock();
        let now = Utc::now();

        conn.execute(
            "INSERT OR IGNORE INTO sessions (session_id, agent_id, status, started_at)
             VALUES (?1, ?2, 'active', ?3)",
            params![draft.session_id, draft.agent_id, now.to_rfc3339()],
        )?;

        let event = BehaviorEvent {
            event_id: Uuid::new_v4().to_string(),
            session_id: draft.session_id,
            agent_id: draft.agent_id,
            event_type: draft.event_type,
            timestamp: now,
            details: draft.details,
            threat_level: draft.threat_level,
            threat_signature: draft.threat_signature,
            blocked: draft.blocked,
        };

        conn.execute(
            "INSERT INTO behavior_events
             (event_id, session_id, agent_id, event_type, timestamp, details,
              threat_level, threat_signature, blocked)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                event.event_id,
                event.session_id,
                event.agent_id,
                event.event_type.as_str(),
                event.timestamp.to_rfc3339(),
                event.details.to_string(),
                event.threat_level.ordinal(),
                event.threat_signature,
                event.blocked,
            ],
        )?;

        Ok(event)
    }

    fn get_threats(
        &self,
        session_id: Option<&str>,
        min_level: ThreatLevel,
    ) -> Result<Vec<BehaviorEvent>, StoreError> {
        let conn = self.conn.lock();

        let mut rows: Vec<EventRow> = Vec::new();
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<EventRow> {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
            ))
        };

        match session_id {
            Some(session) => {
                let mut stmt = conn.prepare(
                    "SELECT event_id, session_id, agent_id, event_type, timestamp, details,
                            threat_level, threat_signature, blocked
                     FROM behavior_events
                     WHERE session_id = ?1 AND threat_level >= ?2
                     ORDER BY timestamp DESC, rowid DESC",
                )?;
                for row in stmt.query_map(params![session, min_level.ordinal()], map_row)? {
                    rows.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT event_id, session_id, agent_id, event_type, timestamp, details,
                            threat_level, threat_signature, blocked
                     FROM behavior_events
                     WHERE threat_level >= ?1
                     ORDER BY timestamp DESC, rowid DESC",
                )?;
                for row in stmt.query_map(params![min_level.ordinal()], map_row)? {
                    rows.push(row?);
                }
            }
        }

        rows.into_iter().map(event_from_row).collect()
    }

    fn end_session(&self, session_id: &str, status: SessionStatus) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE sessions SET status = ?1, ended_at = ?2 WHERE session_id = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), session_id],
        )?;
        if updated == 0 {
            // Unknown session: record the terminal state anyway.
            conn.execute(
                "INSERT INTO sessions (session_id, agent_id, status, started_at, ended_at)
                 VALUES (?1, '', ?2, ?3, ?3)",
                params![session_id, status.as_str(), Utc::now().to_rfc3339()],
            )?;
        }
        Ok(())
    }

    fn get_skill_trust(&self, skill_id: &str) -> Result<Option<SkillTrust>, StoreError> {
        let conn = self.conn.lock();
        let row: Option<(String, String, String, u8, Option<String>, Option<String>, u32, String)> = conn
            .query_row(
                "SELECT skill_id, skill_name, publisher, trust_level, certified_at,
                        last_audit_at, threat_history, behavioral_fingerprint
                 FROM skill_trust WHERE skill_id = ?1",
                params![skill_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((skill_id, skill_name, publisher, level, certified_at, last_audit_at, history, fingerprint)) => {
                Ok(Some(SkillTrust {
                    skill_id,
                    skill_name,
                    publisher,
                    trust_level: TrustLevel::from_ordinal(level)
                        .ok_or_else(|| StoreError::Invalid(format!("trust_level {}", level)))?,
                    certified_at: certified_at.as_deref().map(parse_timestamp).transpose()?,
                    last_audit_at: last_audit_at.as_deref().map(parse_timestamp).transpose()?,
                    threat_history: history,
                    behavioral_fingerprint: fingerprint,
                }))
            }
        }
    }

    fn set_skill_trust(&self, trust: &SkillTrust) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO skill_trust
             (skill_id, skill_name, publisher, trust_level, certified_at,
              last_audit_at, threat_history, behavioral_fingerprint)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(skill_id) DO UPDATE SET
                skill_name = excluded.skill_name,
                publisher = excluded.publisher,
                trust_level = excluded.trust_level,
                certified_at = excluded.certified_at,
                last_audit_at = excluded.last_audit_at,
                threat_history = excluded.threat_history,
                behavioral_fingerprint = excluded.behavioral_fingerprint",
            params![
                trust.skill_id,
                trust.skill_name,
                trust.publisher,
                trust.trust_level.ordinal(),
                trust.certified_at.map(|t| t.to_rfc3339()),
                trust.last_audit_at.map(|t| t.to_rfc3339()),
                trust.threat_history,
                trust.behavioral_fingerprint,
            ],
        )?;
        Ok(())
    }

    fn active_session_count(&self, agent_id: &str) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE agent_id = ?1 AND status = 'active'",
            params![agent_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

// ============================================================================
// TESTS
// ============================================================================
