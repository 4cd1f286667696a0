#![allow(dead_code)]

//! Session Store - Durable Event & Session Persistence
//!
//! Narrow read/write contract consumed by the Runtime Monitor, the Kill
//! Switch, and Threat Intelligence. Two implementations: SQLite (durable)
//! and in-memory (tests, embedders).

pub mod memory;
pub mod sqlite;
pub mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::{BehaviorDraft, BehaviorEvent, EventType, SessionStatus, ThreatLevel};

use crate::logic::intel::SkillTrust;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database failure: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("invalid stored value: {0}")]
    Invalid(String),
}

// ============================================================================
// STORE CONTRACT
// ============================================================================

/// The store contract: single atomic record inserts/updates, never
/// multi-step transactions spanning components.
pub trait SessionStore: Send + Sync {
    /// Persist one behavior event. The store generates id and timestamp
    /// and implicitly opens an active session on first sight.
    fn record_behavior(&self, draft: BehaviorDraft) -> Result<BehaviorEvent, StoreError>;

    /// Threat history at `min_level` and above, most recent first.
    /// `session_id = None` spans all sessions.
    fn get_threats(
        &self,
        session_id: Option<&str>,
        min_level: ThreatLevel,
    ) -> Result<Vec<BehaviorEvent>, StoreError>;

    /// Mark a session as ended with the given status.
    fn end_session(&self, session_id: &str, status: SessionStatus) -> Result<(), StoreError>;

    fn get_skill_trust(&self, skill_id: &str) -> Result<Option<SkillTrust>, StoreError>;

    fn set_skill_trust(&self, trust: &SkillTrust) -> Result<(), StoreError>;

    /// Number of sessions still active for an agent.
    fn active_session_count(&self, agent_id: &str) -> Result<usize, StoreError>;
}
