//! In-Memory Session Store
//!
//! Reference implementation of the store contract backed by plain maps.
//! Used by tests and by embedders that supply their own durability.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use super::types::{BehaviorDraft, BehaviorEvent, SessionStatus, ThreatLevel};
use super::{SessionStore, StoreError};
use crate::logic::intel::SkillTrust;

#[derive(Default)]
struct Inner {
    events: Vec<BehaviorEvent>,
    sessions: HashMap<String, (String, SessionStatus)>,
    trust: HashMap<String, SkillTrust>,
}

/// In-memory store. All state lives behind one mutex; every contract
/// operation is a single critical section.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total events recorded (test probe).
    pub fn event_count(&self) -> usize {
        self.inner.lock().events.len()
    }

    /// Status of a session, if known (test probe).
    pub fn session_status(&self, session_id: &str) -> Option<SessionStatus> {
        self.inner.lock().sessions.get(session_id).map(|(_, s)| *s)
    }
}

impl SessionStore for MemoryStore {
    fn record_behavior(&self, draft: BehaviorDraft) -> Result<BehaviorEvent, StoreError> {
        let mut inner = self.inner.lock();

        inner
            .sessions
            .entry(draft.session_id.clone())
            .or_insert_with(|| (draft.agent_id.clone(), SessionStatus::Active));

        let event = BehaviorEvent {
            event_id: Uuid::new_v4().to_string(),
            session_id: draft.session_id,
            agent_id: draft.agent_id,
            event_type: draft.event_type,
            timestamp: Utc::now(),
            details: draft.details,
            threat_level: draft.threat_level,
            threat_signature: draft.threat_signature,
            blocked: draft.blocked,
        };
        inner.events.push(event.clone());
        Ok(event)
    }

    fn get_threats(
        &self,
        session_id: Option<&str>,
        min_level: ThreatLevel,
    ) -> Result<Vec<BehaviorEvent>, StoreError> {
        let inner = self.inner.lock();
        let mut out: Vec<BehaviorEvent> = inner
            .events
            .iter()
            .filter(|e| e.threat_level >= min_level)
            .filter(|e| session_id.map_or(true, |s| e.session_id == s))
            .cloned()
            .collect();
        // Insertion order is chronological; most recent first.
        out.reverse();
        Ok(out)
    }

    fn end_session(&self, session_id: &str, status: SessionStatus) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        match inner.sessions.get_mut(session_id) {
            Some(entry) => {
                entry.1 = status;
                Ok(())
            }
            None => {
                // Ending an unseen session still records the terminal state.
                inner
                    .sessions
                    .insert(session_id.to_string(), (String::new(), status));
                Ok(())
            }
        }
    }

    fn get_skill_trust(&self, skill_id: &str) -> Result<Option<SkillTrust>, StoreError> {
        Ok(self.inner.lock().trust.get(skill_id).cloned())
    }

    fn set_skill_trust(&self, trust: &SkillTrust) -> Result<(), StoreError> {
        self.inner
            .lock()
            .trust
            .insert(trust.skill_id.clone(), trust.clone());
        Ok(())
    }

    fn active_session_count(&self, agent_id: &str) -> Result<usize, StoreError> {
        Ok(self
            .inner
            .lock()
            .sessions
            .values()
            .filter(|(agent, status)| agent == agent_id && *status == SessionStatus::Active)
            .count())
    }
}

// ============================================================================
// TESTS
// ============================================================================
