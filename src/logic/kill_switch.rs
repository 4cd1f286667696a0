#![allow(dead_code)]

//! Kill Switch - Local Session Termination
//!
//! Terminates a session in the store and writes the full causal event
//! chain as an audit record. The remote side is not touched here; the
//! Gateway Connector picks up the `behavior.blocked` notification and
//! mirrors the kill onto the agent host.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use super::events::{channels, EventBus, ACTION_KILL_SWITCH};
use super::policy::signatures;
use super::store::{
    BehaviorDraft, BehaviorEvent, EventType, SessionStatus, SessionStore, StoreError, ThreatLevel,
};

#[derive(Debug, Error)]
pub enum KillSwitchError {
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

/// Transient return value of a kill - the terminated session plus the
/// ordered chain of events that led there.
#[derive(Debug, Clone, Serialize)]
pub struct KillSwitchResult {
    pub session_id: String,
    pub agent_id: String,
    pub terminated: bool,
    pub reason: String,
    pub event_chain: Vec<BehaviorEvent>,
    pub timestamp: DateTime<Utc>,
}

pub struct KillSwitch {
    store: Arc<dyn SessionStore>,
    bus: Arc<EventBus>,
}

impl KillSwitch {
    pub fn new(store: Arc<dyn SessionStore>, bus: Arc<EventBus>) -> Self {
        Self { store, bus }
    }

    /// Terminate a session: assemble the causal chain, end the session in
    /// the store, record the synthetic audit event, notify the bus.
    pub fn kill(
        &self,
        session_id: &str,
        agent_id: &str,
        trigger_event: BehaviorEvent,
        reason: &str,
    ) -> Result<KillSwitchResult, KillSwitchError> {
        log::warn!("Kill switch firing for session {}: {}", session_id, reason);

        // Low-and-above history, trigger first. The trigger may already be
        // persisted; drop the duplicate from the fetched history.
        let history = self.store.get_threats(Some(session_id), ThreatLevel::Low)?;
        let mut event_chain = vec![trigger_event.clone()];
        event_chain.extend(
            history
                .into_iter()
                .filter(|e| e.event_id != trigger_event.event_id),
        );

        self.store.end_session(session_id, SessionStatus::Terminated)?;

        let critical_count = event_chain
            .iter()
            .filter(|e| e.threat_level == ThreatLevel::Critical)
            .count();

        let kill_event = self.store.record_behavior(
            BehaviorDraft::new(
                session_id,
                agent_id,
                EventType::KillSwitch,
                json!({
                    "reason": reason,
                    "chain_length": event_chain.len(),
                    "critical_count": critical_count,
                }),
            )
            .with_threat(
                ThreatLevel::Critical,
                Some(signatures::KILL_SWITCH.to_string()),
                true,
            ),
        )?;

        self.bus.publish(
            channels::BEHAVIOR_BLOCKED,
            json!({
                "event_id": kill_event.event_id,
                "session_id": session_id,
                "agent_id": agent_id,
                "event_type": kill_event.event_type.as_str(),
                "threat_level": kill_event.threat_level.as_str(),
                "threat_signature": signatures::KILL_SWITCH,
                "description": reason,
                "blocked": true,
                "action": ACTION_KILL_SWITCH,
            }),
        );

        Ok(KillSwitchResult {
            session_id: session_id.to_string(),
            agent_id: agent_id.to_string(),
            terminated: true,
            reason: reason.to_string(),
            event_chain,
            timestamp: kill_event.timestamp,
        })
    }

    /// Reconciliation path for late-joining monitors: if the session
    /// already has a critical threat on record, kill it with a reason
    /// derived from the recorded signatures. Returns `None` when there is
    /// nothing to act on.
    pub fn evaluate(
        &self,
        session_id: &str,
        agent_id: &str,
    ) -> Result<Option<KillSwitchResult>, KillSwitchError> {
        let critical = self
            .store
            .get_threats(Some(session_id), ThreatLevel::Critical)?;
        let Some(latest) = critical.first().cloned() else {
            return Ok(None);
        };

        let mut sigs: Vec<&str> = Vec::new();
        for event in &critical {
            if let Some(sig) = event.threat_signature.as_deref() {
                if !sigs.contains(&sig) {
                    sigs.push(sig);
                }
            }
        }

        let reason = if sigs.is_empty() {
            format!("Kill switch triggered: {} critical event(s)", critical.len())
        } else {
            format!(
                "Kill switch triggered: {} ({} critical event(s))",
                sigs.join(", "),
                critical.len()
            )
        };

        self.kill(session_id, agent_id, latest, &reason).map(Some)
    }
}

// ============================================================================
// TESTS
// ============================================================================
