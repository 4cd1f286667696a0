#![allow(dead_code)]

//! Runtime Monitor - Interception Orchestration
//!
//! The four `intercept_*` entry points mirror the policy evaluators and
//! share one pipeline: evaluate policy, reconcile with signature matches,
//! persist the audit record, notify the bus, update skill trust, and -
//! on a critical verdict with auto-kill on - invoke the kill switch.
//! Recording always happens before the kill so detection precedes
//! response in the audit trail.

pub mod window;


use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{json, Value};
use thiserror::Error;

use super::events::{channels, EventBus};
use super::intel::{ThreatIntel, ThreatSignature};
use super::kill_switch::KillSwitch;
use super::policy::{signatures, FileOp, PolicyEngine, PolicyPatch, SecurityPolicy, ThreatDetection};
use super::store::{BehaviorDraft, BehaviorEvent, EventType, SessionStore, StoreError, ThreatLevel};
use window::CostWindows;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

// ============================================================================
// ACTION SOURCE & RESULTS
// ============================================================================

/// Identity of the acting session, carried on every intercept call.
#[derive(Debug, Clone)]
pub struct ActionSource {
    pub session_id: String,
    pub agent_id: String,
    pub skill_id: Option<String>,
}

impl ActionSource {
    pub fn new(session_id: &str, agent_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            agent_id: agent_id.to_string(),
            skill_id: None,
        }
    }

    pub fn with_skill(mut self, skill_id: &str) -> Self {
        self.skill_id = Some(skill_id.to_string());
        self
    }
}

/// Definite outcome of one intercepted action.
#[derive(Debug, Clone)]
pub struct Interception {
    pub allowed: bool,
    pub event: BehaviorEvent,
    pub detection: Option<ThreatDetection>,
}

/// Cost interception additionally reports whether the sample was anomalous.
#[derive(Debug, Clone)]
pub struct CostInterception {
    pub allowed: bool,
    pub anomaly: bool,
    pub event: BehaviorEvent,
    pub detection: Option<ThreatDetection>,
}

// ============================================================================
// RUNTIME MONITOR
// ============================================================================

pub struct RuntimeMonitor {
    engine: RwLock<PolicyEngine>,
    intel: Arc<ThreatIntel>,
    kill_switch: Arc<KillSwitch>,
    store: Arc<dyn SessionStore>,
    bus: Arc<EventBus>,
    cost_windows: CostWindows,
    auto_kill: AtomicBool,
}

impl RuntimeMonitor {
    pub fn new(
        policy: SecurityPolicy,
        intel: Arc<ThreatIntel>,
        kill_switch: Arc<KillSwitch>,
        store: Arc<dyn SessionStore>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            engine: RwLock::new(PolicyEngine::new(policy)),
            intel,
            kill_switch,
            store,
            bus,
            cost_windows: CostWindows::new(),
            auto_kill: AtomicBool::new(true),
        }
    }

    pub fn set_auto_kill(&self, enabled: bool) {
        self.auto_kill.store(enabled, Ordering::SeqCst);
    }

    pub fn auto_kill_enabled(&self) -> bool {
        self.auto_kill.load(Ordering::SeqCst)
    }

    /// Replace the policy document (merged against defaults, never patched
    /// in place).
    pub fn update_policy(&self, patch: &PolicyPatch) {
        let mut engine = self.engine.write();
        let next = SecurityPolicy::merged(engine.policy(), patch);
        log::info!("Security policy updated to version {}", next.version);
        engine.set_policy(next);
    }

    pub fn policy_json(&self) -> String {
        self.engine.read().policy().to_json()
    }

    // ------------------------------------------------------------------
    // INTERCEPTION ENTRY POINTS
    // ------------------------------------------------------------------

    pub fn intercept_network(
        &self,
        src: &ActionSource,
        url: &str,
        method: &str,
    ) -> Result<Interception, MonitorError> {
        let hostname = host_from_url(url);
        let verdict = self
            .engine
            .read()
            .evaluate_network_request(url, method, &hostname);
        let details = json!({"url": url, "method": method, "hostname": hostname});
        self.process(src, EventType::NetworkRequest, details, verdict)
    }

    pub fn intercept_file(
        &self,
        src: &ActionSource,
        path: &str,
        operation: FileOp,
        size: Option<u64>,
    ) -> Result<Interception, MonitorError> {
        let verdict = self.engine.read().evaluate_file_access(path, operation, size);
        let details = json!({"path": path, "operation": operation.as_str(), "size": size});
        self.process(src, EventType::FileAccess, details, verdict)
    }

    pub fn intercept_process(
        &self,
        src: &ActionSource,
        command: &str,
        args: &[String],
    ) -> Result<Interception, MonitorError> {
        let verdict = self.engine.read().evaluate_process_spawn(command, args);
        let details = json!({"command": command, "args": args.join(" ")});
        self.process(src, EventType::ProcessSpawn, details, verdict)
    }

    pub fn intercept_cost(
        &self,
        src: &ActionSource,
        tokens: u64,
    ) -> Result<CostInterception, MonitorError> {
        let window_secs = self.engine.read().policy().cost.window_secs;
        let stats = self.cost_windows.observe(&src.session_id, tokens, window_secs);
        let verdict = self.engine.read().evaluate_cost_anomaly(
            tokens,
            stats.average,
            stats.spike_multiplier,
            window_secs,
        );
        let details = json!({
            "tokens": tokens,
            "average": stats.average,
            "spike_multiplier": stats.spike_multiplier,
            "window_secs": window_secs,
        });
        let result = self.process(src, EventType::CostAnomaly, details, verdict)?;
        Ok(CostInterception {
            allowed: result.allowed,
            anomaly: result.detection.is_some(),
            event: result.event,
            detection: result.detection,
        })
    }

    // ------------------------------------------------------------------
    // SHARED PIPELINE
    // ------------------------------------------------------------------

    fn process(
        &self,
        src: &ActionSource,
        event_type: EventType,
        details: Value,
        verdict: Option<ThreatDetection>,
    ) -> Result<Interception, MonitorError> {
        let matches = self.intel.match_signatures(&details);
        let detection = upgrade_from_signatures(verdict, &matches, event_type);

        // Every action is recorded, clean ones included, so a session can
        // be reconstructed in full.
        let mut draft = BehaviorDraft::new(&src.session_id, &src.agent_id, event_type, details);
        if let Some(det) = &detection {
            draft = draft.with_threat(det.threat_level, det.threat_signature.clone(), det.blocked);
        }
        let event = self.store.record_behavior(draft)?;

        if let Some(det) = &detection {
            log::info!(
                "{} detection on session {}: {} ({})",
                det.threat_level,
                src.session_id,
                det.description,
                det.threat_signature.as_deref().unwrap_or("-")
            );

            let payload = bus_payload(&event, det);
            self.bus.publish(channels::BEHAVIOR_DETECTED, payload.clone());
            if det.blocked {
                self.bus.publish(channels::BEHAVIOR_BLOCKED, payload);
            }

            if let Some(skill_id) = &src.skill_id {
                // Trust decay failure is logged, not fatal: the detection
                // event itself is already durable.
                if let Err(e) = self.intel.record_skill_threat(skill_id, &event) {
                    log::error!("Skill trust update failed for '{}': {}", skill_id, e);
                }
            }

            if det.threat_level == ThreatLevel::Critical && self.auto_kill_enabled() {
                let reason = format!("Auto-kill: {}", det.description);
                match self.kill_switch.kill(&src.session_id, &src.agent_id, event.clone(), &reason)
                {
                    Ok(_) => self.cost_windows.forget(&src.session_id),
                    Err(e) => {
                        // The detection event is already recorded; a failed
                        // kill must not undo that.
                        log::error!("Kill switch failed for session {}: {}", src.session_id, e);
                    }
                }
            }
        }

        let blocked = detection.as_ref().map_or(false, |d| d.blocked);
        Ok(Interception {
            allowed: !blocked,
            event,
            detection,
        })
    }

    /// Monitor state summary.
    pub fn status(&self) -> Value {
        json!({
            "auto_kill": self.auto_kill_enabled(),
            "policy_version": self.engine.read().policy().version,
            "cost_sessions": self.cost_windows.session_count(),
            "signatures": self.intel.stats(),
        })
    }
}

// ============================================================================
// SIGNATURE RECONCILIATION
// ============================================================================

/// Raise the policy verdict to the highest matched signature severity, or
/// synthesize a verdict when signatures matched with no policy concern.
fn upgrade_from_signatures(
    verdict: Option<ThreatDetection>,
    matches: &[ThreatSignature],
    event_type: EventType,
) -> Option<ThreatDetection> {
    let Some(best) = matches.iter().max_by_key(|s| s.severity) else {
        return verdict;
    };

    match verdict {
        Some(mut det) => {
            if best.severity > det.threat_level {
                det.threat_level = best.severity;
                det.threat_signature = Some(best.signature_id.clone());
                det.description = format!("{} (escalated by signature '{}')", det.description, best.name);
                if det.threat_level.is_high() {
                    det.blocked = true;
                }
            }
            Some(det)
        }
        None => {
            let names: Vec<&str> = matches.iter().map(|s| s.name.as_str()).collect();
            let ids: Vec<&str> = matches.iter().map(|s| s.signature_id.as_str()).collect();
            Some(ThreatDetection::new(
                event_type,
                best.severity,
                signatures::SIG_MATCH,
                format!("Signature match: {}", names.join(", ")),
                json!({"signatures": ids}),
                best.severity.is_high(),
            ))
        }
    }
}

fn bus_payload(event: &BehaviorEvent, det: &ThreatDetection) -> Value {
    json!({
        "event_id": event.event_id,
        "session_id": event.session_id,
        "agent_id": event.agent_id,
        "event_type": event.event_type.as_str(),
        "threat_level": det.threat_level.as_str(),
        "threat_signature": det.threat_signature,
        "description": det.description,
        "blocked": det.blocked,
    })
}

/// Hostname portion of a URL: scheme and userinfo stripped, port and path
/// dropped, lowercased.
fn host_from_url(url: &str) -> String {
    let rest = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => url,
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
    let host_port = authority.rsplit('@').next().unwrap_or(authority);
    if let Some(v6) = host_port.strip_prefix('[') {
        return v6.split(']').next().unwrap_or("").to_ascii_lowercase();
    }
    host_port.split(':').next().unwrap_or("").to_ascii_lowercase()
}
