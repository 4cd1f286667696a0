//! Policy Verdict Types
//!
//! No logic here - only the value types produced by the evaluators.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::logic::store::{EventType, ThreatLevel};

// ============================================================================
// SIGNATURE IDS
// ============================================================================

/// Well-known verdict signatures emitted by the policy engine and the
/// kill switch.
pub mod signatures {
    pub const NET_BLOCKED_DOMAIN: &str = "NET_BLOCKED_DOMAIN";
    pub const NET_EXTERNAL_BLOCKED: &str = "NET_EXTERNAL_BLOCKED";
    pub const NET_DATA_EXFILTRATION: &str = "NET_DATA_EXFILTRATION";
    pub const FS_SENSITIVE_PATH: &str = "FS_SENSITIVE_PATH";
    pub const FS_WRITE_OUTSIDE_SANDBOX: &str = "FS_WRITE_OUTSIDE_SANDBOX";
    pub const PROC_SHELL_EXEC: &str = "PROC_SHELL_EXEC";
    pub const PROC_BLOCKED_COMMAND: &str = "PROC_BLOCKED_COMMAND";
    pub const PROC_UNLISTED_COMMAND: &str = "PROC_UNLISTED_COMMAND";
    pub const COST_SPIKE_DETECTED: &str = "COST_SPIKE_DETECTED";
    pub const COST_RATE_EXCEEDED: &str = "COST_RATE_EXCEEDED";
    pub const SIG_MATCH: &str = "SIG_MATCH";
    pub const KILL_SWITCH: &str = "KILL_SWITCH";
}

// ============================================================================
// FILE OPERATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOp {
    Read,
    Write,
    Delete,
}

impl FileOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileOp::Read => "read",
            FileOp::Write => "write",
            FileOp::Delete => "delete",
        }
    }
}

// ============================================================================
// THREAT DETECTION
// ============================================================================

/// In-memory verdict. Never persisted - it exists only long enough to be
/// folded into a `BehaviorEvent` or discarded (`None` = no concern).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatDetection {
    pub event_type: EventType,
    pub threat_level: ThreatLevel,
    pub threat_signature: Option<String>,
    pub description: String,
    pub evidence: Value,
    pub blocked: bool,
}

impl ThreatDetection {
    pub fn new(
        event_type: EventType,
        threat_level: ThreatLevel,
        signature: &str,
        description: String,
        evidence: Value,
        blocked: bool,
    ) -> Self {
        Self {
            event_type,
            threat_level,
            threat_signature: Some(signature.to_string()),
            description,
            evidence,
            blocked,
        }
    }
}
