//! Behavior Audit Types
//!
//! Core data structures for the session store and the audit trail.
//! No logic here - only data structures shared across engines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// THREAT LEVELS
// ============================================================================

/// Ordered severity scale for detections and audit records.
///
/// The ordering is load-bearing: severity comparisons and the skill-trust
/// decay machine rely on `None < Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::None => "none",
            ThreatLevel::Low => "low",
            ThreatLevel::Medium => "medium",
            ThreatLevel::High => "high",
            ThreatLevel::Critical => "critical",
        }
    }

    pub fn ordinal(&self) -> u8 {
        match self {
            ThreatLevel::None => 0,
            ThreatLevel::Low => 1,
            ThreatLevel::Medium => 2,
            ThreatLevel::High => 3,
            ThreatLevel::Critical => 4,
        }
    }

    pub fn from_ordinal(ord: u8) -> Option<Self> {
        match ord {
            0 => Some(ThreatLevel::None),
            1 => Some(ThreatLevel::Low),
            2 => Some(ThreatLevel::Medium),
            3 => Some(ThreatLevel::High),
            4 => Some(ThreatLevel::Critical),
            _ => None,
        }
    }

    pub fn is_high(&self) -> bool {
        matches!(self, ThreatLevel::High | ThreatLevel::Critical)
    }
}

impl std::fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// EVENT TYPES
// ============================================================================

/// Categories of intercepted agent actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Outbound network request
    NetworkRequest,
    /// Filesystem read/write/delete
    FileAccess,
    /// Child process spawn
    ProcessSpawn,
    /// Generic tool invocation
    ToolCall,
    /// Token-spend sample
    CostAnomaly,
    /// Synthetic record written when the kill switch fires
    KillSwitch,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::NetworkRequest => "network_request",
            EventType::FileAccess => "file_access",
            EventType::ProcessSpawn => "process_spawn",
            EventType::ToolCall => "tool_call",
            EventType::CostAnomaly => "cost_anomaly",
            EventType::KillSwitch => "kill_switch",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "network_request" => Some(EventType::NetworkRequest),
            "file_access" => Some(EventType::FileAccess),
            "process_spawn" => Some(EventType::ProcessSpawn),
            "tool_call" => Some(EventType::ToolCall),
            "cost_anomaly" => Some(EventType::CostAnomaly),
            "kill_switch" => Some(EventType::KillSwitch),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// SESSION STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Terminated,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Terminated => "terminated",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            "terminated" => Some(SessionStatus::Terminated),
            _ => None,
        }
    }
}

// ============================================================================
// BEHAVIOR EVENT
// ============================================================================

/// Immutable audit record of one intercepted agent action.
///
/// Events are append-only and never modified after creation. The store
/// assigns `event_id` and `timestamp` on insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorEvent {
    pub event_id: String,
    pub session_id: String,
    pub agent_id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    /// Opaque key/value map describing the action
    pub details: Value,
    pub threat_level: ThreatLevel,
    pub threat_signature: Option<String>,
    pub blocked: bool,
}

/// Input to `record_behavior` - everything except the store-generated fields.
#[derive(Debug, Clone)]
pub struct BehaviorDraft {
    pub session_id: String,
    pub agent_id: String,
    pub event_type: EventType,
    pub details: Value,
    pub threat_level: ThreatLevel,
    pub threat_signature: Option<String>,
    pub blocked: bool,
}

impl BehaviorDraft {
    pub fn new(session_id: &str, agent_id: &str, event_type: EventType, details: Value) -> Self {
        Self {
            session_id: session_id.to_string(),
            agent_id: agent_id.to_string(),
            event_type,
            details,
            threat_level: ThreatLevel::None,
            threat_signature: None,
            blocked: false,
        }
    }

    pub fn with_threat(mut self, level: ThreatLevel, signature: Option<String>, blocked: bool) -> Self {
        self.threat_level = level;
        self.threat_signature = signature;
        self.blocked = blocked;
        self
    }
}

// ============================================================================
// TESTS
// ============================================================================
