//! Threat Intelligence Types
//!
//! Signature records and per-skill trust state. No logic here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::store::ThreatLevel;

// ============================================================================
// SIGNATURE CATEGORIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureCategory {
    Exfiltration,
    CredentialAccess,
    ReverseShell,
    Destructive,
    PromptInjection,
    CostAbuse,
    Execution,
    Campaign,
}

impl SignatureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureCategory::Exfiltration => "exfiltration",
            SignatureCategory::CredentialAccess => "credential_access",
            SignatureCategory::ReverseShell => "reverse_shell",
            SignatureCategory::Destructive => "destructive",
            SignatureCategory::PromptInjection => "prompt_injection",
            SignatureCategory::CostAbuse => "cost_abuse",
            SignatureCategory::Execution => "execution",
            SignatureCategory::Campaign => "campaign",
        }
    }
}

// ============================================================================
// THREAT SIGNATURES
// ============================================================================

/// A named regex pattern with a severity, used to detect known-bad
/// behavioral patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatSignature {
    pub signature_id: String,
    pub name: String,
    pub description: String,
    pub pattern: String,
    pub category: SignatureCategory,
    pub severity: ThreatLevel,
    pub created_at: DateTime<Utc>,
    /// Incremented on every match; never decremented.
    pub hit_count: u64,
}

/// The describing fields of a signature - the shape that travels through
/// export/import. `hit_count` and `created_at` never survive an import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureDef {
    pub signature_id: String,
    pub name: String,
    pub description: String,
    pub pattern: String,
    pub category: SignatureCategory,
    pub severity: ThreatLevel,
}

impl SignatureDef {
    pub fn new(
        id: &str,
        name: &str,
        description: &str,
        pattern: &str,
        category: SignatureCategory,
        severity: ThreatLevel,
    ) -> Self {
        Self {
            signature_id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            pattern: pattern.to_string(),
            category,
            severity,
        }
    }
}

// ============================================================================
// TRUST LEVELS
// ============================================================================

/// Skill reputation on the decay scale. Ordering is load-bearing:
/// `Untrusted < Unknown < Community < Verified < Certified`, and the
/// decay machine only ever moves down it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    Untrusted,
    Unknown,
    Community,
    Verified,
    Certified,
}

impl TrustLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::Untrusted => "untrusted",
            TrustLevel::Unknown => "unknown",
            TrustLevel::Community => "community",
            TrustLevel::Verified => "verified",
            TrustLevel::Certified => "certified",
        }
    }

    pub fn ordinal(&self) -> u8 {
        match self {
            TrustLevel::Untrusted => 0,
            TrustLevel::Unknown => 1,
            TrustLevel::Community => 2,
            TrustLevel::Verified => 3,
            TrustLevel::Certified => 4,
        }
    }

    pub fn from_ordinal(ord: u8) -> Option<Self> {
        match ord {
            0 => Some(TrustLevel::Untrusted),
            1 => Some(TrustLevel::Unknown),
            2 => Some(TrustLevel::Community),
            3 => Some(TrustLevel::Verified),
            4 => Some(TrustLevel::Certified),
            _ => None,
        }
    }

    /// One level down the scale, clamped at `Untrusted`.
    pub fn step_down(&self) -> Self {
        TrustLevel::from_ordinal(self.ordinal().saturating_sub(1)).unwrap_or(TrustLevel::Untrusted)
    }
}

impl std::fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// SKILL TRUST
// ============================================================================

/// Per-skill trust state. `threat_history` only increases; `trust_level`
/// only moves down inside this core (certification is out-of-band).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillTrust {
    pub skill_id: String,
    pub skill_name: String,
    pub publisher: String,
    pub trust_level: TrustLevel,
    pub certified_at: Option<DateTime<Utc>>,
    pub last_audit_at: Option<DateTime<Utc>>,
    pub threat_history: u32,
    pub behavioral_fingerprint: String,
}

impl SkillTrust {
    /// First threat observation for an unseen skill.
    pub fn seed(skill_id: &str) -> Self {
        Self {
            skill_id: skill_id.to_string(),
            skill_name: skill_id.to_string(),
            publisher: "unknown".to_string(),
            trust_level: TrustLevel::Untrusted,
            certified_at: None,
            last_audit_at: None,
            threat_history: 1,
            behavioral_fingerprint: String::new(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
