//! Skill Trust Decay
//!
//! Pure functions for the trust-decay state machine and the behavioral
//! fingerprint. State transitions are monotonic: trust only moves down
//! here; certification happens out-of-band.

use sha2::{Digest, Sha256};

use super::types::TrustLevel;
use crate::logic::store::{BehaviorEvent, ThreatLevel};

/// Next trust level after one observed threat.
///
/// - critical: forced to untrusted regardless of current level
/// - high: exactly one step down the scale
/// - three or more accumulated threats: drop to unknown (unless already
///   at the floor)
/// - anything else: unchanged
pub fn calculate_trust_after_threat(
    current: TrustLevel,
    threat_level: ThreatLevel,
    threat_history: u32,
) -> TrustLevel {
    match threat_level {
        ThreatLevel::Critical => TrustLevel::Untrusted,
        ThreatLevel::High => current.step_down(),
        _ if threat_history >= 3 && current != TrustLevel::Untrusted => TrustLevel::Unknown,
        _ => current,
    }
}

/// Fixed-length behavioral fingerprint: SHA-256 over
/// `event_type | threat_level | threat_signature | sorted(detail keys)`.
/// Identical events always hash identically; detail values are not part
/// of the input.
pub fn generate_fingerprint(event: &BehaviorEvent) -> String {
    let mut keys: Vec<&str> = event
        .details
        .as_object()
        .map(|map| map.keys().map(String::as_str).collect())
        .unwrap_or_default();
    keys.sort_unstable();

    let input = format!(
        "{}|{}|{}|{}",
        event.event_type.as_str(),
        event.threat_level.as_str(),
        event.threat_signature.as_deref().unwrap_or(""),
        keys.join(","),
    );

    hex::encode(Sha256::digest(input.as_bytes()))
}

// ============================================================================
// TESTS
// ============================================================================
