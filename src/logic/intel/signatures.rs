//! Signature Registry
//!
//! Built-in and runtime-registered threat signatures with compiled-pattern
//! matching. Patterns compile once at registration; an invalid pattern is
//! kept in the table but skipped by the matcher, so one bad signature can
//! never break matching for the rest.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use regex::{Regex, RegexBuilder};
use serde::Serialize;

use super::types::{SignatureCategory, SignatureDef, ThreatSignature};
use crate::logic::store::ThreatLevel;

// ============================================================================
// BUILT-IN SIGNATURES
// ============================================================================

fn builtin_signatures() -> Vec<SignatureDef> {
    use SignatureCategory::*;
    use ThreatLevel::*;

    vec![
        SignatureDef::new(
            "EXFIL_BASE64_BLOB",
            "Base64 Payload Exfiltration",
            "Large base64-looking blob leaving the runtime",
            r"[A-Za-z0-9+/]{100,}={0,2}",
            Exfiltration,
            Critical,
        ),
        SignatureDef::new(
            "EXFIL_HEX_BLOB",
            "Hex Payload Exfiltration",
            "Long hex-encoded blob leaving the runtime",
            r"(?:[0-9a-f]{2}){60,}",
            Exfiltration,
            High,
        ),
        SignatureDef::new(
            "CRED_LEAK",
            "Credential Leakage",
            "Secret-looking assignment in action details",
            r"(?:password|passwd|secret|api_?key|access_token|authorization)\x22?\s*[=:]\s*\x22?[^\s\x22]{6,}",
            CredentialAccess,
            High,
        ),
        SignatureDef::new(
            "SSH_KEY_ACCESS",
            "SSH Key Material Access",
            "SSH private key paths or PEM headers",
            r"\.ssh/(?:id_[a-z0-9]+|authorized_keys)|BEGIN (?:RSA|OPENSSH|EC) PRIVATE KEY",
            CredentialAccess,
            Critical,
        ),
        SignatureDef::new(
            "REVERSE_SHELL",
            "Reverse Shell Pattern",
            "Classic reverse-shell invocations",
            r"/dev/tcp/|nc\s+-e\s|ncat\s+-e\s|socat\s+\S*exec|bash\s+-i\s+>&",
            ReverseShell,
            Critical,
        ),
        SignatureDef::new(
            "DESTRUCTIVE_CMD",
            "Destructive Command",
            "Filesystem or device destruction patterns",
            r"rm\s+-rf\s+[/~]|mkfs\.|dd\s+if=\S+\s+of=/dev/|chmod\s+-R\s+777\s+/",
            Destructive,
            Critical,
        ),
        SignatureDef::new(
            "CURL_PIPE_SH",
            "Remote Script Execution",
            "Piping a downloaded script straight into a shell",
            r"(?:curl|wget)[^|]{0,200}\|\s*(?:ba|z|da)?sh",
            Execution,
            High,
        ),
        SignatureDef::new(
            "PROMPT_INJECTION",
            "Prompt Injection Artifact",
            "Instruction-override phrasing in action details",
            r"ignore\s+(?:all\s+)?previous\s+instructions|disregard\s+(?:your|all|prior)\s+(?:instructions|rules)|do\s+anything\s+now",
            PromptInjection,
            High,
        ),
        SignatureDef::new(
            "COST_BOMB",
            "Cost Bomb",
            "Unbounded-generation phrasing or absurd token ceilings",
            r"(?:repeat|loop)\s+(?:this\s+)?(?:forever|indefinitely|until\s+stopped)|max_tokens\s*[=:]\s*\d{7,}",
            CostAbuse,
            High,
        ),
        SignatureDef::new(
            "CVE_2024_3094",
            "XZ Backdoor Artifact",
            "Artifacts of the xz/liblzma supply-chain backdoor",
            r"liblzma\S*\.so\.5\.6\.[01]",
            Campaign,
            Critical,
        ),
        SignatureDef::new(
            "CAMPAIGN_SHAI_HULUD",
            "Shai-Hulud npm Worm",
            "Markers of the self-replicating npm credential stealer",
            r"shai[-_]?hulud",
            Campaign,
            Critical,
        ),
    ]
}

// ============================================================================
// REGISTRY
// ============================================================================

struct CompiledSignature {
    sig: ThreatSignature,
    /// `None` when the stored pattern failed to compile; such entries are
    /// skipped by the matcher.
    regex: Option<Regex>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignatureStats {
    pub total_signatures: usize,
    pub total_hits: u64,
    pub hits_by_severity: HashMap<String, u64>,
    pub top_signatures: Vec<(String, u64)>,
}

pub struct SignatureRegistry {
    sigs: RwLock<HashMap<String, CompiledSignature>>,
}

impl SignatureRegistry {
    /// Registry seeded with the built-in set.
    pub fn new() -> Self {
        let registry = Self {
            sigs: RwLock::new(HashMap::new()),
        };
        for def in builtin_signatures() {
            registry.register(def);
        }
        registry
    }

    fn compile(pattern: &str) -> Option<Regex> {
        match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => Some(re),
            Err(e) => {
                log::warn!("Signature pattern failed to compile, entry disabled: {}", e);
                None
            }
        }
    }

    /// Add or replace a signature. The compiled pattern is cached here;
    /// hit count starts at zero.
    pub fn register(&self, def: SignatureDef) {
        let regex = Self::compile(&def.pattern);
        let sig = ThreatSignature {
            signature_id: def.signature_id.clone(),
            name: def.name,
            description: def.description,
            pattern: def.pattern,
            category: def.category,
            severity: def.severity,
            created_at: Utc::now(),
            hit_count: 0,
        };
        self.sigs
            .write()
            .insert(def.signature_id, CompiledSignature { sig, regex });
    }

    /// Test every signature against the serialized details; every match
    /// increments that signature's hit count. Returns the matched set.
    pub fn match_serialized(&self, serialized: &str) -> Vec<ThreatSignature> {
        let mut sigs = self.sigs.write();
        let mut matched = Vec::new();
        for entry in sigs.values_mut() {
            let Some(regex) = &entry.regex else { continue };
            if regex.is_match(serialized) {
                entry.sig.hit_count += 1;
                matched.push(entry.sig.clone());
            }
        }
        matched
    }

    pub fn get(&self, signature_id: &str) -> Option<ThreatSignature> {
        self.sigs.read().get(signature_id).map(|e| e.sig.clone())
    }

    /// Describing fields of every signature, for transfer to another
    /// registry.
    pub fn export(&self) -> Vec<SignatureDef> {
        let mut defs: Vec<SignatureDef> = self
            .sigs
            .read()
            .values()
            .map(|e| SignatureDef {
                signature_id: e.sig.signature_id.clone(),
                name: e.sig.name.clone(),
                description: e.sig.description.clone(),
                pattern: e.sig.pattern.clone(),
                category: e.sig.category,
                severity: e.sig.severity,
            })
            .collect();
        defs.sort_by(|a, b| a.signature_id.cmp(&b.signature_id));
        defs
    }

    /// Idempotent import: ids already present are skipped, never
    /// overwritten. Returns the number of signatures added.
    pub fn import(&self, defs: Vec<SignatureDef>) -> usize {
        let mut added = 0;
        for def in defs {
            if self.sigs.read().contains_key(&def.signature_id) {
                continue;
            }
            self.register(def);
            added += 1;
        }
        added
    }

    pub fn len(&self) -> usize {
        self.sigs.read().len()
    }

    pub fn stats(&self) -> SignatureStats {
        let sigs = self.sigs.read();
        let mut hits_by_severity: HashMap<String, u64> = HashMap::new();
        let mut by_sig: Vec<(String, u64)> = Vec::new();
        let mut total_hits = 0;

        for entry in sigs.values() {
            total_hits += entry.sig.hit_count;
            if entry.sig.hit_count > 0 {
                *hits_by_severity
                    .entry(entry.sig.severity.as_str().to_string())
                    .or_insert(0) += entry.sig.hit_count;
                by_sig.push((entry.sig.signature_id.clone(), entry.sig.hit_count));
            }
        }

        by_sig.sort_by(|a, b| b.1.cmp(&a.1));
        by_sig.truncate(10);

        SignatureStats {
            total_signatures: sigs.len(),
            total_hits,
            hits_by_severity,
            top_signatures: by_sig,
        }
    }
}

impl Default for SignatureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
