//! Security Policy Document
//!
//! A versioned document with four independent sub-policies. Immutable once
//! evaluated against; an update merges a patch with the documented defaults
//! to produce a new complete document, so partial input never leaves a
//! field unset.

use serde::{Deserialize, Serialize};

// ============================================================================
// NETWORK POLICY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkPolicy {
    /// Block every hostname not on the allow-list.
    pub block_external_by_default: bool,
    /// Allow-list entries: exact hostnames or `*.suffix` wildcards.
    pub allowed_domains: Vec<String>,
    /// Block-list entries: exact hostnames or `*.suffix` wildcards.
    pub blocked_domains: Vec<String>,
    /// Regexes tested against the full URL for exfiltration shapes.
    pub exfiltration_patterns: Vec<String>,
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        Self {
            block_external_by_default: true,
            // Loopback only by default.
            allowed_domains: vec![
                "localhost".to_string(),
                "127.0.0.1".to_string(),
                "::1".to_string(),
            ],
            blocked_domains: vec![],
            exfiltration_patterns: default_exfiltration_patterns(),
        }
    }
}

/// Default exfiltration shapes: long base64 blobs, long hex blobs,
/// credential-looking query params, sensitive file extensions.
pub fn default_exfiltration_patterns() -> Vec<String> {
    vec![
        r"[A-Za-z0-9+/]{100,}={0,2}".to_string(),
        r"(?:[0-9a-fA-F]{2}){50,}".to_string(),
        r"[?&](?:password|passwd|secret|token|api_?key|auth)=[^&\s]+".to_string(),
        r"\.(?:pem|key|p12|pfx|env|kdbx|sqlite)(?:[?#]|$)".to_string(),
    ]
}

// ============================================================================
// FILESYSTEM POLICY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesystemPolicy {
    /// Path prefixes that must never be touched. `~` expands to home.
    pub blocked_paths: Vec<String>,
    /// Writes outside this root are flagged. Relative roots resolve
    /// against the working directory.
    pub sandbox_root: String,
}

impl Default for FilesystemPolicy {
    fn default() -> Self {
        Self {
            blocked_paths: vec![
                "/etc/passwd".to_string(),
                "/etc/shadow".to_string(),
                "/etc/sudoers".to_string(),
                "~/.ssh".to_string(),
                "~/.aws".to_string(),
                "~/.gnupg".to_string(),
                "~/.kube".to_string(),
                "~/.config/gcloud".to_string(),
            ],
            sandbox_root: ".".to_string(),
        }
    }
}

// ============================================================================
// PROCESS POLICY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessPolicy {
    /// When false, shell binaries are refused and unlisted commands are
    /// flagged.
    pub allow_shell_exec: bool,
    /// Commands an agent may run without being flagged (exact or basename
    /// match).
    pub allowed_commands: Vec<String>,
    /// Substrings that make a command line critical wherever they appear.
    pub blocked_commands: Vec<String>,
}

impl Default for ProcessPolicy {
    fn default() -> Self {
        Self {
            allow_shell_exec: false,
            allowed_commands: vec![
                "node".to_string(),
                "npm".to_string(),
                "npx".to_string(),
                "python".to_string(),
                "python3".to_string(),
                "pip".to_string(),
                "git".to_string(),
                "cargo".to_string(),
                "rustc".to_string(),
                "go".to_string(),
                "make".to_string(),
                "ls".to_string(),
                "cat".to_string(),
                "grep".to_string(),
                "find".to_string(),
                "echo".to_string(),
                "pwd".to_string(),
                "which".to_string(),
            ],
            blocked_commands: vec![
                "rm -rf /".to_string(),
                "rm -rf ~".to_string(),
                "mkfs".to_string(),
                "dd if=/dev/zero".to_string(),
                ":(){ :|:& };:".to_string(),
                "chmod -R 777 /".to_string(),
                "shutdown".to_string(),
                "reboot".to_string(),
            ],
        }
    }
}

// ============================================================================
// COST POLICY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CostPolicy {
    /// Hard per-minute token ceiling.
    pub max_tokens_per_minute: u64,
    /// Spike ratio over the trailing average that triggers a verdict.
    pub spike_threshold: f64,
    /// A spike at `critical_spike_factor * spike_threshold` or beyond
    /// escalates to critical (and blocks).
    pub critical_spike_factor: f64,
    /// Sliding-window size in seconds.
    pub window_secs: u64,
}

impl Default for CostPolicy {
    fn default() -> Self {
        Self {
            max_tokens_per_minute: 100_000,
            spike_threshold: 3.0,
            critical_spike_factor: 2.0,
            window_secs: 60,
        }
    }
}

// ============================================================================
// SECURITY POLICY (document root)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityPolicy {
    pub version: u32,
    pub network: NetworkPolicy,
    pub filesystem: FilesystemPolicy,
    pub process: ProcessPolicy,
    pub cost: CostPolicy,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            version: 1,
            network: NetworkPolicy::default(),
            filesystem: FilesystemPolicy::default(),
            process: ProcessPolicy::default(),
            cost: CostPolicy::default(),
        }
    }
}

impl SecurityPolicy {
    /// Parse a (possibly partial) JSON document. Missing fields take the
    /// documented defaults, so the result is always complete.
    pub fn load_from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize the full merged document.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Build a new complete document: defaults overlaid with the patch.
    /// The version is carried forward from `current` and bumped.
    pub fn merged(current: &SecurityPolicy, patch: &PolicyPatch) -> SecurityPolicy {
        let mut next = SecurityPolicy::default();
        next.version = current.version + 1;

        if let Some(net) = &patch.network {
            apply_opt(&mut next.network.block_external_by_default, &net.block_external_by_default);
            apply_opt(&mut next.network.allowed_domains, &net.allowed_domains);
            apply_opt(&mut next.network.blocked_domains, &net.blocked_domains);
            apply_opt(&mut next.network.exfiltration_patterns, &net.exfiltration_patterns);
        }
        if let Some(fs) = &patch.filesystem {
            apply_opt(&mut next.filesystem.blocked_paths, &fs.blocked_paths);
            apply_opt(&mut next.filesystem.sandbox_root, &fs.sandbox_root);
        }
        if let Some(proc) = &patch.process {
            apply_opt(&mut next.process.allow_shell_exec, &proc.allow_shell_exec);
            apply_opt(&mut next.process.allowed_commands, &proc.allowed_commands);
            apply_opt(&mut next.process.blocked_commands, &proc.blocked_commands);
        }
        if let Some(cost) = &patch.cost {
            apply_opt(&mut next.cost.max_tokens_per_minute, &cost.max_tokens_per_minute);
            apply_opt(&mut next.cost.spike_threshold, &cost.spike_threshold);
            apply_opt(&mut next.cost.critical_spike_factor, &cost.critical_spike_factor);
            apply_opt(&mut next.cost.window_secs, &cost.window_secs);
        }
        next
    }

    /// Strict preset - nothing external, nothing unlisted, low cost ceiling.
    pub fn strict() -> Self {
        let mut policy = Self::default();
        policy.network.allowed_domains = vec![];
        policy.process.allowed_commands = vec![];
        policy.cost.max_tokens_per_minute = 20_000;
        policy.cost.spike_threshold = 2.0;
        policy
    }

    /// Permissive preset for trusted environments - external traffic and
    /// shell exec allowed, detection still on.
    pub fn permissive() -> Self {
        let mut policy = Self::default();
        policy.network.block_external_by_default = false;
        policy.process.allow_shell_exec = true;
        policy
    }
}

fn apply_opt<T: Clone>(target: &mut T, source: &Option<T>) {
    if let Some(value) = source {
        *target = value.clone();
    }
}

// ============================================================================
// POLICY PATCH
// ============================================================================

/// Partial policy update. Every field is optional; omitted fields fall
/// back to defaults when merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyPatch {
    pub network: Option<NetworkPolicyPatch>,
    pub filesystem: Option<FilesystemPolicyPatch>,
    pub process: Option<ProcessPolicyPatch>,
    pub cost: Option<CostPolicyPatch>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkPolicyPatch {
    pub block_external_by_default: Option<bool>,
    pub allowed_domains: Option<Vec<String>>,
    pub blocked_domains: Option<Vec<String>>,
    pub exfiltration_patterns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilesystemPolicyPatch {
    pub blocked_paths: Option<Vec<String>>,
    pub sandbox_root: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessPolicyPatch {
    pub allow_shell_exec: Option<bool>,
    pub allowed_commands: Option<Vec<String>>,
    pub blocked_commands: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostPolicyPatch {
    pub max_tokens_per_minute: Option<u64>,
    pub spike_threshold: Option<f64>,
    pub critical_spike_factor: Option<f64>,
    pub window_secs: Option<u64>,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_complete() {
        let policy = SecurityPolicy::default();
        assert!(policy.network.block_external_by_default);
        assert!(!policy.network.allowed_domains.is_empty());
        assert!(!policy.filesystem.blocked_paths.is_empty());
        assert!(!policy.process.allow_shell_exec);
        assert_eq!(policy.cost.spike_threshold, 3.0);
        assert_eq!(policy.cost.window_secs, 60);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let policy = SecurityPolicy::load_from_json(
            r#"{"network": {"block_external_by_default": false}}"#,
        )
        .unwrap();

        assert!(!policy.network.block_external_by_default);
        // Everything omitted is still present with its default.
        assert_eq!(policy.network.allowed_domains, NetworkPolicy::default().allowed_domains);
        assert_eq!(policy.filesystem.blocked_paths, FilesystemPolicy::default().blocked_paths);
        assert_eq!(policy.cost.max_tokens_per_minute, 100_000);
    }

    #[test]
    fn test_json_roundtrip() {
        let policy = SecurityPolicy::strict();
        let json = policy.to_json();
        let reloaded = SecurityPolicy::load_from_json(&json).unwrap();
        assert_eq!(reloaded.to_json(), json);
    }

    #[test]
    fn test_merge_is_against_defaults() {
        let mut current = SecurityPolicy::default();
        current.network.block_external_by_default = false; // prior override
        current.version = 4;

        let patch = PolicyPatch {
            cost: Some(CostPolicyPatch {
                spike_threshold: Some(5.0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let next = SecurityPolicy::merged(&current, &patch);

        assert_eq!(next.version, 5);
        assert_eq!(next.cost.spike_threshold, 5.0);
        // Unpatched sub-fields return to the documented defaults rather
        // than keeping stale in-place edits.
        assert!(next.network.block_external_by_default);
        assert_eq!(next.cost.window_secs, 60);
    }

    #[test]
    fn test_presets() {
        assert!(SecurityPolicy::strict().process.allowed_commands.is_empty());
        assert!(SecurityPolicy::permissive().process.allow_shell_exec);
    }
}
