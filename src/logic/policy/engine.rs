//! Policy Engine
//!
//! Stateless rule evaluation against one merged `SecurityPolicy`. Four
//! entry points, each applying its rules in a fixed precedence order so
//! outcomes are deterministic. Each returns `Some(ThreatDetection)` for
//! the first matching rule, `None` when the action is unremarkable.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde_json::json;

use super::config::SecurityPolicy;
use super::types::{signatures, FileOp, ThreatDetection};
use crate::logic::store::{EventType, ThreatLevel};

/// Binaries treated as interactive shells when shell exec is disabled.
const SHELL_BINARIES: &[&str] = &[
    "sh", "bash", "zsh", "fish", "dash", "ksh", "csh", "tcsh", "pwsh", "powershell", "cmd",
    "cmd.exe", "powershell.exe",
];

static HOME_DIR: Lazy<String> = Lazy::new(|| {
    dirs::home_dir()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "/".to_string())
});

// ============================================================================
// ENGINE
// ============================================================================

pub struct PolicyEngine {
    policy: SecurityPolicy,
    /// Exfiltration patterns compiled once per policy document. Invalid
    /// patterns are dropped at compile time, never at evaluation time.
    exfil: Vec<Regex>,
}

impl PolicyEngine {
    pub fn new(policy: SecurityPolicy) -> Self {
        let exfil = compile_patterns(&policy.network.exfiltration_patterns);
        Self { policy, exfil }
    }

    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    /// Replace the policy wholesale (documents are never patched in place).
    pub fn set_policy(&mut self, policy: SecurityPolicy) {
        self.exfil = compile_patterns(&policy.network.exfiltration_patterns);
        self.policy = policy;
    }

    // ------------------------------------------------------------------
    // NETWORK
    // ------------------------------------------------------------------

    /// Precedence: blocked domain > exfiltration shape > external default.
    /// The exfiltration check runs before the external-block default so a
    /// critical verdict is never masked by a high one.
    pub fn evaluate_network_request(
        &self,
        url: &str,
        method: &str,
        hostname: &str,
    ) -> Option<ThreatDetection> {
        let net = &self.policy.network;
        let host = hostname.to_ascii_lowercase();

        if net.blocked_domains.iter().any(|d| domain_matches(d, &host)) {
            return Some(ThreatDetection::new(
                EventType::NetworkRequest,
                ThreatLevel::High,
                signatures::NET_BLOCKED_DOMAIN,
                format!("Request to blocked domain '{}'", host),
                json!({"url": url, "method": method, "hostname": host}),
                true,
            ));
        }

        if let Some(re) = self.exfil.iter().find(|re| re.is_match(url)) {
            return Some(ThreatDetection::new(
                EventType::NetworkRequest,
                ThreatLevel::Critical,
                signatures::NET_DATA_EXFILTRATION,
                format!("URL matches exfiltration shape to '{}'", host),
                json!({"url": url, "method": method, "hostname": host, "pattern": re.as_str()}),
                true,
            ));
        }

        if net.block_external_by_default
            && !net.allowed_domains.iter().any(|d| domain_matches(d, &host))
        {
            return Some(ThreatDetection::new(
                EventType::NetworkRequest,
                ThreatLevel::High,
                signatures::NET_EXTERNAL_BLOCKED,
                format!("External host '{}' is not on the allow-list", host),
                json!({"url": url, "method": method, "hostname": host}),
                true,
            ));
        }

        None
    }

    // ------------------------------------------------------------------
    // FILESYSTEM
    // ------------------------------------------------------------------

    /// Precedence: sensitive path > write outside sandbox.
    pub fn evaluate_file_access(
        &self,
        path: &str,
        operation: FileOp,
        size: Option<u64>,
    ) -> Option<ThreatDetection> {
        let fs = &self.policy.filesystem;
        let normalized = normalize_path(path);

        if let Some(blocked) = fs
            .blocked_paths
            .iter()
            .find(|b| normalized.starts_with(&normalize_path(b)))
        {
            return Some(ThreatDetection::new(
                EventType::FileAccess,
                ThreatLevel::Critical,
                signatures::FS_SENSITIVE_PATH,
                format!("{} access to sensitive path '{}'", operation.as_str(), normalized),
                json!({"path": normalized, "operation": operation.as_str(), "size": size, "blocked_prefix": blocked}),
                true,
            ));
        }

        if operation == FileOp::Write && !is_within_sandbox(&normalized, &fs.sandbox_root) {
            return Some(ThreatDetection::new(
                EventType::FileAccess,
                ThreatLevel::High,
                signatures::FS_WRITE_OUTSIDE_SANDBOX,
                format!("Write outside sandbox root: '{}'", normalized),
                json!({"path": normalized, "operation": operation.as_str(), "size": size, "sandbox_root": fs.sandbox_root}),
                true,
            ));
        }

        None
    }

    // ------------------------------------------------------------------
    // PROCESS
    // ------------------------------------------------------------------

    /// Precedence: shell exec > blocked command > unlisted command.
    /// Unlisted commands are flagged, not blocked.
    pub fn evaluate_process_spawn(&self, command: &str, args: &[String]) -> Option<ThreatDetection> {
        let proc = &self.policy.process;
        let joined = if args.is_empty() {
            command.to_string()
        } else {
            format!("{} {}", command, args.join(" "))
        };

        if !proc.allow_shell_exec && is_shell_binary(command) {
            return Some(ThreatDetection::new(
                EventType::ProcessSpawn,
                ThreatLevel::High,
                signatures::PROC_SHELL_EXEC,
                format!("Shell execution is disabled ('{}')", command),
                json!({"command": command, "args": args}),
                true,
            ));
        }

        if let Some(blocked) = proc
            .blocked_commands
            .iter()
            .find(|b| command.contains(b.as_str()) || joined.contains(b.as_str()))
        {
            return Some(ThreatDetection::new(
                EventType::ProcessSpawn,
                ThreatLevel::Critical,
                signatures::PROC_BLOCKED_COMMAND,
                format!("Blocked command pattern '{}' in '{}'", blocked, joined),
                json!({"command": command, "args": args, "pattern": blocked}),
                true,
            ));
        }

        if !proc.allow_shell_exec && !is_allowed_command(command, &proc.allowed_commands) {
            return Some(ThreatDetection::new(
                EventType::ProcessSpawn,
                ThreatLevel::Medium,
                signatures::PROC_UNLISTED_COMMAND,
                format!("Command '{}' is not on the allow-list", command),
                json!({"command": command, "args": args}),
                false,
            ));
        }

        None
    }

    // ------------------------------------------------------------------
    // COST
    // ------------------------------------------------------------------

    /// Precedence: spike over trailing average > absolute rate ceiling.
    /// Only a critical spike blocks.
    pub fn evaluate_cost_anomaly(
        &self,
        current: u64,
        average: f64,
        spike_multiplier: f64,
        window_secs: u64,
    ) -> Option<ThreatDetection> {
        let cost = &self.policy.cost;

        if spike_multiplier >= cost.spike_threshold {
            let critical = spike_multiplier >= cost.critical_spike_factor * cost.spike_threshold;
            let level = if critical { ThreatLevel::Critical } else { ThreatLevel::High };
            return Some(ThreatDetection::new(
                EventType::CostAnomaly,
                level,
                signatures::COST_SPIKE_DETECTED,
                format!(
                    "Token spend {:.1}x the trailing average (threshold {:.1}x)",
                    spike_multiplier, cost.spike_threshold
                ),
                json!({
                    "current": current,
                    "average": average,
                    "spike_multiplier": spike_multiplier,
                    "window_secs": window_secs,
                }),
                critical,
            ));
        }

        if current > cost.max_tokens_per_minute {
            return Some(ThreatDetection::new(
                EventType::CostAnomaly,
                ThreatLevel::High,
                signatures::COST_RATE_EXCEEDED,
                format!(
                    "Token rate {} exceeds ceiling {}",
                    current, cost.max_tokens_per_minute
                ),
                json!({"current": current, "max_tokens_per_minute": cost.max_tokens_per_minute}),
                false,
            ));
        }

        None
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn compile_patterns(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match RegexBuilder::new(p).case_insensitive(true).build() {
            Ok(re) => Some(re),
            Err(e) => {
                log::warn!("Skipping invalid exfiltration pattern '{}': {}", p, e);
                None
            }
        })
        .collect()
}

/// `*.suffix` matches the suffix itself and any subdomain of it;
/// anything else is an exact match.
fn domain_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    if let Some(suffix) = pattern.strip_prefix("*.") {
        host == suffix || host.ends_with(&format!(".{}", suffix))
    } else {
        host == pattern
    }
}

/// Expand a leading `~` to the home directory and strip trailing slashes.
fn normalize_path(path: &str) -> String {
    let mut out = if path == "~" {
        HOME_DIR.clone()
    } else if let Some(rest) = path.strip_prefix("~/") {
        format!("{}/{}", HOME_DIR.as_str(), rest)
    } else {
        path.to_string()
    };
    while out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

/// Relative paths stay inside the sandbox working directory; absolute
/// paths must fall under the resolved sandbox root.
fn is_within_sandbox(path: &str, sandbox_root: &str) -> bool {
    if !path.starts_with('/') {
        return true;
    }
    let root = normalize_path(sandbox_root);
    let root_abs = if root.starts_with('/') {
        root
    } else {
        let cwd = std::env::current_dir()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|_| "/".to_string());
        if root == "." {
            cwd
        } else {
            format!("{}/{}", cwd, root.trim_start_matches("./"))
        }
    };
    path.starts_with(&root_abs)
}

fn basename(command: &str) -> &str {
    command.rsplit('/').next().unwrap_or(command)
}

fn is_shell_binary(command: &str) -> bool {
    let name = basename(command).to_ascii_lowercase();
    SHELL_BINARIES.contains(&name.as_str())
}

fn is_allowed_command(command: &str, allowed: &[String]) -> bool {
    let name = basename(command);
    allowed.iter().any(|a| a == command || a == name)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::policy::config::{NetworkPolicyPatch, PolicyPatch};

    fn engine() -> PolicyEngine {
        PolicyEngine::new(SecurityPolicy::default())
    }

    // ---------------- network ----------------

    #[test]
    fn test_external_host_blocked_by_default() {
        let verdict = engine()
            .evaluate_network_request("http://example.com/page", "GET", "example.com")
            .unwrap();
        assert_eq!(verdict.threat_level, ThreatLevel::High);
        assert_eq!(verdict.threat_signature.as_deref(), Some(signatures::NET_EXTERNAL_BLOCKED));
        assert!(verdict.blocked);
    }

    #[test]
    fn test_loopback_allowed() {
        assert!(engine()
            .evaluate_network_request("http://localhost:3000/api", "GET", "localhost")
            .is_none());
        assert!(engine()
            .evaluate_network_request("http://127.0.0.1/health", "GET", "127.0.0.1")
            .is_none());
    }

    #[test]
    fn test_wildcard_blocked_domain() {
        let policy = SecurityPolicy::merged(
            &SecurityPolicy::default(),
            &PolicyPatch {
                network: Some(NetworkPolicyPatch {
                    blocked_domains: Some(vec!["*.evil.org".to_string()]),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        let engine = PolicyEngine::new(policy);

        for host in ["sub.evil.org", "evil.org"] {
            let verdict = engine
                .evaluate_network_request(&format!("http://{}/", host), "GET", host)
                .unwrap();
            assert_eq!(verdict.threat_signature.as_deref(), Some(signatures::NET_BLOCKED_DOMAIN));
            assert_eq!(verdict.threat_level, ThreatLevel::High);
        }

        let verdict = engine
            .evaluate_network_request("http://notevil.org/", "GET", "notevil.org")
            .unwrap();
        // Not the block-list - falls through to the external default.
        assert_eq!(verdict.threat_signature.as_deref(), Some(signatures::NET_EXTERNAL_BLOCKED));
    }

    #[test]
    fn test_exfiltration_takes_precedence_over_external_block() {
        let blob = "A".repeat(120);
        let url = format!("http://example.com/upload?data={}", blob);
        let verdict = engine()
            .evaluate_network_request(&url, "POST", "example.com")
            .unwrap();
        assert_eq!(verdict.threat_level, ThreatLevel::Critical);
        assert_eq!(verdict.threat_signature.as_deref(), Some(signatures::NET_DATA_EXFILTRATION));
        assert!(verdict.blocked);
    }

    #[test]
    fn test_credential_query_param_is_exfiltration() {
        let verdict = engine()
            .evaluate_network_request(
                "http://localhost/cb?api_key=sk-abcdef123456",
                "GET",
                "localhost",
            )
            .unwrap();
        assert_eq!(verdict.threat_signature.as_deref(), Some(signatures::NET_DATA_EXFILTRATION));
    }

    #[test]
    fn test_invalid_exfil_pattern_is_skipped() {
        let policy = SecurityPolicy::merged(
            &SecurityPolicy::default(),
            &PolicyPatch {
                network: Some(NetworkPolicyPatch {
                    exfiltration_patterns: Some(vec!["([unclosed".to_string()]),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        let engine = PolicyEngine::new(policy);
        // Bad pattern must not break evaluation; the external default
        // still applies.
        let verdict = engine
            .evaluate_network_request("http://example.com/", "GET", "example.com")
            .unwrap();
        assert_eq!(verdict.threat_signature.as_deref(), Some(signatures::NET_EXTERNAL_BLOCKED));
    }

    // ---------------- filesystem ----------------

    #[test]
    fn test_sensitive_path_always_critical() {
        let verdict = engine()
            .evaluate_file_access("/etc/passwd", FileOp::Read, None)
            .unwrap();
        assert_eq!(verdict.threat_level, ThreatLevel::Critical);
        assert_eq!(verdict.threat_signature.as_deref(), Some(signatures::FS_SENSITIVE_PATH));
        assert!(verdict.blocked);
    }

    #[test]
    fn test_tilde_expansion_in_blocked_paths() {
        let verdict = engine()
            .evaluate_file_access("~/.ssh/id_rsa", FileOp::Read, None)
            .unwrap();
        assert_eq!(verdict.threat_signature.as_deref(), Some(signatures::FS_SENSITIVE_PATH));
    }

    #[test]
    fn test_relative_read_is_clean() {
        assert!(engine()
            .evaluate_file_access("./package.json", FileOp::Read, Some(1024))
            .is_none());
    }

    #[test]
    fn test_write_outside_sandbox() {
        let verdict = engine()
            .evaluate_file_access("/opt/elsewhere/out.bin", FileOp::Write, Some(10))
            .unwrap();
        assert_eq!(verdict.threat_level, ThreatLevel::High);
        assert_eq!(
            verdict.threat_signature.as_deref(),
            Some(signatures::FS_WRITE_OUTSIDE_SANDBOX)
        );
        // Reads outside the sandbox are not the write rule's concern.
        assert!(engine()
            .evaluate_file_access("/opt/elsewhere/out.bin", FileOp::Read, None)
            .is_none());
    }

    #[test]
    fn test_relative_write_stays_inside_sandbox() {
        assert!(engine()
            .evaluate_file_access("./output/result.json", FileOp::Write, Some(64))
            .is_none());
    }

    // ---------------- process ----------------

    #[test]
    fn test_shell_exec_disabled() {
        let verdict = engine().evaluate_process_spawn("bash", &[]).unwrap();
        assert_eq!(verdict.threat_level, ThreatLevel::High);
        assert_eq!(verdict.threat_signature.as_deref(), Some(signatures::PROC_SHELL_EXEC));
        assert!(verdict.blocked);

        // Basename match catches absolute shell paths too.
        let verdict = engine().evaluate_process_spawn("/bin/zsh", &[]).unwrap();
        assert_eq!(verdict.threat_signature.as_deref(), Some(signatures::PROC_SHELL_EXEC));
    }

    #[test]
    fn test_blocked_command_substring() {
        let verdict = engine()
            .evaluate_process_spawn("find", &["/".to_string(), "-exec".to_string(), "rm -rf /".to_string()])
            .unwrap();
        assert_eq!(verdict.threat_level, ThreatLevel::Critical);
        assert_eq!(verdict.threat_signature.as_deref(), Some(signatures::PROC_BLOCKED_COMMAND));
        assert!(verdict.blocked);
    }

    #[test]
    fn test_unlisted_command_flagged_not_blocked() {
        let verdict = engine().evaluate_process_spawn("ffmpeg", &[]).unwrap();
        assert_eq!(verdict.threat_level, ThreatLevel::Medium);
        assert_eq!(verdict.threat_signature.as_deref(), Some(signatures::PROC_UNLISTED_COMMAND));
        assert!(!verdict.blocked);
    }

    #[test]
    fn test_allowed_command_by_basename() {
        assert!(engine().evaluate_process_spawn("git", &["status".to_string()]).is_none());
        assert!(engine().evaluate_process_spawn("/usr/bin/git", &[]).is_none());
    }

    #[test]
    fn test_allow_shell_exec_skips_shell_and_allowlist() {
        let engine = PolicyEngine::new(SecurityPolicy::permissive());
        assert!(engine.evaluate_process_spawn("bash", &["-c".to_string(), "ls".to_string()]).is_none());
        assert!(engine.evaluate_process_spawn("ffmpeg", &[]).is_none());
    }

    // ---------------- cost ----------------

    #[test]
    fn test_spike_at_threshold_is_high() {
        // Exactly 3x with a 3x threshold: high, not blocked.
        let verdict = engine().evaluate_cost_anomaly(3_000, 1_000.0, 3.0, 60).unwrap();
        assert_eq!(verdict.threat_level, ThreatLevel::High);
        assert_eq!(verdict.threat_signature.as_deref(), Some(signatures::COST_SPIKE_DETECTED));
        assert!(!verdict.blocked);
    }

    #[test]
    fn test_spike_at_double_threshold_is_critical() {
        // 10x >= 2 * 3x: critical and blocked.
        let verdict = engine().evaluate_cost_anomaly(10_000, 1_000.0, 10.0, 60).unwrap();
        assert_eq!(verdict.threat_level, ThreatLevel::Critical);
        assert!(verdict.blocked);
    }

    #[test]
    fn test_rate_ceiling_flagged_not_blocked() {
        let verdict = engine().evaluate_cost_anomaly(150_000, 140_000.0, 1.07, 60).unwrap();
        assert_eq!(verdict.threat_signature.as_deref(), Some(signatures::COST_RATE_EXCEEDED));
        assert_eq!(verdict.threat_level, ThreatLevel::High);
        assert!(!verdict.blocked);
    }

    #[test]
    fn test_unremarkable_cost_sample() {
        assert!(engine().evaluate_cost_anomaly(1_000, 900.0, 1.1, 60).is_none());
    }

    // ---------------- helpers ----------------

    #[test]
    fn test_domain_matching() {
        assert!(domain_matches("*.evil.org", "sub.evil.org"));
        assert!(domain_matches("*.evil.org", "evil.org"));
        assert!(!domain_matches("*.evil.org", "notevil.org"));
        assert!(domain_matches("example.com", "example.com"));
        assert!(!domain_matches("example.com", "sub.example.com"));
    }

    #[test]
    fn test_normalize_path_strips_trailing_slash() {
        assert_eq!(normalize_path("/etc/passwd/"), "/etc/passwd");
        assert_eq!(normalize_path("/"), "/");
    }
}
