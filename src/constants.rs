//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! To change a deployment default, only edit this file.

use std::path::PathBuf;

/// Default agent-host gateway address
pub const DEFAULT_GATEWAY_ADDR: &str = "127.0.0.1:9797";

/// Default operator token for the gateway handshake
pub const DEFAULT_GATEWAY_TOKEN: &str = "dev-operator-token-change-in-production";

/// Default per-request timeout (seconds)
pub const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 10;

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "Agent-Shield";

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Get gateway address from environment or use default
pub fn get_gateway_addr() -> String {
    std::env::var("AGENT_SHIELD_GATEWAY_ADDR").unwrap_or_else(|_| DEFAULT_GATEWAY_ADDR.to_string())
}

/// Get gateway operator token from environment or use default
pub fn get_gateway_token() -> String {
    std::env::var("AGENT_SHIELD_GATEWAY_TOKEN")
        .unwrap_or_else(|_| DEFAULT_GATEWAY_TOKEN.to_string())
}

/// Get gateway request timeout from environment or use default
pub fn get_gateway_timeout_secs() -> u64 {
    std::env::var("AGENT_SHIELD_GATEWAY_TIMEOUT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_GATEWAY_TIMEOUT_SECS)
}

/// Path to a policy JSON document, if configured
pub fn get_policy_path() -> Option<PathBuf> {
    std::env::var("AGENT_SHIELD_POLICY").ok().map(PathBuf::from)
}

/// Data directory for the session store
pub fn get_data_dir() -> PathBuf {
    std::env::var("AGENT_SHIELD_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("agent-shield")
        })
}

/// Check if auto-kill is enabled (default: on)
pub fn is_auto_kill_enabled() -> bool {
    std::env::var("AGENT_SHIELD_AUTO_KILL")
        .map(|s| s.to_lowercase() != "false" && s != "0")
        .unwrap_or(true)
}
