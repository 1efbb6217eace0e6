//! Compiled-in configuration: timeout tables, provider dictionaries, and
//! the fixed environment variable surface.
//!
//! These are plain constants rather than a parsed config file on purpose:
//! the spec's Non-goals exclude "configuration file parsing into constant
//! tables" as an external collaborator's concern, so this module *is* the
//! constant table the excluded parser would otherwise populate.

pub mod constants;

use std::env;

/// Fixed set of environment variables the engine reads. No other
/// environment variable is consulted from probe code (§6).
pub mod env_vars {
    pub const AUTH_ENABLED: &str = "NETPROBE_AUTH_ENABLED";
    pub const AUTH_KEY: &str = "NETPROBE_AUTH_KEY";
    pub const ABUSEIPDB_API_KEY: &str = "NETPROBE_ABUSEIPDB_API_KEY";
}

/// Whether the external-protocol server's optional auth gate is enabled.
pub fn auth_enabled() -> bool {
    matches!(
        env::var(env_vars::AUTH_ENABLED).ok().as_deref(),
        Some("1") | Some("true") | Some("TRUE") | Some("yes")
    )
}

/// The configured shared secret for the auth gate, if any.
pub fn auth_key() -> Option<String> {
    env::var(env_vars::AUTH_KEY).ok().filter(|v| !v.is_empty())
}

/// API key for the external-IP reputation lookup (AbuseIPDB), if configured.
pub fn abuseipdb_api_key() -> Option<String> {
    env::var(env_vars::ABUSEIPDB_API_KEY)
        .ok()
        .filter(|v| !v.is_empty())
}
