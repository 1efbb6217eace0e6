//! The two-level error taxonomy (§4.1, §7) and message-template builder.
//!
//! Modeled as a `thiserror`-derived enum the way `vtcode-core`'s
//! `ModelParseError` and `mcp/errors.rs` model their own closed error
//! sets, except this taxonomy is consumed by the envelope rather than
//! bubbled up as a Rust `Error` trait object: probes convert a
//! `ProbeError` into `(error_type, error_message)` fields and never let
//! it escape their own boundary (propagation policy, §7).

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Error category, the first half of the `(category, code)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    System,
    Input,
    Execution,
    Configuration,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Network => "network",
            ErrorCategory::System => "system",
            ErrorCategory::Input => "input",
            ErrorCategory::Execution => "execution",
            ErrorCategory::Configuration => "configuration",
        };
        f.write_str(s)
    }
}

/// Specific error code within a category (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ConnectionFailed,
    Timeout,
    DnsResolution,
    Unreachable,
    PermissionDenied,
    ToolMissing,
    InvalidPlatform,
    InvalidTarget,
    InvalidPort,
    InvalidFormat,
    MissingParameter,
    CommandFailed,
    ParsingError,
    UnexpectedError,
    FileNotFound,
    InvalidConfig,
    PermissionError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::ConnectionFailed => "connection_failed",
            ErrorCode::Timeout => "timeout",
            ErrorCode::DnsResolution => "dns_resolution",
            ErrorCode::Unreachable => "unreachable",
            ErrorCode::PermissionDenied => "permission_denied",
            ErrorCode::ToolMissing => "tool_missing",
            ErrorCode::InvalidPlatform => "invalid_platform",
            ErrorCode::InvalidTarget => "invalid_target",
            ErrorCode::InvalidPort => "invalid_port",
            ErrorCode::InvalidFormat => "invalid_format",
            ErrorCode::MissingParameter => "missing_parameter",
            ErrorCode::CommandFailed => "command_failed",
            ErrorCode::ParsingError => "parsing_error",
            ErrorCode::UnexpectedError => "unexpected_error",
            ErrorCode::FileNotFound => "file_not_found",
            ErrorCode::InvalidConfig => "invalid_config",
            ErrorCode::PermissionError => "permission_error",
        };
        f.write_str(s)
    }
}

/// A fully-formed probe error: category, code, formatted message, and
/// remediation suggestions. This is what ends up in the envelope's
/// `error_type`/`error_message` fields; `suggestions` rides along as a
/// probe-specific `parsed_data` extra when useful.
#[derive(Debug, Clone, Error, serde::Serialize)]
#[error("{category}.{code}: {message}")]
pub struct ProbeError {
    pub category: ErrorCategory,
    pub code: ErrorCode,
    pub message: String,
    pub suggestions: Vec<String>,
}

/// Formats a message template against a context map. Missing
/// placeholders are left literal rather than raising (§4.1).
fn format_template(template: &str, context: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = template[i + 1..].find('}') {
                let key = &template[i + 1..i + 1 + end];
                if let Some(value) = context.get(key) {
                    out.push_str(value);
                } else {
                    out.push_str(&template[i..i + 2 + end]);
                }
                i += 2 + end;
                continue;
            }
        }
        let ch = template[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    let _ = &mut chars;
    out
}

struct Template {
    message: &'static str,
    suggestions: &'static [&'static str],
}

fn template_for(category: ErrorCategory, code: ErrorCode) -> Template {
    use ErrorCategory::*;
    use ErrorCode::*;
    match (category, code) {
        (Network, Timeout) => Template {
            message: "Operation timed out after {timeout}s",
            suggestions: &[
                "Check your internet connection",
                "Try increasing the timeout for this tool",
                "Verify the target is reachable manually (ping/traceroute)",
                "Check if a firewall is blocking the connection",
            ],
        },
        (Network, ConnectionFailed) => Template {
            message: "Failed to establish connection to {target}",
            suggestions: &[
                "Verify the target IP/hostname is correct",
                "Check if the target service is running",
                "Test basic connectivity with ping first",
            ],
        },
        (Network, DnsResolution) => Template {
            message: "Failed to resolve hostname {target}",
            suggestions: &[
                "Check if the hostname is spelled correctly",
                "Test DNS resolution with 'dig' or 'nslookup'",
                "Try using an IP address instead of a hostname",
            ],
        },
        (Network, Unreachable) => Template {
            message: "Target {target} is unreachable",
            suggestions: &["Check routing to the target", "Verify the target is online"],
        },
        (System, PermissionDenied) => Template {
            message: "Operation '{operation}' requires elevated privileges",
            suggestions: &[
                "Re-run with the required privileges",
                "Use a connect-scan profile that does not require raw sockets",
            ],
        },
        (System, ToolMissing) => Template {
            message: "Required tool '{tool}' not found on system",
            suggestions: &[
                "Install {tool} using your platform's package manager",
                "Verify {tool} is on your PATH",
            ],
        },
        (System, InvalidPlatform) => Template {
            message: "Operation not supported on this platform",
            suggestions: &["Run this tool on a supported platform"],
        },
        (Input, InvalidTarget) => Template {
            message: "Invalid target: {target}",
            suggestions: &["Provide a valid hostname, IP address, or CIDR"],
        },
        (Input, InvalidPort) => Template {
            message: "Invalid port: {target}",
            suggestions: &["Provide a port number between 1 and 65535"],
        },
        (Input, InvalidFormat) => Template {
            message: "Invalid format for {target}",
            suggestions: &["Check the expected input format and retry"],
        },
        (Input, MissingParameter) => Template {
            message: "Missing required parameter: {target}",
            suggestions: &["Supply the missing parameter and retry"],
        },
        (Execution, CommandFailed) => Template {
            message: "Command failed: {command}",
            suggestions: &["Inspect stderr for the underlying cause"],
        },
        (Execution, ParsingError) => Template {
            message: "Failed to parse output of {tool}",
            suggestions: &["The command succeeded but its output was unexpected"],
        },
        (Execution, UnexpectedError) => Template {
            message: "Unexpected error in {tool}: {target}",
            suggestions: &["Re-run with verbose logging and report the issue"],
        },
        (Configuration, FileNotFound) => Template {
            message: "Configuration file not found: {target}",
            suggestions: &["Check the expected file location"],
        },
        (Configuration, InvalidConfig) => Template {
            message: "Invalid configuration: {target}",
            suggestions: &["Review the configuration value and retry"],
        },
        (Configuration, PermissionError) => Template {
            message: "Permission error accessing {target}",
            suggestions: &["Check file permissions for the target path"],
        },
        _ => Template {
            message: "{tool} failed: {target}",
            suggestions: &[],
        },
    }
}

impl ProbeError {
    /// Builds a `ProbeError` from its template, formatting placeholders
    /// against `context`.
    pub fn new(
        category: ErrorCategory,
        code: ErrorCode,
        context: &HashMap<&str, String>,
    ) -> Self {
        let template = template_for(category, code);
        Self {
            category,
            code,
            message: format_template(template.message, context),
            suggestions: template.suggestions.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn network(code: ErrorCode, context: &HashMap<&str, String>) -> Self {
        Self::new(ErrorCategory::Network, code, context)
    }

    pub fn system(code: ErrorCode, context: &HashMap<&str, String>) -> Self {
        Self::new(ErrorCategory::System, code, context)
    }

    pub fn input(code: ErrorCode, context: &HashMap<&str, String>) -> Self {
        Self::new(ErrorCategory::Input, code, context)
    }

    pub fn execution(code: ErrorCode, context: &HashMap<&str, String>) -> Self {
        Self::new(ErrorCategory::Execution, code, context)
    }

    pub fn configuration(code: ErrorCode, context: &HashMap<&str, String>) -> Self {
        Self::new(ErrorCategory::Configuration, code, context)
    }
}

/// Convenience: build a one-entry context map.
pub fn ctx(pairs: &[(&'static str, &str)]) -> HashMap<&'static str, String> {
    pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_placeholder_left_literal() {
        let err = ProbeError::network(ErrorCode::Timeout, &HashMap::new());
        assert_eq!(err.message, "Operation timed out after {timeout}s");
    }

    #[test]
    fn placeholder_substitution() {
        let err = ProbeError::network(ErrorCode::Timeout, &ctx(&[("timeout", "5")]));
        assert_eq!(err.message, "Operation timed out after 5s");
    }

    #[test]
    fn category_display() {
        assert_eq!(ErrorCategory::Network.to_string(), "network");
        assert_eq!(ErrorCode::DnsResolution.to_string(), "dns_resolution");
    }
}
