//! Pentest-suite wrappers (§4.4 "Pentest-suite wrappers", §9 "Privileged
//! scans"): thin adapters over an external port-scanner binary, captured
//! verbatim plus a best-effort structured host/port listing. Registered
//! unconditionally; the registry's own `external_tool_required` gate
//! (§4.6 item 3) already refuses to run them when the binary is absent,
//! so there is nothing extra to check here at registration time.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::constants::timeouts;
use crate::envelope::EnvelopeBuilder;
use crate::errors::{ErrorCode, ProbeError};
use crate::primitives::process::run_and_capture;
use crate::probes::args::str_or;
use crate::registry::metadata::{Mode, ParamType, ParameterInfo, ToolCategory};
use crate::registry::{ToolFn, ToolFuture, ToolMetadata, ToolRegistry};

const SCANNER_BINARY: &str = "nmap";

/// One fixed profile -> its nmap argv flags. `service-version` and
/// `os-detection` both probe beyond a plain connect scan and are the
/// profiles most likely to hit a permission wall on an unprivileged
/// user; `comprehensive` combines both plus default scripts.
fn profile_flags(profile: &str) -> Option<Vec<&'static str>> {
    match profile {
        "basic" => Some(vec!["-F"]),
        "quick" => Some(vec!["-T4", "-F"]),
        "service-version" => Some(vec!["-sV"]),
        "os-detection" => Some(vec!["-O"]),
        "comprehensive" => Some(vec!["-sV", "-O", "-sC"]),
        _ => None,
    }
}

pub fn register(registry: &mut ToolRegistry) {
    register_run_port_scan(registry);
}

/// nmap reports a failed raw-socket/SYN scan needing root with this
/// phrase on stderr (wording is stable across nmap releases); detecting
/// it is how the probe distinguishes "needs privilege" from any other
/// scan failure.
fn looks_like_permission_failure(stderr: &str) -> bool {
    let lowered = stderr.to_lowercase();
    lowered.contains("requires root privileges") || lowered.contains("operation not permitted")
}

/// Best-effort structured listing from nmap's default (human-readable)
/// output: lines of the form `80/tcp open  http`.
fn parse_ports(stdout: &str) -> Vec<Value> {
    let mut ports = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        let Some((port_proto, rest)) = line.split_once(' ') else { continue };
        let Some((port, proto)) = port_proto.split_once('/') else { continue };
        if port.parse::<u16>().is_err() {
            continue;
        }
        if !matches!(proto, "tcp" | "udp") {
            continue;
        }
        let mut fields = rest.split_whitespace();
        let Some(state) = fields.next() else { continue };
        if !matches!(state, "open" | "closed" | "filtered") {
            continue;
        }
        let service = fields.next().unwrap_or("").to_string();
        ports.push(json!({
            "port": port.parse::<u16>().unwrap(),
            "protocol": proto,
            "state": state,
            "service": service,
        }));
    }
    ports
}

/// Markdown block offered in place of a raw-socket scan the caller
/// isn't privileged to run: a connect-scan (`-sT`) equivalent the caller
/// can run by hand without elevated capabilities (§9 "Privileged
/// scans"). Surfaced verbatim by the external protocol server (§4.9)
/// instead of the generic error block.
fn manual_commands_markdown(target: &str, profile: &str) -> Value {
    let markdown = format!(
        "This scan profile (`{profile}`) requires raw-socket privileges this process does not have.\n\n\
         Run it yourself with a connect-scan equivalent that needs no elevated capability:\n\n\
         ```\n{SCANNER_BINARY} -sT {target}\n```\n"
    );
    json!({
        "security_restricted": true,
        "manual_commands_markdown": markdown,
    })
}

fn register_run_port_scan(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("run_port_scan", "run_port_scan")
        .description("Run a scan profile against a target host or CIDR with the installed scanner")
        .category(ToolCategory::Pentesting)
        .param("target", ParameterInfo::required(ParamType::String, "host, IP, or CIDR to scan"))
        .param(
            "profile",
            ParameterInfo::optional(ParamType::String, "scan profile", json!("basic"))
                .with_choices(&["basic", "quick", "service-version", "os-detection", "comprehensive"]),
        )
        .external_tool(SCANNER_BINARY)
        .privileged()
        .build();
    let function: ToolFn = Arc::new(|args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let target = str_or(&args, "target", "");
            let profile = str_or(&args, "profile", "basic");
            let builder = EnvelopeBuilder::new("run_port_scan").target(target.clone());

            let Some(flags) = profile_flags(&profile) else {
                return builder.failure(
                    ProbeError::input(ErrorCode::InvalidFormat, &crate::errors::ctx(&[("target", &profile)])),
                    String::new(),
                    String::new(),
                );
            };

            let mut argv = vec![SCANNER_BINARY.to_string()];
            argv.extend(flags.iter().map(|s| s.to_string()));
            argv.push(target.clone());
            let builder = builder.command(argv.join(" "));

            let timeout_dur = if profile == "comprehensive" {
                timeouts::COMPREHENSIVE_SCAN
            } else {
                timeouts::PORT_SCAN
            };

            let capture = match run_and_capture(&argv, timeout_dur).await {
                Ok(c) => c,
                Err(e) => {
                    return builder.failure(
                        ProbeError::system(ErrorCode::ToolMissing, &crate::errors::ctx(&[("tool", SCANNER_BINARY)])),
                        String::new(),
                        e.to_string(),
                    );
                }
            };

            if capture.timed_out {
                return builder.failure(
                    ProbeError::network(ErrorCode::Timeout, &crate::errors::ctx(&[("timeout", &timeout_dur.as_secs().to_string())])),
                    capture.stdout,
                    capture.stderr,
                );
            }

            if capture.exit_code != 0 && looks_like_permission_failure(&capture.stderr) {
                return builder.failure_with_data(
                    ProbeError::system(
                        ErrorCode::PermissionDenied,
                        &crate::errors::ctx(&[("target", &target)]),
                    ),
                    capture.stdout,
                    capture.stderr,
                    manual_commands_markdown(&target, &profile),
                );
            }

            let ports = parse_ports(&capture.stdout);
            builder.success_with_exit_code(
                capture.exit_code,
                capture.stdout,
                capture.stderr,
                json!({"profile": profile, "ports": ports}),
            )
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_all_fixed_profiles() {
        for profile in ["basic", "quick", "service-version", "os-detection", "comprehensive"] {
            assert!(profile_flags(profile).is_some());
        }
    }

    #[test]
    fn rejects_unknown_profile() {
        assert!(profile_flags("stealth-syn").is_none());
    }

    #[test]
    fn detects_permission_denied_phrasing() {
        assert!(looks_like_permission_failure("TCP/IP fingerprinting (for OS scan) requires root privileges."));
        assert!(looks_like_permission_failure("connect: Operation not permitted"));
        assert!(!looks_like_permission_failure("Note: Host seems down."));
    }

    #[test]
    fn parses_open_port_lines() {
        let stdout = "PORT   STATE SERVICE\n22/tcp open  ssh\n80/tcp open  http\n443/tcp closed https\n";
        let ports = parse_ports(stdout);
        assert_eq!(ports.len(), 3);
        assert_eq!(ports[0]["port"], json!(22));
        assert_eq!(ports[0]["service"], json!("ssh"));
    }

    #[test]
    fn manual_commands_markdown_suggests_connect_scan() {
        let data = manual_commands_markdown("10.0.0.5", "os-detection");
        assert_eq!(data["security_restricted"], json!(true));
        assert!(data["manual_commands_markdown"].as_str().unwrap().contains("-sT 10.0.0.5"));
    }

    #[tokio::test]
    async fn unregistered_binary_yields_tool_missing() {
        let mut registry = ToolRegistry::new();
        register(&mut registry);
        // Availability cache defaults to "not present" until refreshed,
        // so without calling `refresh_external_binaries` this is the
        // guaranteed outcome regardless of whether nmap happens to be
        // installed in the test environment.
        let result = registry
            .execute_tool("run_port_scan", json!({"target": "127.0.0.1"}), Mode::Interactive)
            .await;
        assert!(!result.success);
        assert_eq!(result.error_type.as_deref(), Some("system"));
    }
}
