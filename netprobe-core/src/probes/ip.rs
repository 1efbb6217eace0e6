//! IP layer probes (§4.4 "IP layer").

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::batch::{run_batch, RetryPolicy};
use crate::config::constants::{timeouts, EXTERNAL_IP_SERVICES};
use crate::envelope::EnvelopeBuilder;
use crate::errors::{ErrorCode, ProbeError};
use crate::parsers::{ping, traceroute};
use crate::primitives::process::run_and_capture;
use crate::primitives::{http, local_ip_guess, tcp, Platform};
use crate::probes::args::{str_or, u16_or, u32_or};
use crate::registry::metadata::{Mode, ParamType, ParameterInfo, ToolCategory};
use crate::registry::{ToolFn, ToolFuture, ToolMetadata, ToolRegistry};

pub fn register(registry: &mut ToolRegistry) {
    register_get_external_ip(registry);
    register_ping_host(registry);
    register_traceroute_host(registry);
    register_test_port_connectivity(registry);
    register_scan_local_network(registry);
    register_check_nat_status(registry);
}

/// Pulls the echoed IP out of either a bare-text body (`icanhazip.com`,
/// `ident.me`) or ipify's `{"ip": "..."}` JSON body.
pub(crate) fn extract_ip(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.starts_with('{') {
        serde_json::from_str::<Value>(trimmed)
            .ok()
            .and_then(|v| v.get("ip").and_then(Value::as_str).map(str::to_string))
    } else {
        Some(trimmed.to_string())
    }
}

fn register_get_external_ip(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("get_external_ip", "get_external_ip")
        .description("Determine this host's external (public) IP address")
        .category(ToolCategory::NetworkDiagnostics)
        .example("get_external_ip")
        .build();
    let function: ToolFn = Arc::new(|_args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let builder = EnvelopeBuilder::new("get_external_ip");
            let opts = http::HttpGetOptions {
                timeout: timeouts::WEB_REQUEST,
                ..Default::default()
            };
            for service in EXTERNAL_IP_SERVICES {
                let Ok(response) = http::get(service, &opts).await else {
                    continue;
                };
                if response.status != 200 {
                    continue;
                }
                let Some(candidate) = extract_ip(&response.body_preview) else {
                    continue;
                };
                if candidate.parse::<Ipv4Addr>().is_ok() {
                    return builder.command(format!("GET {service}")).success(
                        response.body_preview,
                        String::new(),
                        json!({"external_ip": candidate, "service_used": service}),
                    );
                }
            }
            builder.failure(
                ProbeError::network(ErrorCode::Unreachable, &crate::errors::ctx(&[("target", "external-ip services")])),
                String::new(),
                "all external-IP services failed".into(),
            )
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

fn register_ping_host(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("ping_host", "ping_host")
        .description("Ping a target N times and report loss/latency statistics")
        .category(ToolCategory::NetworkDiagnostics)
        .param("target", ParameterInfo::required(ParamType::String, "hostname or IP to ping"))
        .param("count", ParameterInfo::optional(ParamType::Integer, "number of packets", json!(4)).with_range(1.0, 20.0))
        .param("timeout", ParameterInfo::optional(ParamType::Integer, "per-packet timeout seconds", json!(5)).with_range(1.0, 60.0))
        .example("ping_host{target: \"1.1.1.1\", count: 4}")
        .build();
    let function: ToolFn = Arc::new(|args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let target = str_or(&args, "target", "");
            let count = u32_or(&args, "count", 4);
            let timeout_secs = u32_or(&args, "timeout", 5);
            let platform = Platform::current();
            let argv = platform.ping_command(&target, count, timeout_secs);
            let builder = EnvelopeBuilder::new("ping_host")
                .target(target.clone())
                .command(argv.join(" "));

            let overall_timeout = Duration::from_secs((timeout_secs as u64 * count as u64) + 5);
            let capture = match run_and_capture(&argv, overall_timeout).await {
                Ok(c) => c,
                Err(e) => {
                    return builder.failure(
                        ProbeError::system(ErrorCode::ToolMissing, &crate::errors::ctx(&[("tool", "ping")])),
                        String::new(),
                        e.to_string(),
                    );
                }
            };

            let stats = ping::parse(&capture.stdout, platform);
            let received = stats.packets_received.unwrap_or(0);

            if received == 0 {
                let code = if capture.stdout.to_lowercase().contains("unknown host")
                    || capture.stderr.to_lowercase().contains("unknown host")
                    || capture.stdout.to_lowercase().contains("name or service not known")
                {
                    ErrorCode::DnsResolution
                } else {
                    ErrorCode::Unreachable
                };
                return builder.failure(
                    ProbeError::network(code, &crate::errors::ctx(&[("target", &target)])),
                    capture.stdout,
                    capture.stderr,
                );
            }

            builder.success(
                capture.stdout,
                capture.stderr,
                json!({
                    "packets_sent": stats.packets_sent,
                    "packets_received": stats.packets_received,
                    "packet_loss_pct": stats.packet_loss_pct,
                    "min_time": stats.min_ms,
                    "avg_time": stats.avg_ms,
                    "max_time": stats.max_ms,
                }),
            )
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

fn register_traceroute_host(registry: &mut ToolRegistry) {
    let binary = if cfg!(target_os = "windows") { "tracert" } else { "traceroute" };
    let meta = ToolMetadata::builder("traceroute_host", "traceroute_host")
        .description("Trace the network path to a target, hop by hop")
        .category(ToolCategory::NetworkDiagnostics)
        .param("target", ParameterInfo::required(ParamType::String, "hostname or IP to trace"))
        .external_tool(binary)
        .build();
    let function: ToolFn = Arc::new(|args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let target = str_or(&args, "target", "");
            let platform = Platform::current();
            let argv = platform.traceroute_command(&target);
            let builder = EnvelopeBuilder::new("traceroute_host")
                .target(target.clone())
                .command(argv.join(" "));

            let capture = match run_and_capture(&argv, timeouts::TRACEROUTE).await {
                Ok(c) => c,
                Err(e) => {
                    return builder.failure(
                        ProbeError::system(ErrorCode::ToolMissing, &crate::errors::ctx(&[("tool", "traceroute")])),
                        String::new(),
                        e.to_string(),
                    );
                }
            };

            let hops = traceroute::parse(&capture.stdout);
            builder.success(capture.stdout, capture.stderr, json!({"hops": hops, "hop_count": hops.len()}))
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

fn register_test_port_connectivity(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("test_port_connectivity", "test_port_connectivity")
        .description("TCP-connect to a single host:port and report reachability with timing")
        .category(ToolCategory::NetworkDiagnostics)
        .param("host", ParameterInfo::required(ParamType::String, "target host"))
        .param("port", ParameterInfo::required(ParamType::Integer, "target port").with_range(1.0, 65535.0))
        .param("timeout", ParameterInfo::optional(ParamType::Integer, "connect timeout seconds", json!(5)).with_range(1.0, 60.0))
        .build();
    let function: ToolFn = Arc::new(|args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let host = str_or(&args, "host", "");
            let port = u16_or(&args, "port", 0);
            let timeout_secs = u32_or(&args, "timeout", 5);
            let builder = EnvelopeBuilder::new("test_port_connectivity")
                .target(format!("{host}:{port}"))
                .command(format!("tcp-connect {host}:{port}"));

            match tcp::connect(&host, port, Duration::from_secs(timeout_secs as u64)).await {
                Ok(result) => builder.success(
                    String::new(),
                    String::new(),
                    json!({"status": "open", "connect_time_ms": result.connect_time_ms}),
                ),
                Err(error) => {
                    let mut result = builder.failure(error, String::new(), String::new());
                    result.parsed_data = json!({"status": "closed/filtered"});
                    result
                }
            }
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

/// Fixed sparse sample of the /24's last octet, per §4.4: a full 254-host
/// sweep is explicitly avoided.
const SCAN_SAMPLE_OFFSETS: &[u8] = &[1, 10, 50,100,150,200, 254];
const SCAN_PROBE_PORT: u16 = 80;

fn register_scan_local_network(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("scan_local_network", "scan_local_network")
        .description("Auto-detect the local /24 and connect-probe a sparse sample of hosts")
        .category(ToolCategory::NetworkDiagnostics)
        .build();
    let function: ToolFn = Arc::new(|_args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let builder = EnvelopeBuilder::new("scan_local_network");
            let Ok(local_ip) = local_ip_guess() else {
                return builder.failure(
                    ProbeError::system(ErrorCode::InvalidPlatform, &Default::default()),
                    String::new(),
                    "unable to determine local subnet".into(),
                );
            };
            let Ok(parsed) = local_ip.parse::<Ipv4Addr>() else {
                return builder.failure(
                    ProbeError::input(ErrorCode::InvalidTarget, &crate::errors::ctx(&[("target", &local_ip)])),
                    String::new(),
                    String::new(),
                );
            };
            let octets = parsed.octets();
            let subnet_prefix = format!("{}.{}.{}", octets[0], octets[1], octets[2]);

            let targets: Vec<String> = SCAN_SAMPLE_OFFSETS
                .iter()
                .map(|last| format!("{subnet_prefix}.{last}"))
                .collect();

            let outcome = run_batch(
                targets,
                8,
                timeouts::PING,
                RetryPolicy::none(),
                |_e: &ProbeError| false,
                || ProbeError::network(ErrorCode::Timeout, &crate::errors::ctx(&[("timeout", "ping")])),
                |host: String| async move {
                    tcp::connect(&host, SCAN_PROBE_PORT, Duration::from_millis(800))
                        .await
                        .map(|r| (host.clone(), r.connect_time_ms))
                        .map_err(|_| ProbeError::network(ErrorCode::Unreachable, &crate::errors::ctx(&[("target", &host)])))
                },
            )
            .await;

            builder.command(format!("scan {subnet_prefix}.0/24 (sparse sample)")).success(
                String::new(),
                String::new(),
                json!({
                    "subnet": format!("{subnet_prefix}.0/24"),
                    "sampled": SCAN_SAMPLE_OFFSETS.len(),
                    "live_hosts": outcome.successes.iter().map(|(h, _)| h.clone()).collect::<Vec<_>>(),
                    "unreachable_count": outcome.failures.len(),
                }),
            )
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

fn register_check_nat_status(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("check_nat_status", "check_nat_status")
        .description("Compare local vs external IP to classify NAT/direct/uncertain")
        .category(ToolCategory::NetworkDiagnostics)
        .param("local_ip", ParameterInfo::optional(ParamType::String, "override the auto-detected local IP", Value::Null))
        .param("external_ip", ParameterInfo::optional(ParamType::String, "override the fetched external IP", Value::Null))
        .build();
    let function: ToolFn = Arc::new(|args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let builder = EnvelopeBuilder::new("check_nat_status");

            let local_ip = match args.get("local_ip").and_then(Value::as_str) {
                Some(ip) => ip.to_string(),
                None => match local_ip_guess() {
                    Ok(ip) => ip,
                    Err(_) => {
                        return builder.failure(
                            ProbeError::system(ErrorCode::InvalidPlatform, &Default::default()),
                            String::new(),
                            "unable to determine local IP".into(),
                        );
                    }
                },
            };

            let external_ip = match args.get("external_ip").and_then(Value::as_str) {
                Some(ip) => ip.to_string(),
                None => {
                    let opts = http::HttpGetOptions::default();
                    let mut found = None;
                    for service in EXTERNAL_IP_SERVICES {
                        if let Ok(response) = http::get(service, &opts).await {
                            if response.status == 200 {
                                if let Some(ip) = extract_ip(&response.body_preview) {
                                    if ip.parse::<Ipv4Addr>().is_ok() {
                                        found = Some(ip);
                                        break;
                                    }
                                }
                            }
                        }
                    }
                    match found {
                        Some(ip) => ip,
                        None => {
                            return builder.failure(
                                ProbeError::network(
                                    ErrorCode::Unreachable,
                                    &crate::errors::ctx(&[("target", "external-ip services")]),
                                ),
                                String::new(),
                                String::new(),
                            );
                        }
                    }
                }
            };

            let nat = classify_nat(&local_ip, &external_ip);
            builder.success(
                String::new(),
                String::new(),
                json!({"local_ip": local_ip, "external_ip": external_ip, "nat": nat}),
            )
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

/// NAT classification (§4.4, §8 S5): equal addresses mean a direct public
/// connection; a private local address behind a different external one
/// means NAT; anything else (e.g. a non-private local address that still
/// differs from the external one) is uncertain rather than a guess.
fn classify_nat(local_ip: &str, external_ip: &str) -> Value {
    if local_ip == external_ip {
        return json!(false);
    }
    match local_ip.parse::<Ipv4Addr>() {
        Ok(addr) if addr.is_private() => json!(true),
        Ok(_) => json!("uncertain"),
        Err(_) => json!("uncertain"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nat_true_for_private_local_and_differing_external() {
        assert_eq!(classify_nat("192.168.1.10", "203.0.113.5"), json!(true));
    }

    #[test]
    fn nat_false_when_addresses_match() {
        assert_eq!(classify_nat("203.0.113.5", "203.0.113.5"), json!(false));
    }

    #[test]
    fn nat_uncertain_for_public_local_differing_external() {
        assert_eq!(classify_nat("8.8.8.8", "203.0.113.5"), json!("uncertain"));
    }

    #[test]
    fn extracts_ip_from_json_body() {
        assert_eq!(extract_ip("{\"ip\":\"1.2.3.4\"}").as_deref(), Some("1.2.3.4"));
    }

    #[test]
    fn extracts_ip_from_plain_body() {
        assert_eq!(extract_ip("1.2.3.4\n").as_deref(), Some("1.2.3.4"));
    }

    #[tokio::test]
    async fn test_port_connectivity_reports_closed_on_refused_connect() {
        let mut registry = ToolRegistry::new();
        register(&mut registry);
        let result = registry
            .execute_tool(
                "test_port_connectivity",
                json!({"host": "127.0.0.1", "port": 1, "timeout": 1}),
                Mode::Interactive,
            )
            .await;
        assert!(!result.success);
        assert_eq!(result.parsed_data.get("status").and_then(Value::as_str), Some("closed/filtered"));
    }
}
