//! Link / host layer probes (§4.4 "Link / host").

use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::constants::timeouts;
use crate::envelope::EnvelopeBuilder;
use crate::errors::{ErrorCode, ProbeError};
use crate::parsers::{ifconfig, route};
use crate::primitives::process::run_and_capture;
use crate::primitives::Platform;
use crate::probes::args::opt_str;
use crate::registry::metadata::{Mode, ParamType, ParameterInfo, ToolCategory};
use crate::registry::{ToolFn, ToolFuture, ToolMetadata, ToolRegistry};

pub fn register(registry: &mut ToolRegistry) {
    register_get_local_ip(registry);
    register_check_interface_status(registry);
    register_get_system_info(registry);
    register_get_gateway_info(registry);
    register_get_interface_mac_address(registry);
    register_get_dns_config(registry);
    register_get_network_config(registry);
}

fn register_get_local_ip(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("get_local_ip", "get_local_ip")
        .description("Determine this host's local IP address via a UDP-connect trick")
        .category(ToolCategory::NetworkDiagnostics)
        .example("get_local_ip")
        .build();
    let function: ToolFn = Arc::new(|_args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let builder = EnvelopeBuilder::new("get_local_ip").command("udp-connect 8.8.8.8:80");
            match crate::primitives::local_ip_guess() {
                Ok(ip) => builder.success(ip.clone(), String::new(), json!({"local_ip": ip})),
                Err(_) => builder.failure(
                    ProbeError::system(ErrorCode::InvalidPlatform, &Default::default()),
                    String::new(),
                    "unable to determine local IP".into(),
                ),
            }
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

fn register_check_interface_status(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("check_interface_status", "check_interface_status")
        .description("Enumerate network interfaces, optionally filtered to one name")
        .category(ToolCategory::NetworkDiagnostics)
        .param(
            "interface",
            ParameterInfo {
                param_type: ParamType::String,
                required: false,
                default: None,
                description: "Interface name to filter to".into(),
                choices: None,
                min_value: None,
                max_value: None,
            },
        )
        .build();
    let function: ToolFn = Arc::new(|args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let platform = Platform::current();
            let argv = platform.interface_command();
            let builder = EnvelopeBuilder::new("check_interface_status").command(argv.join(" "));
            let capture = match run_and_capture(&argv, timeouts::WEB_REQUEST).await {
                Ok(c) => c,
                Err(e) => {
                    return builder.failure(
                        ProbeError::system(ErrorCode::ToolMissing, &crate::errors::ctx(&[("tool", argv[0].as_str())])),
                        String::new(),
                        e.to_string(),
                    );
                }
            };
            let mut interfaces = ifconfig::parse(&capture.stdout, platform);
            if let Some(filter) = opt_str(&args, "interface") {
                interfaces.retain(|i| i.name == filter);
            }
            builder.success(
                capture.stdout,
                capture.stderr,
                json!({"interfaces": interfaces}),
            )
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

fn register_get_system_info(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("get_system_info", "get_system_info")
        .description("Report hostname, OS, release, architecture, and current user")
        .category(ToolCategory::SystemInfo)
        .build();
    let function: ToolFn = Arc::new(|_args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let hostname = hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown".to_string());
            let data = json!({
                "hostname": hostname,
                "os": std::env::consts::OS,
                "arch": std::env::consts::ARCH,
                "family": std::env::consts::FAMILY,
                "user": std::env::var("USER").or_else(|_| std::env::var("USERNAME")).unwrap_or_default(),
            });
            EnvelopeBuilder::new("get_system_info")
                .command("system_info")
                .success(String::new(), String::new(), data)
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

fn register_get_gateway_info(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("get_gateway_info", "get_gateway_info")
        .description("Report the default gateway IP and its ARP-resolved MAC if available")
        .category(ToolCategory::NetworkDiagnostics)
        .build();
    let function: ToolFn = Arc::new(|_args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let platform = Platform::current();
            let argv = platform.route_command();
            let builder = EnvelopeBuilder::new("get_gateway_info").command(argv.join(" "));
            let capture = match run_and_capture(&argv, timeouts::WEB_REQUEST).await {
                Ok(c) => c,
                Err(e) => {
                    return builder.failure(
                        ProbeError::system(ErrorCode::ToolMissing, &crate::errors::ctx(&[("tool", argv[0].as_str())])),
                        String::new(),
                        e.to_string(),
                    );
                }
            };
            let gateway = route::parse_default_gateway(&capture.stdout, platform);
            let Some(gateway_ip) = gateway else {
                return builder.success(
                    capture.stdout,
                    capture.stderr,
                    json!({"gateway_ip": Value::Null, "gateway_mac": Value::Null}),
                );
            };

            let arp_argv = platform.arp_command(&gateway_ip);
            let mac = match run_and_capture(&arp_argv, timeouts::WEB_REQUEST).await {
                Ok(arp_capture) => crate::parsers::arp::parse_mac_for_ip(&arp_capture.stdout, &gateway_ip),
                Err(_) => None,
            };

            builder.success(
                capture.stdout,
                capture.stderr,
                json!({"gateway_ip": gateway_ip, "gateway_mac": mac}),
            )
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

fn register_get_interface_mac_address(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("get_interface_mac_address", "get_interface_mac_address")
        .description("Report the MAC address of a named network interface")
        .category(ToolCategory::NetworkDiagnostics)
        .param(
            "interface",
            ParameterInfo::required(ParamType::String, "interface name"),
        )
        .build();
    let function: ToolFn = Arc::new(|args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let platform = Platform::current();
            let argv = platform.interface_command();
            let builder = EnvelopeBuilder::new("get_interface_mac_address").command(argv.join(" "));
            let capture = match run_and_capture(&argv, timeouts::WEB_REQUEST).await {
                Ok(c) => c,
                Err(e) => {
                    return builder.failure(
                        ProbeError::system(ErrorCode::ToolMissing, &crate::errors::ctx(&[("tool", argv[0].as_str())])),
                        String::new(),
                        e.to_string(),
                    );
                }
            };
            let interfaces = ifconfig::parse(&capture.stdout, platform);
            let requested = args.get("interface").and_then(Value::as_str).unwrap_or_default();
            match interfaces.iter().find(|i| i.name == requested) {
                Some(iface) => builder.success(
                    capture.stdout,
                    capture.stderr,
                    json!({"interface": iface.name, "mac": iface.mac}),
                ),
                None => builder.failure(
                    ProbeError::input(ErrorCode::InvalidTarget, &crate::errors::ctx(&[("target", requested)])),
                    capture.stdout,
                    capture.stderr,
                ),
            }
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

fn register_get_dns_config(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("get_dns_config", "get_dns_config")
        .description("Report the configured system DNS resolvers")
        .category(ToolCategory::Dns)
        .build();
    let function: ToolFn = Arc::new(|_args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let builder = EnvelopeBuilder::new("get_dns_config");
            if cfg!(target_os = "windows") {
                let argv = vec!["ipconfig".to_string(), "/all".to_string()];
                return match run_and_capture(&argv, timeouts::WEB_REQUEST).await {
                    Ok(capture) => builder
                        .command(argv.join(" "))
                        .success(capture.stdout.clone(), capture.stderr, json!({"raw": capture.stdout})),
                    Err(e) => builder.failure(
                        ProbeError::system(ErrorCode::ToolMissing, &crate::errors::ctx(&[("tool", "ipconfig")])),
                        String::new(),
                        e.to_string(),
                    ),
                };
            }

            match tokio::fs::read_to_string("/etc/resolv.conf").await {
                Ok(contents) => {
                    let servers: Vec<String> = contents
                        .lines()
                        .filter_map(|l| l.strip_prefix("nameserver "))
                        .map(|s| s.trim().to_string())
                        .collect();
                    builder
                        .command("read /etc/resolv.conf")
                        .success(contents, String::new(), json!({"nameservers": servers}))
                }
                Err(e) => builder.failure(
                    ProbeError::configuration(
                        ErrorCode::FileNotFound,
                        &crate::errors::ctx(&[("target", "/etc/resolv.conf")]),
                    ),
                    String::new(),
                    e.to_string(),
                ),
            }
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

fn register_get_network_config(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("get_network_config", "get_network_config")
        .description("Report per-interface IP, netmask, and derived network address")
        .category(ToolCategory::NetworkDiagnostics)
        .build();
    let function: ToolFn = Arc::new(|_args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let platform = Platform::current();
            let argv = platform.interface_command();
            let builder = EnvelopeBuilder::new("get_network_config").command(argv.join(" "));
            let capture = match run_and_capture(&argv, timeouts::WEB_REQUEST).await {
                Ok(c) => c,
                Err(e) => {
                    return builder.failure(
                        ProbeError::system(ErrorCode::ToolMissing, &crate::errors::ctx(&[("tool", argv[0].as_str())])),
                        String::new(),
                        e.to_string(),
                    );
                }
            };
            let interfaces = ifconfig::parse(&capture.stdout, platform);
            builder.success(capture.stdout, capture.stderr, json!({"interfaces": interfaces}))
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_local_ip_registers_and_executes() {
        let mut registry = ToolRegistry::new();
        register(&mut registry);
        let result = registry
            .execute_tool("get_local_ip", json!({}), Mode::Interactive)
            .await;
        // Loopback-only CI sandboxes may still succeed since UDP connect
        // never sends a packet; either way the envelope must be well formed.
        assert_eq!(result.error_type.is_none(), result.success);
    }
}
