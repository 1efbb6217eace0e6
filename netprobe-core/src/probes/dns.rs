//! DNS probes (§4.4 "DNS").

use std::net::IpAddr;
use std::sync::Arc;

use serde_json::{json, Value};
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

use crate::config::constants::{timeouts, DNS_CANARY_NAME};
use crate::envelope::EnvelopeBuilder;
use crate::errors::{ErrorCode, ProbeError};
use crate::parsers::dns_answer;
use crate::primitives::process::run_and_capture;
use crate::primitives::Platform;
use crate::probes::args::{str_list, str_or};
use crate::registry::metadata::{Mode, ParamType, ParameterInfo, ToolCategory};
use crate::registry::{ToolFn, ToolFuture, ToolMetadata, ToolRegistry};

pub fn register(registry: &mut ToolRegistry) {
    register_resolve_hostname(registry);
    register_test_dns_servers(registry);
    register_reverse_dns_lookup(registry);
    register_check_dns_propagation(registry);
}

fn system_resolver() -> TokioAsyncResolver {
    TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
}

/// Builds a resolver pointed at exactly one nameserver, used whenever a
/// probe must query a *specific* server rather than the system default.
fn resolver_for(server_ip: IpAddr) -> TokioAsyncResolver {
    let group = NameServerConfigGroup::from_ips_clear(&[server_ip], 53, true);
    let config = ResolverConfig::from_parts(None, vec![], group);
    let mut opts = ResolverOpts::default();
    opts.timeout = timeouts::DNS_QUERY;
    TokioAsyncResolver::tokio(config, opts)
}

fn register_resolve_hostname(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("resolve_hostname", "resolve_hostname")
        .description("Resolve a hostname, using the system resolver for A records and dig/nslookup otherwise")
        .category(ToolCategory::Dns)
        .param("hostname", ParameterInfo::required(ParamType::String, "hostname to resolve"))
        .param("record_type", ParameterInfo::optional(ParamType::String, "DNS record type", json!("A")))
        .build();
    let function: ToolFn = Arc::new(|args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let hostname = str_or(&args, "hostname", "");
            let record_type = str_or(&args, "record_type", "A").to_uppercase();
            let builder = EnvelopeBuilder::new("resolve_hostname")
                .target(hostname.clone())
                .command(format!("resolve {hostname} {record_type}"));

            if record_type == "A" {
                let resolver = system_resolver();
                return match resolver.lookup_ip(hostname.as_str()).await {
                    Ok(response) => {
                        let addrs: Vec<String> = response
                            .iter()
                            .filter(IpAddr::is_ipv4)
                            .map(|ip| ip.to_string())
                            .collect();
                        if addrs.is_empty() {
                            builder.failure(
                                ProbeError::network(ErrorCode::DnsResolution, &crate::errors::ctx(&[("target", &hostname)])),
                                String::new(),
                                String::new(),
                            )
                        } else {
                            builder.success(String::new(), String::new(), json!({"record_type": "A", "answers": addrs}))
                        }
                    }
                    Err(_) => builder.failure(
                        ProbeError::network(ErrorCode::DnsResolution, &crate::errors::ctx(&[("target", &hostname)])),
                        String::new(),
                        String::new(),
                    ),
                };
            }

            let platform = Platform::current();
            let argv = platform.dns_query_command(&hostname, &record_type);
            let capture = match run_and_capture(&argv, timeouts::DNS_QUERY).await {
                Ok(c) => c,
                Err(e) => {
                    return builder.failure(
                        ProbeError::system(ErrorCode::ToolMissing, &crate::errors::ctx(&[("tool", &argv[0])])),
                        String::new(),
                        e.to_string(),
                    );
                }
            };
            let answers = if matches!(platform, Platform::Windows) {
                dns_answer::extract_nslookup_answers(&capture.stdout)
            } else {
                dns_answer::extract_ipv4_addresses(&capture.stdout)
            };
            if answers.is_empty() {
                builder.failure(
                    ProbeError::execution(ErrorCode::ParsingError, &crate::errors::ctx(&[("tool", &argv[0])])),
                    capture.stdout,
                    capture.stderr,
                )
            } else {
                builder.success(
                    capture.stdout,
                    capture.stderr,
                    json!({"record_type": record_type, "answers": answers}),
                )
            }
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

async fn query_canary_via(server: &str) -> Result<(Vec<String>, f64), ProbeError> {
    let Ok(server_ip) = server.parse::<IpAddr>() else {
        return Err(ProbeError::input(ErrorCode::InvalidTarget, &crate::errors::ctx(&[("target", server)])));
    };
    let resolver = resolver_for(server_ip);
    let started = std::time::Instant::now();
    match tokio::time::timeout(timeouts::DNS_QUERY, resolver.lookup_ip(DNS_CANARY_NAME)).await {
        Ok(Ok(response)) => {
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            let addrs: Vec<String> = response.iter().map(|ip| ip.to_string()).collect();
            if addrs.is_empty() {
                Err(ProbeError::network(ErrorCode::DnsResolution, &crate::errors::ctx(&[("target", DNS_CANARY_NAME)])))
            } else {
                Ok((addrs, elapsed_ms))
            }
        }
        Ok(Err(_)) => Err(ProbeError::network(ErrorCode::DnsResolution, &crate::errors::ctx(&[("target", DNS_CANARY_NAME)]))),
        Err(_) => Err(ProbeError::network(
            ErrorCode::Timeout,
            &crate::errors::ctx(&[("timeout", &timeouts::DNS_QUERY.as_secs().to_string())]),
        )),
    }
}

fn register_test_dns_servers(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("check_dns_resolvers", "check_dns_resolvers")
        .description("Query a canary name against a list of DNS servers and identify the fastest")
        .category(ToolCategory::Dns)
        .param("servers", ParameterInfo::required(ParamType::List { element: Box::new(ParamType::String) }, "DNS server IPs to test"))
        .alias("test_dns_servers")
        .build();
    let function: ToolFn = Arc::new(|args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let servers = str_list(&args, "servers").unwrap_or_default();
            let builder = EnvelopeBuilder::new("check_dns_resolvers").command(format!("query {DNS_CANARY_NAME} against {} servers", servers.len()));

            let mut results = Vec::new();
            for server in &servers {
                match query_canary_via(server).await {
                    Ok((answers, elapsed_ms)) => results.push(json!({
                        "server": server,
                        "success": true,
                        "response_time_ms": elapsed_ms,
                        "answers": answers,
                    })),
                    Err(error) => results.push(json!({
                        "server": server,
                        "success": false,
                        "error_type": error.category.to_string(),
                        "error_message": error.message,
                    })),
                }
            }

            let fastest = results
                .iter()
                .filter(|r| r["success"] == json!(true))
                .min_by(|a, b| {
                    let at = a["response_time_ms"].as_f64().unwrap_or(f64::MAX);
                    let bt = b["response_time_ms"].as_f64().unwrap_or(f64::MAX);
                    at.partial_cmp(&bt).unwrap_or(std::cmp::Ordering::Equal)
                })
                .and_then(|r| r["server"].as_str())
                .map(str::to_string);

            builder.success(String::new(), String::new(), json!({"results": results, "fastest": fastest}))
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

fn register_reverse_dns_lookup(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("reverse_dns_lookup", "reverse_dns_lookup")
        .description("Resolve the PTR record for an IP address")
        .category(ToolCategory::Dns)
        .param("ip", ParameterInfo::required(ParamType::String, "IP address to reverse-resolve"))
        .build();
    let function: ToolFn = Arc::new(|args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let ip_str = str_or(&args, "ip", "");
            let builder = EnvelopeBuilder::new("reverse_dns_lookup")
                .target(ip_str.clone())
                .command(format!("reverse-resolve {ip_str}"));

            let Ok(ip) = ip_str.parse::<IpAddr>() else {
                return builder.failure(
                    ProbeError::input(ErrorCode::InvalidTarget, &crate::errors::ctx(&[("target", &ip_str)])),
                    String::new(),
                    String::new(),
                );
            };

            let resolver = system_resolver();
            match resolver.reverse_lookup(ip).await {
                Ok(response) => {
                    let names: Vec<String> = response.iter().map(|name| name.to_string()).collect();
                    if names.is_empty() {
                        builder.failure(
                            ProbeError::network(ErrorCode::DnsResolution, &crate::errors::ctx(&[("target", &ip_str)])),
                            String::new(),
                            String::new(),
                        )
                    } else {
                        builder.success(String::new(), String::new(), json!({"hostnames": names}))
                    }
                }
                Err(_) => builder.failure(
                    ProbeError::network(ErrorCode::DnsResolution, &crate::errors::ctx(&[("target", &ip_str)])),
                    String::new(),
                    String::new(),
                ),
            }
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

fn register_check_dns_propagation(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("check_dns_propagation", "check_dns_propagation")
        .description("Query many resolvers for the same name and check whether they agree")
        .category(ToolCategory::Dns)
        .param("hostname", ParameterInfo::optional(ParamType::String, "name to check (defaults to the internal canary)", json!(DNS_CANARY_NAME)))
        .param("servers", ParameterInfo::required(ParamType::List { element: Box::new(ParamType::String) }, "DNS server IPs to poll"))
        .build();
    let function: ToolFn = Arc::new(|args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let servers = str_list(&args, "servers").unwrap_or_default();
            let builder = EnvelopeBuilder::new("check_dns_propagation").command(format!("propagation check across {} servers", servers.len()));

            let mut groups: std::collections::BTreeMap<String, Vec<String>> = std::collections::BTreeMap::new();
            let mut failures = Vec::new();
            for server in &servers {
                match query_canary_via(server).await {
                    Ok((mut answers, _elapsed_ms)) => {
                        answers.sort();
                        let key = answers.join(",");
                        groups.entry(key).or_default().push(server.clone());
                    }
                    Err(error) => failures.push(json!({"server": server, "error_message": error.message})),
                }
            }

            let complete = groups.len() == 1 && failures.is_empty();
            let group_list: Vec<Value> = groups
                .into_iter()
                .map(|(answer, servers)| json!({"answer": answer, "servers": servers}))
                .collect();

            builder.success(
                String::new(),
                String::new(),
                json!({"groups": group_list, "failures": failures, "propagation_complete": complete}),
            )
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolver_for_builds_without_panicking() {
        let _resolver = resolver_for("1.1.1.1".parse().unwrap());
    }

    #[test]
    fn resolver_sweep_is_registered_under_its_canonical_name() {
        let mut registry = ToolRegistry::new();
        register(&mut registry);
        assert!(registry.get("check_dns_resolvers").is_some());
        assert_eq!(
            registry.get("test_dns_servers").unwrap().name,
            registry.get("check_dns_resolvers").unwrap().name
        );
    }
}
