//! WHOIS server reachability probe (§4.4 "WHOIS server reachability"):
//! TCP-connect to port 43 against the regional registries and a small
//! set of TLD registries, without issuing an actual WHOIS query.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::batch::{run_batch, RetryPolicy};
use crate::config::constants::{timeouts, WHOIS_SERVERS};
use crate::envelope::{batch_parsed_data, EnvelopeBuilder, TargetOutcome};
use crate::errors::{ErrorCode, ProbeError};
use crate::primitives::tcp;
use crate::probes::args::str_list;
use crate::registry::metadata::{Mode, ParamType, ParameterInfo, ToolCategory};
use crate::registry::{ToolFn, ToolFuture, ToolMetadata, ToolRegistry};

const WHOIS_PORT: u16 = 43;

pub fn register(registry: &mut ToolRegistry) {
    register_check_whois_servers(registry);
}

fn register_check_whois_servers(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("check_whois_servers", "check_whois_servers")
        .description("TCP-connect to WHOIS servers (port 43) to check reachability")
        .category(ToolCategory::NetworkDiagnostics)
        .param("servers", ParameterInfo::optional(ParamType::List { element: Box::new(ParamType::String) }, "WHOIS servers to check (defaults to the regional registries)", json!(WHOIS_SERVERS)))
        .build();
    let function: ToolFn = Arc::new(|args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let servers = str_list(&args, "servers")
                .unwrap_or_else(|| WHOIS_SERVERS.iter().map(|s| s.to_string()).collect());
            let builder = EnvelopeBuilder::new("check_whois_servers").command(format!("tcp-connect {} WHOIS servers:{WHOIS_PORT}", servers.len()));

            let outcome = run_batch(
                servers,
                6,
                timeouts::WHOIS,
                RetryPolicy::with_retries(2, Duration::from_millis(250)),
                |_e: &(String, ProbeError)| true,
                || ("unknown".to_string(), ProbeError::network(ErrorCode::Timeout, &crate::errors::ctx(&[("timeout", "whois")]))),
                |server: String| async move {
                    tcp::connect(&server, WHOIS_PORT, timeouts::WHOIS)
                        .await
                        .map(|r| (server.clone(), r.connect_time_ms))
                        .map_err(|e| (server, e))
                },
            )
            .await;

            let reachable: Vec<TargetOutcome> = outcome
                .successes
                .iter()
                .map(|(server, ms)| TargetOutcome::ok(server.clone(), Some(*ms), json!({})))
                .collect();
            let unreachable: Vec<TargetOutcome> = outcome
                .failures
                .iter()
                .map(|(server, error)| TargetOutcome::failed(server.clone(), error))
                .collect();

            builder.success(
                String::new(),
                String::new(),
                batch_parsed_data("reachable", "unreachable", reachable, unreachable),
            )
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_server_is_reported_as_failure() {
        let mut registry = ToolRegistry::new();
        register(&mut registry);
        let result = registry
            .execute_tool(
                "check_whois_servers",
                json!({"servers": ["127.0.0.1"]}),
                Mode::Interactive,
            )
            .await;
        assert!(result.success);
        let unreachable = result.parsed_data.get("unreachable").and_then(Value::as_array).unwrap();
        assert_eq!(unreachable.len(), 1);
    }
}
