//! IXP reachability probe (§4.4 "IXP reachability"): HTTP sweep of major
//! Internet Exchange Point home pages, used as a coarse signal for
//! upstream transit health rather than a certification of the IXP itself.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::batch::{run_batch, RetryPolicy};
use crate::config::constants::{timeouts, IXP_ENDPOINTS};
use crate::envelope::{batch_parsed_data, EnvelopeBuilder, TargetOutcome};
use crate::errors::{ErrorCode, ProbeError};
use crate::primitives::http;
use crate::probes::args::{bool_or, opt_str, u32_or};
use crate::registry::metadata::{Mode, ParamType, ParameterInfo, ToolCategory};
use crate::registry::{ToolFn, ToolFuture, ToolMetadata, ToolRegistry};

pub fn register(registry: &mut ToolRegistry) {
    register_monitor_ixp_connectivity(registry);
}

/// Overall health band for `monitor_ixp_connectivity` (§3 BatchStatus
/// mirrors this at the `reachable`/`unreachable` level; this is the
/// coarser three-way "healthy/degraded/down" rating the tool itself
/// surfaces alongside the per-IXP detail).
fn rating_for(reachable: usize, total: usize) -> &'static str {
    if total == 0 || reachable == 0 {
        "down"
    } else if reachable == total {
        "healthy"
    } else {
        "degraded"
    }
}

fn register_monitor_ixp_connectivity(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("monitor_ixp_connectivity", "monitor_ixp_connectivity")
        .description("Check reachability of major Internet Exchange Point endpoints")
        .category(ToolCategory::NetworkDiagnostics)
        .param("timeout", ParameterInfo::optional(ParamType::Integer, "per-endpoint timeout seconds", json!(timeouts::IXP_CHECK.as_secs())).with_range(1.0, 120.0))
        .param("verify_tls", ParameterInfo::optional(ParamType::Boolean, "verify TLS certificates", json!(true)))
        .param("proxy", ParameterInfo::optional(ParamType::String, "HTTP proxy URL", Value::Null))
        .build();
    let function: ToolFn = Arc::new(|args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let timeout_secs = u32_or(&args, "timeout", timeouts::IXP_CHECK.as_secs() as u32);
            let verify_tls = bool_or(&args, "verify_tls", true);
            let proxy = opt_str(&args, "proxy");
            let builder = EnvelopeBuilder::new("monitor_ixp_connectivity")
                .command(format!("GET {} IXP endpoints", IXP_ENDPOINTS.len()));

            let endpoints: Vec<(String, String)> = IXP_ENDPOINTS
                .iter()
                .map(|(name, url)| (name.to_string(), url.to_string()))
                .collect();

            let timeout_dur = Duration::from_secs(timeout_secs as u64);
            let outcome = run_batch(
                endpoints,
                4,
                timeout_dur,
                RetryPolicy::with_retries(2, Duration::from_millis(300)),
                |_e: &(String, ProbeError)| true,
                || ("unknown".to_string(), ProbeError::network(ErrorCode::Timeout, &crate::errors::ctx(&[("timeout", "ixp_check")]))),
                move |(name, url): (String, String)| {
                    let proxy = proxy.clone();
                    async move {
                        let opts = http::HttpGetOptions {
                            timeout: timeout_dur,
                            follow_redirects: true,
                            verify_tls,
                            proxy: proxy.as_deref(),
                            user_agent: "netprobe/0.1 (+diagnostic-probe-engine)",
                        };
                        http::get(&url, &opts)
                            .await
                            .map(|r| (name.clone(), url.clone(), r.elapsed_ms))
                            .map_err(|e| (name, e))
                    }
                },
            )
            .await;

            let reachable: Vec<TargetOutcome> = outcome
                .successes
                .iter()
                .map(|(name, url, ms)| TargetOutcome::ok(name.clone(), Some(*ms), json!({"endpoint": url})))
                .collect();
            let unreachable: Vec<TargetOutcome> = outcome
                .failures
                .iter()
                .map(|(name, error)| TargetOutcome::failed(name.clone(), error))
                .collect();

            let total = IXP_ENDPOINTS.len();
            let rating = rating_for(reachable.len(), total);
            let mut data = batch_parsed_data("reachable", "unreachable", reachable, unreachable);
            if let Value::Object(ref mut map) = data {
                map.insert("rating".into(), json!(rating));
            }

            builder.success(String::new(), String::new(), data)
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_bands() {
        assert_eq!(rating_for(6, 6), "healthy");
        assert_eq!(rating_for(3, 6), "degraded");
        assert_eq!(rating_for(0, 6), "down");
    }
}
