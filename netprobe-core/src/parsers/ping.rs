//! Ping output parser (§4.3): packets sent/received/loss, min/avg/max.

use regex::Regex;
use serde::Serialize;

use crate::primitives::Platform;

#[derive(Debug, Clone, Default, Serialize)]
pub struct PingStats {
    pub packets_sent: Option<u32>,
    pub packets_received: Option<u32>,
    pub packet_loss_pct: Option<f64>,
    pub min_ms: Option<f64>,
    pub avg_ms: Option<f64>,
    pub max_ms: Option<f64>,
}

/// Parses `ping`/`ping -n` output. Never raises: unrecognized input
/// yields a default (all-`None`) `PingStats`.
pub fn parse(output: &str, platform: Platform) -> PingStats {
    let mut stats = PingStats::default();

    match platform {
        Platform::Windows => {
            if let Some(c) = Regex::new(r"Packets: Sent = (\d+)").unwrap().captures(output) {
                stats.packets_sent = c[1].parse().ok();
            }
            if let Some(c) = Regex::new(r"Received = (\d+)").unwrap().captures(output) {
                stats.packets_received = c[1].parse().ok();
            }
            if let Some(c) = Regex::new(r"Lost = \d+ \((\d+)% loss\)").unwrap().captures(output) {
                stats.packet_loss_pct = c[1].parse().ok();
            }
            if let Some(c) = Regex::new(r"Minimum = (\d+)ms, Maximum = (\d+)ms, Average = (\d+)ms")
                .unwrap()
                .captures(output)
            {
                stats.min_ms = c[1].parse().ok();
                stats.max_ms = c[2].parse().ok();
                stats.avg_ms = c[3].parse().ok();
            }
        }
        _ => {
            if let Some(c) = Regex::new(r"(\d+) packets transmitted, (\d+)(?: packets)? received, ([\d.]+)% packet loss")
                .unwrap()
                .captures(output)
            {
                stats.packets_sent = c[1].parse().ok();
                stats.packets_received = c[2].parse().ok();
                stats.packet_loss_pct = c[3].parse().ok();
            }
            if let Some(c) = Regex::new(r"(?:min/avg/max(?:/(?:mdev|stddev))?) = ([\d.]+)/([\d.]+)/([\d.]+)")
                .unwrap()
                .captures(output)
            {
                stats.min_ms = c[1].parse().ok();
                stats.avg_ms = c[2].parse().ok();
                stats.max_ms = c[3].parse().ok();
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_linux_ping_output() {
        let sample = "--- 127.0.0.1 ping statistics ---\n2 packets transmitted, 2 received, 0% packet loss, time 1001ms\nrtt min/avg/max/mdev = 0.020/0.030/0.040/0.005 ms";
        let stats = parse(sample, Platform::Linux);
        assert_eq!(stats.packets_sent, Some(2));
        assert_eq!(stats.packets_received, Some(2));
        assert_eq!(stats.packet_loss_pct, Some(0.0));
        assert_eq!(stats.avg_ms, Some(0.030));
    }

    #[test]
    fn unrecognized_input_yields_empty_stats() {
        let stats = parse("garbage output", Platform::Linux);
        assert!(stats.packets_sent.is_none());
    }
}
