//! Traceroute output parser (§4.3): ordered hops with hop number, IP,
//! hostname, and average time.

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Hop {
    pub hop: u32,
    pub ip: Option<String>,
    pub hostname: Option<String>,
    pub avg_ms: Option<f64>,
}

/// Parses Unix-style `traceroute -n` output into ordered hops.
pub fn parse(output: &str) -> Vec<Hop> {
    let line_re = Regex::new(r"^\s*(\d+)\s+(.*)$").unwrap();
    let ip_re = Regex::new(r"\b(\d{1,3}(?:\.\d{1,3}){3})\b").unwrap();
    let time_re = Regex::new(r"([\d.]+)\s*ms").unwrap();
    let host_re = Regex::new(r"^([A-Za-z0-9][A-Za-z0-9.\-]*)\s+\(").unwrap();

    let mut hops = Vec::new();
    for line in output.lines() {
        let Some(caps) = line_re.captures(line) else {
            continue;
        };
        let Ok(hop_num) = caps[1].parse::<u32>() else {
            continue;
        };
        let rest = &caps[2];

        if rest.trim().starts_with('*') {
            hops.push(Hop {
                hop: hop_num,
                ip: None,
                hostname: None,
                avg_ms: None,
            });
            continue;
        }

        let ip = ip_re.captures(rest).map(|c| c[1].to_string());
        let hostname = host_re.captures(rest).map(|c| c[1].to_string());
        let times: Vec<f64> = time_re
            .captures_iter(rest)
            .filter_map(|c| c[1].parse::<f64>().ok())
            .collect();
        let avg_ms = if times.is_empty() {
            None
        } else {
            Some(times.iter().sum::<f64>() / times.len() as f64)
        };

        hops.push(Hop {
            hop: hop_num,
            ip,
            hostname,
            avg_ms,
        });
    }
    hops
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reachable_hop() {
        let sample = " 1  192.168.1.1  0.512 ms  0.498 ms  0.471 ms";
        let hops = parse(sample);
        assert_eq!(hops.len(), 1);
        assert_eq!(hops[0].hop, 1);
        assert_eq!(hops[0].ip.as_deref(), Some("192.168.1.1"));
        assert!(hops[0].avg_ms.unwrap() > 0.0);
    }

    #[test]
    fn parses_timed_out_hop() {
        let hops = parse(" 4  * * *");
        assert_eq!(hops.len(), 1);
        assert!(hops[0].ip.is_none());
    }
}
