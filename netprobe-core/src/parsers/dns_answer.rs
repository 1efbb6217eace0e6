//! DNS tool output parser (§4.3): IP address extraction from `dig`
//! `+short`/`nslookup` output via a strict regex, used when a record
//! type other than A is requested and the probe shells out instead of
//! using the system resolver.

use regex::Regex;

/// Extracts IPv4 addresses from raw `dig`/`nslookup` output, in order of
/// appearance, de-duplicated.
pub fn extract_ipv4_addresses(output: &str) -> Vec<String> {
    let re = Regex::new(r"^(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})$").unwrap();
    let mut seen = std::collections::HashSet::new();
    let mut addrs = Vec::new();
    for line in output.lines() {
        let trimmed = line.trim();
        if let Some(c) = re.captures(trimmed) {
            let ip = c[1].to_string();
            if seen.insert(ip.clone()) {
                addrs.push(ip);
            }
        }
    }
    addrs
}

/// Extracts `nslookup`-style `Address: a.b.c.d` answers, skipping the
/// first "Server:"/"Address:" block which identifies the resolver
/// itself rather than the answer.
pub fn extract_nslookup_answers(output: &str) -> Vec<String> {
    let re = Regex::new(r"Address:\s*(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})").unwrap();
    let mut blocks = output.split("\n\n");
    blocks.next(); // the resolver's own address block
    blocks
        .flat_map(|block| re.captures_iter(block).map(|c| c[1].to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_dig_short_answer() {
        let output = "93.184.216.34\n";
        assert_eq!(extract_ipv4_addresses(output), vec!["93.184.216.34"]);
    }

    #[test]
    fn ignores_non_ip_lines() {
        let output = "; some comment\nnot-an-ip\n93.184.216.34\n";
        assert_eq!(extract_ipv4_addresses(output), vec!["93.184.216.34"]);
    }
}
