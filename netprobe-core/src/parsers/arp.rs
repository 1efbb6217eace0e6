//! ARP output parser (§4.3): MAC for a queried IP.

use regex::Regex;

/// Extracts the MAC address for `ip` out of `arp -n`/`arp -a` output.
pub fn parse_mac_for_ip(output: &str, ip: &str) -> Option<String> {
    let mac_re = Regex::new(r"([0-9A-Fa-f]{1,2}:[0-9A-Fa-f]{1,2}(?::[0-9A-Fa-f]{1,2}){4})").unwrap();
    output
        .lines()
        .find(|line| line.contains(ip))
        .and_then(|line| mac_re.captures(line))
        .map(|c| c[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_mac_on_matching_line() {
        let sample = "? (192.168.1.1) at aa:bb:cc:dd:ee:ff [ether] on eth0";
        assert_eq!(
            parse_mac_for_ip(sample, "192.168.1.1").as_deref(),
            Some("aa:bb:cc:dd:ee:ff")
        );
    }

    #[test]
    fn no_match_yields_none() {
        let sample = "? (192.168.1.2) at bb:bb:bb:bb:bb:bb [ether] on eth0";
        assert!(parse_mac_for_ip(sample, "192.168.1.1").is_none());
    }
}
