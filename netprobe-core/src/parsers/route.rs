//! Route table parser (§4.3): default gateway extraction.

use regex::Regex;

use crate::primitives::Platform;

/// Extracts the default gateway IP from `ip route`/`netstat -nr`/`route
/// print` output.
pub fn parse_default_gateway(output: &str, platform: Platform) -> Option<String> {
    match platform {
        Platform::Windows => {
            let re = Regex::new(r"0\.0\.0\.0\s+0\.0\.0\.0\s+(\d{1,3}(?:\.\d{1,3}){3})").unwrap();
            re.captures(output).map(|c| c[1].to_string())
        }
        Platform::Macos => {
            output
                .lines()
                .find(|l| l.trim_start().starts_with("default"))
                .and_then(|l| l.split_whitespace().nth(1))
                .map(str::to_string)
        }
        _ => {
            let re = Regex::new(r"default via (\d{1,3}(?:\.\d{1,3}){3})").unwrap();
            re.captures(output).map(|c| c[1].to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_linux_default_route() {
        let sample = "default via 192.168.1.1 dev eth0 proto dhcp metric 100";
        assert_eq!(
            parse_default_gateway(sample, Platform::Linux).as_deref(),
            Some("192.168.1.1")
        );
    }

    #[test]
    fn missing_default_route_yields_none() {
        assert!(parse_default_gateway("no default here", Platform::Linux).is_none());
    }
}
