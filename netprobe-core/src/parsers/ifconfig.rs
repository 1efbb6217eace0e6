//! Interface listing parser (§4.3): `ifconfig`/`ip addr`/`ipconfig`
//! output into per-interface name, status, IP, and MAC.

use regex::Regex;
use serde::Serialize;

use crate::primitives::Platform;

#[derive(Debug, Clone, Serialize)]
pub struct Interface {
    pub name: String,
    pub up: bool,
    pub ipv4: Option<String>,
    pub mac: Option<String>,
}

/// Parses interface-listing output. Returns one entry per interface
/// block found; unrecognized formats yield an empty list.
pub fn parse(output: &str, platform: Platform) -> Vec<Interface> {
    match platform {
        Platform::Windows => parse_ipconfig(output),
        Platform::Macos => parse_ifconfig(output),
        _ => parse_ip_addr(output),
    }
}

fn parse_ip_addr(output: &str) -> Vec<Interface> {
    let header_re = Regex::new(r"^\d+:\s+([\w.\-@]+):\s+<([^>]*)>").unwrap();
    let inet_re = Regex::new(r"inet\s+(\d{1,3}(?:\.\d{1,3}){3})").unwrap();
    let mac_re = Regex::new(r"link/ether\s+([0-9a-fA-F:]{17})").unwrap();

    let mut interfaces = Vec::new();
    let mut current: Option<Interface> = None;
    for line in output.lines() {
        if let Some(c) = header_re.captures(line) {
            if let Some(iface) = current.take() {
                interfaces.push(iface);
            }
            current = Some(Interface {
                name: c[1].to_string(),
                up: c[2].contains("UP"),
                ipv4: None,
                mac: None,
            });
            continue;
        }
        if let Some(iface) = current.as_mut() {
            if iface.ipv4.is_none() {
                if let Some(c) = inet_re.captures(line) {
                    iface.ipv4 = Some(c[1].to_string());
                }
            }
            if iface.mac.is_none() {
                if let Some(c) = mac_re.captures(line) {
                    iface.mac = Some(c[1].to_string());
                }
            }
        }
    }
    if let Some(iface) = current {
        interfaces.push(iface);
    }
    interfaces
}

fn parse_ifconfig(output: &str) -> Vec<Interface> {
    let header_re = Regex::new(r"^([\w.\-]+):\s+flags=\d+<([^>]*)>").unwrap();
    let inet_re = Regex::new(r"inet\s+(\d{1,3}(?:\.\d{1,3}){3})").unwrap();
    let mac_re = Regex::new(r"ether\s+([0-9a-fA-F:]{17})").unwrap();

    let mut interfaces = Vec::new();
    let mut current: Option<Interface> = None;
    for line in output.lines() {
        if let Some(c) = header_re.captures(line) {
            if let Some(iface) = current.take() {
                interfaces.push(iface);
            }
            current = Some(Interface {
                name: c[1].to_string(),
                up: c[2].contains("UP"),
                ipv4: None,
                mac: None,
            });
            continue;
        }
        if let Some(iface) = current.as_mut() {
            if iface.ipv4.is_none() {
                if let Some(c) = inet_re.captures(line) {
                    iface.ipv4 = Some(c[1].to_string());
                }
            }
            if iface.mac.is_none() {
                if let Some(c) = mac_re.captures(line) {
                    iface.mac = Some(c[1].to_string());
                }
            }
        }
    }
    if let Some(iface) = current {
        interfaces.push(iface);
    }
    interfaces
}

fn parse_ipconfig(output: &str) -> Vec<Interface> {
    let header_re = Regex::new(r"^(?:Ethernet adapter|Wireless LAN adapter)\s+([^:]+):").unwrap();
    let inet_re = Regex::new(r"IPv4 Address[.\s]*:\s*([\d.]+)").unwrap();
    let mac_re = Regex::new(r"Physical Address[.\s]*:\s*([0-9A-Fa-f-]{17})").unwrap();

    let mut interfaces = Vec::new();
    let mut current: Option<Interface> = None;
    for line in output.lines() {
        if let Some(c) = header_re.captures(line) {
            if let Some(iface) = current.take() {
                interfaces.push(iface);
            }
            current = Some(Interface {
                name: c[1].trim().to_string(),
                up: true,
                ipv4: None,
                mac: None,
            });
            continue;
        }
        if let Some(iface) = current.as_mut() {
            if iface.ipv4.is_none() {
                if let Some(c) = inet_re.captures(line) {
                    iface.ipv4 = Some(c[1].to_string());
                }
            }
            if iface.mac.is_none() {
                if let Some(c) = mac_re.captures(line) {
                    iface.mac = Some(c[1].replace('-', ":"));
                }
            }
        }
    }
    if let Some(iface) = current {
        interfaces.push(iface);
    }
    interfaces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ip_addr_output() {
        let sample = "2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500\n    link/ether aa:bb:cc:dd:ee:ff brd ff:ff:ff:ff:ff:ff\n    inet 192.168.1.5/24 brd 192.168.1.255 scope global eth0";
        let ifaces = parse(sample, Platform::Linux);
        assert_eq!(ifaces.len(), 1);
        assert_eq!(ifaces[0].name, "eth0");
        assert!(ifaces[0].up);
        assert_eq!(ifaces[0].ipv4.as_deref(), Some("192.168.1.5"));
        assert_eq!(ifaces[0].mac.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
    }
}
