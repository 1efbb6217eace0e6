//! Platform command chooser (§4.2): keyed on the current OS, selects the
//! appropriate external command and flag set.

/// The three platform families the probe layer cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    Macos,
    Windows,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::Macos
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Other
        }
    }

    pub fn as_tag(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Macos => "darwin",
            Platform::Windows => "windows",
            Platform::Other => "other",
        }
    }

    /// `ping` argv for `count` packets against `target`.
    pub fn ping_command(&self, target: &str, count: u32, timeout_secs: u32) -> Vec<String> {
        match self {
            Platform::Windows => vec![
                "ping".into(),
                "-n".into(),
                count.to_string(),
                "-w".into(),
                (timeout_secs * 1000).to_string(),
                target.into(),
            ],
            _ => vec![
                "ping".into(),
                "-c".into(),
                count.to_string(),
                "-W".into(),
                timeout_secs.to_string(),
                target.into(),
            ],
        }
    }

    /// `traceroute`/`tracert` argv.
    pub fn traceroute_command(&self, target: &str) -> Vec<String> {
        match self {
            Platform::Windows => vec!["tracert".into(), "-d".into(), target.into()],
            _ => vec!["traceroute".into(), "-n".into(), target.into()],
        }
    }

    /// Interface-listing command.
    pub fn interface_command(&self) -> Vec<String> {
        match self {
            Platform::Windows => vec!["ipconfig".into(), "/all".into()],
            Platform::Macos => vec!["ifconfig".into()],
            _ => vec!["ip".into(), "addr".into()],
        }
    }

    /// Default-route listing command.
    pub fn route_command(&self) -> Vec<String> {
        match self {
            Platform::Windows => vec!["route".into(), "print".into()],
            Platform::Macos => vec!["netstat".into(), "-nr".into()],
            _ => vec!["ip".into(), "route".into()],
        }
    }

    /// ARP table query for a single IP.
    pub fn arp_command(&self, ip: &str) -> Vec<String> {
        match self {
            Platform::Windows => vec!["arp".into(), "-a".into(), ip.into()],
            _ => vec!["arp".into(), "-n".into(), ip.into()],
        }
    }

    /// DNS lookup tool preference: `dig` where available, else `nslookup`.
    pub fn dns_query_command(&self, name: &str, record_type: &str) -> Vec<String> {
        match self {
            Platform::Windows => vec!["nslookup".into(), format!("-type={record_type}"), name.into()],
            _ => vec!["dig".into(), "+short".into(), name.into(), record_type.into()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_flags_differ_by_platform() {
        let linux = Platform::Linux.ping_command("1.1.1.1", 2, 2);
        assert!(linux.contains(&"-c".to_string()));
        let win = Platform::Windows.ping_command("1.1.1.1", 2, 2);
        assert!(win.contains(&"-n".to_string()));
    }
}
