//! Centralized constant tables consulted by probes.
//!
//! §4.1 requires every probe that needs a timeout to consult the keyed
//! table below rather than hard-code one; this mirrors the spirit of
//! `vtcode-core::config::constants` (one file of named tables that the
//! rest of the crate imports instead of re-declaring magic numbers).

use std::time::Duration;

/// Keyed timeout defaults (§4.1). Durations, not raw seconds, so callers
/// can pass them straight to `tokio::time::timeout`.
pub mod timeouts {
    use super::Duration;

    pub const PING: Duration = Duration::from_secs(5);
    pub const DNS_QUERY: Duration = Duration::from_secs(10);
    pub const WEB_REQUEST: Duration = Duration::from_secs(15);
    pub const PORT_SCAN: Duration = Duration::from_secs(30);
    pub const NETWORK_DISCOVERY: Duration = Duration::from_secs(120);
    pub const COMPREHENSIVE_SCAN: Duration = Duration::from_secs(600);
    pub const TRACEROUTE: Duration = Duration::from_secs(30);
    pub const NTP_QUERY: Duration = Duration::from_secs(5);
    pub const WHOIS: Duration = Duration::from_secs(10);
    pub const TLS_PEEK: Duration = Duration::from_secs(10);
    pub const IXP_CHECK: Duration = Duration::from_secs(15);
    pub const EMAIL_PORT_CHECK: Duration = Duration::from_secs(8);

    /// Looks up a timeout by the keys used in §4.1; unknown keys fall back
    /// to `WEB_REQUEST`, matching the original's permissive behavior of
    /// never raising over a missing config key.
    pub fn by_key(key: &str) -> Duration {
        match key {
            "ping" => PING,
            "dns_query" => DNS_QUERY,
            "web_request" => WEB_REQUEST,
            "port_scan" => PORT_SCAN,
            "network_discovery" => NETWORK_DISCOVERY,
            "comprehensive_scan" => COMPREHENSIVE_SCAN,
            "traceroute" => TRACEROUTE,
            "ntp_query" => NTP_QUERY,
            "whois" => WHOIS,
            "tls_peek" => TLS_PEEK,
            "ixp_check" => IXP_CHECK,
            "email_port_check" => EMAIL_PORT_CHECK,
            _ => WEB_REQUEST,
        }
    }
}

/// Fixed ordered list of HTTP IP-echo services for `get_external_ip`.
pub const EXTERNAL_IP_SERVICES: &[&str] = &[
    "https://api.ipify.org?format=json",
    "https://ifconfig.me/ip",
    "https://icanhazip.com",
    "https://ident.me",
];

/// SMTP provider -> (host, port) for `check_smtp_connectivity`.
pub const SMTP_PROVIDERS: &[(&str, &str, u16)] = &[
    ("Gmail", "smtp.gmail.com", 587),
    ("Outlook/O365", "smtp.office365.com", 587),
    ("Yahoo", "smtp.mail.yahoo.com", 587),
    ("iCloud Mail", "smtp.mail.me.com", 587),
    ("AOL Mail", "smtp.aol.com", 587),
    ("Zoho Mail", "smtp.zoho.com", 587),
    ("Mail.com", "smtp.mail.com", 587),
    ("GMX Mail", "smtp.gmx.com", 587),
    ("Fastmail", "smtp.fastmail.com", 587),
];

/// IMAP provider -> (host, port) for `check_imap_connectivity`.
pub const IMAP_PROVIDERS: &[(&str, &str, u16)] = &[
    ("Gmail", "imap.gmail.com", 993),
    ("Outlook/O365", "outlook.office365.com", 993),
    ("Yahoo", "imap.mail.yahoo.com", 993),
    ("iCloud Mail", "imap.mail.me.com", 993),
    ("AOL Mail", "imap.aol.com", 993),
    ("Zoho Mail", "imap.zoho.com", 993),
    ("Mail.com", "imap.mail.com", 993),
    ("GMX Mail", "imap.gmx.com", 993),
    ("Fastmail", "imap.fastmail.com", 993),
];

/// Major global Internet Exchange Point home pages for
/// `monitor_ixp_connectivity`.
pub const IXP_ENDPOINTS: &[(&str, &str)] = &[
    ("DE-CIX Frankfurt", "https://www.de-cix.net/"),
    ("LINX London", "https://www.linx.net/"),
    ("AMS-IX Amsterdam", "https://www.ams-ix.net/"),
    ("NYIIX New York", "https://www.nyiix.net/"),
    ("HKIX Hong Kong", "https://www.hkix.net/"),
    ("Equinix Global", "https://status.equinix.com/"),
];

/// WHOIS servers (host, port is always 43) for `check_whois_servers`.
pub const WHOIS_SERVERS: &[&str] = &[
    "whois.apnic.net",
    "whois.ripe.net",
    "whois.arin.net",
    "whois.afrinic.net",
    "whois.lacnic.net",
    "whois.pir.org",
    "whois.iana.org",
    "whois.verisign-grs.com",
];

/// Default NTP server pool for `check_ntp_servers`.
pub const DEFAULT_NTP_SERVERS: &[&str] = &[
    "pool.ntp.org",
    "time.google.com",
    "time.cloudflare.com",
    "time.windows.com",
];

/// Fixed sample of common subdomains probed by
/// `check_website_accessibility`.
pub const COMMON_SUBDOMAINS: &[&str] = &["www", "mail", "ftp", "api", "blog"];

/// Canary name used by `check_dns_resolvers` / `check_dns_propagation`.
pub const DNS_CANARY_NAME: &str = "example.com";

/// NTP offset classification thresholds, milliseconds, for
/// `analyze_ntp_sync`.
pub mod ntp_quality {
    pub const DEFAULT_THRESHOLD_MS: f64 = 100.0;
    pub const EXCELLENT_MS: f64 = 10.0;
    pub const GOOD_MULTIPLIER: f64 = 2.0;
    pub const MODERATE_MULTIPLIER: f64 = 5.0;
}

/// Module roots a Rust build would whitelist for dynamic discovery in the
/// original design; here this is informational only (Design Notes §9 —
/// discovery is explicit `register()` calls instead), retained because
/// the registry's `whitelisted_roots()` accessor (§3 "list of whitelisted
/// module roots") is part of the documented registry state.
pub const DISCOVERY_WHITELIST: &[&str] = &["network", "pentest", "memory", "core"];

/// Maximum age (in days) before the manufacturer database is considered
/// stale and `mac_address_manufacturer_lookup` emits a warning.
pub const MANUF_DB_MAX_AGE_DAYS: i64 = 180;

/// Sentinel manufacturer string for unmatched OUI prefixes (§8 property 9).
pub const UNKNOWN_MANUFACTURER: &str = "Unknown";

/// Sentinel returned by MAC normalization for malformed input (§8 property 6).
pub const INVALID_MAC_SENTINEL: &str = "INVALID_MAC";

/// Upstream Wireshark `manuf` database location, consulted by
/// `fetch_latest_wireshark_manuf_file`.
pub const MANUF_DOWNLOAD_URL: &str =
    "https://www.wireshark.org/download/automated/data/manuf";

/// AbuseIPDB's v2 "check" endpoint, consulted by the external-IP
/// reputation lookup when an API key is configured.
pub const ABUSEIPDB_CHECK_URL: &str = "https://api.abuseipdb.com/api/v2/check";

/// Spamhaus DNS blacklist zones queried by the external-IP reputation
/// lookup (§4.4 "Security / reputation"). SBL/CSS carry a threat
/// verdict; PBL is informational only (dynamic/residential address
/// space, not necessarily abusive).
pub mod spamhaus {
    pub const SBL_CSS_ZONE: &str = "sbl-xbl.spamhaus.org";
    pub const PBL_ZONE: &str = "pbl.spamhaus.org";
}
