//! Manufacturer database parser (§4.3, §6): tab-separated OUI prefix,
//! manufacturer, optional comment; `#` comments and blank lines ignored.
//! Lookup is by longest prefix <= the input's 24-bit OUI (§4.3).

use std::collections::BTreeMap;

use crate::config::constants::UNKNOWN_MANUFACTURER;

#[derive(Debug, Clone)]
pub struct ManufEntry {
    pub manufacturer: String,
    pub comment: Option<String>,
}

/// A parsed manufacturer database, keyed by uppercase hex OUI prefix
/// (6, 7, or 9 hex-digit prefixes are all supported, matching
/// Wireshark's `manuf` format which mixes 24-bit and longer prefixes).
#[derive(Debug, Clone, Default)]
pub struct ManufDatabase {
    entries: BTreeMap<String, ManufEntry>,
}

impl ManufDatabase {
    pub fn parse(text: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split('\t').filter(|f| !f.is_empty());
            let Some(prefix) = fields.next() else {
                continue;
            };
            let Some(manufacturer) = fields.next() else {
                continue;
            };
            let comment = fields.next().map(str::to_string);
            let normalized_prefix = normalize_prefix(prefix);
            if normalized_prefix.is_empty() {
                continue;
            }
            entries.insert(
                normalized_prefix,
                ManufEntry {
                    manufacturer: manufacturer.trim().to_string(),
                    comment,
                },
            );
        }
        Self { entries }
    }

    /// Looks up the manufacturer for a normalized 12-hex-digit MAC by
    /// longest matching prefix; returns the "unknown" sentinel when
    /// nothing matches (§8 property 9).
    pub fn lookup(&self, normalized_mac: &str) -> String {
        for len in (2..=normalized_mac.len()).rev() {
            if let Some(entry) = self.entries.get(&normalized_mac[..len]) {
                return entry.manufacturer.clone();
            }
        }
        UNKNOWN_MANUFACTURER.to_string()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize_prefix(prefix: &str) -> String {
    prefix
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .collect::<String>()
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lines_and_skips_comments() {
        let text = "# comment\n\n00:00:00\tXEROX CORPORATION\nAA:BB:CC\tExample Inc.\tnote";
        let db = ManufDatabase::parse(text);
        assert_eq!(db.len(), 2);
    }

    #[test]
    fn longest_prefix_match_wins() {
        let text = "AABBCC\tShort Match\nAABBCCDD\tLong Match";
        let db = ManufDatabase::parse(text);
        assert_eq!(db.lookup("AABBCCDDEEFF"), "Long Match");
    }

    #[test]
    fn unmatched_prefix_returns_unknown() {
        let text = "AABBCC\tKnown Vendor";
        let db = ManufDatabase::parse(text);
        assert_eq!(db.lookup("112233445566"), UNKNOWN_MANUFACTURER);
    }
}
