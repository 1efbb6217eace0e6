//! MAC to manufacturer lookup probes (§4.4 "MAC <-> manufacturer", §4.3,
//! §6): normalize a MAC address, look it up against a local copy of the
//! Wireshark `manuf` database, and refresh that copy on demand.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::config::constants::{
    timeouts, INVALID_MAC_SENTINEL, MANUF_DB_MAX_AGE_DAYS, MANUF_DOWNLOAD_URL,
};
use crate::envelope::EnvelopeBuilder;
use crate::errors::{ErrorCode, ProbeError};
use crate::parsers::manuf::ManufDatabase;
use crate::primitives::{http, oui};
use crate::probes::args::{bool_or, str_or};
use crate::registry::metadata::{Mode, ParamType, ParameterInfo, ToolCategory};
use crate::registry::{ToolFn, ToolFuture, ToolMetadata, ToolRegistry};

pub fn register(registry: &mut ToolRegistry) {
    register_fetch_latest_wireshark_manuf_file(registry);
    register_mac_address_manufacturer_lookup(registry);
}

/// Normalizes a MAC address to 12 uppercase hex digits, accepting
/// colon-, dash-, and Cisco dot-separated forms as well as a bare
/// run of hex digits. Returns `None` when the input isn't exactly 12
/// hex digits once `:-. \t` separators are stripped (§8 property 6).
fn normalize_mac(input: &str) -> Option<String> {
    let stripped: String = input
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.' | ' ' | '\t'))
        .collect();
    if stripped.len() != 12 || !stripped.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(stripped.to_uppercase())
}

fn register_fetch_latest_wireshark_manuf_file(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("fetch_latest_wireshark_manuf_file", "fetch_latest_wireshark_manuf_file")
        .description("Download the latest Wireshark manuf (OUI) database if the local copy is missing or stale")
        .category(ToolCategory::NetworkDiagnostics)
        .param("force", ParameterInfo::optional(ParamType::Boolean, "re-download even if the local copy is fresh", json!(false)))
        .build();
    let function: ToolFn = Arc::new(|args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let force = bool_or(&args, "force", false);
            let builder = EnvelopeBuilder::new("fetch_latest_wireshark_manuf_file").command(format!("GET {MANUF_DOWNLOAD_URL}"));

            let existing = oui::locate_existing();
            if !force {
                if let Some(path) = &existing {
                    if let Ok(metadata) = tokio::fs::metadata(path).await {
                        if let Ok(modified) = metadata.modified() {
                            let age_days = modified
                                .elapsed()
                                .map(|d| d.as_secs() / 86_400)
                                .unwrap_or(0);
                            if age_days < MANUF_DB_MAX_AGE_DAYS as u64 {
                                return builder.success(
                                    String::new(),
                                    String::new(),
                                    json!({"status": "skipped", "reason": "already fresh", "age_days": age_days, "path": path.display().to_string()}),
                                );
                            }
                        }
                    }
                }
            }

            let (status, body) = match http::download(MANUF_DOWNLOAD_URL, timeouts::WEB_REQUEST).await {
                Ok(r) => r,
                Err(error) => return builder.failure(error, String::new(), String::new()),
            };
            if status != 200 {
                return builder.failure(
                    ProbeError::network(ErrorCode::Unreachable, &crate::errors::ctx(&[("target", MANUF_DOWNLOAD_URL)])),
                    String::new(),
                    format!("unexpected status {status}"),
                );
            }

            let Some(dest) = oui::fallback_manuf_path() else {
                return builder.failure(
                    ProbeError::system(ErrorCode::InvalidPlatform, &Default::default()),
                    String::new(),
                    "no writable location for the manuf database".into(),
                );
            };
            if let Some(parent) = dest.parent() {
                if tokio::fs::create_dir_all(parent).await.is_err() {
                    return builder.failure(
                        ProbeError::configuration(ErrorCode::PermissionError, &crate::errors::ctx(&[("target", &parent.display().to_string())])),
                        String::new(),
                        String::new(),
                    );
                }
            }
            if tokio::fs::write(&dest, &body).await.is_err() {
                return builder.failure(
                    ProbeError::configuration(ErrorCode::PermissionError, &crate::errors::ctx(&[("target", &dest.display().to_string())])),
                    String::new(),
                    String::new(),
                );
            }

            builder.success(
                String::new(),
                String::new(),
                json!({"status": "downloaded", "path": dest.display().to_string()}),
            )
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

fn register_mac_address_manufacturer_lookup(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("mac_address_manufacturer_lookup", "mac_address_manufacturer_lookup")
        .description("Look up the manufacturer registered to a MAC address's OUI prefix")
        .category(ToolCategory::NetworkDiagnostics)
        .param("mac_address", ParameterInfo::required(ParamType::String, "MAC address, any common separator"))
        .build();
    let function: ToolFn = Arc::new(|args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let raw = str_or(&args, "mac_address", "");
            let builder = EnvelopeBuilder::new("mac_address_manufacturer_lookup").target(raw.clone());

            let Some(normalized) = normalize_mac(&raw) else {
                let mut result = builder.failure(
                    ProbeError::input(ErrorCode::InvalidFormat, &crate::errors::ctx(&[("target", &raw)])),
                    String::new(),
                    String::new(),
                );
                result.parsed_data = json!({"normalized": INVALID_MAC_SENTINEL});
                return result;
            };

            let Some(path) = oui::locate_existing() else {
                return builder.failure(
                    ProbeError::configuration(ErrorCode::FileNotFound, &crate::errors::ctx(&[("target", "manuf database")])),
                    String::new(),
                    "run fetch_latest_wireshark_manuf_file first".into(),
                );
            };

            let contents = match tokio::fs::read_to_string(&path).await {
                Ok(c) => c,
                Err(_) => {
                    return builder.failure(
                        ProbeError::configuration(ErrorCode::FileNotFound, &crate::errors::ctx(&[("target", &path.display().to_string())])),
                        String::new(),
                        String::new(),
                    );
                }
            };
            let db = ManufDatabase::parse(&contents);
            let manufacturer = db.lookup(&normalized);

            let stale = tokio::fs::metadata(&path)
                .await
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|m| m.elapsed().ok())
                .map(|age| age.as_secs() / 86_400 >= MANUF_DB_MAX_AGE_DAYS as u64)
                .unwrap_or(false);

            builder.success(
                String::new(),
                String::new(),
                json!({
                    "normalized_mac": normalized,
                    "manufacturer": manufacturer,
                    "database_stale": stale,
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
    fn normalizes_colon_separated() {
        assert_eq!(normalize_mac("aa:bb:cc:dd:ee:ff").as_deref(), Some("AABBCCDDEEFF"));
    }

    #[test]
    fn normalizes_cisco_dot_format() {
        assert_eq!(normalize_mac("aabb.ccdd.eeff").as_deref(), Some("AABBCCDDEEFF"));
    }

    #[test]
    fn normalizes_tab_separated() {
        assert_eq!(normalize_mac("aa\tbb\tcc\tdd\tee\tff").as_deref(), Some("AABBCCDDEEFF"));
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(normalize_mac("aa:bb:cc"), None);
    }

    #[test]
    fn rejects_non_hex() {
        assert_eq!(normalize_mac("zz:bb:cc:dd:ee:ff"), None);
    }

    #[tokio::test]
    async fn invalid_mac_yields_sentinel() {
        let mut registry = ToolRegistry::new();
        register(&mut registry);
        let result = registry
            .execute_tool(
                "mac_address_manufacturer_lookup",
                json!({"mac_address": "not-a-mac"}),
                Mode::Interactive,
            )
            .await;
        assert!(!result.success);
        assert_eq!(result.parsed_data.get("normalized").and_then(Value::as_str), Some(INVALID_MAC_SENTINEL));
    }
}
