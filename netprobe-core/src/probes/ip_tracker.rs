//! External-IP change tracking (§4.4.1): records the current and previous
//! external IP in a small JSON history file under the user config
//! directory and reports whether the address has changed since the last
//! check. The three states implied by the history file are
//! Uninitialized (no file yet) -> Steady (unchanged since last check) ->
//! Changed (current differs from the last recorded value); there is no
//! explicit enum for this because the history file's own optional fields
//! already encode it.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::constants::timeouts;
use crate::envelope::EnvelopeBuilder;
use crate::errors::{ErrorCode, ProbeError};
use crate::primitives::http;
use crate::probes::args::opt_str;
use crate::probes::ip::extract_ip;
use crate::registry::metadata::{Mode, ParamType, ParameterInfo, ToolCategory};
use crate::registry::{ToolFn, ToolFuture, ToolMetadata, ToolRegistry};

pub fn register(registry: &mut ToolRegistry) {
    register_monitor_external_ip_changes(registry);
    register_did_external_ip_change(registry);
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct IpHistory {
    current_ip: Option<String>,
    current_timestamp: Option<String>,
    previous_ip: Option<String>,
    previous_timestamp: Option<String>,
}

fn history_file_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("netprobe").join("external_ip_history.json"))
}

async fn load_ip_history(path: &PathBuf) -> IpHistory {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
        Err(_) => IpHistory::default(),
    }
}

/// Writes the history file via write-temp-then-rename so a concurrent
/// reader never observes a half-written file.
async fn save_ip_history(path: &PathBuf, history: &IpHistory) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let body = serde_json::to_string_pretty(history).unwrap_or_default();
    tokio::fs::write(&tmp_path, body).await?;
    tokio::fs::rename(&tmp_path, path).await
}

/// Shifts `current` to `previous` when the new IP differs, then always
/// refreshes `current`/`current_timestamp`. Mirrors the update-in-place
/// behavior the original tracker uses regardless of whether the IP
/// actually changed (a no-change check still bumps the timestamp).
fn update_ip_history(history: &mut IpHistory, new_ip: &str, now: String) {
    if let Some(existing) = &history.current_ip {
        if existing != new_ip {
            history.previous_ip = Some(existing.clone());
            history.previous_timestamp = history.current_timestamp.clone();
        }
    }
    history.current_ip = Some(new_ip.to_string());
    history.current_timestamp = Some(now);
}

/// Testable-without-I/O core of the change-detection FSM: given the
/// loaded history and a freshly observed IP, decides whether this counts
/// as a change and produces the updated history plus a status message.
/// Supplemented per the distilled original's `check_ip_change_status`.
fn check_ip_change_status(mut history: IpHistory, current_ip: &str, now: String) -> (bool, String, IpHistory) {
    let was_uninitialized = history.current_ip.is_none();
    let changed = !was_uninitialized && history.current_ip.as_deref() != Some(current_ip);
    let message = if was_uninitialized {
        format!("Initial IP recorded: {current_ip}")
    } else if changed {
        format!(
            "IP changed from {} to {current_ip}",
            history.current_ip.clone().unwrap_or_default()
        )
    } else {
        format!("IP unchanged: {current_ip}")
    };
    update_ip_history(&mut history, current_ip, now);
    (changed, message, history)
}

async fn fetch_current_external_ip() -> Result<String, ProbeError> {
    let opts = http::HttpGetOptions { timeout: timeouts::WEB_REQUEST, ..Default::default() };
    for service in crate::config::constants::EXTERNAL_IP_SERVICES {
        let Ok(response) = http::get(service, &opts).await else {
            continue;
        };
        if response.status != 200 {
            continue;
        }
        if let Some(candidate) = extract_ip(&response.body_preview) {
            return Ok(candidate);
        }
    }
    Err(ProbeError::network(
        ErrorCode::Unreachable,
        &crate::errors::ctx(&[("target", "external-ip services")]),
    ))
}

fn history_to_json(history: &IpHistory) -> Value {
    json!({
        "current_ip": history.current_ip,
        "current_timestamp": history.current_timestamp,
        "previous_ip": history.previous_ip,
        "previous_timestamp": history.previous_timestamp,
    })
}

fn register_monitor_external_ip_changes(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("monitor_external_ip_changes", "monitor_external_ip_changes")
        .description("Monitor the external IP address for changes against a persisted history")
        .category(ToolCategory::NetworkDiagnostics)
        .build();
    let function: ToolFn = Arc::new(|_args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let builder = EnvelopeBuilder::new("monitor_external_ip_changes");

            let Some(path) = history_file_path() else {
                return builder.failure(
                    ProbeError::system(ErrorCode::InvalidPlatform, &Default::default()),
                    String::new(),
                    "no home directory to store IP history".into(),
                );
            };

            let current_ip = match fetch_current_external_ip().await {
                Ok(ip) => ip,
                Err(error) => return builder.failure(error, String::new(), String::new()),
            };

            let history = load_ip_history(&path).await;
            let now = Utc::now().to_rfc3339();
            let (changed, message, updated) = check_ip_change_status(history, &current_ip, now);

            if let Err(e) = save_ip_history(&path, &updated).await {
                return builder.failure(
                    ProbeError::configuration(ErrorCode::PermissionError, &crate::errors::ctx(&[("target", &path.display().to_string())])),
                    String::new(),
                    e.to_string(),
                );
            }

            let mut data = history_to_json(&updated);
            if let Value::Object(ref mut map) = data {
                map.insert("changed".into(), json!(changed));
                map.insert("message".into(), json!(message));
                map.insert("config_file".into(), json!(path.display().to_string()));
            }
            builder.success(String::new(), String::new(), data)
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

/// Legacy-named alias over `check_ip_change_status`, kept for parity with
/// the distilled original's `did_external_ip_change`: accepts an optional
/// pre-fetched IP instead of always calling out to the network.
fn register_did_external_ip_change(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("did_external_ip_change", "did_external_ip_change")
        .description("Check whether the external IP changed since the last recorded value")
        .category(ToolCategory::NetworkDiagnostics)
        .param("current_external_ip", ParameterInfo::optional(ParamType::String, "pre-fetched external IP; fetched automatically when omitted", Value::Null))
        .build();
    let function: ToolFn = Arc::new(|args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let builder = EnvelopeBuilder::new("did_external_ip_change");
            let Some(path) = history_file_path() else {
                return builder.failure(
                    ProbeError::system(ErrorCode::InvalidPlatform, &Default::default()),
                    String::new(),
                    "no home directory to store IP history".into(),
                );
            };

            let current_ip = match opt_str(&args, "current_external_ip") {
                Some(ip) => ip,
                None => match fetch_current_external_ip().await {
                    Ok(ip) => ip,
                    Err(error) => return builder.failure(error, String::new(), String::new()),
                },
            };

            let history = load_ip_history(&path).await;
            let now = Utc::now().to_rfc3339();
            let (changed, message, updated) = check_ip_change_status(history, &current_ip, now);

            if let Err(e) = save_ip_history(&path, &updated).await {
                return builder.failure(
                    ProbeError::configuration(ErrorCode::PermissionError, &crate::errors::ctx(&[("target", &path.display().to_string())])),
                    String::new(),
                    e.to_string(),
                );
            }

            builder.success(String::new(), String::new(), json!({"changed": changed, "message": message}))
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_is_not_a_change() {
        let (changed, message, updated) = check_ip_change_status(IpHistory::default(), "1.2.3.4", "t0".into());
        assert!(!changed);
        assert!(message.contains("Initial IP recorded"));
        assert_eq!(updated.current_ip.as_deref(), Some("1.2.3.4"));
        assert!(updated.previous_ip.is_none());
    }

    #[test]
    fn differing_ip_is_reported_as_changed_and_shifts_previous() {
        let history = IpHistory {
            current_ip: Some("1.2.3.4".into()),
            current_timestamp: Some("t0".into()),
            previous_ip: None,
            previous_timestamp: None,
        };
        let (changed, message, updated) = check_ip_change_status(history, "5.6.7.8", "t1".into());
        assert!(changed);
        assert!(message.contains("changed from 1.2.3.4 to 5.6.7.8"));
        assert_eq!(updated.current_ip.as_deref(), Some("5.6.7.8"));
        assert_eq!(updated.previous_ip.as_deref(), Some("1.2.3.4"));
    }

    #[test]
    fn unchanged_ip_still_refreshes_timestamp() {
        let history = IpHistory {
            current_ip: Some("1.2.3.4".into()),
            current_timestamp: Some("t0".into()),
            previous_ip: None,
            previous_timestamp: None,
        };
        let (changed, _message, updated) = check_ip_change_status(history, "1.2.3.4", "t1".into());
        assert!(!changed);
        assert_eq!(updated.current_timestamp.as_deref(), Some("t1"));
        assert!(updated.previous_ip.is_none());
    }

    #[tokio::test]
    async fn round_trips_through_a_temp_history_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("external_ip_history.json");
        let mut history = IpHistory::default();
        update_ip_history(&mut history, "9.9.9.9", "t0".into());
        save_ip_history(&path, &history).await.unwrap();
        let reloaded = load_ip_history(&path).await;
        assert_eq!(reloaded.current_ip.as_deref(), Some("9.9.9.9"));
    }
}
