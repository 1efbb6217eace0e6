//! The standardized result envelope (§3) every tool invocation returns.

use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::ProbeError;

/// Uniform result object returned by every probe. All fields are always
/// present; `error_type`/`error_message` are `None` iff `success`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub success: bool,
    pub exit_code: i32,
    pub execution_time: f64,
    pub timestamp: String,
    pub tool_name: String,
    pub target: Option<String>,
    pub command_executed: String,
    pub options_used: Value,
    pub stdout: String,
    pub stderr: String,
    pub parsed_data: Value,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
}

/// Builds envelopes while tracking elapsed wall-clock time from
/// construction, so probes don't each re-implement the timing dance.
pub struct EnvelopeBuilder {
    tool_name: String,
    target: Option<String>,
    command_executed: String,
    options_used: Value,
    started: Instant,
}

impl EnvelopeBuilder {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            target: None,
            command_executed: String::new(),
            options_used: Value::Object(Map::new()),
            started: Instant::now(),
        }
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command_executed = command.into();
        self
    }

    pub fn options(mut self, options: Value) -> Self {
        self.options_used = options;
        self
    }

    fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Builds a successful envelope. `parsed_data` MUST be populated
    /// (§3); `stdout`/`stderr` may be empty.
    pub fn success(self, stdout: String, stderr: String, parsed_data: Value) -> ToolResult {
        ToolResult {
            success: true,
            exit_code: 0,
            execution_time: self.elapsed_secs(),
            timestamp: Utc::now().to_rfc3339(),
            tool_name: self.tool_name,
            target: self.target,
            command_executed: self.command_executed,
            options_used: self.options_used,
            stdout,
            stderr,
            parsed_data,
            error_type: None,
            error_message: None,
        }
    }

    /// Builds a successful envelope with a non-zero exit code, for
    /// probes that document that `exit_code == 0` does not always imply
    /// success (§3).
    pub fn success_with_exit_code(
        self,
        exit_code: i32,
        stdout: String,
        stderr: String,
        parsed_data: Value,
    ) -> ToolResult {
        ToolResult {
            success: true,
            exit_code,
            execution_time: self.elapsed_secs(),
            timestamp: Utc::now().to_rfc3339(),
            tool_name: self.tool_name,
            target: self.target,
            command_executed: self.command_executed,
            options_used: self.options_used,
            stdout,
            stderr,
            parsed_data,
            error_type: None,
            error_message: None,
        }
    }

    /// Builds a failed envelope from a `ProbeError`.
    pub fn failure(self, error: ProbeError, stdout: String, stderr: String) -> ToolResult {
        self.failure_with_data(error, stdout, stderr, Value::Object(Map::new()))
    }

    /// Builds a failed envelope that still carries `parsed_data` — used
    /// by privileged-scan refusals (§9 "Privileged scans") that offer a
    /// markdown block of manual, unprivileged-equivalent commands
    /// alongside the `system.permission_denied` error.
    pub fn failure_with_data(
        self,
        error: ProbeError,
        stdout: String,
        stderr: String,
        parsed_data: Value,
    ) -> ToolResult {
        ToolResult {
            success: false,
            exit_code: 1,
            execution_time: self.elapsed_secs(),
            timestamp: Utc::now().to_rfc3339(),
            tool_name: self.tool_name,
            target: self.target,
            command_executed: self.command_executed,
            options_used: self.options_used,
            stdout,
            stderr,
            parsed_data,
            error_type: Some(error.category.to_string()),
            error_message: Some(error.message),
        }
    }
}

/// A per-target sub-result, the common shape multi-target probes nest
/// inside `parsed_data` (§3).
#[derive(Debug, Clone, Serialize)]
pub struct TargetOutcome {
    pub target: String,
    /// Response time (ms) or NTP offset (ms), when applicable.
    pub metric_ms: Option<f64>,
    pub success: bool,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    #[serde(flatten)]
    pub extra: Value,
}

impl TargetOutcome {
    pub fn ok(target: impl Into<String>, metric_ms: Option<f64>, extra: Value) -> Self {
        Self {
            target: target.into(),
            metric_ms,
            success: true,
            error_type: None,
            error_message: None,
            extra,
        }
    }

    pub fn failed(target: impl Into<String>, error: &ProbeError) -> Self {
        Self {
            target: target.into(),
            metric_ms: None,
            success: false,
            error_type: Some(error.category.to_string()),
            error_message: Some(error.message.clone()),
            extra: Value::Object(Map::new()),
        }
    }
}

/// Overall status of a batch sweep (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Success,
    Partial,
    Error,
}

/// Summary sub-object for multi-target probes (§3).
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub status: BatchStatus,
}

impl BatchSummary {
    pub fn from_counts(total: usize, succeeded: usize) -> Self {
        let failed = total.saturating_sub(succeeded);
        let success_rate = if total == 0 {
            0.0
        } else {
            succeeded as f64 / total as f64
        };
        let status = if total == 0 || succeeded == 0 {
            BatchStatus::Error
        } else if failed == 0 {
            BatchStatus::Success
        } else {
            BatchStatus::Partial
        };
        Self {
            total,
            succeeded,
            failed,
            success_rate,
            status,
        }
    }
}

/// Builds the standard "reachable/unreachable + summary" `parsed_data`
/// shape used by DNS, NTP, IXP, endpoint, and port-scan sweeps (§3).
pub fn batch_parsed_data(
    reachable_key: &str,
    unreachable_key: &str,
    reachable: Vec<TargetOutcome>,
    unreachable: Vec<TargetOutcome>,
) -> Value {
    let summary = BatchSummary::from_counts(reachable.len() + unreachable.len(), reachable.len());
    serde_json::json!({
        reachable_key: reachable,
        unreachable_key: unreachable,
        "summary": summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape_invariant_success() {
        let env = EnvelopeBuilder::new("ping_host")
            .target("127.0.0.1")
            .command("ping -c 1 127.0.0.1")
            .success("ok".into(), String::new(), serde_json::json!({"a": 1}));
        assert!(env.success);
        assert!(env.error_type.is_none());
        assert!(env.error_message.is_none());
    }

    #[test]
    fn envelope_shape_invariant_failure() {
        let err = ProbeError::network(crate::errors::ErrorCode::Timeout, &Default::default());
        let env = EnvelopeBuilder::new("ping_host").failure(err, String::new(), "boom".into());
        assert!(!env.success);
        assert!(env.error_type.is_some());
        assert!(env.error_message.is_some());
    }

    #[test]
    fn batch_summary_partial() {
        let s = BatchSummary::from_counts(4, 3);
        assert_eq!(s.status, BatchStatus::Partial);
        assert!((s.success_rate - 0.75).abs() < 1e-9);
    }

    #[test]
    fn batch_summary_all_success() {
        let s = BatchSummary::from_counts(3, 3);
        assert_eq!(s.status, BatchStatus::Success);
    }

    #[test]
    fn batch_summary_all_failed() {
        let s = BatchSummary::from_counts(3, 0);
        assert_eq!(s.status, BatchStatus::Error);
    }
}
