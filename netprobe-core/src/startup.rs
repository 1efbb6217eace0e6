//! Startup sequence (SUPPLEMENTED FEATURES: "Startup sequence phases
//! mirrored from `core/startup_checks.py`"): a 4-phase environment
//! survey run once before `interactive`/`server` start, and on demand
//! by the `selftest` subcommand (§6).
//!
//! The original's phases were OS/Ollama/interfaces, internet
//! connectivity, pentest tool inventory, and a target-scope prompt. The
//! fourth phase managed a persistent markdown scope file, which is out
//! of scope here (Non-goals: no persistent database beyond the two
//! small JSON side files). The remaining three phases are kept, plus a
//! registry self-check standing in for what the tool inventory phase
//! fed into: every probe module actually registered itself correctly.

use std::time::Instant;

use serde::Serialize;

use crate::orchestrator::{ChatMessage, LlmClient};
use crate::registry::{Mode, ToolRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub status: PhaseStatus,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub name: String,
    pub status: PhaseStatus,
    pub duration_secs: f64,
    pub checks: Vec<CheckResult>,
}

impl PhaseReport {
    fn worst_status(checks: &[CheckResult]) -> PhaseStatus {
        if checks.iter().any(|c| c.status == PhaseStatus::Error) {
            PhaseStatus::Error
        } else if checks.iter().any(|c| c.status == PhaseStatus::Warning) {
            PhaseStatus::Warning
        } else {
            PhaseStatus::Success
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StartupReport {
    pub phases: Vec<PhaseReport>,
    pub total_duration_secs: f64,
    pub success: bool,
}

/// Phase 1: environment check. OS/arch/hostname, and (when an LLM
/// client is supplied) a reachability probe with graceful fallback —
/// the inference backend itself stays a black box (§1), so this only
/// confirms *something* answers, never which model.
async fn phase_environment_check(llm: Option<&dyn LlmClient>) -> PhaseReport {
    let start = Instant::now();
    let mut checks = Vec::new();

    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    checks.push(CheckResult {
        name: "os_detection".into(),
        status: PhaseStatus::Success,
        message: format!(
            "{hostname} running {} ({})",
            std::env::consts::OS,
            std::env::consts::ARCH
        ),
    });

    match llm {
        Some(client) => {
            let probe = [ChatMessage::user("ping")];
            match client.chat(&probe).await {
                Ok(_) => checks.push(CheckResult {
                    name: "llm_connectivity".into(),
                    status: PhaseStatus::Success,
                    message: "LLM backend responded".into(),
                }),
                Err(e) => checks.push(CheckResult {
                    name: "llm_connectivity".into(),
                    status: PhaseStatus::Warning,
                    message: format!("LLM backend unreachable, continuing without it: {e}"),
                }),
            }
        }
        None => checks.push(CheckResult {
            name: "llm_connectivity".into(),
            status: PhaseStatus::Warning,
            message: "no LLM client configured".into(),
        }),
    }

    match crate::primitives::local_ip_guess() {
        Ok(ip) => checks.push(CheckResult {
            name: "local_ip".into(),
            status: PhaseStatus::Success,
            message: format!("local IP {ip}"),
        }),
        Err(e) => checks.push(CheckResult {
            name: "local_ip".into(),
            status: PhaseStatus::Warning,
            message: format!("local IP detection failed: {e}"),
        }),
    }

    PhaseReport {
        status: PhaseReport::worst_status(&checks),
        name: "environment_check".into(),
        duration_secs: start.elapsed().as_secs_f64(),
        checks,
    }
}

/// Phase 2: external-binary availability sweep, over every registered
/// tool that declares `external_tool_required` (§4.6 item 3).
async fn phase_binary_sweep(registry: &mut ToolRegistry) -> PhaseReport {
    let start = Instant::now();
    registry.refresh_external_binaries().await;

    let required: Vec<String> = registry
        .get_available_tools(None, None, true)
        .iter()
        .filter_map(|meta| meta.external_tool_name.clone())
        .collect();
    let mut seen = std::collections::BTreeSet::new();
    let mut checks = Vec::new();
    for binary in required {
        if !seen.insert(binary.clone()) {
            continue;
        }
        let present = registry.availability().is_present(&binary);
        checks.push(CheckResult {
            name: binary.clone(),
            status: if present { PhaseStatus::Success } else { PhaseStatus::Warning },
            message: if present {
                format!("{binary} found on PATH")
            } else {
                format!("{binary} not found; install it to use the tools that require it")
            },
        });
    }

    PhaseReport {
        status: PhaseReport::worst_status(&checks),
        name: "external_binary_sweep".into(),
        duration_secs: start.elapsed().as_secs_f64(),
        checks,
    }
}

/// Phase 3: registry self-check — every linked-in probe module actually
/// registered its tools, categories are non-empty, and the whitelist
/// of module roots (§3 "list of whitelisted module roots") is intact.
fn phase_registry_self_check(registry: &ToolRegistry) -> PhaseReport {
    let start = Instant::now();
    let mut checks = Vec::new();

    let tool_count = registry.get_available_tools(None, None, false).len();
    checks.push(CheckResult {
        name: "tool_count".into(),
        status: if tool_count > 0 { PhaseStatus::Success } else { PhaseStatus::Error },
        message: format!("{tool_count} tools registered"),
    });

    let conversational = registry.get_available_tools(Some(Mode::Conversational), None, false).len();
    checks.push(CheckResult {
        name: "conversational_tools".into(),
        status: if conversational > 0 { PhaseStatus::Success } else { PhaseStatus::Warning },
        message: format!("{conversational} tools offered in conversational mode"),
    });

    let roots = registry.whitelisted_roots();
    checks.push(CheckResult {
        name: "whitelisted_roots".into(),
        status: if roots.is_empty() { PhaseStatus::Warning } else { PhaseStatus::Success },
        message: format!("module roots: {}", roots.join(", ")),
    });

    PhaseReport {
        status: PhaseReport::worst_status(&checks),
        name: "registry_self_check".into(),
        duration_secs: start.elapsed().as_secs_f64(),
        checks,
    }
}

/// Phase 4: connectivity smoke test — external IP, a canary DNS
/// resolution, and one HTTP GET, each run through the registry itself
/// so this exercises the same execution path a caller would use.
async fn phase_connectivity_smoke_test(registry: &ToolRegistry) -> PhaseReport {
    let start = Instant::now();
    let mut checks = Vec::new();

    let external_ip = registry
        .execute_tool("get_external_ip", serde_json::json!({}), Mode::Interactive)
        .await;
    checks.push(result_check("external_ip", &external_ip));

    let dns = registry
        .execute_tool(
            "resolve_hostname",
            serde_json::json!({"hostname": "example.com", "record_type": "A"}),
            Mode::Interactive,
        )
        .await;
    checks.push(result_check("dns_resolution", &dns));

    let web = registry
        .execute_tool(
            "test_http_connectivity",
            serde_json::json!({"url": "https://example.com"}),
            Mode::Interactive,
        )
        .await;
    checks.push(result_check("web_connectivity", &web));

    PhaseReport {
        status: PhaseReport::worst_status(&checks),
        name: "connectivity_smoke_test".into(),
        duration_secs: start.elapsed().as_secs_f64(),
        checks,
    }
}

fn result_check(name: &str, result: &crate::envelope::ToolResult) -> CheckResult {
    if result.success {
        CheckResult {
            name: name.to_string(),
            status: PhaseStatus::Success,
            message: format!("{name} ok"),
        }
    } else {
        CheckResult {
            name: name.to_string(),
            status: PhaseStatus::Warning,
            message: result.error_message.clone().unwrap_or_else(|| "failed".into()),
        }
    }
}

/// Runs all four phases in order, returning a report whose `success`
/// reflects the original's rule: overall success iff every phase is
/// `success` or `warning` (no phase in `error`).
pub async fn run_startup_sequence(registry: &mut ToolRegistry, llm: Option<&dyn LlmClient>) -> StartupReport {
    let start = Instant::now();
    let phases = vec![
        phase_environment_check(llm).await,
        phase_binary_sweep(registry).await,
        phase_registry_self_check(registry),
        phase_connectivity_smoke_test(registry).await,
    ];
    let success = phases.iter().all(|p| p.status != PhaseStatus::Error);
    StartupReport {
        total_duration_secs: start.elapsed().as_secs_f64(),
        success,
        phases,
    }
}

/// Renders a human-readable summary, the way `print_startup_summary`
/// does in the distilled original, minus the ANSI coloring (terminal
/// color here is left to the CLI layer, not baked into this report).
pub fn render_summary(report: &StartupReport) -> String {
    let mut out = String::new();
    for phase in &report.phases {
        out.push_str(&format!("\n{} [{:?}] ({:.2}s)\n", phase.name, phase.status, phase.duration_secs));
        for check in &phase.checks {
            out.push_str(&format!("  [{:?}] {}: {}\n", check.status, check.name, check.message));
        }
    }
    out.push_str(&format!(
        "\nstartup {} in {:.2}s\n",
        if report.success { "succeeded" } else { "failed" },
        report.total_duration_secs
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::MockLlmClient;

    #[tokio::test]
    async fn environment_check_succeeds_without_an_llm_client() {
        let report = phase_environment_check(None).await;
        assert_eq!(report.status, PhaseStatus::Warning);
        assert!(report.checks.iter().any(|c| c.name == "os_detection" && c.status == PhaseStatus::Success));
    }

    #[tokio::test]
    async fn environment_check_reports_llm_reachability() {
        let client = MockLlmClient::new("pong");
        let report = phase_environment_check(Some(&client)).await;
        assert!(report.checks.iter().any(|c| c.name == "llm_connectivity" && c.status == PhaseStatus::Success));
    }

    #[test]
    fn registry_self_check_flags_an_empty_registry_as_error() {
        let registry = ToolRegistry::new();
        let report = phase_registry_self_check(&registry);
        assert_eq!(report.status, PhaseStatus::Error);
    }

    #[tokio::test]
    async fn binary_sweep_reports_missing_tool_as_warning_not_error() {
        let mut registry = ToolRegistry::new();
        crate::probes::pentest::register(&mut registry);
        let report = phase_binary_sweep(&mut registry).await;
        assert_ne!(report.status, PhaseStatus::Error);
    }

    #[tokio::test]
    async fn full_sequence_reports_a_phase_per_stage() {
        let mut registry = crate::build_default_registry();
        let report = run_startup_sequence(&mut registry, None).await;
        assert_eq!(report.phases.len(), 4);
    }
}
