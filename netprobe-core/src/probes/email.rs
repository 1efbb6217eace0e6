//! Email infrastructure probes (§4.4 "Email infrastructure").

use std::sync::Arc;

use serde_json::{json, Value};

use crate::batch::{run_batch, RetryPolicy};
use crate::config::constants::{timeouts, IMAP_PROVIDERS, SMTP_PROVIDERS};
use crate::envelope::EnvelopeBuilder;
use crate::primitives::tcp;
use crate::registry::metadata::{Mode, ToolCategory};
use crate::registry::{ToolFn, ToolFuture, ToolMetadata, ToolRegistry};

pub fn register(registry: &mut ToolRegistry) {
    register_check_smtp_connectivity(registry);
    register_check_imap_connectivity(registry);
    register_check_all_email_services(registry);
}

async fn probe_providers(providers: &'static [(&'static str, &'static str, u16)]) -> (Vec<Value>, usize) {
    let targets: Vec<(&'static str, &'static str, u16)> = providers.to_vec();
    let outcome = run_batch(
        targets,
        6,
        timeouts::EMAIL_PORT_CHECK,
        RetryPolicy::none(),
        |_e: &Value| false,
        || json!({"success": false, "error_message": "timed out"}),
        |(name, host, port): (&'static str, &'static str, u16)| async move {
            tcp::connect(host, port, timeouts::EMAIL_PORT_CHECK)
                .await
                .map(|r| json!({"provider": name, "host": host, "port": port, "success": true, "connect_time_ms": r.connect_time_ms}))
                .map_err(|e| json!({"provider": name, "host": host, "port": port, "success": false, "error_message": e.message}))
        },
    )
    .await;

    let succeeded = outcome.successes.len();
    let mut results = outcome.successes;
    results.extend(outcome.failures);
    (results, succeeded)
}

fn register_check_smtp_connectivity(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("check_smtp_connectivity", "check_smtp_connectivity")
        .description("TCP-probe port 587 on a fixed dictionary of SMTP providers")
        .category(ToolCategory::EmailDiagnostics)
        .build();
    let function: ToolFn = Arc::new(|_args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let builder = EnvelopeBuilder::new("check_smtp_connectivity").command("tcp-probe SMTP providers:587");
            let (results, succeeded) = probe_providers(SMTP_PROVIDERS).await;
            builder.success(
                String::new(),
                String::new(),
                json!({"results": results, "total": SMTP_PROVIDERS.len(), "succeeded": succeeded}),
            )
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

fn register_check_imap_connectivity(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("check_imap_connectivity", "check_imap_connectivity")
        .description("TCP-probe port 993 on a fixed dictionary of IMAP providers")
        .category(ToolCategory::EmailDiagnostics)
        .build();
    let function: ToolFn = Arc::new(|_args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let builder = EnvelopeBuilder::new("check_imap_connectivity").command("tcp-probe IMAP providers:993");
            let (results, succeeded) = probe_providers(IMAP_PROVIDERS).await;
            builder.success(
                String::new(),
                String::new(),
                json!({"results": results, "total": IMAP_PROVIDERS.len(), "succeeded": succeeded}),
            )
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

/// Overall rating band for the combined SMTP+IMAP sweep (§4.4), mirroring
/// the banding style `analyze_ntp_sync` uses for offset spread.
fn rate(success_rate: f64) -> &'static str {
    if success_rate >= 0.9 {
        "excellent"
    } else if success_rate >= 0.7 {
        "good"
    } else if success_rate >= 0.4 {
        "moderate"
    } else {
        "poor"
    }
}

fn register_check_all_email_services(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("check_all_email_services", "check_all_email_services")
        .description("Composes the SMTP and IMAP sweeps into an overall connectivity rating")
        .category(ToolCategory::EmailDiagnostics)
        .build();
    let function: ToolFn = Arc::new(|_args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let builder = EnvelopeBuilder::new("check_all_email_services").command("tcp-probe SMTP+IMAP providers");
            let (smtp_results, smtp_succeeded) = probe_providers(SMTP_PROVIDERS).await;
            let (imap_results, imap_succeeded) = probe_providers(IMAP_PROVIDERS).await;

            let total = SMTP_PROVIDERS.len() + IMAP_PROVIDERS.len();
            let succeeded = smtp_succeeded + imap_succeeded;
            let success_rate = if total == 0 { 0.0 } else { succeeded as f64 / total as f64 };

            builder.success(
                String::new(),
                String::new(),
                json!({
                    "smtp": {"results": smtp_results, "succeeded": smtp_succeeded, "total": SMTP_PROVIDERS.len()},
                    "imap": {"results": imap_results, "succeeded": imap_succeeded, "total": IMAP_PROVIDERS.len()},
                    "success_rate": success_rate,
                    "rating": rate(success_rate),
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
    fn rating_bands() {
        assert_eq!(rate(1.0), "excellent");
        assert_eq!(rate(0.75), "good");
        assert_eq!(rate(0.5), "moderate");
        assert_eq!(rate(0.1), "poor");
    }
}
