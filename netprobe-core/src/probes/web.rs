//! Web probes (§4.4 "Web").

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::batch::{run_batch, RetryPolicy};
use crate::config::constants::{timeouts, COMMON_SUBDOMAINS};
use crate::envelope::EnvelopeBuilder;
use crate::errors::{ErrorCode, ProbeError};
use crate::primitives::{http, tls};
use crate::probes::args::{bool_or, str_list, str_or, u16_or, u32_or};
use crate::registry::metadata::{Mode, ParamType, ParameterInfo, ToolCategory};
use crate::registry::{ToolFn, ToolFuture, ToolMetadata, ToolRegistry};

pub fn register(registry: &mut ToolRegistry) {
    register_test_http_connectivity(registry);
    register_check_ssl_certificate(registry);
    register_test_web_service_health(registry);
    register_check_multiple_endpoints(registry);
    register_check_website_accessibility(registry);
}

fn http_result_json(result: &http::HttpGetResult) -> Value {
    json!({
        "status_code": result.status,
        "final_url": result.final_url,
        "redirect_count": result.redirect_count,
        "server": result.server,
        "content_type": result.content_type,
        "content_length": result.content_length,
        "body_preview": result.body_preview,
        "response_time_ms": result.elapsed_ms,
    })
}

fn http_opts_from_args(args: &Value) -> http::HttpGetOptions<'static> {
    http::HttpGetOptions {
        timeout: Duration::from_secs(u32_or(args, "timeout", timeouts::WEB_REQUEST.as_secs() as u32) as u64),
        follow_redirects: bool_or(args, "follow_redirects", true),
        verify_tls: bool_or(args, "verify_tls", true),
        proxy: None,
        user_agent: "netprobe/0.1 (+diagnostic-probe-engine)",
    }
}

fn register_test_http_connectivity(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("test_http_connectivity", "test_http_connectivity")
        .description("HTTP/HTTPS GET a URL, auto-prefixing https:// when no scheme is given")
        .category(ToolCategory::Web)
        .param("url", ParameterInfo::required(ParamType::String, "URL or bare host"))
        .param("timeout", ParameterInfo::optional(ParamType::Integer, "request timeout seconds", json!(15)).with_range(1.0, 120.0))
        .param("follow_redirects", ParameterInfo::optional(ParamType::Boolean, "follow redirects", json!(true)))
        .param("verify_tls", ParameterInfo::optional(ParamType::Boolean, "verify TLS certificates", json!(true)))
        .build();
    let function: ToolFn = Arc::new(|args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let raw_url = str_or(&args, "url", "");
            let url = http::ensure_scheme(&raw_url);
            let builder = EnvelopeBuilder::new("test_http_connectivity").target(url.clone()).command(format!("GET {url}"));
            let opts = http_opts_from_args(&args);
            match http::get(&url, &opts).await {
                Ok(result) => builder.success(String::new(), String::new(), http_result_json(&result)),
                Err(error) => builder.failure(error, String::new(), String::new()),
            }
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

fn register_check_ssl_certificate(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("check_ssl_certificate", "check_ssl_certificate")
        .description("Open a TLS session and summarize the peer certificate")
        .category(ToolCategory::Web)
        .param("host", ParameterInfo::required(ParamType::String, "host to connect to"))
        .param("port", ParameterInfo::optional(ParamType::Integer, "TLS port", json!(443)).with_range(1.0, 65535.0))
        .build();
    let function: ToolFn = Arc::new(|args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let host = str_or(&args, "host", "");
            let port = u16_or(&args, "port", 443);
            let builder = EnvelopeBuilder::new("check_ssl_certificate")
                .target(format!("{host}:{port}"))
                .command(format!("tls-peek {host}:{port}"));
            match tls::peek(&host, port, timeouts::TLS_PEEK).await {
                Ok(summary) => builder.success(String::new(), String::new(), serde_json::to_value(&summary).unwrap_or_default()),
                Err(error) => builder.failure(error, String::new(), String::new()),
            }
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

fn register_test_web_service_health(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("test_web_service_health", "test_web_service_health")
        .description("GET a URL and compare the response status against an expected status")
        .category(ToolCategory::Web)
        .param("url", ParameterInfo::required(ParamType::String, "URL to check"))
        .param("expected_status", ParameterInfo::optional(ParamType::Integer, "expected HTTP status code", json!(200)).with_range(100.0, 599.0))
        .build();
    let function: ToolFn = Arc::new(|args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let raw_url = str_or(&args, "url", "");
            let url = http::ensure_scheme(&raw_url);
            let expected_status = u32_or(&args, "expected_status", 200) as u16;
            let builder = EnvelopeBuilder::new("test_web_service_health").target(url.clone()).command(format!("GET {url}"));
            let opts = http_opts_from_args(&args);
            match http::get(&url, &opts).await {
                Ok(result) => {
                    let healthy = result.status == expected_status;
                    let mut data = http_result_json(&result);
                    if let Value::Object(ref mut map) = data {
                        map.insert("expected_status".into(), json!(expected_status));
                        map.insert("healthy".into(), json!(healthy));
                    }
                    if healthy {
                        builder.success(String::new(), String::new(), data)
                    } else {
                        let mut envelope = builder.failure(
                            ProbeError::network(ErrorCode::Unreachable, &crate::errors::ctx(&[("target", &url)])),
                            String::new(),
                            String::new(),
                        );
                        envelope.parsed_data = data;
                        envelope
                    }
                }
                Err(error) => builder.failure(error, String::new(), String::new()),
            }
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

fn register_check_multiple_endpoints(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("check_multiple_endpoints", "check_multiple_endpoints")
        .description("Batch-check a list of URLs, averaging response time and summarizing failures")
        .category(ToolCategory::Web)
        .param("urls", ParameterInfo::required(ParamType::List { element: Box::new(ParamType::String) }, "URLs to check"))
        .build();
    let function: ToolFn = Arc::new(|args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let urls = str_list(&args, "urls").unwrap_or_default();
            let builder = EnvelopeBuilder::new("check_multiple_endpoints").command(format!("batch GET {} endpoints", urls.len()));

            let outcome = run_batch(
                urls.clone(),
                8,
                timeouts::WEB_REQUEST,
                RetryPolicy::none(),
                |_e: &ProbeError| false,
                || ProbeError::network(ErrorCode::Timeout, &crate::errors::ctx(&[("timeout", "web_request")])),
                |url: String| async move {
                    let target = http::ensure_scheme(&url);
                    http::get(&target, &http::HttpGetOptions::default())
                        .await
                        .map(|r| (url.clone(), r.status, r.elapsed_ms))
                },
            )
            .await;

            let total = urls.len();
            let succeeded = outcome.successes.len();
            let avg_response_ms = if succeeded == 0 {
                0.0
            } else {
                outcome.successes.iter().map(|(_, _, ms)| ms).sum::<f64>() / succeeded as f64
            };
            let results: Vec<Value> = outcome
                .successes
                .iter()
                .map(|(url, status, ms)| json!({"url": url, "success": true, "status_code": status, "response_time_ms": ms}))
                .collect();

            if succeeded == 0 && total > 0 {
                return builder.failure(
                    ProbeError::network(ErrorCode::Unreachable, &crate::errors::ctx(&[("target", "all endpoints")])),
                    String::new(),
                    "all endpoints failed".into(),
                );
            }

            builder.success(
                String::new(),
                String::new(),
                json!({
                    "results": results,
                    "total": total,
                    "succeeded": succeeded,
                    "failed": total - succeeded,
                    "average_response_time_ms": avg_response_ms,
                }),
            )
        })
    });
    registry.register(meta, Some(function)).expect("valid metadata");
}

fn register_check_website_accessibility(registry: &mut ToolRegistry) {
    let meta = ToolMetadata::builder("check_website_accessibility", "check_website_accessibility")
        .description("Composite check: HTTP, HTTPS, SSL certificate, and a fixed list of common subdomains")
        .category(ToolCategory::Web)
        .param("domain", ParameterInfo::required(ParamType::String, "bare domain, no scheme"))
        .build();
    let function: ToolFn = Arc::new(|args: Value, _mode: Mode| -> ToolFuture {
        Box::pin(async move {
            let domain = str_or(&args, "domain", "");
            let builder = EnvelopeBuilder::new("check_website_accessibility")
                .target(domain.clone())
                .command(format!("composite accessibility check for {domain}"));

            let opts = http::HttpGetOptions::default();
            let http_result = http::get(&format!("http://{domain}"), &opts).await;
            let https_result = http::get(&format!("https://{domain}"), &opts).await;
            let ssl_summary = tls::peek(&domain, 443, timeouts::TLS_PEEK).await;

            let mut subdomain_results = Vec::new();
            for sub in COMMON_SUBDOMAINS {
                let host = format!("{sub}.{domain}");
                let reachable = http::get(&format!("https://{host}"), &opts).await.is_ok();
                subdomain_results.push(json!({"subdomain": host, "reachable": reachable}));
            }

            let http_ok = http_result.is_ok();
            let https_ok = https_result.is_ok();

            builder.success(
                String::new(),
                String::new(),
                json!({
                    "domain": domain,
                    "http": http_result.as_ref().ok().map(http_result_json),
                    "http_reachable": http_ok,
                    "https": https_result.as_ref().ok().map(http_result_json),
                    "https_reachable": https_ok,
                    "ssl_certificate": ssl_summary.as_ref().ok(),
                    "subdomains": subdomain_results,
                    "overall_accessible": http_ok || https_ok,
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
    fn ensure_scheme_used_for_bare_host() {
        assert_eq!(http::ensure_scheme("example.com"), "https://example.com");
    }
}
