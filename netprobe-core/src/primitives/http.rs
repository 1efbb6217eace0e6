//! HTTP GET primitive (§4.2).

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::errors::{ErrorCode, ProbeError};

const DEFAULT_USER_AGENT: &str = "netprobe/0.1 (+diagnostic-probe-engine)";
const BODY_PREVIEW_BYTES: usize = 500;

/// Options for a single GET.
pub struct HttpGetOptions<'a> {
    pub timeout: Duration,
    pub follow_redirects: bool,
    pub verify_tls: bool,
    pub proxy: Option<&'a str>,
    pub user_agent: &'a str,
}

impl Default for HttpGetOptions<'_> {
    fn default() -> Self {
        Self {
            timeout: crate::config::constants::timeouts::WEB_REQUEST,
            follow_redirects: true,
            verify_tls: true,
            proxy: None,
            user_agent: DEFAULT_USER_AGENT,
        }
    }
}

/// Result of an HTTP GET, with the select headers and body preview §4.2
/// requires.
#[derive(Debug, Clone, Serialize)]
pub struct HttpGetResult {
    pub status: u16,
    pub final_url: String,
    pub redirect_count: u32,
    pub server: Option<String>,
    pub content_type: Option<String>,
    pub content_length: Option<String>,
    pub body_preview: String,
    pub elapsed_ms: f64,
}

/// Auto-prefixes a bare host with `https://` when no scheme is present
/// (`test_http_connectivity`'s documented behavior).
pub fn ensure_scheme(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

pub async fn get(url: &str, opts: &HttpGetOptions<'_>) -> Result<HttpGetResult, ProbeError> {
    let mut builder = reqwest::Client::builder()
        .timeout(opts.timeout)
        .danger_accept_invalid_certs(!opts.verify_tls)
        .user_agent(opts.user_agent);

    let redirect_count = Arc::new(AtomicU32::new(0));
    builder = if opts.follow_redirects {
        let counter = redirect_count.clone();
        builder.redirect(reqwest::redirect::Policy::custom(move |attempt| {
            counter.fetch_add(1, Ordering::Relaxed);
            if attempt.previous().len() >= 10 {
                attempt.error("too many redirects")
            } else {
                attempt.follow()
            }
        }))
    } else {
        builder.redirect(reqwest::redirect::Policy::none())
    };

    if let Some(proxy) = opts.proxy {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|_| ProbeError::configuration(ErrorCode::InvalidConfig, &crate::errors::ctx(&[("target", proxy)])))?;
        builder = builder.proxy(proxy);
    }

    let client = builder
        .build()
        .map_err(|_| ProbeError::execution(ErrorCode::UnexpectedError, &crate::errors::ctx(&[("tool", "http_get")])))?;

    let started = std::time::Instant::now();
    let response = client.get(url).send().await.map_err(|e| classify_reqwest_error(url, &e))?;

    let status = response.status().as_u16();
    let final_url = response.url().to_string();
    let redirect_count = redirect_count.load(Ordering::Relaxed);
    let server = response
        .headers()
        .get("server")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let content_length = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = response.text().await.unwrap_or_default();
    let body_preview: String = body.chars().take(BODY_PREVIEW_BYTES).collect();

    Ok(HttpGetResult {
        status,
        final_url,
        redirect_count,
        server,
        content_type,
        content_length,
        body_preview,
        elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
    })
}

/// Plain GET returning the full response body, untruncated. Used by
/// callers that persist the body (e.g. downloading the manuf database)
/// rather than merely previewing it.
pub async fn download(url: &str, timeout: Duration) -> Result<(u16, String), ProbeError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(DEFAULT_USER_AGENT)
        .build()
        .map_err(|_| ProbeError::execution(ErrorCode::UnexpectedError, &crate::errors::ctx(&[("tool", "http_download")])))?;
    let response = client.get(url).send().await.map_err(|e| classify_reqwest_error(url, &e))?;
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Ok((status, body))
}

fn classify_reqwest_error(url: &str, error: &reqwest::Error) -> ProbeError {
    if error.is_timeout() {
        ProbeError::network(ErrorCode::Timeout, &crate::errors::ctx(&[("timeout", "request")]))
    } else if error.is_connect() {
        ProbeError::network(ErrorCode::ConnectionFailed, &crate::errors::ctx(&[("target", url)]))
    } else {
        ProbeError::network(ErrorCode::Unreachable, &crate::errors::ctx(&[("target", url)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_scheme_adds_https() {
        assert_eq!(ensure_scheme("example.com"), "https://example.com");
        assert_eq!(ensure_scheme("http://example.com"), "http://example.com");
    }
}
