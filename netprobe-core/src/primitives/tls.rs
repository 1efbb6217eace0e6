//! TLS peek primitive (§4.2): connect, inspect the peer certificate, and
//! summarize it without validating the full HTTPS transaction.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rustls_pki_types::ServerName;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use x509_parser::prelude::*;

use crate::errors::{ErrorCode, ProbeError};

#[derive(Debug, Clone, Serialize)]
pub struct CertificateSummary {
    pub subject: String,
    pub issuer: String,
    pub serial: String,
    pub not_before: String,
    pub not_after: String,
    pub sans: Vec<String>,
    pub signature_algorithm: String,
    pub self_signed: bool,
    pub days_until_expiry: i64,
}

fn tls_config() -> Arc<rustls::ClientConfig> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let mut config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    // Enforce TLS 1.2+ (§4.2); rustls never negotiates below 1.2.
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Arc::new(config)
}

/// Opens a TLS session to `(host, port)` and summarizes the peer
/// certificate (§4.2).
pub async fn peek(host: &str, port: u16, timeout_dur: Duration) -> Result<CertificateSummary, ProbeError> {
    let addr = format!("{host}:{port}");
    let tcp = timeout(timeout_dur, TcpStream::connect(&addr))
        .await
        .map_err(|_| ProbeError::network(ErrorCode::Timeout, &crate::errors::ctx(&[("timeout", &timeout_dur.as_secs().to_string())])))?
        .map_err(|_| ProbeError::network(ErrorCode::ConnectionFailed, &crate::errors::ctx(&[("target", &addr)])))?;

    let connector = TlsConnector::from(tls_config());
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| ProbeError::input(ErrorCode::InvalidTarget, &crate::errors::ctx(&[("target", host)])))?;

    let tls_stream = timeout(timeout_dur, connector.connect(server_name, tcp))
        .await
        .map_err(|_| ProbeError::network(ErrorCode::Timeout, &crate::errors::ctx(&[("timeout", &timeout_dur.as_secs().to_string())])))?
        .map_err(|_| ProbeError::network(ErrorCode::ConnectionFailed, &crate::errors::ctx(&[("target", &addr)])))?;

    let (_, session) = tls_stream.into_inner();
    let certs = session
        .peer_certificates()
        .ok_or_else(|| ProbeError::execution(ErrorCode::ParsingError, &crate::errors::ctx(&[("tool", "check_ssl_certificate")])))?;
    let leaf = certs
        .first()
        .ok_or_else(|| ProbeError::execution(ErrorCode::ParsingError, &crate::errors::ctx(&[("tool", "check_ssl_certificate")])))?;

    let (_, cert) = X509Certificate::from_der(leaf.as_ref())
        .map_err(|_| ProbeError::execution(ErrorCode::ParsingError, &crate::errors::ctx(&[("tool", "check_ssl_certificate")])))?;

    let subject = cert.subject().to_string();
    let issuer = cert.issuer().to_string();
    let self_signed = subject == issuer;
    let not_before: DateTime<Utc> = cert.validity().not_before.to_datetime().into();
    let not_after: DateTime<Utc> = cert.validity().not_after.to_datetime().into();
    let days_until_expiry = (not_after - Utc::now()).num_days();
    let sans = cert
        .subject_alternative_name()
        .ok()
        .flatten()
        .map(|ext| {
            ext.value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(s) => Some(s.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(CertificateSummary {
        subject,
        issuer,
        serial: cert.raw_serial_as_string(),
        not_before: not_before.to_rfc3339(),
        not_after: not_after.to_rfc3339(),
        sans,
        signature_algorithm: cert.signature_algorithm.algorithm.to_id_string(),
        self_signed,
        days_until_expiry,
    })
}
