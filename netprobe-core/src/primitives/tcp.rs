//! TCP connect probe (§4.2): classify failures as timeout, connection
//! failure, DNS resolution failure, or generic unreachability.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::errors::{ErrorCode, ProbeError};

/// Outcome of a single TCP connect attempt.
pub struct TcpProbeResult {
    pub connect_time_ms: f64,
}

/// Attempts a TCP connect to `(host, port)` bounded by `timeout_dur`.
pub async fn connect(
    host: &str,
    port: u16,
    timeout_dur: Duration,
) -> Result<TcpProbeResult, ProbeError> {
    let started = std::time::Instant::now();
    let addr = format!("{host}:{port}");

    let resolved = match timeout(timeout_dur, tokio::net::lookup_host(&addr)).await {
        Ok(Ok(mut addrs)) => addrs.next(),
        Ok(Err(_)) => None,
        Err(_) => {
            return Err(ProbeError::network(
                ErrorCode::Timeout,
                &crate::errors::ctx(&[("timeout", &timeout_dur.as_secs().to_string())]),
            ));
        }
    };

    let Some(socket_addr) = resolved else {
        return Err(ProbeError::network(
            ErrorCode::DnsResolution,
            &crate::errors::ctx(&[("target", host)]),
        ));
    };

    match timeout(timeout_dur, TcpStream::connect(socket_addr)).await {
        Ok(Ok(_stream)) => Ok(TcpProbeResult {
            connect_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        }),
        Ok(Err(_)) => Err(ProbeError::network(
            ErrorCode::ConnectionFailed,
            &crate::errors::ctx(&[("target", &addr)]),
        )),
        Err(_) => Err(ProbeError::network(
            ErrorCode::Timeout,
            &crate::errors::ctx(&[("timeout", &timeout_dur.as_secs().to_string())]),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connect_succeeds_against_loopback_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });
        let result = connect("127.0.0.1", port, Duration::from_secs(2)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn connect_fails_against_closed_port() {
        // Port 1 is reserved and should be closed/filtered on loopback.
        let result = connect("127.0.0.1", 1, Duration::from_millis(500)).await;
        assert!(result.is_err());
    }
}
