//! UDP request/response primitive (§4.2), used by the NTP probes.

use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::errors::{ErrorCode, ProbeError};

/// Sends `payload` to `(host, port)` over UDP and waits for a single
/// reply, bounded by `timeout_dur`. Returns the reply bytes and the
/// measured round-trip time.
pub async fn request_response(
    host: &str,
    port: u16,
    payload: &[u8],
    timeout_dur: Duration,
) -> Result<(Vec<u8>, Duration), ProbeError> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .map_err(|_| ProbeError::system(ErrorCode::InvalidPlatform, &Default::default()))?;

    let addr = format!("{host}:{port}");
    let resolved = timeout(timeout_dur, tokio::net::lookup_host(&addr))
        .await
        .map_err(|_| {
            ProbeError::network(
                ErrorCode::Timeout,
                &crate::errors::ctx(&[("timeout", &timeout_dur.as_secs().to_string())]),
            )
        })?
        .ok()
        .and_then(|mut it| it.next())
        .ok_or_else(|| ProbeError::network(ErrorCode::DnsResolution, &crate::errors::ctx(&[("target", host)])))?;

    socket
        .connect(resolved)
        .await
        .map_err(|_| ProbeError::network(ErrorCode::ConnectionFailed, &crate::errors::ctx(&[("target", &addr)])))?;

    let started = std::time::Instant::now();
    socket
        .send(payload)
        .await
        .map_err(|_| ProbeError::network(ErrorCode::ConnectionFailed, &crate::errors::ctx(&[("target", &addr)])))?;

    let mut buf = vec![0u8; 512];
    let n = match timeout(timeout_dur, socket.recv(&mut buf)).await {
        Ok(Ok(n)) => n,
        Ok(Err(_)) => {
            return Err(ProbeError::network(
                ErrorCode::ConnectionFailed,
                &crate::errors::ctx(&[("target", &addr)]),
            ));
        }
        Err(_) => {
            return Err(ProbeError::network(
                ErrorCode::Timeout,
                &crate::errors::ctx(&[("timeout", &timeout_dur.as_secs().to_string())]),
            ));
        }
    };

    buf.truncate(n);
    Ok((buf, started.elapsed()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_roundtrip_over_loopback() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 16];
            if let Ok((n, peer)) = server.recv_from(&mut buf).await {
                let _ = server.send_to(&buf[..n], peer).await;
            }
        });

        let (reply, _elapsed) = request_response(
            "127.0.0.1",
            server_addr.port(),
            b"ping",
            Duration::from_secs(2),
        )
        .await
        .unwrap();
        assert_eq!(reply, b"ping");
    }

    #[tokio::test]
    async fn no_reply_times_out() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        // Server never replies; keep it alive for the test's duration.
        let _keep = server;
        let result = request_response("127.0.0.1", port, b"ping", Duration::from_millis(200)).await;
        assert!(result.is_err());
    }
}
