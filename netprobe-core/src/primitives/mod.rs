//! OS/process/network helpers probes compose to do their work (§4.2).

pub mod http;
pub mod oui;
pub mod platform;
pub mod process;
pub mod tcp;
pub mod tls;
pub mod udp;

pub use platform::Platform;

/// Guesses this host's local IP by UDP-connecting to a public address
/// and reading back the socket's local name. No packet is actually sent
/// for a UDP connect, so this works offline too, modulo routing tables.
pub fn local_ip_guess() -> std::io::Result<String> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0")?;
    socket.connect("8.8.8.8:80")?;
    Ok(socket.local_addr()?.ip().to_string())
}
