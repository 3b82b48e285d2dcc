use crate::error::{WatchError, WatchResult};
use crate::models::DroneDetection;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use tracing::debug;

/// Sends one result datagram per processed image.
///
/// Each send opens a fresh ephemeral socket; nothing is acknowledged or retried.
#[derive(Debug, Clone)]
pub struct ResultSender {
    target: SocketAddr,
}

impl ResultSender {
    pub fn new(host: &str, port: u16) -> WatchResult<Self> {
        let target = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| WatchError::Config(format!("cannot resolve {}:{}", host, port)))?;
        Ok(Self { target })
    }

    pub fn from_addr(target: SocketAddr) -> Self {
        Self { target }
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// The datagram body: a JSON array of results
    pub fn encode(results: &[DroneDetection]) -> WatchResult<String> {
        Ok(serde_json::to_string(results)?)
    }

    /// Serialize `results` as a JSON array and send it; returns bytes sent
    pub fn send(&self, results: &[DroneDetection]) -> WatchResult<usize> {
        self.send_payload(&Self::encode(results)?)
    }

    pub fn send_payload(&self, payload: &str) -> WatchResult<usize> {
        let bind_addr: SocketAddr = match self.target {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(bind_addr)?;
        let sent = socket.send_to(payload.as_bytes(), self.target)?;

        debug!("Sent {} bytes to {}", sent, self.target);
        Ok(sent)
    }
}
