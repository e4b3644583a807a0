//! Best-effort datagram transport.
//!
//! Sends are fire-and-forget: a successful return only means the datagram
//! was handed to the network stack. The same socket receives the collectors'
//! responses, which only bump the rx counter.

use std::net::{Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::counters::CounterSet;
use crate::payload::Payload;

/// Largest response the receiver will read.
const RECEIVE_BUFFER_SIZE: usize = 1024;

/// First pause after a failed receive, in milliseconds
const RECEIVE_BASE_DELAY_MS: u64 = 10;

/// Longest pause between failed receives, in milliseconds
const RECEIVE_MAX_DELAY_MS: u64 = 1000;

/// Errors that can occur in the transport.
#[derive(Debug)]
pub enum TransportError {
    /// Binding the local socket failed
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// The network stack refused the datagram
    Send {
        destination: SocketAddr,
        source: std::io::Error,
    },

    /// The datagram was only partially accepted
    ShortWrite {
        destination: SocketAddr,
        written: usize,
        expected: usize,
    },
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Bind { addr, source } => {
                write!(f, "Failed to bind {}: {}", addr, source)
            }
            TransportError::Send {
                destination,
                source,
            } => write!(f, "Failed to send to {}: {}", destination, source),
            TransportError::ShortWrite {
                destination,
                written,
                expected,
            } => write!(
                f,
                "Short write to {}: {} of {} bytes",
                destination, written, expected
            ),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Bind { source, .. } | TransportError::Send { source, .. } => {
                Some(source)
            }
            TransportError::ShortWrite { .. } => None,
        }
    }
}

/// The interface the agent needs from the datagram transport.
#[async_trait]
pub trait DatagramTransport: Send + Sync {
    /// Hand `payload` to the network for `destination`.
    async fn send(&self, payload: &Payload, destination: SocketAddr) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: DatagramTransport + ?Sized> DatagramTransport for Arc<T> {
    async fn send(&self, payload: &Payload, destination: SocketAddr) -> Result<(), TransportError> {
        (**self).send(payload, destination).await
    }
}

/// UDP transport bound to the agent's local port.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind the IPv6 unspecified address on `port`.
    pub async fn bind_port(port: u16) -> Result<Self, TransportError> {
        Self::bind(SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), port)).await
    }

    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;

        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Shared handle to the socket, for the response receiver.
    pub fn socket(&self) -> Arc<UdpSocket> {
        self.socket.clone()
    }
}

#[async_trait]
impl DatagramTransport for UdpTransport {
    async fn send(&self, payload: &Payload, destination: SocketAddr) -> Result<(), TransportError> {
        let written = self
            .socket
            .send_to(payload.as_bytes(), destination)
            .await
            .map_err(|source| TransportError::Send {
                destination,
                source,
            })?;

        if written != payload.len() {
            return Err(TransportError::ShortWrite {
                destination,
                written,
                expected: payload.len(),
            });
        }

        debug!(bytes = written, destination = %destination, "Datagram sent");
        Ok(())
    }
}

/// Receive responses on `socket` forever, counting each one.
///
/// Receive errors are logged and the loop continues after a backoff that
/// grows with each consecutive failure.
pub async fn receive_responses(socket: Arc<UdpSocket>, counters: Arc<CounterSet>) {
    let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];
    let mut consecutive_errors: u32 = 0;

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, sender)) => {
                info!(
                    response = %String::from_utf8_lossy(&buf[..len]),
                    from = %sender,
                    "Received response"
                );
                counters.record_response();
                consecutive_errors = 0;
            }
            Err(e) => {
                consecutive_errors = consecutive_errors.saturating_add(1);
                let delay = receive_backoff(consecutive_errors);
                warn!(
                    error = %e,
                    consecutive_errors = consecutive_errors,
                    delay_ms = delay.as_millis() as u64,
                    "Failed to receive response"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Pause after the `consecutive_errors`-th failed receive in a row:
/// `base * 2^(n - 1)`, capped at the maximum.
fn receive_backoff(consecutive_errors: u32) -> Duration {
    let exponent = consecutive_errors.saturating_sub(1).min(10);
    let delay = RECEIVE_BASE_DELAY_MS.saturating_mul(1 << exponent);
    Duration::from_millis(delay.min(RECEIVE_MAX_DELAY_MS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::PayloadEncoder;
    use std::net::Ipv4Addr;

    async fn loopback_transport() -> UdpTransport {
        UdpTransport::bind(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_send_delivers_payload_bytes() {
        let transport = loopback_transport().await;
        let receiver = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let destination = receiver.local_addr().unwrap();

        let encoded = PayloadEncoder::default().temperature(23);
        transport.send(&encoded.payload, destination).await.unwrap();

        let mut buf = [0u8; 64];
        let (len, from) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], "temperature: 23 °C".as_bytes());
        assert_eq!(from, transport.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_receiver_counts_responses() {
        let transport = loopback_transport().await;
        let counters = Arc::new(CounterSet::new());
        let handle = tokio::spawn(receive_responses(transport.socket(), counters.clone()));

        let peer = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let agent_addr = transport.local_addr().unwrap();
        peer.send_to(b"ack", agent_addr).await.unwrap();
        peer.send_to(b"ack", agent_addr).await.unwrap();

        for _ in 0..50 {
            if counters.rx_count() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(counters.rx_count(), 2);

        handle.abort();
    }

    #[tokio::test]
    async fn test_bind_conflict_reports_address() {
        let first = loopback_transport().await;
        let addr = first.local_addr().unwrap();

        let err = UdpTransport::bind(addr).await.unwrap_err();
        assert!(matches!(err, TransportError::Bind { .. }));
        assert!(format!("{}", err).contains(&addr.to_string()));
    }

    #[test]
    fn test_receive_backoff_grows_and_caps() {
        assert_eq!(receive_backoff(1), Duration::from_millis(10));
        assert_eq!(receive_backoff(2), Duration::from_millis(20));
        assert_eq!(receive_backoff(4), Duration::from_millis(80));
        assert_eq!(receive_backoff(8), Duration::from_millis(1000));
        assert_eq!(receive_backoff(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn test_receive_backoff_never_zero() {
        assert!(receive_backoff(0) > Duration::ZERO);
    }
}
