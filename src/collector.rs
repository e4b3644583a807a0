//! Collector sink for agent datagrams.
//!
//! The collector listens on the collector port, decodes each datagram into a
//! structured record and logs it as a JSON line. Sensor readings and both
//! energy report formats are recognised; anything else is kept as raw text.
//! When replies are enabled every datagram is acknowledged, which is what
//! drives the agents' rx counters.

use std::net::{IpAddr, SocketAddr};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::config::CollectorConfig;
use crate::transport::TransportError;

/// Largest datagram the collector reads.
const RECEIVE_BUFFER_SIZE: usize = 1024;

/// Acknowledgement body sent back to agents.
pub const ACK_PAYLOAD: &[u8] = b"ack";

/// A decoded agent payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reading {
    /// `temperature: <N> °C`
    Temperature { celsius: u32 },

    /// Seven comma-joined `<value>s` tokens
    Energy { values: Vec<u64> },

    /// Anything that matches neither format
    Raw { text: String },
}

/// Decode a datagram body.
pub fn parse_payload(bytes: &[u8]) -> Reading {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();

    if let Some(celsius) = trimmed
        .strip_prefix("temperature: ")
        .and_then(|rest| rest.strip_suffix(" °C"))
        .and_then(|value| value.parse().ok())
    {
        return Reading::Temperature { celsius };
    }

    let values: Option<Vec<u64>> = trimmed
        .split(',')
        .map(|token| token.strip_suffix('s').and_then(|v| v.parse().ok()))
        .collect();
    match values {
        Some(values) if values.len() == 7 => Reading::Energy { values },
        _ => Reading::Raw {
            text: trimmed.to_string(),
        },
    }
}

/// Short node identifier: the last segment of the sender's address.
pub fn node_id(addr: &IpAddr) -> String {
    match addr {
        IpAddr::V6(v6) => v6
            .to_string()
            .rsplit(':')
            .next()
            .unwrap_or_default()
            .to_string(),
        IpAddr::V4(v4) => v4.octets()[3].to_string(),
    }
}

/// One received datagram, as logged by the collector.
#[derive(Debug, Clone, Serialize)]
pub struct CollectorRecord {
    pub received_at: DateTime<Utc>,
    pub node_id: String,
    pub node_ip: IpAddr,
    pub reading: Reading,
}

impl CollectorRecord {
    pub fn new(sender: SocketAddr, bytes: &[u8]) -> Self {
        Self {
            received_at: Utc::now(),
            node_id: node_id(&sender.ip()),
            node_ip: sender.ip(),
            reading: parse_payload(bytes),
        }
    }
}

/// UDP collector sink.
pub struct Collector {
    socket: UdpSocket,
    reply: bool,
}

impl Collector {
    pub async fn bind(config: &CollectorConfig) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(config.bind)
            .await
            .map_err(|source| TransportError::Bind {
                addr: config.bind,
                source,
            })?;

        Ok(Self {
            socket,
            reply: config.reply,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive one datagram, log it and optionally acknowledge it.
    pub async fn receive_one(&self) -> std::io::Result<CollectorRecord> {
        let mut buf = [0u8; RECEIVE_BUFFER_SIZE];
        let (len, sender) = self.socket.recv_from(&mut buf).await?;
        let record = CollectorRecord::new(sender, &buf[..len]);

        match serde_json::to_string(&record) {
            Ok(json) => info!(record = %json, "Datagram received"),
            Err(e) => warn!(error = %e, node_ip = %record.node_ip, "Failed to encode record"),
        }

        if self.reply {
            if let Err(e) = self.socket.send_to(ACK_PAYLOAD, sender).await {
                warn!(error = %e, destination = %sender, "Failed to acknowledge datagram");
            } else {
                debug!(destination = %sender, "Acknowledged datagram");
            }
        }

        Ok(record)
    }

    /// Receive forever. Receive errors are logged and the loop continues.
    pub async fn run(self) {
        loop {
            if let Err(e) = self.receive_one().await {
                warn!(error = %e, "Failed to receive datagram");
            }
        }
    }
}
