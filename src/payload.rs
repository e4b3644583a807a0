//! Fixed-capacity text payloads.
//!
//! Payloads are rendered into a buffer with a hard byte limit. Content past
//! the limit is dropped, and the encoder reports how long the text would have
//! been so the caller can tell that truncation happened.

use std::fmt::{self, Write};

use crate::energy::EnergyReport;

/// Default payload capacity in bytes.
pub const DEFAULT_PAYLOAD_CAPACITY: usize = 63;

/// An immutable datagram body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    bytes: Vec<u8>,
}

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Result of rendering a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub payload: Payload,

    /// Length the full text would have had without the capacity limit
    pub intended_len: usize,
}

impl Encoded {
    pub fn is_truncated(&self) -> bool {
        self.intended_len > self.payload.len()
    }
}

/// Renders sensor and energy payloads within a byte capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadEncoder {
    capacity: usize,
}

impl PayloadEncoder {
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Render arbitrary formatted text.
    pub fn encode(&self, args: fmt::Arguments<'_>) -> Encoded {
        let mut writer = BoundedWriter {
            buf: Vec::with_capacity(self.capacity),
            capacity: self.capacity,
            intended: 0,
        };
        // BoundedWriter never returns an error
        let _ = writer.write_fmt(args);

        Encoded {
            payload: Payload { bytes: writer.buf },
            intended_len: writer.intended,
        }
    }

    /// `temperature: <N> °C`
    pub fn temperature(&self, celsius: u32) -> Encoded {
        self.encode(format_args!("temperature: {} °C", celsius))
    }

    /// The comma-joined token list of an energy report.
    pub fn energy(&self, report: &EnergyReport) -> Encoded {
        self.encode(format_args!("{}", report))
    }
}

impl Default for PayloadEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_PAYLOAD_CAPACITY)
    }
}

struct BoundedWriter {
    buf: Vec<u8>,
    capacity: usize,
    intended: usize,
}

impl Write for BoundedWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.intended += s.len();
        let room = self.capacity.saturating_sub(self.buf.len());
        let take = room.min(s.len());
        self.buf.extend_from_slice(&s.as_bytes()[..take]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy::EnergyMode;

    #[test]
    fn test_temperature_payload() {
        let encoded = PayloadEncoder::default().temperature(24);

        assert_eq!(encoded.payload.as_bytes(), "temperature: 24 °C".as_bytes());
        assert!(!encoded.is_truncated());
        // the degree sign is two bytes in UTF-8
        assert_eq!(encoded.payload.len(), 19);
    }

    #[test]
    fn test_energy_payload() {
        let report = EnergyReport {
            mode: EnergyMode::Cumulative,
            values: [120, 300, 0, 600, 50, 10, 540],
        };
        let encoded = PayloadEncoder::default().energy(&report);

        assert_eq!(encoded.payload.as_bytes(), b"120s,300s,0s,600s,50s,10s,540s");
        assert!(!encoded.is_truncated());
    }

    #[test]
    fn test_truncation_is_flagged() {
        let encoder = PayloadEncoder::new(16);
        let encoded = encoder.temperature(27);

        assert!(encoded.is_truncated());
        assert_eq!(encoded.payload.len(), 16);
        assert_eq!(encoded.intended_len, 19);
        assert_eq!(encoded.payload.as_bytes(), b"temperature: 27 ");
    }

    #[test]
    fn test_long_energy_report_truncated_at_capacity() {
        let report = EnergyReport {
            mode: EnergyMode::Delta,
            values: [u64::MAX; 7],
        };
        let encoded = PayloadEncoder::default().energy(&report);

        assert!(encoded.is_truncated());
        assert_eq!(encoded.payload.len(), DEFAULT_PAYLOAD_CAPACITY);
        assert_eq!(encoded.intended_len, 7 * 21 + 6);
    }

    #[test]
    fn test_exact_fit_is_not_truncated() {
        let encoder = PayloadEncoder::new(5);
        let encoded = encoder.encode(format_args!("{}", "hello"));

        assert!(!encoded.is_truncated());
        assert_eq!(encoded.payload.as_ref(), b"hello");
    }

    #[test]
    fn test_zero_capacity() {
        let encoded = PayloadEncoder::new(0).temperature(21);

        assert!(encoded.payload.is_empty());
        assert!(encoded.is_truncated());
    }
}
