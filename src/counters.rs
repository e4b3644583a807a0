//! Transmission counters shared between the cycle task and the receive path.
//!
//! The cycle task records one attempt per reachable cycle and one miss per
//! unreachable cycle (once something has been sent). The receive task only
//! ever records responses. Counters are atomics so the two tasks never need
//! a lock.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time copy of the counters, used for summaries and logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    /// Cycles in which the collector was reachable and a send was attempted
    pub tx: u64,

    /// Inbound responses received
    pub rx: u64,

    /// Unreachable cycles after the first successful send
    pub missed_tx: u64,
}

impl std::fmt::Display for CounterSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.tx, self.rx, self.missed_tx)
    }
}

/// Monotonic tx/rx/missed-tx counters for the lifetime of the agent.
#[derive(Debug, Default)]
pub struct CounterSet {
    tx: AtomicU64,
    missed_tx: AtomicU64,
    rx: AtomicU64,
}

impl CounterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one scheduling cycle.
    ///
    /// A reachable cycle counts as a transmission. An unreachable cycle only
    /// counts as missed once at least one transmission has happened, so the
    /// unreachable cycles while the mesh is still forming are not reported.
    pub fn record_attempt(&self, reachable: bool) {
        if reachable {
            self.tx.fetch_add(1, Ordering::Relaxed);
        } else if self.tx.load(Ordering::Relaxed) > 0 {
            self.missed_tx.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record an inbound response. Safe to call from any task.
    pub fn record_response(&self) {
        self.rx.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tx_count(&self) -> u64 {
        self.tx.load(Ordering::Relaxed)
    }

    pub fn missed_tx_count(&self) -> u64 {
        self.missed_tx.load(Ordering::Relaxed)
    }

    pub fn rx_count(&self) -> u64 {
        self.rx.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            tx: self.tx_count(),
            rx: self.rx_count(),
            missed_tx: self.missed_tx_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_new_counters_are_zero() {
        let counters = CounterSet::new();
        assert_eq!(counters.snapshot(), CounterSnapshot::default());
    }

    #[test]
    fn test_reachable_attempt_increments_tx() {
        let counters = CounterSet::new();
        counters.record_attempt(true);
        counters.record_attempt(true);

        assert_eq!(counters.tx_count(), 2);
        assert_eq!(counters.missed_tx_count(), 0);
    }

    #[test]
    fn test_unreachable_before_first_send_not_missed() {
        let counters = CounterSet::new();
        counters.record_attempt(false);
        counters.record_attempt(false);

        assert_eq!(counters.tx_count(), 0);
        assert_eq!(counters.missed_tx_count(), 0);
    }

    #[test]
    fn test_unreachable_after_first_send_is_missed() {
        let counters = CounterSet::new();
        counters.record_attempt(false);
        counters.record_attempt(true);
        counters.record_attempt(false);
        counters.record_attempt(false);
        counters.record_attempt(true);

        assert_eq!(counters.tx_count(), 2);
        assert_eq!(counters.missed_tx_count(), 2);
    }

    #[test]
    fn test_responses_counted_independently() {
        let counters = CounterSet::new();
        counters.record_response();
        counters.record_response();

        assert_eq!(counters.rx_count(), 2);
        assert_eq!(counters.tx_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_responses() {
        let counters = Arc::new(CounterSet::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let counters = counters.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    counters.record_response();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(counters.rx_count(), 800);
    }

    #[test]
    fn test_snapshot_display_and_serialization() {
        let snapshot = CounterSnapshot {
            tx: 12,
            rx: 9,
            missed_tx: 3,
        };
        assert_eq!(format!("{}", snapshot), "12/9/3");

        let json = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(json, r#"{"tx":12,"rx":9,"missed_tx":3}"#);
    }
}
