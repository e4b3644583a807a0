//! Simulated energy counters for running the agent on a host.
//!
//! Real nodes read time-in-state counters from the radio and MCU. On a host
//! there is nothing to read, so on every flush this source apportions the
//! elapsed monotonic time to each power domain by fixed duty-cycle ratios.
//! The result is monotonic and realistic enough to exercise both report
//! formats end to end.

use tokio::time::Instant;

use crate::energy::{EnergyCounters, PowerDomain};

/// Counter resolution, matching a 32 kHz real-time timer.
pub const ENERGEST_SECOND: u64 = 32_768;

/// Share of elapsed time spent in each state, in parts per thousand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCycle {
    pub cpu: u64,
    pub lpm: u64,
    pub deep_lpm: u64,
    pub transmit: u64,
    pub listen: u64,
}

impl Default for DutyCycle {
    /// A lightly loaded node: mostly asleep, radio duty-cycled.
    fn default() -> Self {
        Self {
            cpu: 40,
            lpm: 760,
            deep_lpm: 200,
            transmit: 6,
            listen: 94,
        }
    }
}

impl DutyCycle {
    fn share(&self, domain: PowerDomain) -> u64 {
        match domain {
            PowerDomain::Cpu => self.cpu,
            PowerDomain::Lpm => self.lpm,
            PowerDomain::DeepLpm => self.deep_lpm,
            PowerDomain::Transmit => self.transmit,
            PowerDomain::Listen => self.listen,
        }
    }
}

/// Host-side stand-in for the hardware energy counters.
#[derive(Debug, Clone)]
pub struct SimulatedEnergest {
    started: Instant,
    duty: DutyCycle,
    total: u64,
}

impl SimulatedEnergest {
    pub fn new(duty: DutyCycle) -> Self {
        Self::starting_at(Instant::now(), duty)
    }

    pub fn starting_at(started: Instant, duty: DutyCycle) -> Self {
        Self {
            started,
            duty,
            total: 0,
        }
    }

    /// Bring the counters up to `now`. Never moves them backwards.
    pub fn flush_at(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.started);
        let ticks = (elapsed.as_micros() * ENERGEST_SECOND as u128 / 1_000_000) as u64;
        self.total = self.total.max(ticks);
    }
}

impl Default for SimulatedEnergest {
    fn default() -> Self {
        Self::new(DutyCycle::default())
    }
}

impl EnergyCounters for SimulatedEnergest {
    fn flush(&mut self) {
        self.flush_at(Instant::now());
    }

    fn time_in(&self, domain: PowerDomain) -> u64 {
        self.total * self.duty.share(domain) / 1000
    }

    fn total_time(&self) -> u64 {
        self.total
    }

    fn ticks_per_second(&self) -> u64 {
        ENERGEST_SECOND
    }
}
