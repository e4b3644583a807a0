//! The telemetry agent: one task that wakes on a jittered schedule, checks
//! reachability, and sends a sensor reading and an energy report.
//!
//! The agent owns all of its state. Only the counter set is shared, with the
//! response receiver, and only through atomic increments.

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU64;
use std::sync::Arc;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::counters::CounterSet;
use crate::energy::{build_accountant, EnergyAccountant, EnergyCounters, EnergyReport};
use crate::payload::{Encoded, PayloadEncoder};
use crate::reachability::{Reachability, ReachabilityGate, RoutingLayer};
use crate::sampler::TemperatureSampler;
use crate::schedule::{JitterPolicy, ScheduleError, Scheduler};
use crate::transport::DatagramTransport;

/// Errors that stop the agent.
#[derive(Debug)]
pub enum AgentError {
    Schedule(ScheduleError),

    /// Summary cadence of zero transmissions
    InvalidSummaryCadence,
}

impl std::fmt::Display for AgentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentError::Schedule(e) => write!(f, "Scheduler error: {}", e),
            AgentError::InvalidSummaryCadence => {
                write!(f, "Summary cadence must be at least one transmission")
            }
        }
    }
}

impl std::error::Error for AgentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AgentError::Schedule(e) => Some(e),
            AgentError::InvalidSummaryCadence => None,
        }
    }
}

impl From<ScheduleError> for AgentError {
    fn from(err: ScheduleError) -> Self {
        AgentError::Schedule(err)
    }
}

/// What happened in one evaluated cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The collector was reachable and both payloads were handed to the transport.
    /// `energy` is `None` when the counters were inconsistent and the report was skipped.
    Sent {
        root: IpAddr,
        temperature: u32,
        energy: Option<EnergyReport>,
    },

    /// No route to the collector; `missed` tells whether it counted as a missed send.
    Unreachable { missed: bool },
}

/// The periodic telemetry agent.
pub struct Agent<R, T, E, G> {
    gate: ReachabilityGate<R>,
    transport: T,
    energest: E,
    accountant: Box<dyn EnergyAccountant>,
    sampler: TemperatureSampler,
    encoder: PayloadEncoder,
    counters: Arc<CounterSet>,
    scheduler: Scheduler,
    rng: G,
    sensor_collector: SocketAddr,
    metrics_collector: SocketAddr,
    summary_every: NonZeroU64,
}

impl<R, T, E, G> Agent<R, T, E, G>
where
    R: RoutingLayer,
    T: DatagramTransport,
    E: EnergyCounters,
    G: Rng + Send,
{
    /// Build an agent from its configuration and collaborators.
    ///
    /// The energy accountant is chosen here, once, from `config.energy_mode`,
    /// and the first wake is scheduled relative to now.
    pub fn new(
        config: &Config,
        routing: R,
        transport: T,
        mut energest: E,
        counters: Arc<CounterSet>,
        mut rng: G,
    ) -> Result<Self, AgentError> {
        let policy = JitterPolicy::new(config.send_interval, config.unit_tick)?;
        let summary_every =
            NonZeroU64::new(config.summary_every).ok_or(AgentError::InvalidSummaryCadence)?;
        let accountant = build_accountant(config.energy_mode, &mut energest);
        let scheduler = Scheduler::start(policy, Instant::now(), &mut rng);

        Ok(Self {
            gate: ReachabilityGate::new(routing),
            transport,
            energest,
            accountant,
            sampler: TemperatureSampler::new(),
            encoder: PayloadEncoder::new(config.payload_capacity),
            counters,
            scheduler,
            rng,
            sensor_collector: config.sensor_collector,
            metrics_collector: config.metrics_collector,
            summary_every,
        })
    }

    pub fn counters(&self) -> &Arc<CounterSet> {
        &self.counters
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Run forever: wait for the deadline, evaluate, re-arm.
    pub async fn run(mut self) -> Result<(), AgentError> {
        info!(
            energy_mode = %self.accountant.mode(),
            sensor_collector = %self.sensor_collector,
            metrics_collector = %self.metrics_collector,
            first_wake_ms = self
                .scheduler
                .deadline()
                .saturating_duration_since(Instant::now())
                .as_millis() as u64,
            "Agent started"
        );

        loop {
            time::sleep_until(self.scheduler.deadline()).await;
            self.scheduler.timer_expired()?;

            let outcome = self.run_cycle().await;
            debug!(cycle = self.scheduler.cycles(), outcome = ?outcome, "Cycle evaluated");

            self.scheduler.cycle_complete()?;
            let previous = self.scheduler.deadline();
            let next = self.scheduler.rearm(&mut self.rng)?;
            debug!(
                next_in_ms = (next - previous).as_millis() as u64,
                "Scheduler re-armed"
            );
        }
    }

    /// Evaluate one cycle: check reachability and, if reachable, send both payloads.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let root = match self.gate.check() {
            Reachability::Reachable(root) => root,
            Reachability::Unreachable => {
                info!("Not reachable yet");
                let missed = self.counters.tx_count() > 0;
                self.counters.record_attempt(false);
                return CycleOutcome::Unreachable { missed };
            }
        };

        let tx_count = self.counters.tx_count();
        if tx_count % self.summary_every.get() == 0 {
            let snapshot = self.counters.snapshot();
            info!(
                tx = snapshot.tx,
                rx = snapshot.rx,
                missed_tx = snapshot.missed_tx,
                "Tx/Rx/MissedTx: {}",
                snapshot
            );
        }

        let temperature = self.sampler.sample(&mut self.rng);
        info!(
            temperature = temperature,
            destination = %self.sensor_collector,
            "Sending data (temperature: {} °C)",
            temperature
        );
        let sensor = self.encoder.temperature(temperature);
        dispatch(&self.transport, &self.encoder, "sensor", sensor, self.sensor_collector).await;

        info!(
            tx = tx_count,
            destination = %self.metrics_collector,
            "Sending metric {}",
            tx_count
        );
        self.counters.record_attempt(true);

        let energy = match self.accountant.report(&mut self.energest) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(
                    error = %e,
                    energy_mode = %self.accountant.mode(),
                    "Skipping energy report"
                );
                None
            }
        };
        if let Some(report) = &energy {
            let encoded = self.encoder.energy(report);
            dispatch(&self.transport, &self.encoder, "energy", encoded, self.metrics_collector)
                .await;
        }

        CycleOutcome::Sent {
            root,
            temperature,
            energy,
        }
    }
}

/// Hand a payload to the transport. Truncation and send failures are logged;
/// neither stops the cycle.
async fn dispatch<T: DatagramTransport>(
    transport: &T,
    encoder: &PayloadEncoder,
    kind: &'static str,
    encoded: Encoded,
    destination: SocketAddr,
) {
    if encoded.is_truncated() {
        warn!(
            payload = kind,
            intended_len = encoded.intended_len,
            capacity = encoder.capacity(),
            "Payload truncated"
        );
    }

    if let Err(e) = transport.send(&encoded.payload, destination).await {
        warn!(
            payload = kind,
            destination = %destination,
            error = %e,
            "Send failed, datagram treated as undelivered"
        );
    }
}
