//! Mesh Telemetry Agent Library
//!
//! This library provides the components of a periodic telemetry agent for
//! battery-powered mesh nodes:
//!
//! - **config**: Environment-based configuration for the agent and collector
//! - **schedule**: Jittered wake scheduling as an explicit state machine
//! - **reachability**: Gate that permits sending only when the mesh root is reachable
//! - **sampler**: Synthetic temperature readings
//! - **energy**: Cumulative and delta energy accounting reports
//! - **energest**: Simulated energy counters for host runs
//! - **payload**: Fixed-capacity text payload encoding
//! - **counters**: Shared tx/rx/missed-tx counters
//! - **transport**: Best-effort UDP transport and response receiver
//! - **agent**: The agent task tying everything together
//! - **collector**: Sink that decodes agent datagrams into structured records
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mesh_telemetry_agent::agent::Agent;
//! use mesh_telemetry_agent::config::Config;
//! use mesh_telemetry_agent::counters::CounterSet;
//! use mesh_telemetry_agent::energest::SimulatedEnergest;
//! use mesh_telemetry_agent::reachability::StaticRouting;
//! use mesh_telemetry_agent::transport::{receive_responses, UdpTransport};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let transport = UdpTransport::bind_port(config.local_port)
//!         .await
//!         .expect("Failed to bind");
//!     let counters = Arc::new(CounterSet::new());
//!     tokio::spawn(receive_responses(transport.socket(), counters.clone()));
//!
//!     let agent = Agent::new(
//!         &config,
//!         StaticRouting::new(config.root_address),
//!         transport,
//!         SimulatedEnergest::default(),
//!         counters,
//!         StdRng::from_entropy(),
//!     )
//!     .expect("Failed to build agent");
//!     agent.run().await.ok();
//! }
//! ```

// Module declarations
pub mod agent;
pub mod collector;
pub mod config;
pub mod counters;
pub mod energest;
pub mod energy;
pub mod payload;
pub mod reachability;
pub mod sampler;
pub mod schedule;
pub mod transport;

// Re-export commonly used types at crate root for convenience
pub use agent::{Agent, AgentError, CycleOutcome};
pub use collector::{Collector, CollectorRecord, Reading};
pub use config::{CollectorConfig, Config, ConfigError};
pub use counters::{CounterSet, CounterSnapshot};
pub use energest::SimulatedEnergest;
pub use energy::{
    AccountingSnapshot, CumulativeAccountant, DeltaAccountant, EnergyAccountant, EnergyCounters,
    EnergyError, EnergyMode, EnergyReport, PowerDomain,
};
pub use payload::{Encoded, Payload, PayloadEncoder};
pub use reachability::{Reachability, ReachabilityGate, RoutingLayer, StaticRouting};
pub use sampler::TemperatureSampler;
pub use schedule::{JitterPolicy, Phase, ScheduleError, Scheduler};
pub use transport::{DatagramTransport, TransportError, UdpTransport};
