//! Mesh Agent - periodic telemetry sender for mesh nodes
//!
//! On a jittered interval the agent checks whether the mesh root is
//! reachable and, if so, sends a synthetic temperature reading to the sensor
//! collector and an energy accounting report to the metrics collector.
//! Responses arriving on the local port are counted.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `MESH_AGENT_SEND_INTERVAL_SECS`: Base send interval (default: 10)
//! - `MESH_AGENT_UNIT_TICK_MS`: Jitter unit (default: 1000)
//! - `MESH_AGENT_SENSOR_COLLECTOR`: Sensor reading destination (default: [fd80::1]:5678)
//! - `MESH_AGENT_METRICS_COLLECTOR`: Energy report destination (default: [fd00::1]:5678)
//! - `MESH_AGENT_LOCAL_PORT`: Local port (default: 8765)
//! - `MESH_AGENT_ROOT_ADDRESS`: Mesh root, or `none` (default: fd00::1)
//! - `MESH_AGENT_ENERGY_MODE`: `cumulative` or `delta` (default: cumulative)
//! - `MESH_AGENT_PAYLOAD_CAPACITY`: Payload byte capacity, 16..=1024 (default: 63)
//! - `MESH_AGENT_SUMMARY_EVERY`: Summary log cadence in sends (default: 10)
//! - `RUST_LOG`: Logging level filter (default: info)

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mesh_telemetry_agent::agent::Agent;
use mesh_telemetry_agent::config::Config;
use mesh_telemetry_agent::counters::CounterSet;
use mesh_telemetry_agent::energest::SimulatedEnergest;
use mesh_telemetry_agent::reachability::StaticRouting;
use mesh_telemetry_agent::transport::{receive_responses, UdpTransport};

#[tokio::main]
async fn main() {
    init_tracing();

    info!("Starting mesh agent...");

    let config = match Config::from_env() {
        Ok(config) => {
            info!(
                send_interval_secs = config.send_interval.as_secs(),
                unit_tick_ms = config.unit_tick.as_millis() as u64,
                sensor_collector = %config.sensor_collector,
                metrics_collector = %config.metrics_collector,
                local_port = config.local_port,
                energy_mode = %config.energy_mode,
                "Configuration loaded"
            );
            config
        }
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let transport = match UdpTransport::bind_port(config.local_port).await {
        Ok(transport) => transport,
        Err(e) => {
            error!(error = %e, "Failed to bind transport");
            std::process::exit(1);
        }
    };

    let counters = Arc::new(CounterSet::new());

    // Responses are counted independently of the send cycle
    let receiver_handle = tokio::spawn(receive_responses(transport.socket(), counters.clone()));

    let agent = match Agent::new(
        &config,
        StaticRouting::new(config.root_address),
        transport,
        SimulatedEnergest::default(),
        counters.clone(),
        StdRng::from_entropy(),
    ) {
        Ok(agent) => agent,
        Err(e) => {
            error!(error = %e, "Failed to build agent");
            std::process::exit(1);
        }
    };

    let agent_handle = tokio::spawn(agent.run());

    info!("Mesh agent running. Press Ctrl+C to stop.");
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Shutdown signal received, stopping..."),
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
        }
        joined = agent_handle => {
            match joined {
                Ok(Ok(())) => info!("Agent stopped"),
                Ok(Err(e)) => error!(error = %e, "Agent stopped with error"),
                Err(e) => error!(error = %e, "Agent task panicked"),
            }
        }
    }

    receiver_handle.abort();

    let summary = counters.snapshot();
    info!(
        tx = summary.tx,
        rx = summary.rx,
        missed_tx = summary.missed_tx,
        "Mesh agent stopped"
    );
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}
