//! Mesh Collector - sink for mesh agent datagrams
//!
//! Listens on the collector port, decodes sensor readings and energy reports
//! into structured records, logs each one as a JSON line and acknowledges it.
//!
//! ## Configuration
//!
//! - `MESH_COLLECTOR_BIND`: Listen address (default: [::]:5678)
//! - `MESH_COLLECTOR_REPLY`: Acknowledge each datagram (default: true)
//! - `RUST_LOG`: Logging level filter (default: info)

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mesh_telemetry_agent::collector::Collector;
use mesh_telemetry_agent::config::CollectorConfig;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match CollectorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let collector = match Collector::bind(&config).await {
        Ok(collector) => collector,
        Err(e) => {
            error!(error = %e, "Failed to bind collector");
            std::process::exit(1);
        }
    };

    info!(bind = %config.bind, reply = config.reply, "Collector up and listening");

    tokio::select! {
        _ = collector.run() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
        }
    }

    info!("Collector stopped");
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
