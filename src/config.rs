//! Configuration module for the mesh telemetry agent and collector.
//!
//! Settings are read from environment variables with defaults that match a
//! typical mesh deployment: a 10 second send interval with one second of
//! jitter, sensor readings to `fd80::1` and metrics to the mesh root at
//! `fd00::1`.

use std::env;
use std::net::{IpAddr, Ipv6Addr, SocketAddr, SocketAddrV6};
use std::str::FromStr;
use std::time::Duration;

use crate::energy::EnergyMode;
use crate::payload::DEFAULT_PAYLOAD_CAPACITY;

/// Default seconds between sends
const DEFAULT_SEND_INTERVAL_SECS: u64 = 10;

/// Default jitter unit in milliseconds
const DEFAULT_UNIT_TICK_MS: u64 = 1000;

/// Port the collectors listen on
const COLLECTOR_PORT: u16 = 5678;

/// Default sensor collector
const DEFAULT_SENSOR_COLLECTOR: SocketAddr = SocketAddr::V6(SocketAddrV6::new(
    Ipv6Addr::new(0xfd80, 0, 0, 0, 0, 0, 0, 1),
    COLLECTOR_PORT,
    0,
    0,
));

/// Default metrics collector
const DEFAULT_METRICS_COLLECTOR: SocketAddr = SocketAddr::V6(SocketAddrV6::new(
    DEFAULT_ROOT_ADDRESS,
    COLLECTOR_PORT,
    0,
    0,
));

/// Default local source/listen port
const DEFAULT_LOCAL_PORT: u16 = 8765;

/// Default mesh root address
const DEFAULT_ROOT_ADDRESS: Ipv6Addr = Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 1);

/// Default number of transmissions between summary log lines
const DEFAULT_SUMMARY_EVERY: u64 = 10;

const MIN_SEND_INTERVAL_SECS: u64 = 1;
const MAX_SEND_INTERVAL_SECS: u64 = 3600;

const MIN_PAYLOAD_CAPACITY: usize = 16;
const MAX_PAYLOAD_CAPACITY: usize = 1024;

/// Default collector bind address (all interfaces, collector port)
const DEFAULT_COLLECTOR_BIND: SocketAddr = SocketAddr::V6(SocketAddrV6::new(
    Ipv6Addr::UNSPECIFIED,
    COLLECTOR_PORT,
    0,
    0,
));

/// Configuration for the telemetry agent.
///
/// All settings can be configured via environment variables:
/// - `MESH_AGENT_SEND_INTERVAL_SECS`: Base send interval (default: 10)
/// - `MESH_AGENT_UNIT_TICK_MS`: Jitter unit (default: 1000)
/// - `MESH_AGENT_SENSOR_COLLECTOR`: Sensor reading destination (default: [fd80::1]:5678)
/// - `MESH_AGENT_METRICS_COLLECTOR`: Energy report destination (default: [fd00::1]:5678)
/// - `MESH_AGENT_LOCAL_PORT`: Local source/listen port (default: 8765)
/// - `MESH_AGENT_ROOT_ADDRESS`: Mesh root, or `none` (default: fd00::1)
/// - `MESH_AGENT_ENERGY_MODE`: `cumulative` or `delta` (default: cumulative)
/// - `MESH_AGENT_PAYLOAD_CAPACITY`: Payload byte limit (default: 63)
/// - `MESH_AGENT_SUMMARY_EVERY`: Transmissions between summaries (default: 10)
#[derive(Debug, Clone)]
pub struct Config {
    /// Base interval between wakes
    pub send_interval: Duration,

    /// Jitter unit; wakes land within one unit either side of the interval
    pub unit_tick: Duration,

    /// Destination for sensor readings
    pub sensor_collector: SocketAddr,

    /// Destination for energy reports
    pub metrics_collector: SocketAddr,

    /// Local port datagrams are sent from and responses arrive on
    pub local_port: u16,

    /// Mesh root address used by the static routing layer
    pub root_address: Option<IpAddr>,

    /// Energy report format
    pub energy_mode: EnergyMode,

    /// Maximum payload size in bytes
    pub payload_capacity: usize,

    /// Log a tx/rx/missed summary whenever tx_count is a multiple of this
    pub summary_every: u64,
}

/// Error type for configuration loading failures
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub env_var: Option<String>,
}

impl ConfigError {
    fn for_var(env_var: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            env_var: Some(env_var.to_string()),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.env_var {
            Some(var) => write!(f, "Configuration error for {}: {}", var, self.message),
            None => write!(f, "Configuration error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable does not parse or is out of range,
    /// if the unit tick is not shorter than the send interval, if both
    /// collectors are the same address, or if the local port collides with a
    /// destination port.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use mesh_telemetry_agent::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Metrics collector: {}", config.metrics_collector);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let send_interval_secs = parse_var(
            "MESH_AGENT_SEND_INTERVAL_SECS",
            DEFAULT_SEND_INTERVAL_SECS,
        )?;
        if !(MIN_SEND_INTERVAL_SECS..=MAX_SEND_INTERVAL_SECS).contains(&send_interval_secs) {
            return Err(ConfigError::for_var(
                "MESH_AGENT_SEND_INTERVAL_SECS",
                format!(
                    "send interval {} must be between {}s and {}s",
                    send_interval_secs, MIN_SEND_INTERVAL_SECS, MAX_SEND_INTERVAL_SECS
                ),
            ));
        }
        let send_interval = Duration::from_secs(send_interval_secs);

        let unit_tick_ms: u64 = parse_var("MESH_AGENT_UNIT_TICK_MS", DEFAULT_UNIT_TICK_MS)?;
        let unit_tick = Duration::from_millis(unit_tick_ms);
        if unit_tick_ms == 0 || unit_tick >= send_interval {
            return Err(ConfigError::for_var(
                "MESH_AGENT_UNIT_TICK_MS",
                format!(
                    "unit tick {}ms must be greater than 0 and below the send interval",
                    unit_tick_ms
                ),
            ));
        }

        let sensor_collector = parse_var(
            "MESH_AGENT_SENSOR_COLLECTOR",
            DEFAULT_SENSOR_COLLECTOR,
        )?;
        let metrics_collector = parse_var(
            "MESH_AGENT_METRICS_COLLECTOR",
            DEFAULT_METRICS_COLLECTOR,
        )?;
        if sensor_collector == metrics_collector {
            return Err(ConfigError::for_var(
                "MESH_AGENT_METRICS_COLLECTOR",
                format!(
                    "metrics collector must differ from sensor collector {}",
                    sensor_collector
                ),
            ));
        }

        let local_port: u16 = parse_var("MESH_AGENT_LOCAL_PORT", DEFAULT_LOCAL_PORT)?;
        if local_port == 0
            || local_port == sensor_collector.port()
            || local_port == metrics_collector.port()
        {
            return Err(ConfigError::for_var(
                "MESH_AGENT_LOCAL_PORT",
                format!(
                    "local port {} must be non-zero and differ from the collector ports",
                    local_port
                ),
            ));
        }

        let root_address = Self::parse_root_address()?;

        let energy_mode = parse_var("MESH_AGENT_ENERGY_MODE", EnergyMode::Cumulative)?;

        let payload_capacity =
            parse_var("MESH_AGENT_PAYLOAD_CAPACITY", DEFAULT_PAYLOAD_CAPACITY)?;
        if !(MIN_PAYLOAD_CAPACITY..=MAX_PAYLOAD_CAPACITY).contains(&payload_capacity) {
            return Err(ConfigError::for_var(
                "MESH_AGENT_PAYLOAD_CAPACITY",
                format!(
                    "payload capacity {} must be between {} and {} bytes",
                    payload_capacity, MIN_PAYLOAD_CAPACITY, MAX_PAYLOAD_CAPACITY
                ),
            ));
        }

        let summary_every = parse_var("MESH_AGENT_SUMMARY_EVERY", DEFAULT_SUMMARY_EVERY)?;
        if summary_every == 0 {
            return Err(ConfigError::for_var(
                "MESH_AGENT_SUMMARY_EVERY",
                "summary period must be greater than 0",
            ));
        }

        Ok(Self {
            send_interval,
            unit_tick,
            sensor_collector,
            metrics_collector,
            local_port,
            root_address,
            energy_mode,
            payload_capacity,
            summary_every,
        })
    }

    /// Parse the root address; `none` disables it.
    fn parse_root_address() -> Result<Option<IpAddr>, ConfigError> {
        let env_var = "MESH_AGENT_ROOT_ADDRESS";

        match env::var(env_var) {
            Ok(value) if value.trim().eq_ignore_ascii_case("none") => Ok(None),
            Ok(value) => value.trim().parse().map(Some).map_err(|_| {
                ConfigError::for_var(env_var, format!("'{}' is not a valid IP address", value))
            }),
            Err(_) => Ok(Some(IpAddr::V6(DEFAULT_ROOT_ADDRESS))),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            send_interval: Duration::from_secs(DEFAULT_SEND_INTERVAL_SECS),
            unit_tick: Duration::from_millis(DEFAULT_UNIT_TICK_MS),
            sensor_collector: DEFAULT_SENSOR_COLLECTOR,
            metrics_collector: DEFAULT_METRICS_COLLECTOR,
            local_port: DEFAULT_LOCAL_PORT,
            root_address: Some(IpAddr::V6(DEFAULT_ROOT_ADDRESS)),
            energy_mode: EnergyMode::Cumulative,
            payload_capacity: DEFAULT_PAYLOAD_CAPACITY,
            summary_every: DEFAULT_SUMMARY_EVERY,
        }
    }
}

/// Configuration for the collector sink.
///
/// - `MESH_COLLECTOR_BIND`: Listen address (default: [::]:5678)
/// - `MESH_COLLECTOR_REPLY`: Acknowledge each datagram (default: true)
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub bind: SocketAddr,
    pub reply: bool,
}

impl CollectorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind: parse_var("MESH_COLLECTOR_BIND", DEFAULT_COLLECTOR_BIND)?,
            reply: parse_var("MESH_COLLECTOR_REPLY", true)?,
        })
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_COLLECTOR_BIND,
            reply: true,
        }
    }
}

/// Read `env_var` and parse it, falling back to `default` when unset.
fn parse_var<T: FromStr>(env_var: &str, default: T) -> Result<T, ConfigError> {
    match env::var(env_var) {
        Ok(value) => value.trim().parse().map_err(|_| {
            ConfigError::for_var(env_var, format!("'{}' is not a valid value", value))
        }),
        Err(_) => Ok(default),
    }
}
