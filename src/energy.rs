//! Energy accounting reports.
//!
//! Hardware keeps cumulative time-in-state counters for each power domain.
//! The agent turns them into one of two seven-field reports, chosen once when
//! the agent is built:
//!
//! - **cumulative**: whole seconds since boot, in the order
//!   `CPU,LPM,DEEP_LPM,Total,Radio_LISTEN,Radio_TRANSMIT,Radio_OFF`
//! - **delta**: ticks spent in each state since the previous report, in the
//!   order `Total,CPU,LPM,DEEP_LPM,Radio_Tx,Radio_Rx,Radio_total`
//!
//! Every field is rendered as `<value>s` and the fields are comma-joined.

use serde::{Deserialize, Serialize};

/// Power domains tracked by the hardware energy counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerDomain {
    Cpu,
    Lpm,
    DeepLpm,
    Transmit,
    Listen,
}

impl PowerDomain {
    pub fn all() -> &'static [PowerDomain] {
        &[
            PowerDomain::Cpu,
            PowerDomain::Lpm,
            PowerDomain::DeepLpm,
            PowerDomain::Transmit,
            PowerDomain::Listen,
        ]
    }
}

impl std::fmt::Display for PowerDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerDomain::Cpu => write!(f, "cpu"),
            PowerDomain::Lpm => write!(f, "lpm"),
            PowerDomain::DeepLpm => write!(f, "deep_lpm"),
            PowerDomain::Transmit => write!(f, "transmit"),
            PowerDomain::Listen => write!(f, "listen"),
        }
    }
}

/// The interface the agent needs from the hardware energy counters.
///
/// Counter values are in ticks and never decrease while the node is up.
pub trait EnergyCounters: Send {
    /// Finalize the current accounting interval so reads include it.
    fn flush(&mut self);

    /// Accumulated ticks spent in `domain`.
    fn time_in(&self, domain: PowerDomain) -> u64;

    /// Accumulated ticks since the counters started.
    fn total_time(&self) -> u64;

    /// Counter resolution.
    fn ticks_per_second(&self) -> u64;
}

/// One reading of all six energy counters, in ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingSnapshot {
    pub total: u64,
    pub cpu: u64,
    pub lpm: u64,
    pub deep_lpm: u64,
    pub transmit: u64,
    pub listen: u64,
}

impl AccountingSnapshot {
    /// Flush the counters and read every field.
    pub fn capture(counters: &mut dyn EnergyCounters) -> Self {
        counters.flush();
        Self {
            total: counters.total_time(),
            cpu: counters.time_in(PowerDomain::Cpu),
            lpm: counters.time_in(PowerDomain::Lpm),
            deep_lpm: counters.time_in(PowerDomain::DeepLpm),
            transmit: counters.time_in(PowerDomain::Transmit),
            listen: counters.time_in(PowerDomain::Listen),
        }
    }
}

/// Which report format the agent emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyMode {
    Cumulative,
    Delta,
}

impl std::fmt::Display for EnergyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnergyMode::Cumulative => write!(f, "cumulative"),
            EnergyMode::Delta => write!(f, "delta"),
        }
    }
}

impl std::str::FromStr for EnergyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cumulative" => Ok(EnergyMode::Cumulative),
            "delta" => Ok(EnergyMode::Delta),
            other => Err(format!("unknown energy mode '{}'", other)),
        }
    }
}

/// Data-quality anomalies in the energy counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnergyError {
    /// A counter went backwards between two reports (wraparound or reset)
    CounterRegression {
        field: &'static str,
        last: u64,
        current: u64,
    },

    /// Radio transmit plus listen time exceeds the total time
    RadioExceedsTotal {
        total: u64,
        transmit: u64,
        listen: u64,
    },
}

impl std::fmt::Display for EnergyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnergyError::CounterRegression {
                field,
                last,
                current,
            } => write!(
                f,
                "energy counter '{}' regressed from {} to {}",
                field, last, current
            ),
            EnergyError::RadioExceedsTotal {
                total,
                transmit,
                listen,
            } => write!(
                f,
                "radio time (transmit {} + listen {}) exceeds total time {}",
                transmit, listen, total
            ),
        }
    }
}

impl std::error::Error for EnergyError {}

/// A formatted seven-field energy report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnergyReport {
    pub mode: EnergyMode,
    pub values: [u64; 7],
}

impl std::fmt::Display for EnergyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}s", value)?;
        }
        Ok(())
    }
}

/// Produces an energy report each cycle.
pub trait EnergyAccountant: Send {
    fn mode(&self) -> EnergyMode;

    /// Flush and read the counters, then build this cycle's report.
    fn report(&mut self, counters: &mut dyn EnergyCounters) -> Result<EnergyReport, EnergyError>;
}

/// Reports cumulative whole seconds per state since boot. Keeps no history.
#[derive(Debug, Clone, Copy, Default)]
pub struct CumulativeAccountant;

impl CumulativeAccountant {
    pub fn new() -> Self {
        Self
    }

    /// Build a report from an already captured snapshot.
    pub fn format(
        snapshot: &AccountingSnapshot,
        ticks_per_second: u64,
    ) -> Result<EnergyReport, EnergyError> {
        let radio_off = snapshot
            .total
            .checked_sub(snapshot.transmit)
            .and_then(|rest| rest.checked_sub(snapshot.listen))
            .ok_or(EnergyError::RadioExceedsTotal {
                total: snapshot.total,
                transmit: snapshot.transmit,
                listen: snapshot.listen,
            })?;

        let seconds = |ticks: u64| ticks / ticks_per_second.max(1);

        Ok(EnergyReport {
            mode: EnergyMode::Cumulative,
            values: [
                seconds(snapshot.cpu),
                seconds(snapshot.lpm),
                seconds(snapshot.deep_lpm),
                seconds(snapshot.total),
                seconds(snapshot.listen),
                seconds(snapshot.transmit),
                seconds(radio_off),
            ],
        })
    }
}

impl EnergyAccountant for CumulativeAccountant {
    fn mode(&self) -> EnergyMode {
        EnergyMode::Cumulative
    }

    fn report(&mut self, counters: &mut dyn EnergyCounters) -> Result<EnergyReport, EnergyError> {
        let snapshot = AccountingSnapshot::capture(counters);
        Self::format(&snapshot, counters.ticks_per_second())
    }
}

/// Reports ticks spent in each state since the previous report.
#[derive(Debug, Clone, Default)]
pub struct DeltaAccountant {
    last: AccountingSnapshot,
}

impl DeltaAccountant {
    /// Start from an all-zero baseline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an explicit baseline.
    pub fn with_baseline(last: AccountingSnapshot) -> Self {
        Self { last }
    }

    /// Start from the counters' current values, so the first report covers
    /// only the time since the agent started.
    pub fn primed(counters: &mut dyn EnergyCounters) -> Self {
        Self::with_baseline(AccountingSnapshot::capture(counters))
    }

    pub fn last(&self) -> &AccountingSnapshot {
        &self.last
    }

    /// Compute the report for `curr` and advance the baseline to it.
    ///
    /// The baseline moves even when a counter regressed, so a single reset
    /// only costs one report.
    pub fn advance(&mut self, curr: AccountingSnapshot) -> Result<EnergyReport, EnergyError> {
        let last = std::mem::replace(&mut self.last, curr);

        let delta = |field: &'static str, last: u64, current: u64| {
            current
                .checked_sub(last)
                .ok_or(EnergyError::CounterRegression {
                    field,
                    last,
                    current,
                })
        };

        let elapsed = delta("total", last.total, curr.total)?.max(1);
        let cpu = delta("cpu", last.cpu, curr.cpu)?;
        let lpm = delta("lpm", last.lpm, curr.lpm)?;
        let deep_lpm = delta("deep_lpm", last.deep_lpm, curr.deep_lpm)?;
        let transmit = delta("transmit", last.transmit, curr.transmit)?;
        let listen = delta("listen", last.listen, curr.listen)?;

        Ok(EnergyReport {
            mode: EnergyMode::Delta,
            values: [
                elapsed,
                cpu,
                lpm,
                deep_lpm,
                transmit,
                listen,
                transmit.saturating_add(listen),
            ],
        })
    }
}

impl EnergyAccountant for DeltaAccountant {
    fn mode(&self) -> EnergyMode {
        EnergyMode::Delta
    }

    fn report(&mut self, counters: &mut dyn EnergyCounters) -> Result<EnergyReport, EnergyError> {
        let curr = AccountingSnapshot::capture(counters);
        self.advance(curr)
    }
}

/// Build the accountant for `mode`. Delta mode takes its baseline from the
/// live counters.
pub fn build_accountant(
    mode: EnergyMode,
    counters: &mut dyn EnergyCounters,
) -> Box<dyn EnergyAccountant> {
    match mode {
        EnergyMode::Cumulative => Box::new(CumulativeAccountant::new()),
        EnergyMode::Delta => Box::new(DeltaAccountant::primed(counters)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counters whose values are set directly by the test.
    struct FixedCounters {
        snapshot: AccountingSnapshot,
        ticks_per_second: u64,
        flushes: u32,
    }

    impl FixedCounters {
        fn new(snapshot: AccountingSnapshot, ticks_per_second: u64) -> Self {
            Self {
                snapshot,
                ticks_per_second,
                flushes: 0,
            }
        }
    }

    impl EnergyCounters for FixedCounters {
        fn flush(&mut self) {
            self.flushes += 1;
        }

        fn time_in(&self, domain: PowerDomain) -> u64 {
            match domain {
                PowerDomain::Cpu => self.snapshot.cpu,
                PowerDomain::Lpm => self.snapshot.lpm,
                PowerDomain::DeepLpm => self.snapshot.deep_lpm,
                PowerDomain::Transmit => self.snapshot.transmit,
                PowerDomain::Listen => self.snapshot.listen,
            }
        }

        fn total_time(&self) -> u64 {
            self.snapshot.total
        }

        fn ticks_per_second(&self) -> u64 {
            self.ticks_per_second
        }
    }

    fn sample_snapshot() -> AccountingSnapshot {
        AccountingSnapshot {
            total: 600,
            cpu: 120,
            lpm: 300,
            deep_lpm: 0,
            transmit: 10,
            listen: 50,
        }
    }

    #[test]
    fn test_cumulative_report_format() {
        let mut counters = FixedCounters::new(sample_snapshot(), 1);
        let mut accountant = CumulativeAccountant::new();

        let report = accountant.report(&mut counters).unwrap();
        assert_eq!(report.to_string(), "120s,300s,0s,600s,50s,10s,540s");
        assert_eq!(report.mode, EnergyMode::Cumulative);
        assert_eq!(counters.flushes, 1);
    }

    #[test]
    fn test_cumulative_truncates_to_whole_seconds() {
        let snapshot = AccountingSnapshot {
            total: 32768 * 10 + 32767,
            cpu: 32768 + 100,
            lpm: 32767,
            deep_lpm: 0,
            transmit: 32768 * 2,
            listen: 32768 * 3 + 5,
        };

        let report = CumulativeAccountant::format(&snapshot, 32768).unwrap();
        // radio off = 360447 - 65536 - 98309 = 196602 ticks = 5.99s
        assert_eq!(report.to_string(), "1s,0s,0s,10s,3s,2s,5s");
    }

    #[test]
    fn test_cumulative_radio_exceeding_total_is_anomaly() {
        let snapshot = AccountingSnapshot {
            total: 10,
            transmit: 8,
            listen: 5,
            ..AccountingSnapshot::default()
        };

        let err = CumulativeAccountant::format(&snapshot, 1).unwrap_err();
        assert!(matches!(err, EnergyError::RadioExceedsTotal { total: 10, .. }));
    }

    #[test]
    fn test_delta_report_format() {
        let mut accountant = DeltaAccountant::with_baseline(sample_snapshot());
        let curr = AccountingSnapshot {
            total: 650,
            cpu: 135,
            lpm: 320,
            deep_lpm: 0,
            transmit: 13,
            listen: 52,
        };

        let report = accountant.advance(curr).unwrap();
        assert_eq!(report.to_string(), "50s,15s,20s,0s,3s,2s,5s");
        assert!(report.to_string().starts_with("50s,"));
        assert_eq!(accountant.last(), &curr);
    }

    #[test]
    fn test_delta_elapsed_has_floor_of_one() {
        let mut accountant = DeltaAccountant::with_baseline(sample_snapshot());

        let report = accountant.advance(sample_snapshot()).unwrap();
        assert_eq!(report.to_string(), "1s,0s,0s,0s,0s,0s,0s");
    }

    #[test]
    fn test_delta_regression_is_anomaly_and_baseline_advances() {
        let mut accountant = DeltaAccountant::with_baseline(sample_snapshot());
        let regressed = AccountingSnapshot {
            cpu: 100,
            total: 700,
            ..sample_snapshot()
        };

        let err = accountant.advance(regressed).unwrap_err();
        assert_eq!(
            err,
            EnergyError::CounterRegression {
                field: "cpu",
                last: 120,
                current: 100,
            }
        );
        assert_eq!(accountant.last(), &regressed);

        // The next report measures from the regressed snapshot
        let next = AccountingSnapshot {
            total: 710,
            cpu: 104,
            ..regressed
        };
        let report = accountant.advance(next).unwrap();
        assert_eq!(report.values[0], 10);
        assert_eq!(report.values[1], 4);
    }

    #[test]
    fn test_delta_non_negative_for_monotonic_counters() {
        let mut accountant = DeltaAccountant::new();
        let mut snapshot = AccountingSnapshot::default();

        for step in 1..=50u64 {
            snapshot.total += 100 + step;
            snapshot.cpu += step % 7;
            snapshot.lpm += 50;
            snapshot.deep_lpm += step % 3;
            snapshot.transmit += step % 2;
            snapshot.listen += 4;

            let report = accountant.advance(snapshot).unwrap();
            assert_eq!(report.values[6], report.values[4] + report.values[5]);
            assert!(report.values[0] >= 1);
        }
    }

    #[test]
    fn test_primed_delta_uses_live_counters_as_baseline() {
        let mut counters = FixedCounters::new(sample_snapshot(), 1);
        let mut accountant = build_accountant(EnergyMode::Delta, &mut counters);
        assert_eq!(accountant.mode(), EnergyMode::Delta);

        counters.snapshot.total = 610;
        counters.snapshot.listen = 51;
        let report = accountant.report(&mut counters).unwrap();
        assert_eq!(report.to_string(), "10s,0s,0s,0s,0s,1s,1s");
        assert_eq!(counters.flushes, 2);
    }

    #[test]
    fn test_build_cumulative_accountant() {
        let mut counters = FixedCounters::new(sample_snapshot(), 1);
        let accountant = build_accountant(EnergyMode::Cumulative, &mut counters);

        assert_eq!(accountant.mode(), EnergyMode::Cumulative);
        assert_eq!(counters.flushes, 0);
    }

    #[test]
    fn test_energy_mode_parse_and_display() {
        assert_eq!("cumulative".parse::<EnergyMode>(), Ok(EnergyMode::Cumulative));
        assert_eq!(" Delta ".parse::<EnergyMode>(), Ok(EnergyMode::Delta));
        assert!("joules".parse::<EnergyMode>().is_err());
        assert_eq!(format!("{}", EnergyMode::Delta), "delta");
        assert_eq!(
            serde_json::to_string(&EnergyMode::Cumulative).unwrap(),
            r#""cumulative""#
        );
    }

    #[test]
    fn test_energy_error_display() {
        let err = EnergyError::CounterRegression {
            field: "listen",
            last: 9,
            current: 2,
        };
        assert_eq!(
            format!("{}", err),
            "energy counter 'listen' regressed from 9 to 2"
        );
    }
}
