//! Wake scheduling with jitter.
//!
//! The scheduler is an explicit state machine. It is armed with a deadline,
//! moves to evaluating when that deadline expires, to done once the cycle's
//! work is finished, and back to armed with a new jittered deadline. It never
//! terminates.
//!
//! Jitter desynchronizes nodes that share a channel: the first wake is drawn
//! from `[0, base_interval)` and every following wake lands within
//! `[base_interval - unit_tick, base_interval + unit_tick)` of the previous
//! deadline.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

/// Phase of the scheduling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Timer set, waiting for the deadline
    Armed,
    /// Timer fired, about to check reachability
    Evaluating,
    /// Cycle actions complete, about to re-arm
    Done,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Armed => write!(f, "armed"),
            Phase::Evaluating => write!(f, "evaluating"),
            Phase::Done => write!(f, "done"),
        }
    }
}

/// Events that drive the scheduler between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleEvent {
    TimerExpired,
    CycleComplete,
    Rearm,
}

impl std::fmt::Display for ScheduleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleEvent::TimerExpired => write!(f, "timer expired"),
            ScheduleEvent::CycleComplete => write!(f, "cycle complete"),
            ScheduleEvent::Rearm => write!(f, "re-arm"),
        }
    }
}

/// Errors raised by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The unit tick must be non-zero and shorter than the base interval
    InvalidJitter {
        base_interval: Duration,
        unit_tick: Duration,
    },

    /// The event is not valid in the current phase
    InvalidTransition { from: Phase, event: ScheduleEvent },
}

impl std::fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleError::InvalidJitter {
                base_interval,
                unit_tick,
            } => write!(
                f,
                "unit tick {:?} must be non-zero and shorter than base interval {:?}",
                unit_tick, base_interval
            ),
            ScheduleError::InvalidTransition { from, event } => {
                write!(f, "invalid schedule transition: {} while {}", event, from)
            }
        }
    }
}

impl std::error::Error for ScheduleError {}

/// Base interval and jitter width for the wake timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterPolicy {
    base_interval: Duration,
    unit_tick: Duration,
}

impl JitterPolicy {
    pub fn new(base_interval: Duration, unit_tick: Duration) -> Result<Self, ScheduleError> {
        if unit_tick.is_zero() || unit_tick >= base_interval {
            return Err(ScheduleError::InvalidJitter {
                base_interval,
                unit_tick,
            });
        }

        Ok(Self {
            base_interval,
            unit_tick,
        })
    }

    pub fn base_interval(&self) -> Duration {
        self.base_interval
    }

    pub fn unit_tick(&self) -> Duration {
        self.unit_tick
    }

    /// Delay until the very first wake, uniform in `[0, base_interval)`.
    pub fn first_delay(&self, rng: &mut impl Rng) -> Duration {
        let base_ns = self.base_interval.as_nanos() as u64;
        Duration::from_nanos(rng.gen_range(0..base_ns))
    }

    /// Delay between consecutive wakes:
    /// `base_interval - unit_tick + jitter` with `jitter` in `[0, 2 * unit_tick)`.
    pub fn next_delay(&self, rng: &mut impl Rng) -> Duration {
        let tick_ns = self.unit_tick.as_nanos() as u64;
        let jitter = Duration::from_nanos(rng.gen_range(0..2 * tick_ns));
        self.base_interval - self.unit_tick + jitter
    }
}

/// The wake-cycle state machine and its deadline.
#[derive(Debug)]
pub struct Scheduler {
    policy: JitterPolicy,
    phase: Phase,
    deadline: Instant,
    cycles: u64,
}

impl Scheduler {
    /// Arm the scheduler for its first wake relative to `now`.
    pub fn start(policy: JitterPolicy, now: Instant, rng: &mut impl Rng) -> Self {
        let deadline = now + policy.first_delay(rng);
        Self {
            policy,
            phase: Phase::Armed,
            deadline,
            cycles: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Absolute time of the next wake.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Number of cycles that have been evaluated so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn policy(&self) -> &JitterPolicy {
        &self.policy
    }

    /// `Armed -> Evaluating`, taken when the wake timer fires.
    pub fn timer_expired(&mut self) -> Result<(), ScheduleError> {
        self.transition(Phase::Armed, ScheduleEvent::TimerExpired, Phase::Evaluating)?;
        self.cycles += 1;
        Ok(())
    }

    /// `Evaluating -> Done`, taken once the cycle's work has finished.
    pub fn cycle_complete(&mut self) -> Result<(), ScheduleError> {
        self.transition(Phase::Evaluating, ScheduleEvent::CycleComplete, Phase::Done)
    }

    /// `Done -> Armed`, anchoring the new deadline at the previous one.
    ///
    /// Returns the new deadline.
    pub fn rearm(&mut self, rng: &mut impl Rng) -> Result<Instant, ScheduleError> {
        self.transition(Phase::Done, ScheduleEvent::Rearm, Phase::Armed)?;
        self.deadline += self.policy.next_delay(rng);
        Ok(self.deadline)
    }

    fn transition(
        &mut self,
        expected: Phase,
        event: ScheduleEvent,
        next: Phase,
    ) -> Result<(), ScheduleError> {
        if self.phase != expected {
            return Err(ScheduleError::InvalidTransition {
                from: self.phase,
                event,
            });
        }
        self.phase = next;
        Ok(())
    }
}
