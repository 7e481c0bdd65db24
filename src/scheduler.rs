//! Concurrency scheduling: the ramping schedule state machine and the
//! shared iteration budget for seeding runs.
//!
//! The schedule math is pure and knows nothing about tasks; the runner owns
//! spawning and retiring, so the ramping logic is portable across
//! concurrency primitives.

use crate::config::Stage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Phase of a ramping schedule at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampPhase {
    RampingUp,
    Holding,
    RampingDown,
    Drained,
}

/// An ordered list of `{duration, target}` stages interpreted as a
/// time-driven concurrency controller. The live-client target moves
/// linearly from the previous stage's target toward the current one over
/// the stage's duration, starting from zero.
#[derive(Debug, Clone)]
pub struct RampSchedule {
    stages: Vec<Stage>,
    total: Duration,
}

impl RampSchedule {
    pub fn new(stages: Vec<Stage>) -> anyhow::Result<Self> {
        if stages.is_empty() {
            anyhow::bail!("ramping schedule requires at least one stage");
        }
        let total_secs: u64 = stages.iter().map(|s| s.duration_secs).sum();
        if total_secs == 0 {
            anyhow::bail!("ramping schedule has zero total duration");
        }
        Ok(Self {
            stages,
            total: Duration::from_secs(total_secs),
        })
    }

    /// Total schedule duration; past this point the target is zero.
    pub fn total_duration(&self) -> Duration {
        self.total
    }

    /// Desired number of live virtual clients at `elapsed`.
    pub fn target_at(&self, elapsed: Duration) -> u32 {
        let mut stage_start = Duration::ZERO;
        let mut previous_target = 0u32;
        for stage in &self.stages {
            let stage_duration = Duration::from_secs(stage.duration_secs);
            let stage_end = stage_start + stage_duration;
            if elapsed < stage_end {
                let into_stage = (elapsed - stage_start).as_secs_f64();
                let fraction = into_stage / stage_duration.as_secs_f64();
                let from = previous_target as f64;
                let to = stage.target as f64;
                return (from + (to - from) * fraction).round() as u32;
            }
            previous_target = stage.target;
            stage_start = stage_end;
        }
        // Schedule exhausted: drain to zero regardless of the final target.
        0
    }

    /// Phase of the schedule at `elapsed`, for progress reporting.
    pub fn phase_at(&self, elapsed: Duration) -> RampPhase {
        if elapsed >= self.total {
            return RampPhase::Drained;
        }
        let mut stage_start = Duration::ZERO;
        let mut previous_target = 0u32;
        for stage in &self.stages {
            let stage_end = stage_start + Duration::from_secs(stage.duration_secs);
            if elapsed < stage_end {
                return match stage.target.cmp(&previous_target) {
                    std::cmp::Ordering::Greater => RampPhase::RampingUp,
                    std::cmp::Ordering::Equal => RampPhase::Holding,
                    std::cmp::Ordering::Less => RampPhase::RampingDown,
                };
            }
            previous_target = stage.target;
            stage_start = stage_end;
        }
        RampPhase::Drained
    }
}

/// Shared iteration budget for the fixed-pool executor. Each worker claims
/// the next index atomically, so every index in `0..budget` is handed out
/// exactly once — the seeded-identity bijection depends on this.
#[derive(Debug)]
pub struct IterationCounter {
    next: AtomicU64,
    budget: u64,
}

impl IterationCounter {
    pub fn new(budget: u64) -> Self {
        Self {
            next: AtomicU64::new(0),
            budget,
        }
    }

    /// Claim the next iteration index, or `None` once the budget is spent.
    pub fn claim(&self) -> Option<u64> {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        (index < self.budget).then_some(index)
    }

    /// Number of iterations claimed so far, capped at the budget.
    pub fn claimed(&self) -> u64 {
        self.next.load(Ordering::Relaxed).min(self.budget)
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }
}
