//! Injectable sources for the simulated external approval call.
//!
//! Workers never draw randomness directly: the approval outcome and the
//! simulated latency both come from values implementing these seams so tests
//! can pin them.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use logiport_core::{DomainError, DomainResult};

/// Yields approve/reject draws.
pub trait ApprovalSource: Send + Sync {
    fn approve(&self) -> bool;
}

impl<A: ApprovalSource + ?Sized> ApprovalSource for std::sync::Arc<A> {
    fn approve(&self) -> bool {
        (**self).approve()
    }
}

/// Bernoulli draw with a configurable approval probability (0.7 by default).
#[derive(Debug)]
pub struct RandomApproval {
    probability: f64,
    rng: Mutex<StdRng>,
}

impl RandomApproval {
    pub const DEFAULT_PROBABILITY: f64 = 0.7;

    pub fn new(probability: f64) -> DomainResult<Self> {
        Self::build(probability, StdRng::from_entropy())
    }

    /// Deterministic draws for reproducible runs.
    pub fn seeded(probability: f64, seed: u64) -> DomainResult<Self> {
        Self::build(probability, StdRng::seed_from_u64(seed))
    }

    fn build(probability: f64, rng: StdRng) -> DomainResult<Self> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(DomainError::validation(format!(
                "approval probability must be within [0, 1], got {probability}"
            )));
        }
        Ok(Self {
            probability,
            rng: Mutex::new(rng),
        })
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }
}

impl ApprovalSource for RandomApproval {
    fn approve(&self) -> bool {
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_bool(self.probability),
            // A poisoned rng is still a valid rng.
            Err(poisoned) => poisoned.into_inner().gen_bool(self.probability),
        }
    }
}

/// Always returns the same outcome.
#[derive(Debug, Clone, Copy)]
pub struct FixedApproval(pub bool);

impl ApprovalSource for FixedApproval {
    fn approve(&self) -> bool {
        self.0
    }
}

/// Replays a fixed script of outcomes, then rejects.
#[derive(Debug, Default)]
pub struct ScriptedApproval {
    outcomes: Mutex<VecDeque<bool>>,
}

impl ScriptedApproval {
    pub fn new(outcomes: impl IntoIterator<Item = bool>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
        }
    }
}

impl ApprovalSource for ScriptedApproval {
    fn approve(&self) -> bool {
        match self.outcomes.lock() {
            Ok(mut q) => q.pop_front().unwrap_or(false),
            Err(poisoned) => poisoned.into_inner().pop_front().unwrap_or(false),
        }
    }
}

/// Uniform latency of `min_units..=max_units` whole units.
///
/// With the default unit of one second this is the 1 to 3 second delay of the
/// approval call; tests shrink the unit to milliseconds.
#[derive(Debug)]
pub struct LatencyRange {
    unit: Duration,
    min_units: u32,
    max_units: u32,
    rng: Mutex<StdRng>,
}

impl LatencyRange {
    pub fn new(unit: Duration, min_units: u32, max_units: u32) -> DomainResult<Self> {
        if min_units > max_units {
            return Err(DomainError::validation(format!(
                "latency range is empty ({min_units}..={max_units})"
            )));
        }
        Ok(Self {
            unit,
            min_units,
            max_units,
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    /// 1 to 3 units.
    pub fn standard(unit: Duration) -> Self {
        Self {
            unit,
            min_units: 1,
            max_units: 3,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Always zero; for tests that only care about outcomes.
    pub fn none() -> Self {
        Self::standard(Duration::ZERO)
    }

    pub fn max(&self) -> Duration {
        self.unit * self.max_units
    }

    pub fn sample(&self) -> Duration {
        let units = match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(self.min_units..=self.max_units),
            Err(poisoned) => poisoned
                .into_inner()
                .gen_range(self.min_units..=self.max_units),
        };
        self.unit * units
    }
}
