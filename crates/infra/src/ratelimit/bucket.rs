//! Token-bucket arithmetic. Pure: time is passed in as epoch milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Endpoint classes, each with its own bucket per subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointClass {
    Products,
    Orders,
    Exports,
}

impl EndpointClass {
    pub const ALL: [EndpointClass; 3] = [
        EndpointClass::Products,
        EndpointClass::Orders,
        EndpointClass::Exports,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::Products => "products",
            EndpointClass::Orders => "orders",
            EndpointClass::Exports => "exports",
        }
    }
}

impl std::fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `capacity` tokens, refilled at `refill_tokens` per `refill_period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketParams {
    pub capacity: u32,
    pub refill_tokens: u32,
    pub refill_period: Duration,
}

impl BucketParams {
    /// A bucket that refills completely once per period.
    pub fn per_period(capacity: u32, period: Duration) -> Self {
        Self {
            capacity,
            refill_tokens: capacity,
            refill_period: period,
        }
    }

    pub fn defaults_for(class: EndpointClass) -> Self {
        let minute = Duration::from_secs(60);
        match class {
            EndpointClass::Products => Self::per_period(100, minute),
            EndpointClass::Orders => Self::per_period(50, minute),
            EndpointClass::Exports => Self::per_period(10, minute),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.capacity > 0 && self.refill_tokens > 0 && !self.refill_period.is_zero()
    }

    fn period_ms(&self) -> f64 {
        self.refill_period.as_millis() as f64
    }

    /// Tokens after `elapsed_ms` of refill, clamped to capacity.
    pub fn refill(&self, tokens: f64, elapsed_ms: i64) -> f64 {
        let elapsed_ms = elapsed_ms.max(0) as f64;
        let refilled = tokens + elapsed_ms * f64::from(self.refill_tokens) / self.period_ms();
        refilled.min(f64::from(self.capacity))
    }

    /// Whole seconds until `tokens` reaches one token again.
    pub fn retry_after(&self, tokens: f64) -> Duration {
        let deficit = (1.0 - tokens).max(0.0);
        let secs = deficit * self.refill_period.as_secs_f64() / f64::from(self.refill_tokens);
        // Absorb float noise so an exact 6.0 is not rounded up to 7.
        let secs = (secs - 1e-9).ceil().max(if deficit > 0.0 { 1.0 } else { 0.0 });
        Duration::from_secs(secs as u64)
    }
}

/// Stored state of one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketState {
    pub tokens: f64,
    pub last_refill_ms: i64,
}

impl BucketState {
    pub fn full(params: &BucketParams, now_ms: i64) -> Self {
        Self {
            tokens: f64::from(params.capacity),
            last_refill_ms: now_ms,
        }
    }
}

/// Result of one atomic take on a bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TakeOutcome {
    pub allowed: bool,
    /// Tokens left after the take.
    pub tokens: f64,
}

/// Refill, then consume one token if available. Missing state is a full bucket.
pub fn take(state: Option<BucketState>, params: &BucketParams, now_ms: i64) -> (BucketState, TakeOutcome) {
    let state = state.unwrap_or_else(|| BucketState::full(params, now_ms));
    let tokens = params.refill(state.tokens, now_ms - state.last_refill_ms);
    // A clock that went backwards keeps the later timestamp.
    let last_refill_ms = now_ms.max(state.last_refill_ms);

    let (tokens, allowed) = if tokens >= 1.0 {
        (tokens - 1.0, true)
    } else {
        (tokens, false)
    };

    (
        BucketState {
            tokens,
            last_refill_ms,
        },
        TakeOutcome { allowed, tokens },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ten_per_minute() -> BucketParams {
        BucketParams::per_period(10, Duration::from_secs(60))
    }

    #[test]
    fn defaults_per_class() {
        assert_eq!(BucketParams::defaults_for(EndpointClass::Products).capacity, 100);
        assert_eq!(BucketParams::defaults_for(EndpointClass::Orders).capacity, 50);
        assert_eq!(BucketParams::defaults_for(EndpointClass::Exports).capacity, 10);
    }

    #[test]
    fn n_takes_leave_capacity_minus_n() {
        let params = ten_per_minute();
        let mut state = None;
        for n in 1..=4 {
            let (next, outcome) = take(state, &params, 0);
            assert!(outcome.allowed);
            assert_eq!(outcome.tokens, f64::from(10 - n));
            state = Some(next);
        }
    }

    #[test]
    fn empty_bucket_reports_six_seconds_for_ten_per_minute() {
        let params = ten_per_minute();
        let mut state = None;
        for _ in 0..10 {
            state = Some(take(state, &params, 0).0);
        }
        let (state, outcome) = take(state, &params, 0);
        assert!(!outcome.allowed);
        assert_eq!(params.retry_after(outcome.tokens), Duration::from_secs(6));

        let (state, outcome) = take(Some(state), &params, 6_000);
        assert!(outcome.allowed);
        let (_, outcome) = take(Some(state), &params, 6_000);
        assert!(!outcome.allowed);
    }

    #[test]
    fn partial_tokens_round_retry_up() {
        let params = ten_per_minute();
        // 0.5 tokens missing at 1 token per 6s -> 3s
        assert_eq!(params.retry_after(0.5), Duration::from_secs(3));
        // 0.9 tokens present -> 0.6s -> rounded up to 1s
        assert_eq!(params.retry_after(0.9), Duration::from_secs(1));
    }

    #[test]
    fn backwards_clock_does_not_refill() {
        let params = ten_per_minute();
        let state = BucketState {
            tokens: 0.0,
            last_refill_ms: 10_000,
        };
        let (next, outcome) = take(Some(state), &params, 5_000);
        assert!(!outcome.allowed);
        assert_eq!(next.last_refill_ms, 10_000);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 300,
                ..ProptestConfig::default()
            })]

            /// Property: tokens stay within [0, capacity] for any sequence of takes.
            #[test]
            fn tokens_stay_within_capacity(
                capacity in 1u32..200,
                period_secs in 1u64..600,
                gaps in proptest::collection::vec(0i64..120_000, 1..60),
            ) {
                let params = BucketParams::per_period(capacity, Duration::from_secs(period_secs));
                let mut now = 0i64;
                let mut state = None;
                for gap in gaps {
                    now += gap;
                    let (next, outcome) = take(state, &params, now);
                    prop_assert!(next.tokens >= 0.0);
                    prop_assert!(next.tokens <= f64::from(capacity));
                    prop_assert_eq!(outcome.tokens, next.tokens);
                    state = Some(next);
                }
            }

            /// Property: with no time passing, exactly `capacity` takes succeed.
            #[test]
            fn burst_admits_exactly_capacity(capacity in 1u32..200, extra in 1usize..20) {
                let params = BucketParams::per_period(capacity, Duration::from_secs(60));
                let mut state = None;
                let mut admitted = 0u32;
                for _ in 0..(capacity as usize + extra) {
                    let (next, outcome) = take(state, &params, 1_000);
                    admitted += u32::from(outcome.allowed);
                    state = Some(next);
                }
                prop_assert_eq!(admitted, capacity);
            }
        }
    }
}
