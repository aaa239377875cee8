//! Per-(subject, endpoint class) admission check.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use logiport_auth::Subject;
use logiport_core::{Clock, UserId};

use super::bucket::{BucketParams, EndpointClass};
use super::store::BucketStore;

/// What to do when the bucket store cannot be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailMode {
    #[default]
    Open,
    Closed,
}

impl std::str::FromStr for FailMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(FailMode::Open),
            "closed" => Ok(FailMode::Closed),
            other => Err(format!("unknown fail mode '{other}' (expected open|closed)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Permit,
    Deny { retry_after: Duration },
}

impl Decision {
    pub fn is_permit(&self) -> bool {
        matches!(self, Decision::Permit)
    }

    /// Whole seconds to wait, for a `Retry-After` header.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Decision::Permit => None,
            Decision::Deny { retry_after } => Some(retry_after.as_secs()),
        }
    }
}

/// Bucket parameters per endpoint class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateLimits {
    classes: HashMap<EndpointClass, BucketParams>,
}

impl RateLimits {
    pub fn with(mut self, class: EndpointClass, params: BucketParams) -> Self {
        self.classes.insert(class, params);
        self
    }

    pub fn params(&self, class: EndpointClass) -> BucketParams {
        self.classes
            .get(&class)
            .copied()
            .unwrap_or_else(|| BucketParams::defaults_for(class))
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            classes: EndpointClass::ALL
                .into_iter()
                .map(|c| (c, BucketParams::defaults_for(c)))
                .collect(),
        }
    }
}

pub fn bucket_key(subject: UserId, class: EndpointClass) -> String {
    format!("logiport:throttle:{class}:{subject}")
}

/// Token-bucket limiter over a shared [`BucketStore`].
#[derive(Clone)]
pub struct TokenBucketLimiter {
    store: Arc<dyn BucketStore>,
    limits: RateLimits,
    clock: Arc<dyn Clock>,
    fail_mode: FailMode,
}

impl TokenBucketLimiter {
    pub fn new(store: Arc<dyn BucketStore>, limits: RateLimits, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            limits,
            clock,
            fail_mode: FailMode::default(),
        }
    }

    pub fn with_fail_mode(mut self, fail_mode: FailMode) -> Self {
        self.fail_mode = fail_mode;
        self
    }

    pub fn limits(&self) -> &RateLimits {
        &self.limits
    }

    /// Admission check for one inbound call. Never errors: store outages
    /// resolve to the configured fail mode.
    pub async fn allow(&self, subject: &Subject, class: EndpointClass) -> Decision {
        if subject.unrestricted {
            return Decision::Permit;
        }
        self.check(subject.user_id, class).await
    }

    /// Same as [`allow`](Self::allow) without the unrestricted bypass.
    pub async fn check(&self, subject_id: UserId, class: EndpointClass) -> Decision {
        let params = self.limits.params(class);
        let key = bucket_key(subject_id, class);
        let now_ms = self.clock.now().timestamp_millis();

        match self.store.take(&key, &params, now_ms).await {
            Ok(outcome) if outcome.allowed => Decision::Permit,
            Ok(outcome) => Decision::Deny {
                retry_after: params.retry_after(outcome.tokens),
            },
            Err(e) => {
                warn!(
                    subject_id = %subject_id,
                    endpoint_class = %class,
                    fail_mode = ?self.fail_mode,
                    error = %e,
                    "rate limiter store unavailable"
                );
                match self.fail_mode {
                    FailMode::Open => Decision::Permit,
                    FailMode::Closed => Decision::Deny {
                        retry_after: params.retry_after(0.0),
                    },
                }
            }
        }
    }
}

impl std::fmt::Debug for TokenBucketLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucketLimiter")
            .field("limits", &self.limits)
            .field("fail_mode", &self.fail_mode)
            .finish_non_exhaustive()
    }
}
