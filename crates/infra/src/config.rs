//! Process configuration, read from `LOGIPORT_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use logiport_orders::RandomApproval;

use crate::ratelimit::{BucketParams, EndpointClass, FailMode, RateLimits};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

impl ConfigError {
    fn invalid(key: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind: String,
    pub redis_url: Option<String>,
    pub fail_mode: FailMode,
    pub approval_probability: f64,
    pub latency_unit_ms: u64,
    pub max_processing_secs: u64,
    pub workers: usize,
    pub poll_interval_ms: u64,
    pub artifact_dir: PathBuf,
    pub rate_limits: RateLimits,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            redis_url: None,
            fail_mode: FailMode::Open,
            approval_probability: RandomApproval::DEFAULT_PROBABILITY,
            latency_unit_ms: 1000,
            max_processing_secs: 30,
            workers: 4,
            poll_interval_ms: 100,
            artifact_dir: PathBuf::from("./exports"),
            rate_limits: RateLimits::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(bind) = lookup("LOGIPORT_BIND") {
            config.bind = bind;
        }
        config.redis_url = lookup("LOGIPORT_REDIS_URL").filter(|url| !url.trim().is_empty());
        if let Some(mode) = lookup("LOGIPORT_LIMITER_FAIL_MODE") {
            config.fail_mode = FailMode::from_str(&mode)
                .map_err(|reason| ConfigError::invalid("LOGIPORT_LIMITER_FAIL_MODE", reason))?;
        }
        parse_into(&lookup, "LOGIPORT_APPROVAL_PROBABILITY", &mut config.approval_probability)?;
        parse_into(&lookup, "LOGIPORT_LATENCY_UNIT_MS", &mut config.latency_unit_ms)?;
        parse_into(&lookup, "LOGIPORT_MAX_PROCESSING_SECS", &mut config.max_processing_secs)?;
        parse_into(&lookup, "LOGIPORT_WORKERS", &mut config.workers)?;
        parse_into(&lookup, "LOGIPORT_POLL_INTERVAL_MS", &mut config.poll_interval_ms)?;
        if let Some(dir) = lookup("LOGIPORT_ARTIFACT_DIR") {
            config.artifact_dir = PathBuf::from(dir);
        }

        for class in EndpointClass::ALL {
            let key = format!("LOGIPORT_RATE_{}", class.as_str().to_ascii_uppercase());
            if let Some(raw) = lookup(&key) {
                let params = parse_rate(&raw).map_err(|reason| ConfigError::invalid(&key, reason))?;
                config.rate_limits = config.rate_limits.with(class, params);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.approval_probability) {
            return Err(ConfigError::invalid(
                "LOGIPORT_APPROVAL_PROBABILITY",
                "must be within [0, 1]",
            ));
        }
        if self.workers == 0 {
            return Err(ConfigError::invalid("LOGIPORT_WORKERS", "must be at least 1"));
        }
        if self.max_processing_secs == 0 {
            return Err(ConfigError::invalid("LOGIPORT_MAX_PROCESSING_SECS", "must be at least 1"));
        }
        for class in EndpointClass::ALL {
            if !self.rate_limits.params(class).is_valid() {
                return Err(ConfigError::invalid(
                    &format!("LOGIPORT_RATE_{}", class.as_str().to_ascii_uppercase()),
                    "capacity and period must be non-zero",
                ));
            }
        }
        Ok(())
    }

    pub fn latency_unit(&self) -> Duration {
        Duration::from_millis(self.latency_unit_ms)
    }

    pub fn max_processing(&self) -> Duration {
        Duration::from_secs(self.max_processing_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn parse_into<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(key, e.to_string()))?;
    }
    Ok(())
}

/// `<capacity>/<period_secs>`, e.g. `50/60`.
fn parse_rate(raw: &str) -> Result<BucketParams, String> {
    let (capacity, period) = raw
        .split_once('/')
        .ok_or_else(|| format!("expected <capacity>/<period_secs>, got '{raw}'"))?;
    let capacity: u32 = capacity.trim().parse().map_err(|e| format!("capacity: {e}"))?;
    let period: u64 = period.trim().parse().map_err(|e| format!("period: {e}"))?;
    let params = BucketParams::per_period(capacity, Duration::from_secs(period));
    if params.is_valid() {
        Ok(params)
    } else {
        Err("capacity and period must be non-zero".to_string())
    }
}
