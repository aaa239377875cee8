//! Infrastructure layer: stores, rate limiting, background workers and the
//! command services built on top of them.

pub mod artifacts;
pub mod backend;
pub mod config;
pub mod features;
pub mod jobs;
pub mod ratelimit;
pub mod retry;
pub mod services;
pub mod store;
pub mod transitions;
pub mod workers;

pub use backend::{Backend, BootError, Components};
pub use config::{AppConfig, ConfigError};
pub use services::ServiceError;
