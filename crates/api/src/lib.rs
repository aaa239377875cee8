//! HTTP API: identity extraction, rate limiting and JSON mapping in front of
//! the command services.

pub mod app;
pub mod context;
pub mod middleware;
