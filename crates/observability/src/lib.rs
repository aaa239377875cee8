//! Process-wide tracing setup shared by every binary.

/// Initialize tracing with the format taken from `LOGIPORT_LOG_FORMAT`.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    let format = std::env::var("LOGIPORT_LOG_FORMAT")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_default();
    tracing::init(format);
}

pub mod tracing;

pub use self::tracing::LogFormat;
