//! Job handlers that drive orders and exports to completion.

pub mod export;
pub mod order_processing;

pub use export::{ExportGenerator, ExportOutcome};
pub use order_processing::{OrderProcessor, ProcessError, ProcessOutcome, ProcessingConfig};
