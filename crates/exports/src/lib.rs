//! Export domain module.
//!
//! An export is a company-scoped request to render a set of orders into a CSV
//! artifact. This crate owns the export lifecycle and the CSV layout; workers
//! in `logiport-infra` drive it.

pub mod csv_artifact;
pub mod export;

pub use csv_artifact::{render_csv, ExportRow, RenderError, CSV_HEADERS};
pub use export::{ArtifactRef, Export, ExportStatus};
