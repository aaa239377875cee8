//! CSV layout of an export artifact.

use chrono::{DateTime, Utc};
use serde::Serialize;

pub const CSV_HEADERS: [&str; 8] = [
    "Reference Code",
    "Product",
    "SKU",
    "Quantity",
    "Status",
    "Created By",
    "Company",
    "Created At",
];

const CREATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One resolved order line, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub reference_code: String,
    pub product: String,
    pub sku: String,
    pub quantity: u32,
    pub status: String,
    pub created_by: String,
    pub company: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("csv write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv buffer flush failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv buffer could not be finalised: {0}")]
    IntoInner(String),
}

/// Render rows into a complete CSV document, header first.
pub fn render_csv(rows: &[ExportRow]) -> Result<Vec<u8>, RenderError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADERS)?;

    for row in rows {
        let quantity = row.quantity.to_string();
        let created_at = row.created_at.format(CREATED_AT_FORMAT).to_string();
        writer.write_record([
            row.reference_code.as_str(),
            row.product.as_str(),
            row.sku.as_str(),
            quantity.as_str(),
            row.status.as_str(),
            row.created_by.as_str(),
            row.company.as_str(),
            created_at.as_str(),
        ])?;
    }

    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| RenderError::IntoInner(e.to_string()))
}
