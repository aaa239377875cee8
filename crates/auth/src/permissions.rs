use serde::{Deserialize, Serialize};

/// Something a subject may be allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Browse the product catalog.
    ReadCatalog,
    /// Create orders (single or bulk).
    PlaceOrders,
    /// Re-drive failed orders.
    RetryOrders,
    /// Request order exports.
    RequestExports,
    /// Company administration: feature toggles, blocking users, bulk approval.
    ManageCompany,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ReadCatalog => "catalog.read",
            Capability::PlaceOrders => "orders.place",
            Capability::RetryOrders => "orders.retry",
            Capability::RequestExports => "exports.request",
            Capability::ManageCompany => "company.manage",
        }
    }
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
