use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use logiport_core::{CompanyId, DomainError, DomainResult, Entity, ProductId};

/// Failure reason recorded when an approval cannot be covered by stock.
pub const INSUFFICIENT_STOCK: &str = "insufficient stock";

const MAX_SKU_LEN: usize = 100;
const MAX_NAME_LEN: usize = 255;

/// Catalog entry owned by one company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    company_id: CompanyId,
    sku: String,
    name: String,
    stock_quantity: u32,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Stock to take from a product as part of an approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDeduction {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl Product {
    pub fn new(
        id: ProductId,
        company_id: CompanyId,
        sku: impl Into<String>,
        name: impl Into<String>,
        stock_quantity: u32,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let sku = sku.into().trim().to_string();
        let name = name.into().trim().to_string();

        if sku.is_empty() {
            return Err(DomainError::validation("sku is required"));
        }
        if sku.len() > MAX_SKU_LEN {
            return Err(DomainError::validation("sku is too long"));
        }
        if name.is_empty() {
            return Err(DomainError::validation("name is required"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(DomainError::validation("name is too long"));
        }

        Ok(Self {
            id,
            company_id,
            sku,
            name,
            stock_quantity,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stock_quantity(&self) -> u32 {
        self.stock_quantity
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether new orders may reference this product.
    pub fn can_be_ordered(&self) -> bool {
        self.is_active
    }

    pub fn can_cover(&self, quantity: u32) -> bool {
        self.stock_quantity >= quantity
    }

    /// Decrement-if-sufficient. Leaves the product untouched on failure.
    pub fn deduct(&mut self, quantity: u32, now: DateTime<Utc>) -> DomainResult<u32> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if !self.can_cover(quantity) {
            return Err(DomainError::exhausted(INSUFFICIENT_STOCK));
        }
        self.stock_quantity -= quantity;
        self.updated_at = now;
        Ok(self.stock_quantity)
    }

    pub fn restock(&mut self, quantity: u32, now: DateTime<Utc>) {
        self.stock_quantity = self.stock_quantity.saturating_add(quantity);
        self.updated_at = now;
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.updated_at = now;
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn company_id(&self) -> CompanyId {
        self.company_id
    }
}
