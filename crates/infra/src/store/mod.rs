//! Persistence seams.
//!
//! Every read and write takes the owning `CompanyId` explicitly; a record of
//! another company is indistinguishable from a missing one. Writes that race
//! (status transitions, stock) go through conditional updates guarded by the
//! aggregate version.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use logiport_auth::Role;
use logiport_core::{CompanyId, ExpectedVersion, ExportId, OrderId, ProductId, UserId};
use logiport_exports::Export;
use logiport_orders::{Order, OrderStatus};
use logiport_products::{Product, StockDeduction};

use crate::features::{Feature, FeatureToggles};

pub use memory::InMemoryStore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("reference code already in use: {0}")]
    DuplicateReference(String),

    #[error("insufficient stock (available: {available})")]
    InsufficientStock { available: u32 },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// A tenant. Only the display name is needed outside the auth boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
}

/// Persisted side of a user: what admin commands can change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub company_id: CompanyId,
    pub username: String,
    pub role: Role,
    pub is_blocked: bool,
}

/// Order listing filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub requested_by: Option<UserId>,
}

impl OrderFilter {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            requested_by: None,
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.status.is_none_or(|s| order.status() == s)
            && self.requested_by.is_none_or(|u| order.requested_by() == Some(u))
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<(), StoreError>;

    async fn get(&self, company_id: CompanyId, order_id: OrderId)
    -> Result<Option<Order>, StoreError>;

    /// Orders of `company_id` among `ids`; foreign or unknown ids are dropped.
    async fn get_many(&self, company_id: CompanyId, ids: &[OrderId])
    -> Result<Vec<Order>, StoreError>;

    async fn list(&self, company_id: CompanyId, filter: OrderFilter)
    -> Result<Vec<Order>, StoreError>;

    /// Replace the stored order if its version still equals `expected`.
    ///
    /// When `deduction` is given the product stock is decremented in the same
    /// atomic step, and the whole write is refused with
    /// [`StoreError::InsufficientStock`] if stock no longer covers it.
    async fn commit(
        &self,
        order: &Order,
        expected: ExpectedVersion,
        deduction: Option<StockDeduction>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn insert(&self, product: &Product) -> Result<(), StoreError>;

    async fn get(&self, company_id: CompanyId, product_id: ProductId)
    -> Result<Option<Product>, StoreError>;

    async fn list(&self, company_id: CompanyId) -> Result<Vec<Product>, StoreError>;
}

#[async_trait]
pub trait ExportStore: Send + Sync {
    async fn insert(&self, export: &Export) -> Result<(), StoreError>;

    async fn get(&self, company_id: CompanyId, export_id: ExportId)
    -> Result<Option<Export>, StoreError>;

    /// Persist a completed export. Refused unless the stored one is pending.
    async fn complete(&self, export: &Export) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ToggleStore: Send + Sync {
    /// Idempotent upsert: the first call for a company creates all-enabled toggles.
    async fn get_or_create(&self, company_id: CompanyId) -> Result<FeatureToggles, StoreError>;

    async fn set(
        &self,
        company_id: CompanyId,
        feature: Feature,
        enabled: bool,
    ) -> Result<FeatureToggles, StoreError>;
}

#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn upsert_company(&self, company: &Company) -> Result<(), StoreError>;

    async fn company(&self, company_id: CompanyId) -> Result<Option<Company>, StoreError>;

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), StoreError>;

    async fn profile(&self, company_id: CompanyId, user_id: UserId)
    -> Result<Option<UserProfile>, StoreError>;

    async fn profiles(&self, company_id: CompanyId) -> Result<Vec<UserProfile>, StoreError>;

    async fn set_blocked(
        &self,
        company_id: CompanyId,
        user_id: UserId,
        blocked: bool,
    ) -> Result<(), StoreError>;
}

/// Handles to every store, cheap to clone.
#[derive(Clone)]
pub struct Stores {
    pub orders: Arc<dyn OrderStore>,
    pub products: Arc<dyn ProductStore>,
    pub exports: Arc<dyn ExportStore>,
    pub toggles: Arc<dyn ToggleStore>,
    pub directory: Arc<dyn DirectoryStore>,
}

impl Stores {
    /// Every store backed by the same in-memory instance.
    pub fn from_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            orders: store.clone(),
            products: store.clone(),
            exports: store.clone(),
            toggles: store.clone(),
            directory: store,
        }
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}
