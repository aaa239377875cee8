//! In-memory store for tests/dev.
//!
//! All tables live behind one mutex so a conditional order update and its
//! stock decrement are a single critical section.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use logiport_core::{
    AggregateRoot, CompanyId, DomainError, Entity, ExpectedVersion, ExportId, OrderId, ProductId,
    UserId,
};
use logiport_exports::{Export, ExportStatus};
use logiport_orders::Order;
use logiport_products::{Product, StockDeduction};

use super::{
    Company, DirectoryStore, ExportStore, OrderFilter, OrderStore, ProductStore, StoreError,
    ToggleStore, UserProfile,
};
use crate::features::{Feature, FeatureToggles};

#[derive(Debug, Default)]
struct Tables {
    orders: HashMap<OrderId, Order>,
    /// Reference codes are unique across all companies.
    references: HashMap<String, OrderId>,
    products: HashMap<ProductId, Product>,
    exports: HashMap<ExportId, Export>,
    toggles: HashMap<CompanyId, FeatureToggles>,
    companies: HashMap<CompanyId, Company>,
    profiles: HashMap<UserId, UserProfile>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    offline: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is offline".to_string()));
        }
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }
}

fn order_company(order: &Order) -> Result<CompanyId, StoreError> {
    order
        .company_id()
        .ok_or_else(|| StoreError::Conflict("order has not been placed".to_string()))
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        order_company(order)?;
        let mut t = self.tables()?;
        if t.orders.contains_key(&order.id_typed()) {
            return Err(StoreError::Conflict(format!(
                "order {} already exists",
                order.id_typed()
            )));
        }
        if t.references.contains_key(order.reference_code()) {
            return Err(StoreError::DuplicateReference(
                order.reference_code().to_string(),
            ));
        }
        t.references
            .insert(order.reference_code().to_string(), order.id_typed());
        t.orders.insert(order.id_typed(), order.clone());
        Ok(())
    }

    async fn get(
        &self,
        company_id: CompanyId,
        order_id: OrderId,
    ) -> Result<Option<Order>, StoreError> {
        let t = self.tables()?;
        Ok(t.orders
            .get(&order_id)
            .filter(|o| o.company_id() == Some(company_id))
            .cloned())
    }

    async fn get_many(
        &self,
        company_id: CompanyId,
        ids: &[OrderId],
    ) -> Result<Vec<Order>, StoreError> {
        let t = self.tables()?;
        Ok(ids
            .iter()
            .filter_map(|id| t.orders.get(id))
            .filter(|o| o.company_id() == Some(company_id))
            .cloned()
            .collect())
    }

    async fn list(
        &self,
        company_id: CompanyId,
        filter: OrderFilter,
    ) -> Result<Vec<Order>, StoreError> {
        let t = self.tables()?;
        let mut orders: Vec<Order> = t
            .orders
            .values()
            .filter(|o| o.company_id() == Some(company_id) && filter.matches(o))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.id_typed());
        Ok(orders)
    }

    async fn commit(
        &self,
        order: &Order,
        expected: ExpectedVersion,
        deduction: Option<StockDeduction>,
    ) -> Result<(), StoreError> {
        let company_id = order_company(order)?;
        let mut t = self.tables()?;

        let stored = t
            .orders
            .get(&order.id_typed())
            .filter(|o| o.company_id() == Some(company_id))
            .ok_or(StoreError::NotFound)?;
        expected
            .check(stored.version())
            .map_err(|e| StoreError::Conflict(e.to_string()))?;

        if let Some(deduction) = deduction {
            let product = t
                .products
                .get_mut(&deduction.product_id)
                .filter(|p| p.company_id() == company_id)
                .ok_or(StoreError::NotFound)?;
            match product.deduct(deduction.quantity, Utc::now()) {
                Ok(_) => {}
                Err(DomainError::ResourceExhausted { .. }) => {
                    return Err(StoreError::InsufficientStock {
                        available: product.stock_quantity(),
                    });
                }
                Err(e) => return Err(StoreError::Conflict(e.to_string())),
            }
        }

        t.orders.insert(order.id_typed(), order.clone());
        Ok(())
    }
}

#[async_trait]
impl ProductStore for InMemoryStore {
    async fn insert(&self, product: &Product) -> Result<(), StoreError> {
        let mut t = self.tables()?;
        let duplicate_sku = t
            .products
            .values()
            .any(|p| p.company_id() == product.company_id() && p.sku() == product.sku());
        if duplicate_sku || t.products.contains_key(&product.id_typed()) {
            return Err(StoreError::Conflict(format!(
                "product with sku {} already exists",
                product.sku()
            )));
        }
        t.products.insert(product.id_typed(), product.clone());
        Ok(())
    }

    async fn get(
        &self,
        company_id: CompanyId,
        product_id: ProductId,
    ) -> Result<Option<Product>, StoreError> {
        let t = self.tables()?;
        Ok(t.products
            .get(&product_id)
            .filter(|p| p.company_id() == company_id)
            .cloned())
    }

    async fn list(&self, company_id: CompanyId) -> Result<Vec<Product>, StoreError> {
        let t = self.tables()?;
        let mut products: Vec<Product> = t
            .products
            .values()
            .filter(|p| p.company_id() == company_id)
            .cloned()
            .collect();
        products.sort_by(|a, b| a.sku().cmp(b.sku()));
        Ok(products)
    }
}

#[async_trait]
impl ExportStore for InMemoryStore {
    async fn insert(&self, export: &Export) -> Result<(), StoreError> {
        let mut t = self.tables()?;
        if t.exports.contains_key(&export.id_typed()) {
            return Err(StoreError::Conflict(format!(
                "export {} already exists",
                export.id_typed()
            )));
        }
        t.exports.insert(export.id_typed(), export.clone());
        Ok(())
    }

    async fn get(
        &self,
        company_id: CompanyId,
        export_id: ExportId,
    ) -> Result<Option<Export>, StoreError> {
        let t = self.tables()?;
        Ok(t.exports
            .get(&export_id)
            .filter(|e| e.company_id() == company_id)
            .cloned())
    }

    async fn complete(&self, export: &Export) -> Result<(), StoreError> {
        let mut t = self.tables()?;
        let stored = t
            .exports
            .get(&export.id_typed())
            .filter(|e| e.company_id() == export.company_id())
            .ok_or(StoreError::NotFound)?;
        if stored.status() != ExportStatus::Pending {
            return Err(StoreError::Conflict(format!(
                "export {} is already {}",
                export.id_typed(),
                stored.status()
            )));
        }
        t.exports.insert(export.id_typed(), export.clone());
        Ok(())
    }
}

#[async_trait]
impl ToggleStore for InMemoryStore {
    async fn get_or_create(&self, company_id: CompanyId) -> Result<FeatureToggles, StoreError> {
        let mut t = self.tables()?;
        Ok(*t
            .toggles
            .entry(company_id)
            .or_insert_with(FeatureToggles::all_enabled))
    }

    async fn set(
        &self,
        company_id: CompanyId,
        feature: Feature,
        enabled: bool,
    ) -> Result<FeatureToggles, StoreError> {
        let mut t = self.tables()?;
        let toggles = t
            .toggles
            .entry(company_id)
            .or_insert_with(FeatureToggles::all_enabled);
        toggles.set(feature, enabled);
        Ok(*toggles)
    }
}

#[async_trait]
impl DirectoryStore for InMemoryStore {
    async fn upsert_company(&self, company: &Company) -> Result<(), StoreError> {
        let mut t = self.tables()?;
        t.companies.insert(company.id, company.clone());
        Ok(())
    }

    async fn company(&self, company_id: CompanyId) -> Result<Option<Company>, StoreError> {
        let t = self.tables()?;
        Ok(t.companies.get(&company_id).cloned())
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
        let mut t = self.tables()?;
        t.profiles.insert(profile.user_id, profile.clone());
        Ok(())
    }

    async fn profile(
        &self,
        company_id: CompanyId,
        user_id: UserId,
    ) -> Result<Option<UserProfile>, StoreError> {
        let t = self.tables()?;
        Ok(t.profiles
            .get(&user_id)
            .filter(|p| p.company_id == company_id)
            .cloned())
    }

    async fn profiles(&self, company_id: CompanyId) -> Result<Vec<UserProfile>, StoreError> {
        let t = self.tables()?;
        let mut profiles: Vec<UserProfile> = t
            .profiles
            .values()
            .filter(|p| p.company_id == company_id)
            .cloned()
            .collect();
        profiles.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(profiles)
    }

    async fn set_blocked(
        &self,
        company_id: CompanyId,
        user_id: UserId,
        blocked: bool,
    ) -> Result<(), StoreError> {
        let mut t = self.tables()?;
        let profile = t
            .profiles
            .get_mut(&user_id)
            .filter(|p| p.company_id == company_id)
            .ok_or(StoreError::NotFound)?;
        profile.is_blocked = blocked;
        Ok(())
    }
}
