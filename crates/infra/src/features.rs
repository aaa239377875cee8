//! Per-company feature toggles.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use logiport_core::CompanyId;

use crate::store::{StoreError, ToggleStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    BulkOrders,
    Exports,
    CsvUpload,
    ApiAccess,
}

impl Feature {
    pub const ALL: [Feature; 4] = [
        Feature::BulkOrders,
        Feature::Exports,
        Feature::CsvUpload,
        Feature::ApiAccess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::BulkOrders => "bulk_orders",
            Feature::Exports => "exports",
            Feature::CsvUpload => "csv_upload",
            Feature::ApiAccess => "api_access",
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Feature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("unknown feature '{s}'"))
    }
}

/// One record per company; every flag defaults to enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureToggles {
    pub bulk_orders: bool,
    pub exports: bool,
    pub csv_upload: bool,
    pub api_access: bool,
}

impl FeatureToggles {
    pub fn all_enabled() -> Self {
        Self {
            bulk_orders: true,
            exports: true,
            csv_upload: true,
            api_access: true,
        }
    }

    pub fn is_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::BulkOrders => self.bulk_orders,
            Feature::Exports => self.exports,
            Feature::CsvUpload => self.csv_upload,
            Feature::ApiAccess => self.api_access,
        }
    }

    pub fn set(&mut self, feature: Feature, enabled: bool) {
        let flag = match feature {
            Feature::BulkOrders => &mut self.bulk_orders,
            Feature::Exports => &mut self.exports,
            Feature::CsvUpload => &mut self.csv_upload,
            Feature::ApiAccess => &mut self.api_access,
        };
        *flag = enabled;
    }
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self::all_enabled()
    }
}

/// Read-mostly lookup keyed by company. No process-wide cache: every check
/// reads the store, which creates the record on first use.
#[derive(Clone)]
pub struct FeatureGate {
    store: Arc<dyn ToggleStore>,
}

impl FeatureGate {
    pub fn new(store: Arc<dyn ToggleStore>) -> Self {
        Self { store }
    }

    pub async fn is_enabled(&self, company_id: CompanyId, feature: Feature) -> Result<bool, StoreError> {
        Ok(self.store.get_or_create(company_id).await?.is_enabled(feature))
    }

    pub async fn toggles(&self, company_id: CompanyId) -> Result<FeatureToggles, StoreError> {
        self.store.get_or_create(company_id).await
    }

    /// Write path; callers are responsible for the admin check.
    pub(crate) async fn set(
        &self,
        company_id: CompanyId,
        feature: Feature,
        enabled: bool,
    ) -> Result<FeatureToggles, StoreError> {
        let toggles = self.store.set(company_id, feature, enabled).await?;
        tracing::info!(
            company_id = %company_id,
            feature = %feature,
            enabled,
            "feature toggle updated"
        );
        Ok(toggles)
    }
}
