//! Export requests and downloads.

use std::sync::Arc;

use tracing::{error, info};

use logiport_auth::{Capability, Subject};
use logiport_core::{Clock, ExportId, OrderId};
use logiport_exports::Export;

use crate::artifacts::ArtifactStore;
use crate::features::{Feature, FeatureGate};
use crate::jobs::{Job, JobQueue};
use crate::services::{admit, require_feature, ServiceError};
use crate::store::Stores;

/// A ready export's CSV payload.
#[derive(Debug, Clone)]
pub struct Download {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct ExportService {
    stores: Stores,
    queue: Arc<dyn JobQueue>,
    gate: FeatureGate,
    artifacts: Arc<dyn ArtifactStore>,
    clock: Arc<dyn Clock>,
}

impl ExportService {
    pub fn new(
        stores: Stores,
        queue: Arc<dyn JobQueue>,
        gate: FeatureGate,
        artifacts: Arc<dyn ArtifactStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            stores,
            queue,
            gate,
            artifacts,
            clock,
        }
    }

    /// Record a pending export and queue its generation. Ids outside the
    /// caller's company are dropped at generation time.
    pub async fn create(
        &self,
        subject: &Subject,
        order_ids: Vec<OrderId>,
        note: Option<String>,
    ) -> Result<Export, ServiceError> {
        admit(self.stores.directory.as_ref(), subject, Capability::RequestExports).await?;
        require_feature(&self.gate, subject, Feature::Exports).await?;

        let export = Export::request(
            ExportId::new(),
            subject.company_id,
            subject.user_id,
            order_ids,
            note,
            self.clock.now(),
        )?;
        self.stores.exports.insert(&export).await?;

        self.queue
            .enqueue(Job::generate_export(subject.company_id, export.id_typed()))
            .await
            .map_err(|e| {
                error!(export_id = %export.id_typed(), error = %e, "export saved but not queued");
                ServiceError::from(e)
            })?;

        info!(
            export_id = %export.id_typed(),
            company_id = %subject.company_id,
            orders = export.order_ids().len(),
            "export requested"
        );
        Ok(export)
    }

    pub async fn get(&self, subject: &Subject, export_id: ExportId) -> Result<Export, ServiceError> {
        admit(self.stores.directory.as_ref(), subject, Capability::RequestExports).await?;
        self.stores
            .exports
            .get(subject.company_id, export_id)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    /// Only `ready` exports of the caller's company can be downloaded.
    pub async fn download(
        &self,
        subject: &Subject,
        export_id: ExportId,
    ) -> Result<Download, ServiceError> {
        let export = self.get(subject, export_id).await?;
        let artifact = export.downloadable()?;
        let bytes = self.artifacts.read(artifact).await?;
        Ok(Download {
            filename: format!("orders_export_{}.csv", export.created_at().format("%Y%m%d_%H%M%S")),
            bytes,
        })
    }
}
