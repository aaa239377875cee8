//! Export generation: render the company's requested orders into a CSV
//! artifact, then flip the export to `ready`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use logiport_core::{Clock, CompanyId, DomainError, ExportId, UserId};
use logiport_exports::{render_csv, Export, ExportRow, ExportStatus};
use logiport_orders::Order;

use crate::artifacts::ArtifactStore;
use crate::jobs::{Job, JobHandler, JobKind, JobResult};
use crate::store::{StoreError, Stores};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Ready { rows: usize, excluded: usize },
    Failed { reason: String },
    Skipped { status: Option<ExportStatus> },
}

pub struct ExportGenerator {
    stores: Stores,
    artifacts: Arc<dyn ArtifactStore>,
    clock: Arc<dyn Clock>,
}

impl ExportGenerator {
    pub fn new(stores: Stores, artifacts: Arc<dyn ArtifactStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            stores,
            artifacts,
            clock,
        }
    }

    pub async fn generate(
        &self,
        company_id: CompanyId,
        export_id: ExportId,
    ) -> Result<ExportOutcome, StoreError> {
        let Some(export) = self.stores.exports.get(company_id, export_id).await? else {
            warn!(export_id = %export_id, company_id = %company_id, "export to generate not found");
            return Ok(ExportOutcome::Skipped { status: None });
        };
        if export.status() != ExportStatus::Pending {
            return Ok(ExportOutcome::Skipped {
                status: Some(export.status()),
            });
        }

        // Selection is scoped to the exporting company.
        let orders = self
            .stores
            .orders
            .get_many(company_id, export.order_ids())
            .await?;
        let excluded = export.order_ids().len() - orders.len();
        if excluded > 0 {
            warn!(
                export_id = %export_id,
                company_id = %company_id,
                excluded,
                "export request referenced orders outside the company; excluded"
            );
        }

        let rows = match self.rows(company_id, &orders).await? {
            Ok(rows) => rows,
            Err(reason) => return self.fail(export, reason).await,
        };
        let bytes = match render_csv(&rows) {
            Ok(bytes) => bytes,
            Err(e) => return self.fail(export, e.to_string()).await,
        };

        let name = format!("{company_id}/{export_id}.csv");
        let artifact = match self.artifacts.write(&name, bytes).await {
            Ok(artifact) => artifact,
            Err(e) => return self.fail(export, format!("artifact write failed: {e}")).await,
        };

        let mut export = export;
        export
            .mark_ready(artifact, self.clock.now())
            .map_err(|e| StoreError::Conflict(e.to_string()))?;
        self.stores.exports.complete(&export).await?;

        info!(
            export_id = %export_id,
            company_id = %company_id,
            requested_by = %export.requested_by(),
            rows = rows.len(),
            "export ready"
        );
        Ok(ExportOutcome::Ready {
            rows: rows.len(),
            excluded,
        })
    }

    /// Resolve every order into a row. The inner `Err` is a row-level failure.
    async fn rows(
        &self,
        company_id: CompanyId,
        orders: &[Order],
    ) -> Result<Result<Vec<ExportRow>, String>, StoreError> {
        let company = self
            .stores
            .directory
            .company(company_id)
            .await?
            .map(|c| c.name)
            .unwrap_or_else(|| company_id.to_string());

        let mut usernames: HashMap<UserId, String> = HashMap::new();
        let mut rows = Vec::with_capacity(orders.len());

        for order in orders {
            let (Some(product_id), Some(requested_by), Some(created_at)) =
                (order.product_id(), order.requested_by(), order.created_at())
            else {
                return Ok(Err(format!(
                    "order {} is incomplete",
                    order.reference_code()
                )));
            };

            let Some(product) = self.stores.products.get(company_id, product_id).await? else {
                return Ok(Err(format!(
                    "order {}: product {product_id} not found",
                    order.reference_code()
                )));
            };

            let created_by = match usernames.get(&requested_by) {
                Some(name) => name.clone(),
                None => {
                    let name = self
                        .stores
                        .directory
                        .profile(company_id, requested_by)
                        .await?
                        .map(|p| p.username)
                        .unwrap_or_else(|| requested_by.to_string());
                    usernames.insert(requested_by, name.clone());
                    name
                }
            };

            rows.push(ExportRow {
                reference_code: order.reference_code().to_string(),
                product: product.name().to_string(),
                sku: product.sku().to_string(),
                quantity: order.quantity(),
                status: order.status().to_string(),
                created_by,
                company: company.clone(),
                created_at,
            });
        }

        Ok(Ok(rows))
    }

    async fn fail(&self, mut export: Export, reason: String) -> Result<ExportOutcome, StoreError> {
        export
            .mark_failed(reason.clone(), self.clock.now())
            .map_err(|e: DomainError| StoreError::Conflict(e.to_string()))?;
        self.stores.exports.complete(&export).await?;
        warn!(export_id = %export.id_typed(), reason = %reason, "export failed");
        Ok(ExportOutcome::Failed { reason })
    }
}

#[async_trait]
impl JobHandler for ExportGenerator {
    async fn handle(&self, job: &Job) -> JobResult {
        let JobKind::GenerateExport { export_id } = &job.kind else {
            return JobResult::Fatal(format!("unexpected job kind: {}", job.kind.type_name()));
        };

        match self.generate(job.company_id, *export_id).await {
            Ok(_) => JobResult::Success,
            Err(e) if e.is_transient() => JobResult::Failure(e.to_string()),
            Err(e) => JobResult::Fatal(e.to_string()),
        }
    }
}
