use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use logiport_core::{CompanyId, DomainError, DomainResult, Entity, ExportId, OrderId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    Pending,
    Ready,
    Failed,
}

impl ExportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStatus::Pending => "pending",
            ExportStatus::Ready => "ready",
            ExportStatus::Failed => "failed",
        }
    }
}

impl core::fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque handle returned by the artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Export {
    id: ExportId,
    company_id: CompanyId,
    requested_by: UserId,
    order_ids: Vec<OrderId>,
    status: ExportStatus,
    artifact: Option<ArtifactRef>,
    note: Option<String>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Export {
    pub fn request(
        id: ExportId,
        company_id: CompanyId,
        requested_by: UserId,
        order_ids: Vec<OrderId>,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if order_ids.is_empty() {
            return Err(DomainError::validation("an export needs at least one order"));
        }
        let mut order_ids = order_ids;
        order_ids.sort();
        order_ids.dedup();

        let note = note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        Ok(Self {
            id,
            company_id,
            requested_by,
            order_ids,
            status: ExportStatus::Pending,
            artifact: None,
            note,
            failure_reason: None,
            created_at: now,
            completed_at: None,
        })
    }

    pub fn id_typed(&self) -> ExportId {
        self.id
    }

    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }

    pub fn order_ids(&self) -> &[OrderId] {
        &self.order_ids
    }

    pub fn status(&self) -> ExportStatus {
        self.status
    }

    pub fn artifact(&self) -> Option<&ArtifactRef> {
        self.artifact.as_ref()
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Only called once the artifact has been fully written.
    pub fn mark_ready(&mut self, artifact: ArtifactRef, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_pending()?;
        self.status = ExportStatus::Ready;
        self.artifact = Some(artifact);
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_pending()?;
        self.status = ExportStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.completed_at = Some(now);
        Ok(())
    }

    /// The artifact, if the export may be downloaded.
    pub fn downloadable(&self) -> DomainResult<&ArtifactRef> {
        match (self.status, self.artifact.as_ref()) {
            (ExportStatus::Ready, Some(artifact)) => Ok(artifact),
            _ => Err(DomainError::conflict(format!(
                "export {} is {}, not ready",
                self.id, self.status
            ))),
        }
    }

    fn ensure_pending(&self) -> DomainResult<()> {
        if self.status != ExportStatus::Pending {
            return Err(DomainError::conflict(format!(
                "export {} already {}",
                self.id, self.status
            )));
        }
        Ok(())
    }
}

impl Entity for Export {
    type Id = ExportId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn company_id(&self) -> CompanyId {
        self.company_id
    }
}
