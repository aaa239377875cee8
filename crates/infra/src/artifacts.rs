//! Storage for generated export artifacts.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use logiport_exports::ArtifactRef;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("invalid artifact name: {0}")]
    InvalidName(String),

    #[error("artifact io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store the complete artifact. The reference is only returned once every
    /// byte is durable.
    async fn write(&self, name: &str, bytes: Vec<u8>) -> Result<ArtifactRef, ArtifactError>;

    async fn read(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, ArtifactError>;
}

/// Names are relative paths like `<company>/<export>.csv`; nothing may escape.
fn validate_name(name: &str) -> Result<(), ArtifactError> {
    let path = Path::new(name);
    let ok = !name.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if ok {
        Ok(())
    } else {
        Err(ArtifactError::InvalidName(name.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn write(&self, name: &str, bytes: Vec<u8>) -> Result<ArtifactRef, ArtifactError> {
        validate_name(name)?;
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| ArtifactError::Unavailable("artifact lock poisoned".to_string()))?;
        blobs.insert(name.to_string(), bytes);
        Ok(ArtifactRef::new(name))
    }

    async fn read(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, ArtifactError> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|_| ArtifactError::Unavailable("artifact lock poisoned".to_string()))?;
        blobs
            .get(artifact.as_str())
            .cloned()
            .ok_or_else(|| ArtifactError::NotFound(artifact.to_string()))
    }
}

/// Artifacts as files under a root directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, ArtifactError> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn write(&self, name: &str, bytes: Vec<u8>) -> Result<ArtifactRef, ArtifactError> {
        let path = self.path_for(name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write aside and rename so a reader never sees a partial file.
        let partial = path.with_extension("partial");
        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, &path).await?;

        Ok(ArtifactRef::new(name))
    }

    async fn read(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, ArtifactError> {
        let path = self.path_for(artifact.as_str())?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ArtifactError::NotFound(artifact.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
