//! Read-only clip catalog.

use std::path::Path;

use async_trait::async_trait;
use cstudio_models::{Clip, ClipFilter, ClipId};
use tracing::info;

use crate::error::{WorkerError, WorkerResult};

/// Clip lookup. Results keep catalog order, which selection relies on
/// for tie-breaking.
#[async_trait]
pub trait ClipCatalog: Send + Sync {
    async fn get_clip(&self, id: ClipId) -> WorkerResult<Option<Clip>>;

    async fn find_clips(&self, filter: &ClipFilter) -> WorkerResult<Vec<Clip>>;
}

/// Catalog held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    clips: Vec<Clip>,
}

impl InMemoryCatalog {
    pub fn new(clips: Vec<Clip>) -> Self {
        Self { clips }
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

#[async_trait]
impl ClipCatalog for InMemoryCatalog {
    async fn get_clip(&self, id: ClipId) -> WorkerResult<Option<Clip>> {
        Ok(self.clips.iter().find(|c| c.id == id).cloned())
    }

    async fn find_clips(&self, filter: &ClipFilter) -> WorkerResult<Vec<Clip>> {
        Ok(self.clips.iter().filter(|c| filter.matches(c)).cloned().collect())
    }
}

/// Catalog loaded once from a JSON array of clips.
#[derive(Debug, Clone)]
pub struct JsonFileCatalog {
    inner: InMemoryCatalog,
}

impl JsonFileCatalog {
    pub async fn load(path: impl AsRef<Path>) -> WorkerResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            WorkerError::config_error(format!("cannot read clip catalog {}: {}", path.display(), e))
        })?;
        let clips: Vec<Clip> = serde_json::from_str(&raw)?;

        info!(path = %path.display(), clips = clips.len(), "Loaded clip catalog");
        Ok(Self {
            inner: InMemoryCatalog::new(clips),
        })
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl ClipCatalog for JsonFileCatalog {
    async fn get_clip(&self, id: ClipId) -> WorkerResult<Option<Clip>> {
        self.inner.get_clip(id).await
    }

    async fn find_clips(&self, filter: &ClipFilter) -> WorkerResult<Vec<Clip>> {
        self.inner.find_clips(filter).await
    }
}
