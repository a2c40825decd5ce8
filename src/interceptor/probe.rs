//! Filesystem existence checks used while resolving overrides.

use std::path::Path;

use async_trait::async_trait;

/// Answers whether a candidate override file exists.
#[async_trait]
pub trait FileProbe: Send + Sync {
    async fn is_file(&self, path: &Path) -> bool;
}

/// Probes the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

#[async_trait]
impl FileProbe for FsProbe {
    async fn is_file(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }
}
