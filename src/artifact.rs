//! # Temp Artifact Management
//!
//! Persists a request's payload to a uniquely named on-disk location for
//! the model to read, and guarantees removal on every exit path.
//!
//! ## Lifecycle:
//! An artifact lives for exactly one request: `persist` immediately before
//! the model invocation, `release` immediately after. The `Drop` guard
//! covers the paths that never reach `release` — early returns, handler
//! errors, panics — so a failed transcription cannot leak its file.
//!
//! ## Naming:
//! `<tmpdir>/media_<uuid-v4>.wav`. The v4 identifier makes collisions
//! between concurrent requests a non-issue. The extension is fixed to
//! `.wav` regardless of the sniffed format, matching the original design.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiResult;

/// A payload written to disk for the duration of one request.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    released: bool,
}

impl TempArtifact {
    /// Write the payload to a freshly named temp path.
    ///
    /// Disk failures surface as `ApiError::Storage` via the io conversion.
    pub async fn persist(bytes: &[u8]) -> ApiResult<Self> {
        let path = std::env::temp_dir().join(format!("media_{}.wav", Uuid::new_v4()));
        tokio::fs::write(&path, bytes).await?;
        debug!(path = %path.display(), size = bytes.len(), "persisted temp artifact");

        Ok(Self {
            path,
            released: false,
        })
    }

    /// The on-disk location, handed to the transcription engine.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file. Removal failures are logged, not propagated —
    /// by this point the request outcome is already decided.
    pub async fn release(mut self) {
        self.released = true;
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            warn!(path = %self.path.display(), error = %e, "failed to remove temp artifact");
        } else {
            debug!(path = %self.path.display(), "released temp artifact");
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if !self.released {
            // Synchronous fallback for paths that bypassed release().
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %e, "failed to remove temp artifact on drop");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_persist_writes_payload() {
        let artifact = TempArtifact::persist(b"RIFF fake audio").await.unwrap();
        let on_disk = tokio::fs::read(artifact.path()).await.unwrap();
        assert_eq!(on_disk, b"RIFF fake audio");
        artifact.release().await;
    }

    #[tokio::test]
    async fn test_release_removes_file() {
        let artifact = TempArtifact::persist(b"payload").await.unwrap();
        let path = artifact.path().to_path_buf();
        assert!(path.exists());

        artifact.release().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_drop_removes_file_on_failure_path() {
        // Simulates a transcription failure where release() is never
        // reached: the guard must still clean up.
        let path = {
            let artifact = TempArtifact::persist(b"doomed payload").await.unwrap();
            artifact.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_concurrent_persists_get_distinct_paths() {
        let mut handles = Vec::new();
        for i in 0..32u8 {
            handles.push(tokio::spawn(async move {
                TempArtifact::persist(&[i; 16]).await.unwrap()
            }));
        }

        let mut artifacts = Vec::new();
        for handle in handles {
            artifacts.push(handle.await.unwrap());
        }

        let paths: HashSet<PathBuf> = artifacts
            .iter()
            .map(|a| a.path().to_path_buf())
            .collect();
        assert_eq!(paths.len(), 32);

        for artifact in artifacts {
            artifact.release().await;
        }
    }
}
