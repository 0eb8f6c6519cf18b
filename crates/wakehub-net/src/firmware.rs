//! Firmware download into a staging file
//!
//! The image is streamed to `<target>.part`, checked against the advertised
//! size and renamed over `<target>` only when complete. A failed download
//! never touches the previously staged image.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use wakehub_core::traits::{FirmwarePackageInfo, FirmwareUpdater, TransferProgress};
use wakehub_core::{Error, Result};

use crate::http::{ReqwestHttpClient, map_reqwest_error};

/// Bound on connecting and receiving the response head
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Bound on the gap between two body chunks
pub const CHUNK_TIMEOUT: Duration = Duration::from_secs(15);

/// A partially written image
#[derive(Debug)]
pub struct StagingFile {
    file: File,
    part_path: PathBuf,
    target: PathBuf,
    written: u64,
}

impl StagingFile {
    /// Create `<target>.part`, truncating any leftover
    pub async fn create(target: &Path) -> Result<Self> {
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut part = target.as_os_str().to_owned();
        part.push(".part");
        let part_path = PathBuf::from(part);
        let file = File::create(&part_path).await?;

        Ok(Self {
            file,
            part_path,
            target: target.to_path_buf(),
            written: 0,
        })
    }

    /// Append a chunk
    pub async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Verify the size (0 = unknown) and move the image into place
    pub async fn commit(mut self, expected_size: u64) -> Result<PathBuf> {
        if self.written == 0 {
            self.abort().await;
            return Err(Error::firmware("Empty firmware image"));
        }
        if expected_size > 0 && self.written != expected_size {
            let written = self.written;
            self.abort().await;
            return Err(Error::firmware(format!(
                "Size mismatch: expected {} bytes, got {}",
                expected_size, written
            )));
        }

        self.file.flush().await?;
        self.file.sync_all().await?;
        tokio::fs::rename(&self.part_path, &self.target).await?;
        Ok(self.target)
    }

    /// Remove the partial file
    pub async fn abort(self) {
        drop(self.file);
        if let Err(e) = tokio::fs::remove_file(&self.part_path).await {
            debug!("Could not remove {}: {}", self.part_path.display(), e);
        }
    }
}

/// Downloads firmware images into a fixed staging path
///
/// Applying the staged image is left to the process supervisor once the
/// daemon exits with the restart code.
#[derive(Debug, Clone)]
pub struct FileFirmwareUpdater {
    http: ReqwestHttpClient,
    target: PathBuf,
}

impl FileFirmwareUpdater {
    pub fn new(http: ReqwestHttpClient, target: impl Into<PathBuf>) -> Self {
        Self {
            http,
            target: target.into(),
        }
    }

    /// Where a completed image lands
    pub fn target(&self) -> &Path {
        &self.target
    }
}

#[async_trait]
impl FirmwareUpdater for FileFirmwareUpdater {
    async fn install(
        &self,
        package: &FirmwarePackageInfo,
        progress: &mut (dyn FnMut(TransferProgress) + Send),
    ) -> Result<()> {
        let url = package.url.as_str();
        let mut response = timeout(CONNECT_TIMEOUT, self.http.inner().get(url).send())
            .await
            .map_err(|_| Error::timeout(format!("GET {}", url)))?
            .map_err(|e| map_reqwest_error(url, e))?;

        if !response.status().is_success() {
            return Err(Error::firmware(format!(
                "Download failed: HTTP {}",
                response.status()
            )));
        }

        let total = response.content_length().unwrap_or(package.size);
        let mut staging = StagingFile::create(&self.target).await?;
        progress(TransferProgress::new(0, total));

        loop {
            let next = match timeout(CHUNK_TIMEOUT, response.chunk()).await {
                Ok(Ok(chunk)) => chunk,
                Ok(Err(e)) => {
                    staging.abort().await;
                    return Err(map_reqwest_error(url, e));
                }
                Err(_) => {
                    warn!("Firmware download stalled after {} bytes", staging.written());
                    staging.abort().await;
                    return Err(Error::timeout("Firmware download stalled"));
                }
            };
            let Some(chunk) = next else { break };

            if let Err(e) = staging.write(&chunk).await {
                staging.abort().await;
                return Err(e);
            }
            progress(TransferProgress::new(staging.written(), total));
        }

        let path = staging.commit(package.size).await?;
        info!("Firmware {} staged at {}", package.version, path.display());
        Ok(())
    }
}
