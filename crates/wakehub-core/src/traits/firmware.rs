//! Firmware download and apply

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Firmware package advertised by the metadata endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwarePackageInfo {
    /// Binary download URL
    pub url: String,
    /// Human-readable version
    pub version: String,
    /// Integer version code, `-1` when absent
    pub version_code: i32,
    /// Optional release tag
    pub tag: String,
    /// Image size in bytes, 0 when unknown
    pub size: u64,
    /// Release timestamp as published
    pub released_at: String,
}

/// Download progress of a firmware image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    /// Bytes written so far
    pub bytes: u64,
    /// Expected total, 0 when unknown
    pub total_bytes: u64,
}

impl TransferProgress {
    /// Create a progress value
    pub fn new(bytes: u64, total_bytes: u64) -> Self {
        Self { bytes, total_bytes }
    }

    /// Completion in percent (0..=100), 0 while the total is unknown
    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 0;
        }
        let pct = self.bytes.saturating_mul(100) / self.total_bytes;
        pct.min(100) as u8
    }
}

/// Downloads and applies a firmware image
#[async_trait]
pub trait FirmwareUpdater: Send + Sync {
    /// Fetch `package.url` and apply it
    ///
    /// `progress` is called as bytes arrive. `Ok(())` means the image was
    /// written and verified; the restart is left to the caller.
    async fn install(
        &self,
        package: &FirmwarePackageInfo,
        progress: &mut (dyn FnMut(TransferProgress) + Send),
    ) -> Result<(), crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_bounded_and_handles_unknown_total() {
        assert_eq!(TransferProgress::new(10, 0).percent(), 0);
        assert_eq!(TransferProgress::new(50, 200).percent(), 25);
        assert_eq!(TransferProgress::new(300, 200).percent(), 100);
    }
}
