//! Block Device Mounter
//!
//! Serves Spectrum Scale volumes. The cluster filesystem is already attached
//! to every node by the storage cluster, so the mountpoint reported by the
//! remote attach call is directly usable once it is verified.

use crate::domain::ports::{Mounter, VolumeConfig, SPECTRUM_SCALE};
use crate::error::{Error, Result};
use async_trait::async_trait;
use tracing::{debug, info};

/// Mounter for natively attached cluster filesystems
#[derive(Debug, Clone)]
pub struct BlockDeviceMounter {
    backend: String,
}

impl BlockDeviceMounter {
    pub fn new() -> Self {
        Self {
            backend: SPECTRUM_SCALE.to_string(),
        }
    }

    async fn verify_path(&self, mountpoint: &str) -> Result<()> {
        if mountpoint.is_empty() {
            return Err(Error::Validation("remote attach returned an empty mountpoint".into()));
        }
        let metadata = tokio::fs::metadata(mountpoint).await?;
        if !metadata.is_dir() {
            return Err(Error::Validation(format!("{} is not a directory", mountpoint)));
        }
        Ok(())
    }
}

impl Default for BlockDeviceMounter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mounter for BlockDeviceMounter {
    fn backend(&self) -> &str {
        &self.backend
    }

    async fn mount(&self, mountpoint: &str, _config: &VolumeConfig) -> Result<String> {
        self.verify_path(mountpoint)
            .await
            .map_err(|e| Error::MountFailed {
                backend: self.backend.clone(),
                reason: e.to_string(),
            })?;

        info!("Volume available at {}", mountpoint);
        Ok(mountpoint.to_string())
    }

    async fn unmount(&self, _config: &VolumeConfig) -> Result<()> {
        debug!("Nothing to unmount for {}", self.backend);
        Ok(())
    }

    async fn action_after_detach(&self, _config: &VolumeConfig) -> Result<()> {
        Ok(())
    }
}
