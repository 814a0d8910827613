//! NFS Mounter
//!
//! Mounts NFS exports (Spectrum Scale NFS, SoftLayer file storage) under a
//! local mount root. The local path is derived from the share address so
//! that unmount can recompute it from the volume config alone.

use crate::domain::ports::{Mounter, VolumeConfig};
use crate::error::{Error, Result};
use crate::mounter::executor::{is_mountpoint, run_checked, ExecutorRef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Volume config key carrying the `host:/export` address
pub const NFS_SHARE_KEY: &str = "nfs_share";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the NFS mounter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NfsMounterConfig {
    /// Directory under which shares are mounted
    pub mount_root: PathBuf,
    /// Extra `-o` options passed to `mount`
    pub mount_options: Option<String>,
}

impl Default for NfsMounterConfig {
    fn default() -> Self {
        Self {
            mount_root: PathBuf::from("/mnt/ubiquity"),
            mount_options: None,
        }
    }
}

// =============================================================================
// NFS Mounter
// =============================================================================

/// Mounter for NFS-backed volumes
pub struct NfsMounter {
    backend: String,
    config: NfsMounterConfig,
    executor: ExecutorRef,
}

impl NfsMounter {
    /// Create a mounter serving `backend`
    pub fn new(backend: &str, config: NfsMounterConfig, executor: ExecutorRef) -> Self {
        Self {
            backend: backend.to_string(),
            config,
            executor,
        }
    }

    /// Local path for a `host:/export` share
    pub fn local_mountpoint(&self, share: &str) -> Result<PathBuf> {
        let (host, export) = share
            .split_once(':')
            .ok_or_else(|| Error::Validation(format!("invalid NFS share address: {}", share)))?;
        if host.is_empty() || host.contains('/') {
            return Err(Error::Validation(format!("invalid NFS host in share: {}", share)));
        }

        let mut path = self.config.mount_root.join(host);
        for component in Path::new(export).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::RootDir | Component::CurDir => {}
                _ => {
                    return Err(Error::Validation(format!(
                        "invalid NFS export path in share: {}",
                        share
                    )))
                }
            }
        }
        Ok(path)
    }

    fn share<'a>(&self, config: &'a VolumeConfig) -> Result<&'a str> {
        config
            .get_str(NFS_SHARE_KEY)
            .ok_or_else(|| Error::Validation(format!("volume config is missing '{}'", NFS_SHARE_KEY)))
    }

    async fn mount_share(&self, config: &VolumeConfig) -> Result<String> {
        let share = self.share(config)?;
        let local = self.local_mountpoint(share)?;
        let local_str = local.to_string_lossy().to_string();

        tokio::fs::create_dir_all(&local).await?;

        if is_mountpoint(self.executor.as_ref(), &local_str).await? {
            debug!("NFS share {} already mounted at {}", share, local_str);
            return Ok(local_str);
        }

        let mut args = vec!["-t", "nfs"];
        if let Some(options) = self.config.mount_options.as_deref() {
            args.push("-o");
            args.push(options);
        }
        args.push(share);
        args.push(&local_str);

        run_checked(self.executor.as_ref(), "mount", &args).await?;

        info!("Mounted NFS share {} at {}", share, local_str);
        Ok(local_str)
    }

    async fn unmount_share(&self, config: &VolumeConfig) -> Result<()> {
        let share = self.share(config)?;

        let local = self.local_mountpoint(share)?;
        let local_str = local.to_string_lossy().to_string();

        if is_mountpoint(self.executor.as_ref(), &local_str).await? {
            run_checked(self.executor.as_ref(), "umount", &[&local_str]).await?;
            info!("Unmounted NFS share {} from {}", share, local_str);
        } else {
            warn!("{} is not mounted, skipping umount", local_str);
        }

        match tokio::fs::remove_dir(&local).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Mounter for NfsMounter {
    fn backend(&self) -> &str {
        &self.backend
    }

    async fn mount(&self, _mountpoint: &str, config: &VolumeConfig) -> Result<String> {
        self.mount_share(config)
            .await
            .map_err(|e| Error::MountFailed {
                backend: self.backend.clone(),
                reason: e.to_string(),
            })
    }

    async fn unmount(&self, config: &VolumeConfig) -> Result<()> {
        self.unmount_share(config)
            .await
            .map_err(|e| Error::UnmountFailed {
                backend: self.backend.clone(),
                reason: e.to_string(),
            })
    }

    async fn action_after_detach(&self, _config: &VolumeConfig) -> Result<()> {
        Ok(())
    }
}
