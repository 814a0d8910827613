//! SCBE Multipath Mounter
//!
//! Mounts SCBE block volumes reached over iSCSI/FC multipath. The device is
//! located by WWN in `multipath -ll`, formatted on first use and mounted at
//! `<mount root>/<wwn>`. After the server detaches the volume, the stale
//! multipath map is flushed.

use crate::domain::ports::{Mounter, VolumeConfig, SCBE};
use crate::error::{Error, Result};
use crate::mounter::executor::{is_mountpoint, run_checked, ExecutorRef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Volume config key carrying the volume WWN
pub const WWN_KEY: &str = "wwn";
/// Volume config key carrying the filesystem type
pub const FSTYPE_KEY: &str = "fstype";

/// `blkid` exit code when no filesystem signature was found
const BLKID_NOT_FOUND: i32 = 2;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the SCBE mounter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScbeMounterConfig {
    /// Skip the iSCSI session rescan (FC-only hosts)
    pub skip_rescan_iscsi: bool,
    /// Directory under which devices are mounted
    pub mount_root: PathBuf,
    /// Filesystem created when the volume config names none
    pub default_fstype: String,
}

impl Default for ScbeMounterConfig {
    fn default() -> Self {
        Self {
            skip_rescan_iscsi: false,
            mount_root: PathBuf::from("/ubiquity"),
            default_fstype: "ext4".to_string(),
        }
    }
}

// =============================================================================
// SCBE Mounter
// =============================================================================

/// Mounter for SCBE multipath block volumes
pub struct ScbeMounter {
    backend: String,
    config: ScbeMounterConfig,
    executor: ExecutorRef,
}

impl ScbeMounter {
    pub fn new(config: ScbeMounterConfig, executor: ExecutorRef) -> Self {
        Self {
            backend: SCBE.to_string(),
            config,
            executor,
        }
    }

    fn wwn<'a>(&self, config: &'a VolumeConfig) -> Result<&'a str> {
        let wwn = config
            .get_str(WWN_KEY)
            .ok_or_else(|| Error::Validation(format!("volume config is missing '{}'", WWN_KEY)))?;
        if !wwn.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::Validation(format!("invalid WWN: {}", wwn)));
        }
        Ok(wwn)
    }

    fn mount_dir(&self, wwn: &str) -> PathBuf {
        self.config.mount_root.join(wwn)
    }

    /// Refresh iSCSI sessions and multipath maps
    async fn rescan(&self) -> Result<()> {
        if !self.config.skip_rescan_iscsi {
            let output = self
                .executor
                .execute("iscsiadm", &["-m", "session", "--rescan"])
                .await?;
            if !output.success() {
                warn!("iSCSI rescan failed: {}", output.stderr.trim());
            }
        }
        run_checked(self.executor.as_ref(), "multipath", &["-r"]).await?;
        Ok(())
    }

    /// Find the multipath map name for a WWN
    async fn discover(&self, wwn: &str) -> Result<Option<String>> {
        let output = run_checked(self.executor.as_ref(), "multipath", &["-ll"]).await?;
        let name = output
            .stdout
            .lines()
            .find_map(|line| map_name_for(line, wwn))
            .map(str::to_string);

        debug!("Multipath map for {}: {:?}", wwn, name);
        Ok(name)
    }

    async fn ensure_filesystem(&self, device: &str, fstype: &str) -> Result<()> {
        let output = self.executor.execute("blkid", &[device]).await?;
        if output.success() {
            return Ok(());
        }
        if output.status != Some(BLKID_NOT_FOUND) {
            return Err(Error::CommandFailed {
                command: format!("blkid {}", device),
                reason: output.stderr.trim().to_string(),
            });
        }

        info!("Creating {} filesystem on {}", fstype, device);
        run_checked(self.executor.as_ref(), "mkfs", &["-t", fstype, device]).await?;
        Ok(())
    }

    async fn mount_device(&self, config: &VolumeConfig) -> Result<String> {
        let wwn = self.wwn(config)?;
        let fstype = config
            .get_str(FSTYPE_KEY)
            .unwrap_or(self.config.default_fstype.as_str());

        self.rescan().await?;

        let name = self.discover(wwn).await?.ok_or_else(|| Error::CommandFailed {
            command: "multipath -ll".into(),
            reason: format!("no multipath device found for WWN {}", wwn),
        })?;
        let device = format!("/dev/mapper/{}", name);

        self.ensure_filesystem(&device, fstype).await?;

        let dir = self.mount_dir(wwn);
        let dir_str = dir.to_string_lossy().to_string();
        tokio::fs::create_dir_all(&dir).await?;

        if is_mountpoint(self.executor.as_ref(), &dir_str).await? {
            debug!("{} already mounted at {}", device, dir_str);
        } else {
            run_checked(
                self.executor.as_ref(),
                "mount",
                &["-t", fstype, &device, &dir_str],
            )
            .await?;
            info!("Mounted {} at {}", device, dir_str);
        }

        Ok(dir_str)
    }

    async fn unmount_device(&self, config: &VolumeConfig) -> Result<()> {
        let wwn = self.wwn(config)?;
        let dir = self.mount_dir(wwn);
        let dir_str = dir.to_string_lossy().to_string();

        if is_mountpoint(self.executor.as_ref(), &dir_str).await? {
            run_checked(self.executor.as_ref(), "umount", &[&dir_str]).await?;
            info!("Unmounted {}", dir_str);
        } else {
            warn!("{} is not mounted, skipping umount", dir_str);
        }

        match tokio::fs::remove_dir(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn cleanup_device(&self, config: &VolumeConfig) -> Result<()> {
        let wwn = self.wwn(config)?;

        match self.discover(wwn).await? {
            Some(name) => {
                info!("Flushing multipath map {} for WWN {}", name, wwn);
                run_checked(self.executor.as_ref(), "multipath", &["-f", &name]).await?;
            }
            None => debug!("No multipath map left for WWN {}", wwn),
        }

        self.rescan().await
    }
}

#[async_trait]
impl Mounter for ScbeMounter {
    fn backend(&self) -> &str {
        &self.backend
    }

    async fn mount(&self, _mountpoint: &str, config: &VolumeConfig) -> Result<String> {
        self.mount_device(config)
            .await
            .map_err(|e| Error::MountFailed {
                backend: self.backend.clone(),
                reason: e.to_string(),
            })
    }

    async fn unmount(&self, config: &VolumeConfig) -> Result<()> {
        self.unmount_device(config)
            .await
            .map_err(|e| Error::UnmountFailed {
                backend: self.backend.clone(),
                reason: e.to_string(),
            })
    }

    async fn action_after_detach(&self, config: &VolumeConfig) -> Result<()> {
        self.cleanup_device(config)
            .await
            .map_err(|e| Error::PostDetachFailed {
                backend: self.backend.clone(),
                reason: e.to_string(),
            })
    }
}

/// Map name from a `multipath -ll` header line whose WWID is `wwn`.
///
/// Header lines are `<alias> (<wwid>) dm-N ...` or, without friendly names,
/// `<wwid> dm-N ...`. The WWID may carry the NAA type prefix `3`.
fn map_name_for<'a>(line: &'a str, wwn: &str) -> Option<&'a str> {
    let mut tokens = line.split_whitespace();
    let name = tokens.next()?;
    let wwid = match tokens.next() {
        Some(t) if t.starts_with('(') && t.ends_with(')') => &t[1..t.len() - 1],
        _ => name,
    };
    let is_wwn = |id: &str| id.eq_ignore_ascii_case(wwn);
    if is_wwn(wwid) || wwid.strip_prefix('3').is_some_and(is_wwn) {
        Some(name)
    } else {
        None
    }
}
