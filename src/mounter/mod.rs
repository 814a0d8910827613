//! Local Mounters
//!
//! One [`Mounter`] per backend family:
//! - Block device: Spectrum Scale cluster filesystem
//! - NFS: Spectrum Scale NFS and SoftLayer file storage
//! - SCBE: iSCSI/FC multipath block volumes
//!
//! The [`MounterRegistry`] builds each mounter on first use and hands out the
//! same instance afterwards.

pub mod block_device;
pub mod executor;
pub mod nfs;
pub mod scbe;

pub use block_device::BlockDeviceMounter;
pub use executor::{CommandOutput, Executor, ExecutorRef, SystemExecutor};
pub use nfs::{NfsMounter, NfsMounterConfig};
pub use scbe::{ScbeMounter, ScbeMounterConfig};

use crate::domain::ports::{MounterRef, SCBE, SOFTLAYER_NFS, SPECTRUM_SCALE, SPECTRUM_SCALE_NFS};
use crate::error::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Combined mounter configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MounterConfig {
    pub nfs: NfsMounterConfig,
    pub scbe: ScbeMounterConfig,
}

// =============================================================================
// Factory
// =============================================================================

/// Builds a mounter for a backend name, `None` if the backend is unknown
pub trait MounterFactory: Send + Sync {
    fn create(&self, backend: &str) -> Option<MounterRef>;
}

/// Factory for the built-in mounters
pub struct BackendMounterFactory {
    config: MounterConfig,
    executor: ExecutorRef,
}

impl BackendMounterFactory {
    pub fn new(config: MounterConfig, executor: ExecutorRef) -> Self {
        Self { config, executor }
    }

    /// Factory running real commands on this node
    pub fn system(config: MounterConfig) -> Self {
        Self::new(config, Arc::new(SystemExecutor))
    }
}

impl MounterFactory for BackendMounterFactory {
    fn create(&self, backend: &str) -> Option<MounterRef> {
        match backend {
            SPECTRUM_SCALE => Some(Arc::new(BlockDeviceMounter::new())),
            SPECTRUM_SCALE_NFS | SOFTLAYER_NFS => Some(Arc::new(NfsMounter::new(
                backend,
                self.config.nfs.clone(),
                self.executor.clone(),
            ))),
            SCBE => Some(Arc::new(ScbeMounter::new(
                self.config.scbe.clone(),
                self.executor.clone(),
            ))),
            _ => None,
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Lazily populated cache of one mounter per backend
pub struct MounterRegistry {
    factory: Box<dyn MounterFactory>,
    mounters: DashMap<String, MounterRef>,
}

impl MounterRegistry {
    pub fn new(factory: impl MounterFactory + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            mounters: DashMap::new(),
        }
    }

    /// Return the mounter for `backend`, building it on first use.
    ///
    /// Concurrent first calls for the same backend construct it once.
    pub fn resolve(&self, backend: &str) -> Result<MounterRef> {
        let cached = self.mounters.get(backend).map(|m| m.value().clone());
        if let Some(mounter) = cached {
            return Ok(mounter);
        }

        match self.mounters.entry(backend.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let mounter = self.factory.create(backend).ok_or_else(|| {
                    debug!("No mounter for backend {}", backend);
                    Error::MounterNotFound {
                        backend: backend.to_string(),
                    }
                })?;
                info!("Created mounter for backend {}", backend);
                entry.insert(mounter.clone());
                Ok(mounter)
            }
        }
    }

    /// Backends with a constructed mounter, sorted
    pub fn cached_backends(&self) -> Vec<String> {
        let mut backends: Vec<String> = self.mounters.iter().map(|e| e.key().clone()).collect();
        backends.sort();
        backends
    }
}
