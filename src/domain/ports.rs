//! Domain Ports - Core trait definitions for the volume plugin
//!
//! These traits define the boundaries between the lifecycle logic and
//! external systems: the remote storage API and the local mount actions.
//! Request and response bodies mirror the remote server's wire format.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// Backends
// =============================================================================

/// Spectrum Scale native filesystem backend
pub const SPECTRUM_SCALE: &str = "spectrum-scale";
/// Spectrum Scale exported over NFS
pub const SPECTRUM_SCALE_NFS: &str = "spectrum-scale-nfs";
/// SoftLayer file storage over NFS
pub const SOFTLAYER_NFS: &str = "softlayer-nfs";
/// Spectrum Control Base Edition (iSCSI/FC multipath block storage)
pub const SCBE: &str = "scbe";

// =============================================================================
// Volume
// =============================================================================

/// A volume as reported by the remote storage server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Volume {
    /// Volume name, unique on the remote server
    pub name: String,
    /// Owning backend identifier
    #[serde(default, deserialize_with = "null_as_default")]
    pub backend: String,
    /// Capacity in bytes
    #[serde(default)]
    pub capacity_bytes: u64,
    /// Opaque metadata
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: BTreeMap<String, String>,
    /// Mountpoint, empty until attached
    #[serde(default, deserialize_with = "null_as_default")]
    pub mountpoint: String,
    /// Creation time recorded by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Backend-specific attributes needed to mount a single volume
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeConfig(pub serde_json::Map<String, serde_json::Value>);

impl VolumeConfig {
    /// Create an empty config
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the config for chaining
    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Get a non-empty string attribute
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }
}

// =============================================================================
// Remote Requests
// =============================================================================

/// Activate the given backends on the remote server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActivateRequest {
    pub backends: Vec<String>,
    pub opts: BTreeMap<String, String>,
}

/// Create a volume on the remote server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateVolumeRequest {
    pub name: String,
    pub backend: String,
    /// Capacity as an unsigned byte count
    pub capacity_bytes: u64,
    pub metadata: BTreeMap<String, String>,
    /// Free-form options (capacity constraints plus caller parameters)
    pub opts: serde_json::Map<String, serde_json::Value>,
}

/// Remove a volume from the remote server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoveVolumeRequest {
    pub name: String,
}

/// Fetch a single volume
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetVolumeRequest {
    pub name: String,
}

/// Fetch a volume's backend-specific config
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetVolumeConfigRequest {
    pub name: String,
}

/// List volumes, optionally restricted to some backends
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListVolumesRequest {
    pub backends: Vec<String>,
}

/// Attach a volume to a host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttachRequest {
    pub name: String,
    pub host: String,
}

/// Detach a volume from a host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DetachRequest {
    pub name: String,
    pub host: String,
}

// =============================================================================
// Storage Client Port
// =============================================================================

/// Port for volume lifecycle operations against the storage server
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Activate backends; idempotent per client
    async fn activate(&self, request: ActivateRequest) -> Result<()>;

    /// Create a volume
    async fn create_volume(&self, request: CreateVolumeRequest) -> Result<()>;

    /// Remove a volume
    async fn remove_volume(&self, request: RemoveVolumeRequest) -> Result<()>;

    /// Get a volume
    async fn get_volume(&self, request: GetVolumeRequest) -> Result<Volume>;

    /// Get a volume's backend config
    async fn get_volume_config(&self, request: GetVolumeConfigRequest) -> Result<VolumeConfig>;

    /// List volumes
    async fn list_volumes(&self, request: ListVolumesRequest) -> Result<Vec<Volume>>;

    /// Attach remotely and mount locally, returning the local mountpoint
    async fn attach(&self, request: AttachRequest) -> Result<String>;

    /// Unmount locally and detach remotely
    async fn detach(&self, request: DetachRequest) -> Result<()>;
}

// =============================================================================
// Mounter Port
// =============================================================================

/// Port for the local mount actions of one backend family
#[async_trait]
pub trait Mounter: Send + Sync {
    /// Backend family this mounter serves
    fn backend(&self) -> &str;

    /// Make the volume usable on this node, returning the local mountpoint.
    /// `mountpoint` is the token reported by the remote attach call.
    async fn mount(&self, mountpoint: &str, config: &VolumeConfig) -> Result<String>;

    /// Reverse the mount steps
    async fn unmount(&self, config: &VolumeConfig) -> Result<()>;

    /// Backend cleanup, run only after the remote detach succeeded
    async fn action_after_detach(&self, config: &VolumeConfig) -> Result<()>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type StorageClientRef = Arc<dyn StorageClient>;
pub type MounterRef = Arc<dyn Mounter>;

/// Treat an explicit JSON `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
