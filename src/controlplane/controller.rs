//! Controller Adapter
//!
//! Maps the lifecycle protocol (controller, identity and node services) onto
//! the [`StorageClient`] port. Required identifiers are checked before any
//! remote call. Mutating operations and listing run one at a time behind a
//! single async lock.

use crate::controlplane::metrics::Metrics;
use crate::domain::ports::{
    self, AttachRequest, DetachRequest, GetVolumeRequest, ListVolumesRequest,
    RemoveVolumeRequest, StorageClientRef,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Node id key carrying the host name
pub const HOSTNAME_KEY: &str = "hostname";
/// Handle metadata / parameter key naming the backend
pub const BACKEND_KEY: &str = "backend";
/// Publish info key carrying the local mountpoint
pub const MOUNTPOINT_KEY: &str = "mountpoint";

// =============================================================================
// Protocol Types
// =============================================================================

/// Requested capacity bounds in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityRange {
    #[serde(default)]
    pub required_bytes: u64,
    #[serde(default)]
    pub limit_bytes: u64,
}

/// Identifies a volume to the orchestration caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeHandle {
    pub id: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl VolumeHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            metadata: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeInfo {
    pub capacity_bytes: u64,
    pub handle: VolumeHandle,
}

/// Node descriptor; must carry `hostname` for publish/unpublish
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeId {
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl NodeId {
    pub fn hostname(hostname: &str) -> Self {
        let mut values = BTreeMap::new();
        values.insert(HOSTNAME_KEY.to_string(), hostname.to_string());
        Self { values }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVolumeRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub capacity_range: Option<CapacityRange>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVolumeResponse {
    pub volume_info: VolumeInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteVolumeRequest {
    pub volume_handle: Option<VolumeHandle>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerPublishVolumeRequest {
    pub volume_handle: Option<VolumeHandle>,
    #[serde(default)]
    pub node_id: Option<NodeId>,
    #[serde(default)]
    pub readonly: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerPublishVolumeResponse {
    pub publish_volume_info: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerUnpublishVolumeRequest {
    pub volume_handle: Option<VolumeHandle>,
    #[serde(default)]
    pub node_id: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListVolumesEntry {
    pub volume_info: VolumeInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListVolumesResponse {
    pub entries: Vec<ListVolumesEntry>,
}

/// Requested way of consuming a volume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeCapability {
    #[serde(default)]
    pub fs_type: Option<String>,
    #[serde(default)]
    pub mount_flags: Vec<String>,
    #[serde(default)]
    pub access_mode: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateVolumeCapabilitiesRequest {
    pub volume_handle: Option<VolumeHandle>,
    #[serde(default)]
    pub volume_capabilities: Vec<VolumeCapability>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateVolumeCapabilitiesResponse {
    pub supported: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCapacityResponse {
    pub available_capacity: u64,
}

/// Controller service capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControllerCapability {
    CreateDeleteVolume,
    PublishUnpublishVolume,
    ListVolumes,
    GetCapacity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerCapabilitiesResponse {
    pub capabilities: Vec<ControllerCapability>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedVersionsResponse {
    pub supported_versions: Vec<Version>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    pub name: String,
    pub vendor_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGetIdResponse {
    pub node_id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGetCapabilitiesResponse {
    pub capabilities: Vec<String>,
}

/// Protocol version served by this plugin
pub const SUPPORTED_VERSION: Version = Version {
    major: 0,
    minor: 1,
    patch: 0,
};

const CONTROLLER_CAPABILITIES: [ControllerCapability; 4] = [
    ControllerCapability::CreateDeleteVolume,
    ControllerCapability::PublishUnpublishVolume,
    ControllerCapability::ListVolumes,
    ControllerCapability::GetCapacity,
];

// =============================================================================
// Controller Adapter
// =============================================================================

/// Protocol adapter over a [`StorageClient`](crate::domain::ports::StorageClient)
pub struct ControllerAdapter {
    client: StorageClientRef,
    plugin_name: String,
    node_name: String,
    metrics: Arc<Metrics>,
    /// Serializes create/delete/publish/unpublish/list
    lock: Mutex<()>,
}

impl ControllerAdapter {
    pub fn new(
        client: StorageClientRef,
        plugin_name: impl Into<String>,
        node_name: impl Into<String>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            client,
            plugin_name: plugin_name.into(),
            node_name: node_name.into(),
            metrics,
            lock: Mutex::new(()),
        }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    fn finish<T>(&self, operation: &str, started: Instant, result: Result<T>) -> Result<T> {
        self.metrics
            .observe(operation, started.elapsed(), result.is_ok());
        if let Err(e) = &result {
            warn!("{} failed: {}", operation, e);
        }
        result
    }

    // -------------------------------------------------------------------------
    // Controller service
    // -------------------------------------------------------------------------

    pub async fn create_volume(&self, request: CreateVolumeRequest) -> Result<CreateVolumeResponse> {
        let started = Instant::now();
        let _guard = self.lock.lock().await;
        let result = self.create(request).await;
        self.finish("create_volume", started, result)
    }

    async fn create(&self, request: CreateVolumeRequest) -> Result<CreateVolumeResponse> {
        if request.name.is_empty() {
            return Err(Error::Validation("volume name is required".into()));
        }
        info!("Creating volume {}", request.name);

        let mut opts = serde_json::Map::new();
        if let Some(range) = &request.capacity_range {
            let limit = range.limit_bytes.to_string();
            opts.insert("quota".into(), limit.clone().into());
            opts.insert("size".into(), limit.into());
        }
        for (key, value) in &request.parameters {
            opts.insert(key.clone(), value.clone().into());
        }

        let backend = request
            .parameters
            .get(BACKEND_KEY)
            .cloned()
            .unwrap_or_default();
        let capacity = request.capacity_range.map(|r| r.limit_bytes);

        self.client
            .create_volume(ports::CreateVolumeRequest {
                name: request.name.clone(),
                backend,
                capacity_bytes: capacity.unwrap_or_default(),
                metadata: BTreeMap::new(),
                opts,
            })
            .await?;

        let volume = self
            .client
            .get_volume(GetVolumeRequest {
                name: request.name,
            })
            .await?;

        let mut handle = VolumeHandle::new(volume.name);
        handle
            .metadata
            .insert(BACKEND_KEY.to_string(), volume.backend);

        Ok(CreateVolumeResponse {
            volume_info: VolumeInfo {
                capacity_bytes: capacity.unwrap_or(volume.capacity_bytes),
                handle,
            },
        })
    }

    pub async fn delete_volume(&self, request: DeleteVolumeRequest) -> Result<()> {
        let started = Instant::now();
        let _guard = self.lock.lock().await;
        let result = self.delete(request).await;
        self.finish("delete_volume", started, result)
    }

    async fn delete(&self, request: DeleteVolumeRequest) -> Result<()> {
        let id = volume_id(&request.volume_handle)?;
        info!("Deleting volume {}", id);

        self.client
            .remove_volume(RemoveVolumeRequest {
                name: id.to_string(),
            })
            .await
    }

    pub async fn controller_publish_volume(
        &self,
        request: ControllerPublishVolumeRequest,
    ) -> Result<ControllerPublishVolumeResponse> {
        let started = Instant::now();
        let _guard = self.lock.lock().await;
        let result = self.publish(request).await;
        self.finish("controller_publish_volume", started, result)
    }

    async fn publish(
        &self,
        request: ControllerPublishVolumeRequest,
    ) -> Result<ControllerPublishVolumeResponse> {
        let id = volume_id(&request.volume_handle)?;
        let host = hostname(&request.node_id)?;

        let mountpoint = self
            .client
            .attach(AttachRequest {
                name: id.to_string(),
                host: host.to_string(),
            })
            .await?;

        let mut publish_volume_info = BTreeMap::new();
        publish_volume_info.insert(MOUNTPOINT_KEY.to_string(), mountpoint);
        Ok(ControllerPublishVolumeResponse {
            publish_volume_info,
        })
    }

    pub async fn controller_unpublish_volume(
        &self,
        request: ControllerUnpublishVolumeRequest,
    ) -> Result<()> {
        let started = Instant::now();
        let _guard = self.lock.lock().await;
        let result = self.unpublish(request).await;
        self.finish("controller_unpublish_volume", started, result)
    }

    async fn unpublish(&self, request: ControllerUnpublishVolumeRequest) -> Result<()> {
        let id = volume_id(&request.volume_handle)?;
        let host = hostname(&request.node_id)?;

        self.client
            .detach(DetachRequest {
                name: id.to_string(),
                host: host.to_string(),
            })
            .await
    }

    pub async fn list_volumes(&self) -> Result<ListVolumesResponse> {
        let started = Instant::now();
        let _guard = self.lock.lock().await;
        let result = self.list().await;
        self.finish("list_volumes", started, result)
    }

    async fn list(&self) -> Result<ListVolumesResponse> {
        let volumes = self
            .client
            .list_volumes(ListVolumesRequest::default())
            .await?;
        debug!("Listed {} volumes", volumes.len());

        let entries = volumes
            .into_iter()
            .map(|volume| {
                let mut metadata = volume.metadata;
                if !volume.backend.is_empty() {
                    metadata
                        .entry(BACKEND_KEY.to_string())
                        .or_insert(volume.backend);
                }
                ListVolumesEntry {
                    volume_info: VolumeInfo {
                        capacity_bytes: volume.capacity_bytes,
                        handle: VolumeHandle {
                            id: volume.name,
                            metadata,
                        },
                    },
                }
            })
            .collect();

        Ok(ListVolumesResponse { entries })
    }

    pub async fn validate_volume_capabilities(
        &self,
        request: ValidateVolumeCapabilitiesRequest,
    ) -> Result<ValidateVolumeCapabilitiesResponse> {
        let started = Instant::now();
        let result = self.validate_capabilities(request).await;
        self.finish("validate_volume_capabilities", started, result)
    }

    async fn validate_capabilities(
        &self,
        request: ValidateVolumeCapabilitiesRequest,
    ) -> Result<ValidateVolumeCapabilitiesResponse> {
        let id = volume_id(&request.volume_handle)?;
        if request.volume_capabilities.is_empty() {
            return Err(Error::Validation("at least one volume capability is required".into()));
        }

        self.client
            .get_volume(GetVolumeRequest {
                name: id.to_string(),
            })
            .await?;

        Ok(ValidateVolumeCapabilitiesResponse {
            supported: true,
            message: String::new(),
        })
    }

    /// The storage API has no capacity query
    pub fn get_capacity(&self) -> GetCapacityResponse {
        GetCapacityResponse {
            available_capacity: 0,
        }
    }

    pub fn controller_get_capabilities(&self) -> ControllerCapabilitiesResponse {
        ControllerCapabilitiesResponse {
            capabilities: CONTROLLER_CAPABILITIES.to_vec(),
        }
    }

    // -------------------------------------------------------------------------
    // Identity service
    // -------------------------------------------------------------------------

    pub fn get_supported_versions(&self) -> SupportedVersionsResponse {
        SupportedVersionsResponse {
            supported_versions: vec![SUPPORTED_VERSION],
        }
    }

    pub fn get_plugin_info(&self) -> PluginInfo {
        PluginInfo {
            name: self.plugin_name.clone(),
            vendor_version: crate::VERSION.to_string(),
        }
    }

    // -------------------------------------------------------------------------
    // Node service
    // -------------------------------------------------------------------------

    pub fn get_node_id(&self) -> NodeGetIdResponse {
        NodeGetIdResponse {
            node_id: NodeId::hostname(&self.node_name),
        }
    }

    pub fn probe_node(&self) {}

    pub fn node_get_capabilities(&self) -> NodeGetCapabilitiesResponse {
        NodeGetCapabilitiesResponse {
            capabilities: Vec::new(),
        }
    }
}

fn volume_id(handle: &Option<VolumeHandle>) -> Result<&str> {
    match handle {
        Some(handle) if !handle.id.is_empty() => Ok(&handle.id),
        _ => Err(Error::Validation("volume handle id is required".into())),
    }
}

fn hostname(node_id: &Option<NodeId>) -> Result<&str> {
    node_id
        .as_ref()
        .and_then(|n| n.values.get(HOSTNAME_KEY))
        .map(String::as_str)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| Error::Validation(format!("node id is missing '{}'", HOSTNAME_KEY)))
}
