//! HTTP transport to the remote storage API
//!
//! Every verb maps to one request under the storage API base URL. Bodies and
//! responses use the server's PascalCase JSON; failures come back as
//! `{"Err": "..."}` with a non-2xx status.

use crate::config::PluginConfig;
use crate::domain::ports::*;
use crate::error::{Error, Result};
use crate::mounter::{BackendMounterFactory, MounterRegistry};
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Option key carrying the NFS client override on create
pub const NFS_CLIENT_CONFIG_KEY: &str = "nfsClientConfig";

// =============================================================================
// Response Envelopes
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorEnvelope {
    err: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VolumeEnvelope {
    volume: Volume,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VolumesEnvelope {
    #[serde(default)]
    volumes: Option<Vec<Volume>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VolumeConfigEnvelope {
    #[serde(default)]
    volume_config: Option<VolumeConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MountpointEnvelope {
    mountpoint: String,
}

// =============================================================================
// Remote Storage Client
// =============================================================================

/// Client for the remote storage server.
///
/// Owns the [`MounterRegistry`] used by attach and detach.
pub struct RemoteStorageClient {
    http: reqwest::Client,
    base_url: String,
    nfs_client_config: Option<String>,
    registry: MounterRegistry,
    activated: AtomicBool,
}

impl RemoteStorageClient {
    /// Create a client for `base_url`, e.g. `http://host:9999/ubiquity_storage`
    pub fn new(
        base_url: impl Into<String>,
        registry: MounterRegistry,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            nfs_client_config: None,
            registry,
            activated: AtomicBool::new(false),
        })
    }

    /// Client with the system mounters, configured from the plugin config
    pub fn from_config(config: &PluginConfig) -> Result<Self> {
        let registry =
            MounterRegistry::new(BackendMounterFactory::system(config.mounters.clone()));
        Ok(Self::new(config.storage_api_url(), registry, config.request_timeout())?
            .with_nfs_client_config(config.nfs_client_config().map(str::to_string)))
    }

    /// Set the NFS client override added to created volumes
    pub fn with_nfs_client_config(mut self, nfs_client_config: Option<String>) -> Self {
        self.nfs_client_config = nfs_client_config;
        self
    }

    pub fn registry(&self) -> &MounterRegistry {
        &self.registry
    }

    pub fn is_activated(&self) -> bool {
        self.activated.load(Ordering::SeqCst)
    }

    fn url(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        for segment in segments {
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        url
    }

    /// Send one request and return the body of a successful response
    async fn execute<B: Serialize + ?Sized>(
        &self,
        operation: &str,
        method: Method,
        url: &str,
        body: &B,
    ) -> Result<String> {
        debug!("{} {} ({})", method, url, operation);

        let response = self
            .http
            .request(method, url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::RemoteUnavailable {
                operation: operation.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| Error::RemoteUnavailable {
            operation: operation.to_string(),
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            let description = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.err)
                .unwrap_or_else(|_| text.trim().to_string());
            warn!(
                "Remote {} rejected with status {}: {}",
                operation, status, description
            );
            return Err(Error::RemoteRejected {
                operation: operation.to_string(),
                code: status.as_u16(),
                description,
            });
        }

        Ok(text)
    }

    fn decode<T: DeserializeOwned>(operation: &str, text: &str) -> Result<T> {
        serde_json::from_str(text).map_err(|e| Error::DecodeFailure {
            operation: operation.to_string(),
            reason: e.to_string(),
        })
    }

    /// Remote half of attach; returns the server's mountpoint token
    pub(crate) async fn remote_attach(&self, request: &AttachRequest) -> Result<String> {
        let url = self.url(&["volumes", &request.name, "attach"]);
        let text = self.execute("attach", Method::PUT, &url, request).await?;
        let envelope: MountpointEnvelope = Self::decode("attach", &text)?;
        Ok(envelope.mountpoint)
    }

    /// Remote half of detach
    pub(crate) async fn remote_detach(&self, request: &DetachRequest) -> Result<()> {
        let url = self.url(&["volumes", &request.name, "detach"]);
        self.execute("detach", Method::PUT, &url, request).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageClient for RemoteStorageClient {
    async fn activate(&self, request: ActivateRequest) -> Result<()> {
        if self.is_activated() {
            debug!("Backends already activated");
            return Ok(());
        }

        let url = self.url(&["activate"]);
        self.execute("activate", Method::POST, &url, &request).await?;
        self.activated.store(true, Ordering::SeqCst);

        info!("Activated backends: {:?}", request.backends);
        Ok(())
    }

    async fn create_volume(&self, mut request: CreateVolumeRequest) -> Result<()> {
        if let Some(nfs) = &self.nfs_client_config {
            request
                .opts
                .entry(NFS_CLIENT_CONFIG_KEY)
                .or_insert_with(|| serde_json::Value::String(nfs.clone()));
        }

        let url = self.url(&["volumes"]);
        self.execute("create-volume", Method::POST, &url, &request)
            .await?;

        info!(
            "Created volume {} on backend {} ({} bytes)",
            request.name, request.backend, request.capacity_bytes
        );
        Ok(())
    }

    async fn remove_volume(&self, request: RemoveVolumeRequest) -> Result<()> {
        let url = self.url(&["volumes", &request.name]);
        self.execute("remove-volume", Method::DELETE, &url, &request)
            .await?;

        info!("Removed volume {}", request.name);
        Ok(())
    }

    async fn get_volume(&self, request: GetVolumeRequest) -> Result<Volume> {
        let url = self.url(&["volumes", &request.name]);
        let text = self
            .execute("get-volume", Method::GET, &url, &request)
            .await?;
        let envelope: VolumeEnvelope = Self::decode("get-volume", &text)?;
        Ok(envelope.volume)
    }

    async fn get_volume_config(&self, request: GetVolumeConfigRequest) -> Result<VolumeConfig> {
        let url = self.url(&["volumes", &request.name, "config"]);
        let text = self
            .execute("get-volume-config", Method::GET, &url, &request)
            .await?;
        let envelope: VolumeConfigEnvelope = Self::decode("get-volume-config", &text)?;
        Ok(envelope.volume_config.unwrap_or_default())
    }

    async fn list_volumes(&self, request: ListVolumesRequest) -> Result<Vec<Volume>> {
        let url = self.url(&["volumes"]);
        let text = self
            .execute("list-volumes", Method::GET, &url, &request)
            .await?;
        let envelope: VolumesEnvelope = Self::decode("list-volumes", &text)?;
        Ok(envelope.volumes.unwrap_or_default())
    }

    async fn attach(&self, request: AttachRequest) -> Result<String> {
        self.attach_volume(request).await
    }

    async fn detach(&self, request: DetachRequest) -> Result<()> {
        self.detach_volume(request).await
    }
}
