//! Plugin configuration
//!
//! Static configuration loaded from a YAML file: where the remote storage
//! server lives, which backends to activate, and per-backend mounter settings.

use crate::error::{Error, Result};
use crate::mounter::MounterConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// =============================================================================
// Remote Server
// =============================================================================

/// Address of the remote storage server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConnectionConfig {
    /// Host name or IP address
    pub address: String,
    /// TCP port
    pub port: u16,
}

impl Default for ServerConnectionConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 9999,
        }
    }
}

/// NFS client settings forwarded to the server on volume creation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumNfsRemoteConfig {
    /// Export options applied to the NFS client, e.g. `"*(rw,no_root_squash)"`
    pub client_config: Option<String>,
}

// =============================================================================
// Plugin Configuration
// =============================================================================

/// Top-level plugin configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Name advertised through the identity service
    pub plugin_name: String,
    /// Remote storage server
    pub server: ServerConnectionConfig,
    /// Backends to activate at start-up
    pub backends: Vec<String>,
    /// NFS client override for created volumes
    pub spectrum_nfs: SpectrumNfsRemoteConfig,
    /// Local mounter settings
    pub mounters: MounterConfig,
    /// Optional timeout for each remote request
    pub request_timeout_secs: Option<u64>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            plugin_name: "ubiquity".to_string(),
            server: ServerConnectionConfig::default(),
            backends: Vec::new(),
            spectrum_nfs: SpectrumNfsRemoteConfig::default(),
            mounters: MounterConfig::default(),
            request_timeout_secs: None,
        }
    }
}

impl PluginConfig {
    /// Load and validate a YAML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate YAML content
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: PluginConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.server.address.trim().is_empty() {
            return Err(Error::Configuration("server.address must not be empty".into()));
        }
        if self.server.port == 0 {
            return Err(Error::Configuration("server.port must not be 0".into()));
        }
        if self.plugin_name.trim().is_empty() {
            return Err(Error::Configuration("plugin_name must not be empty".into()));
        }
        if self.request_timeout_secs == Some(0) {
            return Err(Error::Configuration(
                "request_timeout_secs must be positive when set".into(),
            ));
        }
        Ok(())
    }

    /// Base URL of the remote storage API
    pub fn storage_api_url(&self) -> String {
        format!(
            "http://{}:{}/ubiquity_storage",
            self.server.address, self.server.port
        )
    }

    /// NFS client override, if one is configured
    pub fn nfs_client_config(&self) -> Option<&str> {
        self.spectrum_nfs
            .client_config
            .as_deref()
            .filter(|s| !s.is_empty())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}
