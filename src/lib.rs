//! Ubiquity CSI - Volume lifecycle plugin
//!
//! Drives a remote storage server over HTTP and performs the backend-specific
//! local mount actions needed to make its volumes usable on this node.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                 REST API (controller / identity / node)           │
//! ├───────────────────────────────────────────────────────────────────┤
//! │                        Controller Adapter                         │
//! │              (validation, coarse lock, error codes)               │
//! ├───────────────────────────────────────────────────────────────────┤
//! │                      Remote Storage Client                        │
//! │   ┌──────────────────────────┐   ┌────────────────────────────┐   │
//! │   │   HTTP verbs (reqwest)   │   │  Attach / Detach workflows │   │
//! │   └──────────────────────────┘   └─────────────┬──────────────┘   │
//! │                                                │                  │
//! │                              ┌─────────────────┴───────────────┐  │
//! │                              │ Mounter Registry (per backend)  │  │
//! │                              └─────────────────┬───────────────┘  │
//! ├────────────────────────────────────────────────┼──────────────────┤
//! │   ┌──────────────┐   ┌──────────────┐   ┌──────┴───────┐          │
//! │   │ Block device │   │     NFS      │   │    SCBE      │          │
//! │   │ (Scale)      │   │ (Scale/SL)   │   │ (multipath)  │          │
//! │   └──────────────┘   └──────────────┘   └──────────────┘          │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`controlplane`]: Controller adapter, metrics and REST API
//! - [`remote`]: Remote storage client and attach/detach workflows
//! - [`mounter`]: Per-backend local mounters and their registry
//! - [`domain`]: Core domain types and ports
//! - [`config`]: Static plugin configuration
//! - [`error`]: Error types and handling

pub mod config;
pub mod controlplane;
pub mod domain;
pub mod error;
pub mod mounter;
pub mod remote;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::PluginConfig;

pub use controlplane::{ApiServer, ApiServerConfig, ControllerAdapter, Metrics, RestRouter};

pub use domain::ports::{
    Mounter, MounterRef, StorageClient, StorageClientRef, Volume, VolumeConfig,
};

pub use error::{Error, ErrorCode, Result};

pub use mounter::{BackendMounterFactory, MounterFactory, MounterRegistry};

pub use remote::RemoteStorageClient;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
