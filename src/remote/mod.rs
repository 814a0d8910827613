//! Remote Storage Client
//!
//! HTTP client for the remote storage server plus the attach/detach
//! workflows that combine remote calls with local mount actions.

pub mod client;
mod orchestrator;

pub use client::RemoteStorageClient;
