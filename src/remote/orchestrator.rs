//! Attach and detach workflows
//!
//! Attach: remote attach, fetch config and volume, resolve the backend's
//! mounter, mount locally. Detach: fetch volume, resolve mounter, fetch
//! config, unmount locally, remote detach, backend cleanup. Each step needs
//! the previous one; nothing already done remotely is rolled back.

use super::client::RemoteStorageClient;
use crate::domain::ports::{
    AttachRequest, DetachRequest, GetVolumeConfigRequest, GetVolumeRequest, StorageClient,
};
use crate::error::{Error, Result};
use tracing::{error, info};

fn validate(name: &str, host: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Validation("volume name is required".into()));
    }
    if host.is_empty() {
        return Err(Error::Validation("host is required".into()));
    }
    Ok(())
}

impl RemoteStorageClient {
    /// Attach `request.name` to `request.host` and mount it on this node
    pub async fn attach_volume(&self, request: AttachRequest) -> Result<String> {
        validate(&request.name, &request.host)?;
        info!("Attaching volume {} to {}", request.name, request.host);

        let token = self.remote_attach(&request).await?;

        let config = self
            .get_volume_config(GetVolumeConfigRequest {
                name: request.name.clone(),
            })
            .await?;
        let volume = self
            .get_volume(GetVolumeRequest {
                name: request.name.clone(),
            })
            .await?;

        let mounter = self.registry().resolve(&volume.backend)?;
        let mountpoint = mounter.mount(&token, &config).await?;

        info!(
            "Volume {} attached and mounted at {}",
            request.name, mountpoint
        );
        Ok(mountpoint)
    }

    /// Unmount `request.name` from this node and detach it from `request.host`
    pub async fn detach_volume(&self, request: DetachRequest) -> Result<()> {
        validate(&request.name, &request.host)?;
        info!("Detaching volume {} from {}", request.name, request.host);

        let volume = self
            .get_volume(GetVolumeRequest {
                name: request.name.clone(),
            })
            .await?;
        let mounter = self.registry().resolve(&volume.backend)?;
        let config = self
            .get_volume_config(GetVolumeConfigRequest {
                name: request.name.clone(),
            })
            .await?;

        mounter.unmount(&config).await?;
        self.remote_detach(&request).await?;

        if let Err(e) = mounter.action_after_detach(&config).await {
            error!(
                "Volume {} detached but backend cleanup failed: {}",
                request.name, e
            );
            return Err(match e {
                Error::PostDetachFailed { .. } => e,
                other => Error::PostDetachFailed {
                    backend: volume.backend,
                    reason: other.to_string(),
                },
            });
        }

        info!("Volume {} detached", request.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::ports::*;
    use crate::error::Error;
    use crate::mounter::MounterRegistry;
    use crate::remote::RemoteStorageClient;
    use crate::test_support::{FakeStorageServer, Journal, MounterFailures, RecordingFactory};
    use assert_matches::assert_matches;
    use axum::http::StatusCode;

    async fn setup(backend: &str, failures: MounterFailures) -> (FakeStorageServer, RemoteStorageClient, Journal) {
        let journal = Journal::default();
        let server = FakeStorageServer::start(journal.clone()).await;
        server.add_volume(
            Volume {
                name: "vol1".into(),
                backend: backend.into(),
                ..Default::default()
            },
            VolumeConfig::new().with("nfs_share", "nfs01:/export/vol1"),
        );

        let registry = MounterRegistry::new(RecordingFactory::with_failures(journal.clone(), failures));
        let client = RemoteStorageClient::new(server.url(), registry, None).unwrap();
        (server, client, journal)
    }

    fn attach_request() -> AttachRequest {
        AttachRequest {
            name: "vol1".into(),
            host: "node1".into(),
        }
    }

    fn detach_request() -> DetachRequest {
        DetachRequest {
            name: "vol1".into(),
            host: "node1".into(),
        }
    }

    #[tokio::test]
    async fn test_attach_runs_steps_in_order() {
        let (server, client, journal) = setup("nfs-family", MounterFailures::default()).await;

        let mountpoint = client.attach(attach_request()).await.unwrap();

        assert_eq!(mountpoint, "/local/ubiquity/vol1");
        assert_eq!(
            journal.entries(),
            vec![
                "remote:attach:vol1",
                "remote:get-volume-config:vol1",
                "remote:get-volume:vol1",
                "mount:nfs-family:/ubiquity/vol1",
            ]
        );
        assert_eq!(server.last_body("attach").unwrap()["Host"], "node1");
    }

    #[tokio::test]
    async fn test_attach_stops_when_get_volume_fails() {
        let (server, client, journal) = setup("nfs-family", MounterFailures::default()).await;
        server.respond(
            "get-volume",
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"Err":"database locked"}"#,
        );

        let err = client.attach(attach_request()).await.unwrap_err();

        assert_matches!(err, Error::RemoteRejected { ref operation, code: 500, .. } if operation == "get-volume");
        assert!(journal.matching("mount:").is_empty());
        assert!(client.registry().cached_backends().is_empty());
    }

    #[tokio::test]
    async fn test_attach_mount_failure_surfaces_error() {
        let failures = MounterFailures {
            mount: true,
            ..Default::default()
        };
        let (_server, client, journal) = setup("nfs-family", failures).await;

        let err = client.attach(attach_request()).await.unwrap_err();

        assert_matches!(err, Error::MountFailed { ref backend, .. } if backend == "nfs-family");
        assert_eq!(
            journal.entries(),
            vec![
                "remote:attach:vol1",
                "remote:get-volume-config:vol1",
                "remote:get-volume:vol1",
                "mount:nfs-family:/ubiquity/vol1",
            ]
        );
        assert!(journal.matching("remote:detach").is_empty());
    }

    #[tokio::test]
    async fn test_attach_unknown_backend() {
        let (_server, client, journal) = setup("unknown-family", MounterFailures::default()).await;

        let err = client.attach(attach_request()).await.unwrap_err();

        assert_matches!(err, Error::MounterNotFound { ref backend } if backend == "unknown-family");
        assert!(journal.matching("mount:").is_empty());
    }

    #[tokio::test]
    async fn test_attach_validates_before_remote_calls() {
        let (_server, client, journal) = setup("nfs-family", MounterFailures::default()).await;

        let request = AttachRequest {
            name: "vol1".into(),
            host: String::new(),
        };
        let err = client.attach(request).await.unwrap_err();

        assert_matches!(err, Error::Validation(_));
        assert!(journal.entries().is_empty());
    }

    #[tokio::test]
    async fn test_detach_runs_steps_in_order() {
        let (server, client, journal) = setup("nfs-family", MounterFailures::default()).await;
        client.attach(attach_request()).await.unwrap();

        client.detach(detach_request()).await.unwrap();

        let entries = journal.entries();
        assert_eq!(
            entries[4..].to_vec(),
            vec![
                "remote:get-volume:vol1",
                "remote:get-volume-config:vol1",
                "unmount:nfs-family",
                "remote:detach:vol1",
                "after-detach:nfs-family",
            ]
        );
        assert!(server.volume("vol1").unwrap().mountpoint.is_empty());
    }

    #[tokio::test]
    async fn test_unmount_failure_skips_remote_detach() {
        let failures = MounterFailures {
            unmount: true,
            ..Default::default()
        };
        let (_server, client, journal) = setup("nfs-family", failures).await;

        let err = client.detach(detach_request()).await.unwrap_err();

        assert_matches!(err, Error::UnmountFailed { .. });
        assert!(journal.matching("remote:detach").is_empty());
        assert!(journal.matching("after-detach").is_empty());
    }

    #[tokio::test]
    async fn test_remote_detach_failure_skips_cleanup() {
        let (server, client, journal) = setup("nfs-family", MounterFailures::default()).await;
        server.respond("detach", StatusCode::CONFLICT, r#"{"Err":"volume busy"}"#);

        let err = client.detach(detach_request()).await.unwrap_err();

        assert_eq!(err.code(), crate::error::ErrorCode::AlreadyExists);
        assert!(journal.position("unmount:nfs-family").is_some());
        assert!(journal.matching("after-detach").is_empty());
    }

    #[tokio::test]
    async fn test_post_detach_failure_after_remote_detach() {
        let failures = MounterFailures {
            after_detach: true,
            ..Default::default()
        };
        let (_server, client, journal) = setup("scbe", failures).await;

        let err = client.detach(detach_request()).await.unwrap_err();

        assert!(err.remote_detached());
        let detached = journal.position("remote:detach:vol1").unwrap();
        let cleanup = journal.position("after-detach:scbe").unwrap();
        assert!(detached < cleanup);
    }

    #[tokio::test]
    async fn test_detach_unknown_backend() {
        let (_server, client, journal) = setup("unknown-family", MounterFailures::default()).await;

        let err = client.detach(detach_request()).await.unwrap_err();

        assert_matches!(err, Error::MounterNotFound { .. });
        assert_eq!(journal.entries(), vec!["remote:get-volume:vol1"]);
    }
}
