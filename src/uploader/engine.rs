//! Upload engine.
//!
//! Drives one transport connection per call through the sequence
//! connect → (mkdir, put) per file → close, and folds per-file failures into
//! the [`UploadResponse`].

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::constants::{
    CLOSE_TIMEOUT_SECS, DEFAULT_CONNECTION_TIMEOUT_SECS, DEFAULT_OPERATION_TIMEOUT_SECS,
    DEFAULT_REMOTE_BASE,
};
use crate::transport::{Credentials, Endpoint, Transport, TransportError, TransportFactory};
use crate::uploader::error::UploadError;
use crate::uploader::models::{
    RemoteNamespace, TransferOutcome, UploadOptions, UploadRequest, UploadResponse,
};
use crate::uploader::path_mapper::{map_to_remote_path, remote_parent, validate_artifact_name};

/// Where and how to connect, plus the namespace inputs shared by every call.
#[derive(Clone, Debug)]
pub struct ConnectionSettings {
    pub endpoint: Endpoint,
    pub credentials: Credentials,
    pub remote_base: String,
    /// Run identifier supplied by the execution environment
    pub run_id: Option<String>,
    pub connect_timeout: Duration,
    pub operation_timeout: Duration,
}

impl ConnectionSettings {
    pub fn new(endpoint: Endpoint, credentials: Credentials) -> Self {
        Self {
            endpoint,
            credentials,
            remote_base: DEFAULT_REMOTE_BASE.to_string(),
            run_id: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECTION_TIMEOUT_SECS),
            operation_timeout: Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS),
        }
    }
}

/// A file paired with its destination on the server.
#[derive(Debug, Clone)]
struct PlannedTransfer {
    local_path: PathBuf,
    remote_path: String,
}

/// Uploads artifacts, opening a dedicated connection for every call.
pub struct ArtifactUploader<F> {
    factory: F,
    settings: ConnectionSettings,
    cancel: CancellationToken,
}

impl<F: TransportFactory> ArtifactUploader<F> {
    pub fn new(factory: F, settings: ConnectionSettings) -> Self {
        Self {
            factory,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that aborts in-flight and future uploads when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Upload everything described by `request`.
    pub async fn upload(&self, request: &UploadRequest) -> Result<UploadResponse, UploadError> {
        self.upload_artifact(
            &request.artifact_name,
            &request.local_files,
            &request.root_directory,
            &request.options,
        )
        .await
    }

    /// Upload `local_files` under `<base>/<run id>/<artifact_name>`, keeping
    /// their layout relative to `root_directory`.
    ///
    /// Connection failures, invalid inputs and cancellation fail the call.
    /// A failing mkdir or put fails the call too, unless
    /// `options.continue_on_error` is set, in which case the file is listed
    /// in `failed_items` and the remaining files are still processed.
    pub async fn upload_artifact(
        &self,
        artifact_name: &str,
        local_files: &[PathBuf],
        root_directory: &Path,
        options: &UploadOptions,
    ) -> Result<UploadResponse, UploadError> {
        validate_artifact_name(artifact_name)?;

        let namespace = RemoteNamespace::new(
            &self.settings.remote_base,
            self.settings.run_id.as_deref(),
            artifact_name,
        );
        let plan = plan_transfers(local_files, root_directory, &namespace)?;

        if let Some(days) = options.retention_days {
            debug!(
                "Retention of {} day(s) requested for {}; not enforced by the uploader",
                days, artifact_name
            );
        }

        if plan.is_empty() {
            info!("No files to upload for artifact {}", artifact_name);
            return Ok(UploadResponse::from_outcomes(artifact_name, Vec::new()));
        }

        self.check_cancelled()?;

        let mut transport = self.factory.create();
        info!(
            "Connecting to {} to upload {} file(s) for artifact {}",
            self.settings.endpoint,
            plan.len(),
            artifact_name
        );
        let connected = self
            .bounded(
                self.settings.connect_timeout,
                transport.connect(&self.settings.endpoint, &self.settings.credentials),
            )
            .await?;
        if let Err(source) = connected {
            return Err(UploadError::Connection {
                target: transport.target_name(),
                source,
            });
        }

        let result = self.transfer_all(transport.as_mut(), &plan, options).await;
        close_transport(transport.as_mut()).await;

        let outcomes = result?;
        let response = UploadResponse::from_outcomes(artifact_name, outcomes);

        if response.failed_items.is_empty() {
            info!(
                "Artifact {} uploaded: {} file(s), {} bytes under {}",
                artifact_name,
                plan.len(),
                response.size,
                namespace.prefix()
            );
        } else {
            warn!(
                "Artifact {} uploaded with {} of {} file(s) failing",
                artifact_name,
                response.failed_items.len(),
                plan.len()
            );
        }

        Ok(response)
    }

    /// Process the plan strictly in order
    async fn transfer_all(
        &self,
        transport: &mut dyn Transport,
        plan: &[PlannedTransfer],
        options: &UploadOptions,
    ) -> Result<Vec<TransferOutcome>, UploadError> {
        let mut outcomes = Vec::with_capacity(plan.len());

        for item in plan {
            self.check_cancelled()?;

            match self.transfer_one(transport, item).await {
                Ok(bytes) => outcomes.push(TransferOutcome::Success {
                    remote_path: item.remote_path.clone(),
                    bytes,
                }),
                Err(err) if err.is_per_file() && options.continue_on_error => {
                    warn!("{}", err);
                    outcomes.push(TransferOutcome::Failure(item.local_path.clone()));
                }
                Err(err) => return Err(err),
            }
        }

        Ok(outcomes)
    }

    /// Ensure the remote directory exists, then stream the file into it
    async fn transfer_one(
        &self,
        transport: &mut dyn Transport,
        item: &PlannedTransfer,
    ) -> Result<u64, UploadError> {
        let timeout = self.settings.operation_timeout;
        let remote_dir = remote_parent(&item.remote_path);

        debug!("Making directory {}", remote_dir);
        self.bounded(timeout, transport.mkdir(remote_dir))
            .await?
            .map_err(|source| UploadError::DirectoryCreate {
                local_path: item.local_path.clone(),
                remote_dir: remote_dir.to_string(),
                source,
            })?;

        let transfer_error = |source: TransportError| UploadError::Transfer {
            local_path: item.local_path.clone(),
            remote_path: item.remote_path.clone(),
            source,
        };

        // The handle is dropped when this function returns, on every path.
        let mut file = tokio::fs::File::open(&item.local_path)
            .await
            .map_err(|e| transfer_error(e.into()))?;

        debug!(
            "Uploading {} to {}",
            item.local_path.display(),
            item.remote_path
        );
        let bytes = self
            .bounded(timeout, transport.put(&mut file, &item.remote_path))
            .await?
            .map_err(transfer_error)?;

        debug!("Uploaded {} ({} bytes)", item.remote_path, bytes);
        Ok(bytes)
    }

    /// Run one transport operation under the deadline and the cancellation token.
    ///
    /// The outer error is a cancellation; the inner result is the operation's own.
    async fn bounded<T, Fut>(
        &self,
        limit: Duration,
        operation: Fut,
    ) -> Result<Result<T, TransportError>, UploadError>
    where
        Fut: Future<Output = Result<T, TransportError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(UploadError::Cancelled),
            result = tokio::time::timeout(limit, operation) => {
                Ok(result.unwrap_or(Err(TransportError::TimedOut(limit))))
            }
        }
    }

    fn check_cancelled(&self) -> Result<(), UploadError> {
        if self.cancel.is_cancelled() {
            Err(UploadError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Map every input file up front so contract violations surface before connecting
fn plan_transfers(
    local_files: &[PathBuf],
    root_directory: &Path,
    namespace: &RemoteNamespace,
) -> Result<Vec<PlannedTransfer>, UploadError> {
    local_files
        .iter()
        .map(|local_path| {
            Ok(PlannedTransfer {
                local_path: local_path.clone(),
                remote_path: map_to_remote_path(local_path, root_directory, namespace)?,
            })
        })
        .collect()
}

async fn close_transport(transport: &mut dyn Transport) {
    let limit = Duration::from_secs(CLOSE_TIMEOUT_SECS);
    match tokio::time::timeout(limit, transport.close()).await {
        Ok(Ok(())) => debug!("Closed connection to {}", transport.target_name()),
        Ok(Err(e)) => warn!("Failed to close connection to {}: {}", transport.target_name(), e),
        Err(_) => warn!(
            "Closing connection to {} timed out after {:?}",
            transport.target_name(),
            limit
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_artifact_tree, FakeServer, ServerCall};
    use std::num::NonZeroU32;

    fn settings() -> ConnectionSettings {
        ConnectionSettings::new(
            Endpoint {
                host: "files.example.com".to_string(),
                port: 21,
            },
            Credentials {
                username: "anonymous".to_string(),
                password: Some("anonymous".to_string()),
                private_key_path: None,
            },
        )
    }

    #[tokio::test]
    async fn test_single_file_lands_at_mapped_path() {
        let (client, files) = create_artifact_tree(&["path/to/dict/test.txt"]).unwrap();
        let server = FakeServer::new();
        let uploader = ArtifactUploader::new(server.factory(), settings());

        let response = uploader
            .upload_artifact("TestArtifact", &files, client.path(), &UploadOptions::default())
            .await
            .unwrap();

        assert_eq!(response.artifact_name, "TestArtifact");
        assert!(response.failed_items.is_empty());
        assert_eq!(
            server.file("/0/TestArtifact/path/to/dict/test.txt"),
            Some(b"testdata".to_vec())
        );
        assert_eq!(response.size, 8);
        assert_eq!(server.connects(), 1);
        assert_eq!(server.closes(), 1);
    }

    #[tokio::test]
    async fn test_run_id_and_base_shape_the_namespace() {
        let (client, files) = create_artifact_tree(&["a.txt"]).unwrap();
        let server = FakeServer::new();
        let mut settings = settings();
        settings.remote_base = "/builds".to_string();
        settings.run_id = Some("4711".to_string());
        let uploader = ArtifactUploader::new(server.factory(), settings);

        uploader
            .upload_artifact("dist", &files, client.path(), &UploadOptions::default())
            .await
            .unwrap();

        assert!(server.file("/builds/4711/dist/a.txt").is_some());
    }

    #[tokio::test]
    async fn test_directory_created_before_each_put() {
        let (client, files) = create_artifact_tree(&["one/a.txt", "two/b.txt"]).unwrap();
        let server = FakeServer::new();
        let uploader = ArtifactUploader::new(server.factory(), settings());

        uploader
            .upload_artifact("x", &files, client.path(), &UploadOptions::default())
            .await
            .unwrap();

        assert_eq!(
            server.calls(),
            vec![
                ServerCall::Connect,
                ServerCall::Mkdir("/0/x/one".to_string()),
                ServerCall::Put("/0/x/one/a.txt".to_string()),
                ServerCall::Mkdir("/0/x/two".to_string()),
                ServerCall::Put("/0/x/two/b.txt".to_string()),
                ServerCall::Close,
            ]
        );
    }

    #[tokio::test]
    async fn test_authentication_failure_is_fatal() {
        let (client, files) = create_artifact_tree(&["a.txt"]).unwrap();
        let server = FakeServer::new();
        server.reject_login();
        let uploader = ArtifactUploader::new(server.factory(), settings());

        let result = uploader
            .upload_artifact("x", &files, client.path(), &UploadOptions::default())
            .await;

        assert!(matches!(result, Err(UploadError::Connection { .. })));
        assert_eq!(server.calls(), vec![ServerCall::Connect]);
    }

    #[tokio::test]
    async fn test_fail_fast_aborts_and_still_closes() {
        let (client, files) = create_artifact_tree(&["a.txt", "b.txt", "c.txt"]).unwrap();
        let server = FakeServer::new();
        server.reject_put("/0/x/b.txt");
        let uploader = ArtifactUploader::new(server.factory(), settings());

        let result = uploader
            .upload_artifact("x", &files, client.path(), &UploadOptions::default())
            .await;

        match result {
            Err(UploadError::Transfer { local_path, .. }) => assert_eq!(local_path, files[1]),
            other => panic!("expected transfer error, got {:?}", other),
        }
        assert!(server.file("/0/x/c.txt").is_none());
        assert_eq!(server.closes(), 1);
    }

    #[tokio::test]
    async fn test_continue_on_error_reports_failures_in_order() {
        let (client, files) =
            create_artifact_tree(&["a.txt", "dir/b.txt", "c.txt", "d.txt"]).unwrap();
        let server = FakeServer::new();
        server.reject_put("/0/x/c.txt");
        server.reject_mkdir("/0/x/dir");
        let uploader = ArtifactUploader::new(server.factory(), settings());
        let options = UploadOptions {
            continue_on_error: true,
            retention_days: NonZeroU32::new(5),
        };

        let response = uploader
            .upload_artifact("x", &files, client.path(), &options)
            .await
            .unwrap();

        assert_eq!(response.failed_items, vec![files[1].clone(), files[2].clone()]);
        assert!(server.file("/0/x/a.txt").is_some());
        assert!(server.file("/0/x/d.txt").is_some());
        assert_eq!(server.closes(), 1);
    }

    #[tokio::test]
    async fn test_missing_local_file_is_a_transfer_failure() {
        let (client, mut files) = create_artifact_tree(&["a.txt"]).unwrap();
        files.insert(0, client.path().join("vanished.txt"));
        let server = FakeServer::new();
        let uploader = ArtifactUploader::new(server.factory(), settings());
        let options = UploadOptions {
            continue_on_error: true,
            ..Default::default()
        };

        let response = uploader
            .upload_artifact("x", &files, client.path(), &options)
            .await
            .unwrap();

        assert_eq!(response.failed_items, vec![client.path().join("vanished.txt")]);
        assert!(server.file("/0/x/a.txt").is_some());
    }

    #[tokio::test]
    async fn test_path_escape_fails_before_connecting() {
        let (client, mut files) = create_artifact_tree(&["a.txt"]).unwrap();
        files.push(PathBuf::from("/somewhere/else.txt"));
        let server = FakeServer::new();
        let uploader = ArtifactUploader::new(server.factory(), settings());

        let result = uploader
            .upload_artifact("x", &files, client.path(), &UploadOptions::default())
            .await;

        assert!(matches!(result, Err(UploadError::PathEscape { .. })));
        assert!(server.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_artifact_name() {
        let (client, files) = create_artifact_tree(&["a.txt"]).unwrap();
        let server = FakeServer::new();
        let uploader = ArtifactUploader::new(server.factory(), settings());

        let result = uploader
            .upload_artifact("../x", &files, client.path(), &UploadOptions::default())
            .await;

        assert!(matches!(result, Err(UploadError::InvalidArtifactName { .. })));
        assert!(server.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_file_list_skips_connection() {
        let client = tempfile::TempDir::new().unwrap();
        let server = FakeServer::new();
        let uploader = ArtifactUploader::new(server.factory(), settings());

        let response = uploader
            .upload_artifact("x", &[], client.path(), &UploadOptions::default())
            .await
            .unwrap();

        assert!(response.failed_items.is_empty());
        assert_eq!(response.size, 0);
        assert!(server.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stalled_put_times_out() {
        let (client, files) = create_artifact_tree(&["a.txt", "b.txt"]).unwrap();
        let server = FakeServer::new();
        server.stall_put("/0/x/a.txt");
        let mut settings = settings();
        settings.operation_timeout = Duration::from_millis(50);
        let uploader = ArtifactUploader::new(server.factory(), settings);
        let options = UploadOptions {
            continue_on_error: true,
            ..Default::default()
        };

        let response = uploader
            .upload_artifact("x", &files, client.path(), &options)
            .await
            .unwrap();

        assert_eq!(response.failed_items, vec![files[0].clone()]);
        assert!(server.file("/0/x/b.txt").is_some());
        assert_eq!(server.closes(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_during_put_closes_connection() {
        let (client, files) = create_artifact_tree(&["a.txt", "b.txt"]).unwrap();
        let server = FakeServer::new();
        server.stall_put("/0/x/a.txt");
        let uploader = ArtifactUploader::new(server.factory(), settings());
        let cancel = uploader.cancel_token();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });
        let options = UploadOptions {
            continue_on_error: true,
            ..Default::default()
        };
        let result = uploader
            .upload_artifact("x", &files, client.path(), &options)
            .await;
        canceller.await.unwrap();

        assert!(matches!(result, Err(UploadError::Cancelled)));
        assert!(server.file("/0/x/b.txt").is_none());
        assert_eq!(server.closes(), 1);
    }

    #[tokio::test]
    async fn test_upload_request_entry_point() {
        let (client, files) = create_artifact_tree(&["nested/file.bin"]).unwrap();
        let server = FakeServer::new();
        let uploader = ArtifactUploader::new(server.factory(), settings());
        let request = UploadRequest::new("TestArtifact", files, client.path());

        let response = uploader.upload(&request).await.unwrap();

        assert_eq!(response.artifact_name, "TestArtifact");
        assert!(server.file("/0/TestArtifact/nested/file.bin").is_some());
    }

    #[tokio::test]
    async fn test_each_call_gets_its_own_connection() {
        let (client, files) = create_artifact_tree(&["a.txt"]).unwrap();
        let server = FakeServer::new();
        let uploader = ArtifactUploader::new(server.factory(), settings());

        for _ in 0..2 {
            uploader
                .upload_artifact("x", &files, client.path(), &UploadOptions::default())
                .await
                .unwrap();
        }

        assert_eq!(server.connects(), 2);
        assert_eq!(server.closes(), 2);
    }
}
