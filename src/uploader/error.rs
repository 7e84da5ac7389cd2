//! Upload error types.

use std::path::PathBuf;

use crate::transport::TransportError;

/// Errors produced by an artifact upload.
///
/// `DirectoryCreate` and `Transfer` concern a single file; everything else
/// fails the call as a whole.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid artifact name '{name}': {reason}")]
    InvalidArtifactName { name: String, reason: &'static str },

    #[error("invalid path {}: {reason}", path.display())]
    InvalidPath { path: PathBuf, reason: &'static str },

    #[error("{} is not inside root directory {}", path.display(), root.display())]
    PathEscape { path: PathBuf, root: PathBuf },

    #[error("failed to connect to {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to create remote directory {remote_dir} for {}: {source}", local_path.display())]
    DirectoryCreate {
        local_path: PathBuf,
        remote_dir: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to upload {} to {remote_path}: {source}", local_path.display())]
    Transfer {
        local_path: PathBuf,
        remote_path: String,
        #[source]
        source: TransportError,
    },

    #[error("upload cancelled")]
    Cancelled,
}

impl UploadError {
    /// True for failures scoped to one file, which `continue_on_error` may swallow
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            UploadError::DirectoryCreate { .. } | UploadError::Transfer { .. }
        )
    }
}
