use std::num::NonZeroU32;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_RUN_ID;

/// Per-call behavior switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOptions {
    /// Record failed files and keep going instead of failing the call
    #[serde(default)]
    pub continue_on_error: bool,
    /// Requested retention; accepted and logged, never enforced here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<NonZeroU32>,
}

/// Everything one upload call needs from the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub artifact_name: String,
    pub local_files: Vec<PathBuf>,
    pub root_directory: PathBuf,
    pub options: UploadOptions,
}

impl UploadRequest {
    pub fn new(
        artifact_name: impl Into<String>,
        local_files: Vec<PathBuf>,
        root_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            artifact_name: artifact_name.into(),
            local_files,
            root_directory: root_directory.into(),
            options: UploadOptions::default(),
        }
    }

    pub fn with_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }
}

/// Result of transferring a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Success { remote_path: String, bytes: u64 },
    Failure(PathBuf),
}

/// Settlement record of one upload call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub artifact_name: String,
    /// Local paths that could not be uploaded, in input order
    pub failed_items: Vec<PathBuf>,
    /// Bytes transferred for the files that succeeded
    pub size: u64,
}

impl UploadResponse {
    pub(crate) fn from_outcomes(artifact_name: &str, outcomes: Vec<TransferOutcome>) -> Self {
        let mut failed_items = Vec::new();
        let mut size = 0;
        for outcome in outcomes {
            match outcome {
                TransferOutcome::Success { bytes, .. } => size += bytes,
                TransferOutcome::Failure(path) => failed_items.push(path),
            }
        }
        Self {
            artifact_name: artifact_name.to_string(),
            failed_items,
            size,
        }
    }
}

/// Remote prefix `<base>/<run id>/<artifact name>` shared by all files of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNamespace {
    prefix: String,
}

impl RemoteNamespace {
    /// Build the namespace. The prefix is always rooted at `/`; an absent or
    /// empty run id falls back to `"0"`.
    pub fn new(remote_base: &str, run_id: Option<&str>, artifact_name: &str) -> Self {
        let run_id = run_id.filter(|id| !id.is_empty()).unwrap_or(DEFAULT_RUN_ID);

        let mut prefix = String::new();
        for segment in remote_base.split(['/', '\\']).filter(|s| !s.is_empty()) {
            prefix.push('/');
            prefix.push_str(segment);
        }
        prefix.push('/');
        prefix.push_str(run_id);
        prefix.push('/');
        prefix.push_str(artifact_name);

        Self { prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}
