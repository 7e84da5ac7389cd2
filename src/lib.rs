//! # artifact_uploader
//!
//! Uploads the files of a build artifact to a remote file server, keeping
//! their directory layout under a run-scoped namespace.
//!
//! ## Overview
//!
//! Every file below a local root directory lands at
//! `<remote base>/<run id>/<artifact name>/<path relative to root>` on the
//! server. Each upload call opens its own connection, creates the remote
//! directories it needs, streams the files one after another and closes the
//! connection on every exit path.
//!
//! ## Features
//!
//! - **Deterministic path mapping**: segment-aware, always `/`-joined
//! - **Fail-fast or best-effort**: `continue_on_error` collects failed files
//!   instead of aborting
//! - **Bounded operations**: connect, mkdir and put run under deadlines and
//!   honor a cancellation token
//! - **Pluggable transports**: SFTP via libssh2, FTP/FTPS, or a local mirror directory
//! - **YAML configuration** with environment variable expansion
//!
//! ## Usage
//!
//! ```no_run
//! use artifact_uploader::config::UploaderConfig;
//! use artifact_uploader::discovery::find_files_to_upload;
//! use artifact_uploader::uploader::{ArtifactUploader, UploadOptions};
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = UploaderConfig::from_yaml_file(Path::new("uploader.yaml"))?;
//! let found = find_files_to_upload(Path::new("dist"))?;
//!
//! let uploader = ArtifactUploader::new(
//!     config.transport_factory(),
//!     config.connection_settings(Some("1234".to_string())),
//! );
//! let response = uploader
//!     .upload_artifact("dist", &found.files, &found.root_directory, &UploadOptions::default())
//!     .await?;
//!
//! println!("Uploaded {} bytes", response.size);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`cli`]: Command-line interface definitions and argument parsing
//! - [`config`]: Configuration file handling and run id resolution
//! - [`discovery`]: Locating the files of an artifact
//! - [`transport`]: Connection-level primitives (SFTP, FTP, local mirror)
//! - [`uploader`]: Path mapping and the upload engine
//! - [`constants`]: Application-wide constants

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Configuration management
pub mod config;

/// Application constants and configuration values
pub mod constants;

/// File discovery for the search path
pub mod discovery;

/// Server transports
pub mod transport;

/// Path mapping and upload engine
pub mod uploader;

/// Test utilities and helpers
#[cfg(test)]
pub mod test_utils;
