//! Artifact upload core.
//!
//! ## Components
//!
//! - **Path mapping** ([`path_mapper`]): pure translation of a local file
//!   below a root directory into `<base>/<run id>/<artifact>/<relative path>`
//! - **Upload engine** ([`engine`]): owns one connection per call, creates
//!   remote directories, streams files and accounts for failures
//!
//! ## Usage Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use artifact_uploader::transport::{Credentials, Endpoint, LocalTransport, Transport};
//! use artifact_uploader::uploader::{ArtifactUploader, ConnectionSettings, UploadOptions};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let settings = ConnectionSettings::new(
//!     Endpoint { host: "localhost".to_string(), port: 0 },
//!     Credentials::default(),
//! );
//! let factory = || Box::new(LocalTransport::new("/srv/mirror")) as Box<dyn Transport>;
//! let uploader = ArtifactUploader::new(factory, settings);
//!
//! let response = uploader
//!     .upload_artifact(
//!         "TestArtifact",
//!         &[PathBuf::from("/client/path/to/dict/test.txt")],
//!         &PathBuf::from("/client"),
//!         &UploadOptions::default(),
//!     )
//!     .await?;
//! assert!(response.failed_items.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod models;
pub mod path_mapper;

pub use engine::{ArtifactUploader, ConnectionSettings};
pub use error::UploadError;
pub use models::{RemoteNamespace, TransferOutcome, UploadOptions, UploadRequest, UploadResponse};
pub use path_mapper::{map_to_remote_path, validate_artifact_name};
