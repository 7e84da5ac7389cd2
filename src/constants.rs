//! Global constants for the artifact uploader.
//!
//! Defaults shared by the configuration layer, the CLI and the transports
//! live here so the values stay consistent between them.

// Remote namespace
/// Run identifier used when the execution environment does not supply one
pub const DEFAULT_RUN_ID: &str = "0";

/// Remote base directory under which run namespaces are created
pub const DEFAULT_REMOTE_BASE: &str = "/";

/// Environment variable carrying the CI run identifier
pub const RUN_ID_ENV_VAR: &str = "GITHUB_RUN_ID";

/// Artifact name used when none is given on the command line
pub const DEFAULT_ARTIFACT_NAME: &str = "artifact";

// Connection constants
/// Default SFTP port
pub const SFTP_DEFAULT_PORT: u16 = 22;

/// Default FTP port, also used for explicit FTPS
pub const FTP_DEFAULT_PORT: u16 = 21;

/// Default connection timeout in seconds
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Default deadline for a single mkdir or file transfer in seconds
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 300;

/// Upper bound for closing a connection during teardown
pub const CLOSE_TIMEOUT_SECS: u64 = 10;

// Streaming constants
/// Buffer size for streaming file contents to the server (64KB)
pub const STREAMING_BUFFER_SIZE: usize = 64 * 1024;

/// Chunks buffered between an FTP upload and its session thread
pub const FTP_CHUNK_QUEUE_DEPTH: usize = 8;

/// Permissions for directories created on the server
pub const REMOTE_DIR_MODE: i32 = 0o755;

/// Permissions for files created on the server
pub const REMOTE_FILE_MODE: i32 = 0o644;

// Default file names
pub const DEFAULT_CONFIG_NAME: &str = "uploader.yaml";
pub const DEFAULT_MIRROR_DIR: &str = "artifact-mirror";
