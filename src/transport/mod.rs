//! Transport clients for moving files to a remote server.
//!
//! The upload engine never speaks a wire protocol itself. It drives a
//! [`Transport`], which exposes the four primitives an upload needs:
//! connect, recursive mkdir, put and close.
//!
//! ## Available transports
//!
//! - **SFTP** ([`sftp::SftpTransport`]): SSH file transfer via libssh2
//! - **FTP** ([`ftp::FtpTransport`]): plain FTP, or explicit FTPS when
//!   `secure` is set
//! - **Local** ([`local::LocalTransport`]): mirrors the remote layout into a
//!   local directory, for dry runs and tests
//!
//! A [`TransportFactory`] hands out a fresh, unconnected transport for
//! every upload call, so connections are never shared between calls.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncRead;

/// SFTP transport backed by libssh2
pub mod sftp;

/// FTP and FTPS transport
pub mod ftp;

/// Recursive directory creation shared by the remote transports
pub mod remote_dirs;

/// Transport writing into a local directory tree
pub mod local;

pub use ftp::{FtpSettings, FtpTransport};
pub use local::LocalTransport;
pub use sftp::{SftpSettings, SftpTransport};

/// Host and port of the remote server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Login credentials. The password is never printed.
#[derive(Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
    pub private_key_path: Option<PathBuf>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<REDACTED>"))
            .field("private_key_path", &self.private_key_path)
            .finish()
    }
}

/// Errors reported by a transport primitive.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),

    #[error("FTP error: {0}")]
    Ftp(#[from] suppaftp::FtpError),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("authentication failed for user '{0}'")]
    Authentication(String),

    #[error("transport is not connected")]
    NotConnected,

    #[error("server rejected the request: {0}")]
    Rejected(String),

    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// The capabilities an upload needs from a file-transfer client.
///
/// Implementations are driven sequentially by one task: no method is called
/// while another is still pending.
#[async_trait]
pub trait Transport: Send {
    /// Human readable target, used in logs and errors
    fn target_name(&self) -> String;

    /// Open the session and authenticate
    async fn connect(
        &mut self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<(), TransportError>;

    /// Create `path` and any missing parents. Existing directories are not an error.
    async fn mkdir(&mut self, path: &str) -> Result<(), TransportError>;

    /// Stream `source` into `remote_path`, replacing any existing file.
    /// Returns the number of bytes written.
    async fn put(
        &mut self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        remote_path: &str,
    ) -> Result<u64, TransportError>;

    /// End the session. Must be safe to call after a successful connect.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Produces a new, unconnected transport for each upload call.
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Box<dyn Transport>;
}

impl<F> TransportFactory for F
where
    F: Fn() -> Box<dyn Transport> + Send + Sync,
{
    fn create(&self) -> Box<dyn Transport> {
        self()
    }
}
