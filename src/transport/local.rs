use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use log::debug;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};

use crate::transport::{Credentials, Endpoint, Transport, TransportError};

/// Transport that treats a local directory as the server root.
///
/// The remote path `/0/name/file.txt` lands at `<root>/0/name/file.txt`.
/// The root must already exist; connecting to a missing root fails the same
/// way an unreachable server would.
pub struct LocalTransport {
    root: PathBuf,
    connected: bool,
}

impl LocalTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            connected: false,
        }
    }

    /// Resolve a remote path below the root, refusing anything but plain segments
    fn resolve(&self, remote_path: &str) -> Result<PathBuf, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        let mut resolved = self.root.clone();
        for component in Path::new(remote_path).components() {
            match component {
                Component::RootDir | Component::CurDir => {}
                Component::Normal(segment) => resolved.push(segment),
                _ => {
                    return Err(TransportError::Rejected(format!(
                        "invalid remote path: {}",
                        remote_path
                    )))
                }
            }
        }
        Ok(resolved)
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn target_name(&self) -> String {
        format!("file://{}", self.root.display())
    }

    async fn connect(
        &mut self,
        _endpoint: &Endpoint,
        _credentials: &Credentials,
    ) -> Result<(), TransportError> {
        let metadata = fs::metadata(&self.root).await?;
        if !metadata.is_dir() {
            return Err(TransportError::Rejected(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        self.connected = true;
        Ok(())
    }

    async fn mkdir(&mut self, path: &str) -> Result<(), TransportError> {
        let dir = self.resolve(path)?;
        fs::create_dir_all(&dir).await?;
        Ok(())
    }

    async fn put(
        &mut self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        remote_path: &str,
    ) -> Result<u64, TransportError> {
        let target = self.resolve(remote_path)?;
        let mut file = fs::File::create(&target).await?;
        let written = tokio::io::copy(source, &mut file).await?;
        file.flush().await?;
        debug!("Wrote {} bytes to {}", written, target.display());
        Ok(written)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.connected = false;
        Ok(())
    }
}
