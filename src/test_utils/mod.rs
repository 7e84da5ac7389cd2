//! Test utilities for the artifact uploader
//!
//! Provides a scripted in-memory file server and helpers for building
//! local artifact trees.

#![cfg(test)]

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::transport::{Credentials, Endpoint, Transport, TransportError};
use crate::uploader::path_mapper::remote_parent;

/// Creates a temporary client root holding `relative_paths`, each with the
/// content `testdata`. Returns the absolute file paths in the given order.
pub fn create_artifact_tree(relative_paths: &[&str]) -> Result<(TempDir, Vec<PathBuf>)> {
    let root = TempDir::new()?;
    let mut files = Vec::with_capacity(relative_paths.len());

    for relative in relative_paths {
        let path = root.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, b"testdata")?;
        files.push(path);
    }

    Ok((root, files))
}

/// One primitive invoked on the fake server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCall {
    Connect,
    Mkdir(String),
    Put(String),
    Close,
}

#[derive(Default)]
struct ServerState {
    calls: Vec<ServerCall>,
    directories: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
    reject_login: bool,
    rejected_mkdirs: Vec<String>,
    rejected_puts: Vec<String>,
    stalled_puts: Vec<String>,
}

/// In-memory server shared by every transport its factory creates
#[derive(Clone, Default)]
pub struct FakeServer {
    state: Arc<Mutex<ServerState>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory handing out fresh transports connected to this server
    pub fn factory(&self) -> impl Fn() -> Box<dyn Transport> + Send + Sync + 'static {
        let state = Arc::clone(&self.state);
        move || {
            Box::new(FakeTransport {
                state: Arc::clone(&state),
                connected: false,
            }) as Box<dyn Transport>
        }
    }

    pub fn reject_login(&self) {
        self.state.lock().unwrap().reject_login = true;
    }

    pub fn reject_mkdir(&self, path: &str) {
        self.state.lock().unwrap().rejected_mkdirs.push(path.to_string());
    }

    pub fn reject_put(&self, path: &str) {
        self.state.lock().unwrap().rejected_puts.push(path.to_string());
    }

    /// Make puts to `path` never complete
    pub fn stall_put(&self, path: &str) {
        self.state.lock().unwrap().stalled_puts.push(path.to_string());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn calls(&self) -> Vec<ServerCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn connects(&self) -> usize {
        self.count(&ServerCall::Connect)
    }

    pub fn closes(&self) -> usize {
        self.count(&ServerCall::Close)
    }

    fn count(&self, call: &ServerCall) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| *c == call)
            .count()
    }
}

struct FakeTransport {
    state: Arc<Mutex<ServerState>>,
    connected: bool,
}

impl FakeTransport {
    fn record(&self, call: ServerCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn target_name(&self) -> String {
        "fake://server".to_string()
    }

    async fn connect(
        &mut self,
        _endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<(), TransportError> {
        self.record(ServerCall::Connect);
        if self.state.lock().unwrap().reject_login {
            return Err(TransportError::Authentication(credentials.username.clone()));
        }
        self.connected = true;
        Ok(())
    }

    async fn mkdir(&mut self, path: &str) -> Result<(), TransportError> {
        self.record(ServerCall::Mkdir(path.to_string()));
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        let mut state = self.state.lock().unwrap();
        if state.rejected_mkdirs.iter().any(|p| p == path) {
            return Err(TransportError::Rejected(format!("550 cannot create {}", path)));
        }

        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            state.directories.insert(current.clone());
        }
        Ok(())
    }

    async fn put(
        &mut self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        remote_path: &str,
    ) -> Result<u64, TransportError> {
        self.record(ServerCall::Put(remote_path.to_string()));
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        let stalled = {
            let state = self.state.lock().unwrap();
            if state.rejected_puts.iter().any(|p| p == remote_path) {
                return Err(TransportError::Rejected(format!(
                    "553 cannot store {}",
                    remote_path
                )));
            }
            let parent = remote_parent(remote_path);
            if parent != "/" && !state.directories.contains(parent) {
                return Err(TransportError::Rejected(format!("no such directory {}", parent)));
            }
            state.stalled_puts.iter().any(|p| p == remote_path)
        };
        if stalled {
            std::future::pending::<()>().await;
        }

        let mut data = Vec::new();
        source.read_to_end(&mut data).await?;
        let written = data.len() as u64;
        self.state
            .lock()
            .unwrap()
            .files
            .insert(remote_path.to_string(), data);
        Ok(written)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.record(ServerCall::Close);
        self.connected = false;
        Ok(())
    }
}
