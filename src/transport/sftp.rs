use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use ssh2::{OpenFlags, OpenType, Session, Sftp};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::spawn_blocking;

use crate::constants::{
    DEFAULT_CONNECTION_TIMEOUT_SECS, REMOTE_DIR_MODE, REMOTE_FILE_MODE, STREAMING_BUFFER_SIZE,
};
use crate::transport::remote_dirs::{mkdir_recursive, EntryKind, RemoteDirs};
use crate::transport::{Credentials, Endpoint, Transport, TransportError};

/// Tuning knobs for the SFTP transport
#[derive(Clone, Debug)]
pub struct SftpSettings {
    pub connection_timeout: Duration,
    pub buffer_size: usize,
}

impl Default for SftpSettings {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(DEFAULT_CONNECTION_TIMEOUT_SECS),
            buffer_size: STREAMING_BUFFER_SIZE,
        }
    }
}

/// Session state shared with the blocking pool.
///
/// Every libssh2 call takes this lock, so an abandoned operation still
/// running on the pool finishes before the next one touches the session.
struct SessionState {
    session: Session,
    sftp: Sftp,
    file: Option<ssh2::File>,
}

/// SFTP client holding one authenticated SSH session.
///
/// libssh2 is blocking, so every call into it runs on the blocking thread
/// pool while the calling task stays suspended.
pub struct SftpTransport {
    settings: SftpSettings,
    state: Option<Arc<Mutex<SessionState>>>,
    target: String,
}

impl SftpTransport {
    /// Create an unconnected SFTP transport
    pub fn new(settings: SftpSettings) -> Self {
        Self {
            settings,
            state: None,
            target: "sftp://<unconnected>".to_string(),
        }
    }

    fn state(&self) -> Result<Arc<Mutex<SessionState>>, TransportError> {
        self.state.as_ref().map(Arc::clone).ok_or(TransportError::NotConnected)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, TransportError> {
    mutex
        .lock()
        .map_err(|_| TransportError::Rejected("SFTP session lock poisoned".to_string()))
}

/// Run `op` on the blocking pool with exclusive access to `shared`.
///
/// Dropping the returned future does not stop `op`; it keeps the lock until
/// it completes and the next call waits for it.
async fn with_exclusive<S, T, F>(shared: &Arc<Mutex<S>>, op: F) -> Result<T, TransportError>
where
    S: Send + 'static,
    T: Send + 'static,
    F: FnOnce(&mut S) -> Result<T, TransportError> + Send + 'static,
{
    let shared = Arc::clone(shared);
    spawn_blocking(move || {
        let mut guard = lock(&shared)?;
        op(&mut guard)
    })
    .await?
}

/// Open a TCP connection, perform the SSH handshake and authenticate
fn open_session(
    endpoint: &Endpoint,
    credentials: &Credentials,
    timeout: Duration,
) -> Result<SessionState, TransportError> {
    let mut last_error = None;
    let mut tcp = None;
    for addr in (endpoint.host.as_str(), endpoint.port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                tcp = Some(stream);
                break;
            }
            Err(e) => last_error = Some(e),
        }
    }
    let tcp = match (tcp, last_error) {
        (Some(stream), _) => stream,
        (None, Some(e)) => return Err(e.into()),
        (None, None) => {
            return Err(TransportError::Rejected(format!(
                "{} did not resolve to any address",
                endpoint.host
            )))
        }
    };

    tcp.set_read_timeout(Some(timeout))?;
    tcp.set_write_timeout(Some(timeout))?;

    let mut session = Session::new()?;
    session.set_tcp_stream(tcp);
    session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
    session.handshake()?;

    match (&credentials.private_key_path, &credentials.password) {
        (Some(key), _) => {
            session.userauth_pubkey_file(&credentials.username, None, key, None)?;
        }
        (None, Some(password)) => {
            session.userauth_password(&credentials.username, password)?;
        }
        (None, None) => {
            return Err(TransportError::Authentication(credentials.username.clone()));
        }
    }

    if !session.authenticated() {
        return Err(TransportError::Authentication(credentials.username.clone()));
    }

    let sftp = session.sftp()?;
    Ok(SessionState {
        session,
        sftp,
        file: None,
    })
}

impl RemoteDirs for Sftp {
    fn lookup(&mut self, path: &str) -> EntryKind {
        match self.stat(Path::new(path)) {
            Ok(stat) if stat.is_dir() => EntryKind::Directory,
            Ok(_) => EntryKind::Other,
            Err(_) => EntryKind::Missing,
        }
    }

    fn create_dir(&mut self, path: &str) -> Result<(), TransportError> {
        Ok(self.mkdir(Path::new(path), REMOTE_DIR_MODE)?)
    }
}

#[async_trait]
impl Transport for SftpTransport {
    fn target_name(&self) -> String {
        self.target.clone()
    }

    async fn connect(
        &mut self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<(), TransportError> {
        self.target = format!("sftp://{}@{}", credentials.username, endpoint);

        let endpoint = endpoint.clone();
        let credentials = credentials.clone();
        let timeout = self.settings.connection_timeout;
        let state =
            spawn_blocking(move || open_session(&endpoint, &credentials, timeout)).await??;

        debug!("SFTP session established with {}", self.target);
        self.state = Some(Arc::new(Mutex::new(state)));
        Ok(())
    }

    async fn mkdir(&mut self, path: &str) -> Result<(), TransportError> {
        let state = self.state()?;
        let path = path.to_string();
        with_exclusive(&state, move |s| mkdir_recursive(&mut s.sftp, &path)).await
    }

    async fn put(
        &mut self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        remote_path: &str,
    ) -> Result<u64, TransportError> {
        let state = self.state()?;
        let path = remote_path.to_string();
        with_exclusive(&state, move |s| {
            let flags = OpenFlags::CREATE | OpenFlags::WRITE | OpenFlags::TRUNCATE;
            let file = s
                .sftp
                .open_mode(Path::new(&path), flags, REMOTE_FILE_MODE, OpenType::File)?;
            s.file = Some(file);
            Ok(())
        })
        .await?;

        let mut buffer = vec![0u8; self.settings.buffer_size.max(1)];
        let mut written = 0u64;
        loop {
            let read = source.read(&mut buffer).await?;
            if read == 0 {
                break;
            }

            buffer = with_exclusive(&state, move |s| {
                let file = s.file.as_mut().ok_or(TransportError::NotConnected)?;
                file.write_all(&buffer[..read])?;
                Ok(buffer)
            })
            .await?;
            written += read as u64;
        }

        with_exclusive(&state, |s| {
            if let Some(mut file) = s.file.take() {
                file.flush()?;
            }
            Ok(())
        })
        .await?;

        Ok(written)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let Some(state) = self.state.take() else {
            return Ok(());
        };

        with_exclusive(&state, |s| {
            s.file = None;
            s.session.disconnect(None, "upload finished", None)?;
            Ok(())
        })
        .await?;

        debug!("Closed SFTP session with {}", self.target);
        Ok(())
    }
}
