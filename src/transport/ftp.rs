use std::cmp;
use std::io::{self, Read};
use std::net::ToSocketAddrs;
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use native_tls::TlsConnector;
use suppaftp::types::FileType;
use suppaftp::{NativeTlsConnector, NativeTlsFtpStream};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, oneshot};

use crate::constants::{DEFAULT_CONNECTION_TIMEOUT_SECS, FTP_CHUNK_QUEUE_DEPTH, STREAMING_BUFFER_SIZE};
use crate::transport::remote_dirs::{mkdir_recursive, EntryKind, RemoteDirs};
use crate::transport::{Credentials, Endpoint, Transport, TransportError};

/// Tuning knobs for the FTP transport
#[derive(Clone, Debug)]
pub struct FtpSettings {
    pub connection_timeout: Duration,
    /// Upgrade the control connection to TLS (explicit FTPS)
    pub secure: bool,
    pub buffer_size: usize,
}

impl Default for FtpSettings {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(DEFAULT_CONNECTION_TIMEOUT_SECS),
            secure: false,
            buffer_size: STREAMING_BUFFER_SIZE,
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, TransportError>>;

/// Work handed to the session thread
enum Command {
    Mkdir {
        path: String,
        reply: Reply<()>,
    },
    Put {
        path: String,
        chunks: mpsc::Receiver<Chunk>,
        reply: Reply<u64>,
    },
    Quit {
        reply: Reply<()>,
    },
}

/// One piece of a streamed upload
enum Chunk {
    Data(Vec<u8>),
    End,
    Failed(String),
}

/// Blocking reader over the chunks of one upload.
///
/// A channel that closes before `End` means the sender gave up, which is an
/// error rather than end of file.
struct ChunkReader {
    chunks: mpsc::Receiver<Chunk>,
    current: Vec<u8>,
    offset: usize,
    total: u64,
    finished: bool,
    broken: bool,
}

impl ChunkReader {
    fn new(chunks: mpsc::Receiver<Chunk>) -> Self {
        Self {
            chunks,
            current: Vec::new(),
            offset: 0,
            total: 0,
            finished: false,
            broken: false,
        }
    }
}

impl Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.offset >= self.current.len() {
            if self.finished {
                return Ok(0);
            }
            match self.chunks.blocking_recv() {
                Some(Chunk::Data(data)) => {
                    self.current = data;
                    self.offset = 0;
                }
                Some(Chunk::End) => self.finished = true,
                Some(Chunk::Failed(reason)) => {
                    self.broken = true;
                    return Err(io::Error::new(io::ErrorKind::Other, reason));
                }
                None => {
                    self.broken = true;
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "upload source was abandoned",
                    ));
                }
            }
        }

        let n = cmp::min(buf.len(), self.current.len() - self.offset);
        buf[..n].copy_from_slice(&self.current[self.offset..self.offset + n]);
        self.offset += n;
        self.total += n as u64;
        Ok(n)
    }
}

/// FTP has no stat; a directory is whatever the server lets us change into.
impl RemoteDirs for NativeTlsFtpStream {
    fn lookup(&mut self, path: &str) -> EntryKind {
        match self.cwd(path) {
            Ok(()) => EntryKind::Directory,
            Err(_) => EntryKind::Missing,
        }
    }

    fn create_dir(&mut self, path: &str) -> Result<(), TransportError> {
        Ok(self.mkdir(path)?)
    }
}

/// Connect, optionally switch to TLS, log in and select binary mode
fn open_session(
    endpoint: &Endpoint,
    credentials: &Credentials,
    settings: &FtpSettings,
) -> Result<NativeTlsFtpStream, TransportError> {
    let mut last_error = None;
    let mut stream = None;
    for addr in (endpoint.host.as_str(), endpoint.port).to_socket_addrs()? {
        match NativeTlsFtpStream::connect_timeout(addr, settings.connection_timeout) {
            Ok(ftp) => {
                stream = Some(ftp);
                break;
            }
            Err(e) => last_error = Some(e),
        }
    }
    let mut ftp = match (stream, last_error) {
        (Some(ftp), _) => ftp,
        (None, Some(e)) => return Err(e.into()),
        (None, None) => {
            return Err(TransportError::Rejected(format!(
                "{} did not resolve to any address",
                endpoint.host
            )))
        }
    };

    ftp.get_ref().set_read_timeout(Some(settings.connection_timeout))?;
    ftp.get_ref().set_write_timeout(Some(settings.connection_timeout))?;

    if settings.secure {
        let connector = TlsConnector::new().map_err(|e| TransportError::Tls(e.to_string()))?;
        ftp = ftp.into_secure(NativeTlsConnector::from(connector), &endpoint.host)?;
    }

    let password = credentials.password.as_deref().unwrap_or("");
    if let Err(e) = ftp.login(credentials.username.as_str(), password) {
        debug!("FTP login rejected: {}", e);
        return Err(TransportError::Authentication(credentials.username.clone()));
    }
    ftp.transfer_type(FileType::Binary)?;

    Ok(ftp)
}

/// Serve commands until the transport closes or the session breaks
fn run_session(mut ftp: NativeTlsFtpStream, queue: std_mpsc::Receiver<Command>) {
    while let Ok(command) = queue.recv() {
        match command {
            Command::Mkdir { path, reply } => {
                let _ = reply.send(mkdir_recursive(&mut ftp, &path));
            }
            Command::Put {
                path,
                chunks,
                reply,
            } => {
                let mut reader = ChunkReader::new(chunks);
                let result = ftp.put_file(path.as_str(), &mut reader);
                let broken = reader.broken;
                let _ = reply.send(result.map(|_| reader.total).map_err(TransportError::from));
                if broken {
                    // The transfer stopped halfway; the control channel is out of step.
                    warn!("Dropping FTP session after an interrupted upload of {}", path);
                    return;
                }
            }
            Command::Quit { reply } => {
                let _ = reply.send(ftp.quit().map_err(TransportError::from));
                return;
            }
        }
    }
    if let Err(e) = ftp.quit() {
        debug!("FTP quit failed: {}", e);
    }
}

fn session_ended() -> TransportError {
    TransportError::Rejected("FTP session has ended".to_string())
}

/// FTP client; FTPS when `secure` is set.
///
/// The blocking FTP stream lives on its own thread and serves one command
/// at a time, so operations never overlap on the control connection.
pub struct FtpTransport {
    settings: FtpSettings,
    commands: Option<std_mpsc::Sender<Command>>,
    target: String,
}

impl FtpTransport {
    /// Create an unconnected FTP transport
    pub fn new(settings: FtpSettings) -> Self {
        Self {
            settings,
            commands: None,
            target: "ftp://<unconnected>".to_string(),
        }
    }

    fn submit<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<oneshot::Receiver<Result<T, TransportError>>, TransportError> {
        let commands = self.commands.as_ref().ok_or(TransportError::NotConnected)?;
        let (reply, receiver) = oneshot::channel();
        commands.send(command(reply)).map_err(|_| session_ended())?;
        Ok(receiver)
    }
}

#[async_trait]
impl Transport for FtpTransport {
    fn target_name(&self) -> String {
        self.target.clone()
    }

    async fn connect(
        &mut self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<(), TransportError> {
        let scheme = if self.settings.secure { "ftps" } else { "ftp" };
        self.target = format!("{}://{}@{}", scheme, credentials.username, endpoint);

        let (commands, queue) = std_mpsc::channel();
        let (ready, ready_rx) = oneshot::channel();
        let endpoint = endpoint.clone();
        let credentials = credentials.clone();
        let settings = self.settings.clone();

        thread::Builder::new()
            .name("ftp-session".to_string())
            .spawn(move || match open_session(&endpoint, &credentials, &settings) {
                Ok(ftp) => {
                    if ready.send(Ok(())).is_ok() {
                        run_session(ftp, queue);
                    }
                }
                Err(e) => {
                    let _ = ready.send(Err(e));
                }
            })?;

        ready_rx.await.map_err(|_| session_ended())??;

        debug!("FTP session established with {}", self.target);
        self.commands = Some(commands);
        Ok(())
    }

    async fn mkdir(&mut self, path: &str) -> Result<(), TransportError> {
        let path = path.to_string();
        let receiver = self.submit(|reply| Command::Mkdir { path, reply })?;
        receiver.await.map_err(|_| session_ended())?
    }

    async fn put(
        &mut self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        remote_path: &str,
    ) -> Result<u64, TransportError> {
        let (chunks, queue) = mpsc::channel(FTP_CHUNK_QUEUE_DEPTH);
        let path = remote_path.to_string();
        let receiver = self.submit(|reply| Command::Put {
            path,
            chunks: queue,
            reply,
        })?;

        let mut buffer = vec![0u8; self.settings.buffer_size.max(1)];
        loop {
            let read = match source.read(&mut buffer).await {
                Ok(read) => read,
                Err(e) => {
                    let _ = chunks.send(Chunk::Failed(e.to_string())).await;
                    return Err(e.into());
                }
            };
            if read == 0 {
                let _ = chunks.send(Chunk::End).await;
                break;
            }
            if chunks.send(Chunk::Data(buffer[..read].to_vec())).await.is_err() {
                // The server side stopped reading; its reply carries the reason.
                break;
            }
        }
        drop(chunks);

        receiver.await.map_err(|_| session_ended())?
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let Some(commands) = self.commands.take() else {
            return Ok(());
        };

        let (reply, receiver) = oneshot::channel();
        if commands.send(Command::Quit { reply }).is_err() {
            debug!("FTP session with {} already ended", self.target);
            return Ok(());
        }
        drop(commands);

        match receiver.await {
            Ok(result) => result?,
            Err(_) => debug!("FTP session with {} already ended", self.target),
        }

        debug!("Closed FTP session with {}", self.target);
        Ok(())
    }
}
