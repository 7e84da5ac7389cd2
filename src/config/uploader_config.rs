use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::env_vars::expand_env_vars;
use crate::constants::{
    DEFAULT_CONNECTION_TIMEOUT_SECS, DEFAULT_MIRROR_DIR, DEFAULT_OPERATION_TIMEOUT_SECS,
    DEFAULT_REMOTE_BASE, FTP_DEFAULT_PORT, SFTP_DEFAULT_PORT, STREAMING_BUFFER_SIZE,
};
use crate::transport::{
    Credentials, Endpoint, FtpSettings, FtpTransport, LocalTransport, SftpSettings,
    SftpTransport, Transport,
};
use crate::uploader::ConnectionSettings;

/// Which transport carries the upload
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// SSH file transfer
    Sftp,
    /// FTP, or FTPS with `secure`
    Ftp,
    /// Copy into a local mirror directory
    Local,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Sftp => write!(f, "sftp"),
            Protocol::Ftp => write!(f, "ftp"),
            Protocol::Local => write!(f, "local"),
        }
    }
}

impl Protocol {
    /// Well-known port of the protocol
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Sftp => SFTP_DEFAULT_PORT,
            Protocol::Ftp => FTP_DEFAULT_PORT,
            Protocol::Local => 0,
        }
    }
}

/// Connection and transfer settings, loadable from YAML.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploaderConfig {
    pub protocol: Protocol,
    pub host: String,
    /// Server port; the protocol's default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Use explicit FTPS for the ftp protocol
    pub secure: bool,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<PathBuf>,
    /// Remote directory under which run namespaces are created
    pub remote_base: String,
    /// Server root used by the `local` protocol
    pub mirror_dir: PathBuf,
    pub connection_timeout_sec: u64,
    pub operation_timeout_sec: u64,
    pub buffer_size_kb: usize,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Sftp,
            host: String::new(),
            port: None,
            secure: false,
            username: String::new(),
            password: None,
            private_key_path: None,
            remote_base: DEFAULT_REMOTE_BASE.to_string(),
            mirror_dir: PathBuf::from(DEFAULT_MIRROR_DIR),
            connection_timeout_sec: DEFAULT_CONNECTION_TIMEOUT_SECS,
            operation_timeout_sec: DEFAULT_OPERATION_TIMEOUT_SECS,
            buffer_size_kb: STREAMING_BUFFER_SIZE / 1024,
        }
    }
}

impl fmt::Debug for UploaderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploaderConfig")
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<REDACTED>"))
            .field("private_key_path", &self.private_key_path)
            .field("remote_base", &self.remote_base)
            .field("mirror_dir", &self.mirror_dir)
            .field("connection_timeout_sec", &self.connection_timeout_sec)
            .field("operation_timeout_sec", &self.operation_timeout_sec)
            .field("buffer_size_kb", &self.buffer_size_kb)
            .finish()
    }
}

impl UploaderConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: UploaderConfig =
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_yaml_file(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml).context(format!("Failed to write config to {}", path.display()))?;

        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Write a default configuration file
    pub fn create_default_config_file(path: &Path) -> Result<()> {
        UploaderConfig::default().save_to_yaml_file(path)
    }

    /// Expand `$VAR` / `${VAR}` references in the string settings
    pub fn process_environment_variables(&mut self) {
        self.host = expand_env_vars(&self.host);
        self.username = expand_env_vars(&self.username);
        self.remote_base = expand_env_vars(&self.remote_base);
        if let Some(password) = &self.password {
            self.password = Some(expand_env_vars(password));
        }
        if let Some(key) = &self.private_key_path {
            self.private_key_path = Some(PathBuf::from(expand_env_vars(&key.to_string_lossy())));
        }
        self.mirror_dir = PathBuf::from(expand_env_vars(&self.mirror_dir.to_string_lossy()));
    }

    /// Port to connect to
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.protocol.default_port())
    }

    /// Reject settings that cannot produce a working connection
    pub fn validate(&self) -> Result<()> {
        if self.protocol != Protocol::Local {
            if self.host.is_empty() {
                bail!("A host is required for the {} protocol", self.protocol);
            }
            if self.effective_port() == 0 {
                bail!("Port must be between 1 and 65535");
            }
        }
        if self.protocol == Protocol::Sftp
            && self.password.is_none()
            && self.private_key_path.is_none()
        {
            bail!("Either a password or a private key is required for sftp");
        }
        if self.buffer_size_kb == 0 {
            bail!("buffer_size_kb must be at least 1");
        }
        if self.connection_timeout_sec == 0 || self.operation_timeout_sec == 0 {
            bail!("Timeouts must be at least one second");
        }
        Ok(())
    }

    /// Engine settings for this configuration and the given run id
    pub fn connection_settings(&self, run_id: Option<String>) -> ConnectionSettings {
        let endpoint = Endpoint {
            host: self.host.clone(),
            port: self.effective_port(),
        };
        let credentials = Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
            private_key_path: self.private_key_path.clone(),
        };

        ConnectionSettings {
            remote_base: self.remote_base.clone(),
            run_id,
            connect_timeout: Duration::from_secs(self.connection_timeout_sec),
            operation_timeout: Duration::from_secs(self.operation_timeout_sec),
            ..ConnectionSettings::new(endpoint, credentials)
        }
    }

    /// Factory producing a fresh transport for every upload call
    pub fn transport_factory(&self) -> impl Fn() -> Box<dyn Transport> + Send + Sync + 'static {
        let protocol = self.protocol;
        let mirror_dir = self.mirror_dir.clone();
        let connection_timeout = Duration::from_secs(self.connection_timeout_sec);
        let buffer_size = self.buffer_size_kb * 1024;
        let sftp = SftpSettings {
            connection_timeout,
            buffer_size,
        };
        let ftp = FtpSettings {
            connection_timeout,
            secure: self.secure,
            buffer_size,
        };

        move || -> Box<dyn Transport> {
            match protocol {
                Protocol::Sftp => Box::new(SftpTransport::new(sftp.clone())),
                Protocol::Ftp => Box::new(FtpTransport::new(ftp.clone())),
                Protocol::Local => Box::new(LocalTransport::new(mirror_dir.clone())),
            }
        }
    }
}

/// Load the configuration file if one is given, otherwise use defaults
pub fn load_or_default(path: Option<&Path>) -> Result<UploaderConfig> {
    match path {
        Some(p) => UploaderConfig::from_yaml_file(p),
        None => {
            debug!("No configuration file given, using defaults");
            Ok(UploaderConfig::default())
        }
    }
}
