use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Protocol;
use crate::constants::{DEFAULT_ARTIFACT_NAME, DEFAULT_CONFIG_NAME};
use crate::discovery::NoFilesBehavior;

/// Command-line arguments for the artifact uploader.
///
/// Connection flags override the values of the configuration file, which in
/// turn override the built-in defaults.
#[derive(Parser, Debug)]
#[clap(
    name = "upload-artifact",
    about = "Upload build artifacts to a file server",
    subcommand_negates_reqs = true
)]
pub struct Args {
    /// Artifact name, used as the directory under the run namespace
    #[clap(short, long, default_value = DEFAULT_ARTIFACT_NAME)]
    pub name: String,

    /// File or directory to upload
    #[clap(short, long, required = true)]
    pub path: Option<PathBuf>,

    /// Behavior when the path yields no files
    #[clap(long, value_enum, default_value = "warn")]
    pub if_no_files_found: NoFilesBehavior,

    /// Path to YAML configuration file
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Transport used for the upload
    #[clap(long, value_enum)]
    pub protocol: Option<Protocol>,

    /// Server host name
    #[clap(long)]
    pub host: Option<String>,

    /// Server port, defaults to 22 for sftp and 21 for ftp
    #[clap(long)]
    pub port: Option<u16>,

    /// Use explicit FTPS with the ftp protocol
    #[clap(long)]
    pub secure: bool,

    /// Login user name
    #[clap(short, long)]
    pub username: Option<String>,

    /// Login password
    #[clap(long)]
    pub password: Option<String>,

    /// Private key for SSH authentication
    #[clap(long)]
    pub private_key: Option<PathBuf>,

    /// Remote base directory for the run namespaces
    #[clap(long)]
    pub remote_path: Option<String>,

    /// Days the server should keep the artifact
    #[clap(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub retention_days: Option<u32>,

    /// Keep uploading after a file fails and report it instead of aborting
    #[clap(long)]
    pub continue_on_error: bool,

    /// Run identifier, defaults to GITHUB_RUN_ID
    #[clap(long)]
    pub run_id: Option<String>,

    /// Write the upload response as JSON to this file
    #[clap(long)]
    pub summary_file: Option<PathBuf>,

    /// Verbose output
    #[clap(short, long)]
    pub verbose: bool,

    /// Subcommands
    #[clap(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands for the uploader.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a default configuration file
    InitConfig {
        /// Path to output configuration file
        #[clap(default_value = DEFAULT_CONFIG_NAME)]
        path: PathBuf,
    },
}
