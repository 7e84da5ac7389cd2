use std::fs;
use std::num::NonZeroU32;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use log::{info, warn, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use tokio::runtime::Runtime;

use artifact_uploader::cli::{Args, Commands};
use artifact_uploader::config::{load_or_default, resolve_run_id, Protocol, UploaderConfig};
use artifact_uploader::constants::DEFAULT_RUN_ID;
use artifact_uploader::discovery::{find_files_to_upload, DiscoveredFiles, NoFilesBehavior};
use artifact_uploader::uploader::{ArtifactUploader, UploadOptions, UploadResponse};

fn main() -> Result<()> {
    // Parse arguments
    let args = Args::parse();

    // Initialize logging
    initialize_logging(args.verbose)?;

    // Handle subcommands
    if let Some(cmd) = &args.command {
        return handle_subcommand(cmd);
    }

    // Load configuration and apply command-line overrides
    let config = load_and_process_config(&args)?;

    // Find the files that make up the artifact
    let search_path = args
        .path
        .as_deref()
        .ok_or_else(|| anyhow!("A search path is required (--path)"))?;
    let discovered = find_files_to_upload(search_path)?;

    if discovered.is_empty() {
        return handle_no_files(search_path, args.if_no_files_found);
    }

    info!(
        "Found {} file(s) to upload as artifact {}",
        discovered.files.len(),
        args.name
    );

    let run_id = resolve_run_id(args.run_id.as_deref());
    info!(
        "Using run id {}",
        run_id.as_deref().unwrap_or(DEFAULT_RUN_ID)
    );

    let options = UploadOptions {
        continue_on_error: args.continue_on_error,
        retention_days: args.retention_days.and_then(NonZeroU32::new),
    };

    let runtime = Runtime::new().context("Failed to create Tokio runtime")?;
    let response = runtime.block_on(run_upload(
        &config,
        run_id,
        &args.name,
        &discovered,
        &options,
    ))?;

    // Write upload summary
    if let Some(summary_path) = &args.summary_file {
        write_summary(summary_path, &response)?;
    }

    if !response.failed_items.is_empty() {
        for item in &response.failed_items {
            warn!("Failed to upload {}", item.display());
        }
        warn!(
            "Artifact {} uploaded with {} failed file(s)",
            response.artifact_name,
            response.failed_items.len()
        );
    } else {
        info!("Artifact {} uploaded successfully", response.artifact_name);
    }

    Ok(())
}

/// Initialize logging with the specified verbosity level
fn initialize_logging(verbose: bool) -> Result<()> {
    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")?;
    Ok(())
}

/// Handle subcommands (init-config)
fn handle_subcommand(cmd: &Commands) -> Result<()> {
    match cmd {
        Commands::InitConfig { path } => {
            info!("Creating default configuration file at {}", path.display());
            UploaderConfig::create_default_config_file(path)?;
            info!("Configuration created successfully");
            Ok(())
        }
    }
}

/// Load configuration, expand environment variables and apply CLI overrides
fn load_and_process_config(args: &Args) -> Result<UploaderConfig> {
    let mut config = load_or_default(args.config.as_deref())?;
    config.process_environment_variables();

    if let Some(protocol) = args.protocol {
        config.protocol = protocol;
    }
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = Some(port);
    }
    if args.secure {
        config.secure = true;
    }
    if let Some(username) = &args.username {
        config.username = username.clone();
    }
    if let Some(password) = &args.password {
        config.password = Some(password.clone());
    }
    if let Some(key) = &args.private_key {
        config.private_key_path = Some(key.clone());
    }
    if let Some(remote_path) = &args.remote_path {
        config.remote_base = remote_path.clone();
    }

    config.validate().context("Invalid uploader configuration")?;
    Ok(config)
}

/// Apply the configured behavior for a search path without files
fn handle_no_files(search_path: &Path, behavior: NoFilesBehavior) -> Result<()> {
    let message = format!(
        "No files were found with the provided path: {}. No artifacts will be uploaded.",
        search_path.display()
    );
    match behavior {
        NoFilesBehavior::Warn => {
            warn!("{}", message);
            Ok(())
        }
        NoFilesBehavior::Ignore => {
            info!("{}", message);
            Ok(())
        }
        NoFilesBehavior::Error => bail!(message),
    }
}

/// Upload the discovered files, cancelling on Ctrl-C
async fn run_upload(
    config: &UploaderConfig,
    run_id: Option<String>,
    artifact_name: &str,
    discovered: &DiscoveredFiles,
    options: &UploadOptions,
) -> Result<UploadResponse> {
    if config.protocol == Protocol::Local {
        tokio::fs::create_dir_all(&config.mirror_dir)
            .await
            .context(format!(
                "Failed to create mirror directory {}",
                config.mirror_dir.display()
            ))?;
    }

    let uploader = ArtifactUploader::new(
        config.transport_factory(),
        config.connection_settings(run_id),
    );

    let cancel = uploader.cancel_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling upload");
            cancel.cancel();
        }
    });

    let result = uploader
        .upload_artifact(
            artifact_name,
            &discovered.files,
            &discovered.root_directory,
            options,
        )
        .await;
    interrupt.abort();

    result.context(format!("Failed to upload artifact {}", artifact_name))
}

/// Write the upload response as JSON
fn write_summary(path: &Path, response: &UploadResponse) -> Result<()> {
    let json = serde_json::to_string_pretty(response).context("Failed to serialize upload summary")?;
    fs::write(path, json).context(format!("Failed to write summary to {}", path.display()))?;
    info!("Upload summary written to {}", path.display());
    Ok(())
}
