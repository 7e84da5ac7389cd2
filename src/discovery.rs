//! Locating the files that make up an artifact.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use log::debug;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

/// What to do when the search path yields no files
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NoFilesBehavior {
    /// Log a warning and succeed
    Warn,
    /// Fail the run
    Error,
    /// Log at info level and succeed
    Ignore,
}

impl fmt::Display for NoFilesBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoFilesBehavior::Warn => write!(f, "warn"),
            NoFilesBehavior::Error => write!(f, "error"),
            NoFilesBehavior::Ignore => write!(f, "ignore"),
        }
    }
}

/// Files found under a search path, with the root their layout is relative to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFiles {
    pub files: Vec<PathBuf>,
    pub root_directory: PathBuf,
}

impl DiscoveredFiles {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Collect the files to upload from `search_path`.
///
/// A file is uploaded on its own with its parent directory as root. A
/// directory contributes every regular file beneath it, in sorted order,
/// with the directory itself as root. A path that does not exist yields an
/// empty set.
pub fn find_files_to_upload(search_path: &Path) -> Result<DiscoveredFiles> {
    let search_path = if search_path.is_absolute() {
        search_path.to_path_buf()
    } else {
        env::current_dir()
            .context("Failed to determine the working directory")?
            .join(search_path)
    };

    if search_path.is_file() {
        let root_directory = search_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        debug!("Search path {} is a single file", search_path.display());
        return Ok(DiscoveredFiles {
            files: vec![search_path],
            root_directory,
        });
    }

    if !search_path.is_dir() {
        debug!("Search path {} does not exist", search_path.display());
        return Ok(DiscoveredFiles {
            files: Vec::new(),
            root_directory: search_path,
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&search_path)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.context(format!(
            "Failed to read directory entry under {}",
            search_path.display()
        ))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    debug!(
        "Found {} file(s) under {}",
        files.len(),
        search_path.display()
    );
    Ok(DiscoveredFiles {
        files,
        root_directory: search_path,
    })
}
