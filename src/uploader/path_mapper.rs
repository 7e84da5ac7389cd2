//! Local-to-remote path translation.
//!
//! Pure functions only: nothing here touches the filesystem or the network,
//! so the same inputs always map to the same remote path.

use std::ffi::OsStr;
use std::path::{Component, Path};

use crate::uploader::error::UploadError;
use crate::uploader::models::RemoteNamespace;

/// Check that an artifact name can be used as a single remote path segment.
pub fn validate_artifact_name(name: &str) -> Result<(), UploadError> {
    let reason = if name.is_empty() {
        Some("must not be empty")
    } else if name.contains(['/', '\\']) {
        Some("must not contain path separators")
    } else if name == "." || name == ".." {
        Some("must not be a relative path component")
    } else if name.contains('\0') {
        Some("must not contain null bytes")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(UploadError::InvalidArtifactName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Resolve `.` and `..` lexically, without touching the filesystem.
///
/// A `..` at the root stays at the root, as it does for absolute lookups.
fn normalized_segments(path: &Path) -> Vec<&OsStr> {
    let mut segments = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => segments.push(segment),
            Component::ParentDir => {
                segments.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    segments
}

/// Split `local_path` relative to `root_directory` into UTF-8 segments.
///
/// Both paths are normalized first, so `/client/a/../b.txt` is inside
/// `/client`. The ancestor check works on whole segments, so `/root2/a` is
/// not considered to be inside `/root`. A path that ends up outside the root
/// is reported as a [`UploadError::PathEscape`].
pub fn relative_segments<'a>(
    local_path: &'a Path,
    root_directory: &Path,
) -> Result<Vec<&'a str>, UploadError> {
    if !local_path.is_absolute() {
        return Err(UploadError::InvalidPath {
            path: local_path.to_path_buf(),
            reason: "local file path must be absolute",
        });
    }
    if !root_directory.is_absolute() {
        return Err(UploadError::InvalidPath {
            path: root_directory.to_path_buf(),
            reason: "root directory must be absolute",
        });
    }

    let root = normalized_segments(root_directory);
    let local = normalized_segments(local_path);

    if local.len() < root.len() || local[..root.len()] != root[..] {
        return Err(UploadError::PathEscape {
            path: local_path.to_path_buf(),
            root: root_directory.to_path_buf(),
        });
    }

    let segments = local[root.len()..]
        .iter()
        .map(|segment| {
            segment.to_str().ok_or_else(|| UploadError::InvalidPath {
                path: local_path.to_path_buf(),
                reason: "path is not valid UTF-8",
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if segments.is_empty() {
        return Err(UploadError::InvalidPath {
            path: local_path.to_path_buf(),
            reason: "the root directory itself cannot be uploaded as a file",
        });
    }

    Ok(segments)
}

/// Map a local file to its remote path under `namespace`, always joined with `/`.
pub fn map_to_remote_path(
    local_path: &Path,
    root_directory: &Path,
    namespace: &RemoteNamespace,
) -> Result<String, UploadError> {
    let segments = relative_segments(local_path, root_directory)?;

    let mut remote = String::from(namespace.prefix().trim_end_matches('/'));
    for segment in segments {
        remote.push('/');
        remote.push_str(segment);
    }
    Ok(remote)
}

/// Directory part of a remote path. `/a/b/c.txt` gives `/a/b`.
pub fn remote_parent(remote_path: &str) -> &str {
    match remote_path.rfind('/') {
        Some(0) | None => "/",
        Some(index) => &remote_path[..index],
    }
}
