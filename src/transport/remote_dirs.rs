use log::debug;

use crate::transport::TransportError;

/// What a remote lookup found at a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    Other,
    Missing,
}

/// Directory primitives of a remote file system, one path at a time.
pub trait RemoteDirs {
    /// Report what exists at `path`
    fn lookup(&mut self, path: &str) -> EntryKind;

    /// Create a single directory whose parent already exists
    fn create_dir(&mut self, path: &str) -> Result<(), TransportError>;
}

/// Walk `path` from the root and create every missing segment.
///
/// Existing directories are left alone. A non-directory entry on the way is
/// an error. A failed create is accepted when the directory shows up anyway,
/// since another client may have created it in between.
pub fn mkdir_recursive<D>(dirs: &mut D, path: &str) -> Result<(), TransportError>
where
    D: RemoteDirs + ?Sized,
{
    let mut current = String::with_capacity(path.len());
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        current.push('/');
        current.push_str(segment);

        match dirs.lookup(&current) {
            EntryKind::Directory => continue,
            EntryKind::Other => {
                return Err(TransportError::Rejected(format!(
                    "{} exists and is not a directory",
                    current
                )))
            }
            EntryKind::Missing => {
                if let Err(e) = dirs.create_dir(&current) {
                    if dirs.lookup(&current) != EntryKind::Directory {
                        return Err(e);
                    }
                    debug!("{} was created concurrently", current);
                }
            }
        }
    }
    Ok(())
}
