//! Filesystem primitives for publishing downloaded assets.
//!
//! - [`replace_commit`] moves a finished partial file into place, either by
//!   an intra-volume rename or by a copy-then-rename fallback.
//! - [`SpaceGuard`] checks that a directory can hold the bytes still to fetch.
//! - [`file_len`] and [`remove_if_exists`] are the small helpers the
//!   download engine uses to inspect and discard partial files.

mod commit;
mod error;
mod space;

pub use commit::{CommitFallback, CommitMethod, CommitOptions, replace_commit};
pub use error::{Error, Result};
pub use space::{DEFAULT_SAFETY_MARGIN, FsSpaceProbe, SpaceGuard, SpaceProbe, required_space};

use std::io::ErrorKind;
use std::path::Path;

/// Length of a regular file, or `None` if it does not exist or is not a file.
pub fn file_len(path: impl AsRef<Path>) -> Option<u64> {
    std::fs::metadata(path.as_ref())
        .ok()
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
}

/// Removes a file, treating "not found" as success.
///
/// Returns `true` if a file was actually removed.
pub fn remove_if_exists(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::Remove {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Truncates (or creates) a file so that it is empty.
pub fn recreate_empty(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    std::fs::File::create(path)
        .map(drop)
        .map_err(|e| Error::Write {
            path: path.to_path_buf(),
            source: e,
        })
}
