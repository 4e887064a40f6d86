use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::{Error, Result, file_len, remove_if_exists};

/// What to do when the atomic rename of partial → final fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CommitFallback {
    /// Surface the rename error.
    Error,
    /// Stream-copy into a sibling of the destination, then rename that into place.
    #[default]
    Copy,
}

#[derive(Clone, Copy, Debug)]
pub struct CommitOptions {
    fallback: CommitFallback,
    sync: bool,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitOptions {
    pub fn new() -> Self {
        Self {
            fallback: CommitFallback::default(),
            sync: true,
        }
    }

    pub fn fallback(mut self, fallback: CommitFallback) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }
}

/// How the destination file came to exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitMethod {
    Renamed,
    Copied,
}

/// Publishes `partial` as `dest`.
///
/// The partial file must exist and be non-empty. Any pre-existing destination
/// is removed first, then the partial is renamed into place. A rename is only
/// atomic within one volume; when it fails and the fallback is
/// [`CommitFallback::Copy`], the bytes are copied into a hidden sibling of
/// `dest` which is then renamed, so readers of `dest` still never see a
/// truncated file.
pub fn replace_commit(
    partial: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    options: CommitOptions,
) -> Result<CommitMethod> {
    commit_with(partial.as_ref(), dest.as_ref(), options, |from, to| {
        fs::rename(from, to)
    })
}

fn commit_with<R>(partial: &Path, dest: &Path, options: CommitOptions, rename: R) -> Result<CommitMethod>
where
    R: FnOnce(&Path, &Path) -> io::Result<()>,
{
    match file_len(partial) {
        Some(len) if len > 0 => {}
        _ => {
            return Err(Error::EmptySource {
                path: partial.to_path_buf(),
            });
        }
    }

    if options.sync {
        sync_file(partial)?;
    }

    remove_if_exists(dest)?;

    let method = match rename(partial, dest) {
        Ok(()) => CommitMethod::Renamed,
        Err(e) => match options.fallback {
            CommitFallback::Error => {
                return Err(Error::Rename {
                    from: partial.to_path_buf(),
                    to: dest.to_path_buf(),
                    source: e,
                });
            }
            CommitFallback::Copy => {
                tracing::warn!(
                    partial = %partial.display(),
                    dest = %dest.display(),
                    error = %e,
                    "rename failed, falling back to copy"
                );
                copy_into_place(partial, dest, options.sync)?;
                remove_if_exists(partial)?;
                CommitMethod::Copied
            }
        },
    };

    match file_len(dest) {
        Some(len) if len > 0 => Ok(method),
        _ => Err(Error::MissingDestination {
            path: dest.to_path_buf(),
        }),
    }
}

fn staging_sibling(dest: &Path) -> PathBuf {
    let name = dest.file_name().unwrap_or_default().to_string_lossy();
    dest.with_file_name(format!(".{name}.commit"))
}

fn copy_into_place(partial: &Path, dest: &Path, sync: bool) -> Result<()> {
    let staging = staging_sibling(dest);

    let copied = (|| -> io::Result<()> {
        let mut reader = fs::File::open(partial)?;
        let mut writer = fs::File::create(&staging)?;
        io::copy(&mut reader, &mut writer)?;
        if sync {
            writer.sync_all()?;
        }
        Ok(())
    })();

    if let Err(e) = copied {
        let _ = fs::remove_file(&staging);
        return Err(Error::Copy {
            from: partial.to_path_buf(),
            to: dest.to_path_buf(),
            source: e,
        });
    }

    fs::rename(&staging, dest).map_err(|e| {
        let _ = fs::remove_file(&staging);
        Error::Rename {
            from: staging.clone(),
            to: dest.to_path_buf(),
            source: e,
        }
    })
}

fn sync_file(path: &Path) -> Result<()> {
    fs::OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|file| file.sync_all())
        .map_err(|e| Error::Write {
            path: path.to_path_buf(),
            source: e,
        })
}
