use std::path::Path;

use crate::{Error, Result};

/// Headroom added on top of the bytes still to fetch, to absorb filesystem
/// metadata and allocation overhead.
pub const DEFAULT_SAFETY_MARGIN: u64 = 50 * 1024 * 1024;

/// Source of free-space figures for a directory.
pub trait SpaceProbe: Send + Sync {
    fn available(&self, dir: &Path) -> Result<u64>;
}

/// Reads free space from the filesystem via `fs2`.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsSpaceProbe;

impl SpaceProbe for FsSpaceProbe {
    fn available(&self, dir: &Path) -> Result<u64> {
        fs2::available_space(dir).map_err(|e| Error::SpaceQuery {
            path: dir.to_path_buf(),
            source: e,
        })
    }
}

/// Bytes a directory must have free to finish a transfer of `total` bytes
/// when `already_have` bytes are on disk.
pub fn required_space(total: u64, already_have: u64, margin: u64) -> u64 {
    total.saturating_sub(already_have).saturating_add(margin)
}

#[derive(Clone, Debug)]
pub struct SpaceGuard<P = FsSpaceProbe> {
    probe: P,
    margin: u64,
}

impl Default for SpaceGuard {
    fn default() -> Self {
        Self::new(FsSpaceProbe)
    }
}

impl<P: SpaceProbe> SpaceGuard<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            margin: DEFAULT_SAFETY_MARGIN,
        }
    }

    pub fn margin(mut self, margin: u64) -> Self {
        self.margin = margin;
        self
    }

    /// Fails with [`Error::InsufficientSpace`] unless `dir` can hold
    /// `remaining` more bytes plus the safety margin.
    pub fn check(&self, dir: &Path, remaining: u64) -> Result<()> {
        let required = remaining.saturating_add(self.margin);
        let available = self.probe.available(dir)?;

        if available < required {
            return Err(Error::InsufficientSpace {
                required,
                available,
            });
        }

        tracing::debug!(dir = %dir.display(), required, available, "space check passed");
        Ok(())
    }
}

impl<P: SpaceProbe + ?Sized> SpaceProbe for std::sync::Arc<P> {
    fn available(&self, dir: &Path) -> Result<u64> {
        (**self).available(dir)
    }
}
