use std::path::PathBuf;

use crate::error::AcquireError;

/// How the final file came to be in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Downloaded from byte zero.
    Transferred,
    /// Continued from an existing partial file.
    Resumed,
    /// The final file was already complete; nothing was transferred.
    AlreadyComplete,
}

/// A finalized asset on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredAsset {
    pub path: PathBuf,
    pub len: u64,
    pub origin: Origin,
}

/// The single result shared by every caller of one logical acquisition.
pub type AcquisitionOutcome = Result<AcquiredAsset, AcquireError>;
