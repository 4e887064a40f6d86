use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fieldkit_fs::DEFAULT_SAFETY_MARGIN;

/// Observable state of an acquisition.
///
/// Owners move through these phases in order:
/// Idle → Probing → (SkipAlreadyComplete | SpaceCheck → Transferring →
/// Verifying → Committing) → Done.
///
/// `Failed` and `Cancelled` are reachable from every non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquirePhase {
    #[default]
    Idle,

    /// Asking the server for the asset's length.
    Probing,

    /// The final file already matches the remote asset; nothing to fetch.
    SkipAlreadyComplete,

    /// Checking that the storage directory can hold the remaining bytes.
    SpaceCheck,

    /// Bytes are streaming into the partial file.
    Transferring,

    /// Comparing the partial file length with the probed length.
    Verifying,

    /// Publishing the partial file as the final file.
    Committing,

    Done,
    Failed,
    Cancelled,
}

impl AcquirePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for AcquirePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcquirePhase::Idle => "Idle",
            AcquirePhase::Probing => "Probing",
            AcquirePhase::SkipAlreadyComplete => "SkipAlreadyComplete",
            AcquirePhase::SpaceCheck => "SpaceCheck",
            AcquirePhase::Transferring => "Transferring",
            AcquirePhase::Verifying => "Verifying",
            AcquirePhase::Committing => "Committing",
            AcquirePhase::Done => "Done",
            AcquirePhase::Failed => "Failed",
            AcquirePhase::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// Connect and read timeouts for the HTTP client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            read: Duration::from_secs(30),
        }
    }
}

/// Engine-wide configuration, fixed for the lifetime of an
/// [`AcquisitionEngine`](crate::AcquisitionEngine).
///
/// # Examples
///
/// ```
/// use fieldkit_fetch::EngineOptions;
/// use std::time::Duration;
///
/// let options = EngineOptions::new("/data/models")
///     .trusted_domain("huggingface.co")
///     .probe_timeout(Duration::from_secs(5));
///
/// assert_eq!(options.max_redirects, 10);
/// ```
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Directory holding `<name>` and `<name><partial_suffix>`.
    pub storage_dir: PathBuf,

    /// Hosts that may receive the bearer credential. A host matches a domain
    /// when it equals it or is a subdomain of it.
    pub trusted_domains: Vec<String>,

    /// Upper bound for the whole metadata probe, redirects included.
    pub probe_timeout: Duration,

    /// Maximum number of redirect hops followed by the probe and the transfer.
    pub max_redirects: usize,

    /// Extra free space demanded on top of the remaining bytes.
    pub space_margin: u64,

    /// Suffix appended to the file name for the partial transfer file.
    pub partial_suffix: String,
}

impl EngineOptions {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            trusted_domains: Vec::new(),
            probe_timeout: Duration::from_secs(15),
            max_redirects: 10,
            space_margin: DEFAULT_SAFETY_MARGIN,
            partial_suffix: ".tmp".to_string(),
        }
    }

    #[must_use]
    pub fn trusted_domain(mut self, domain: impl Into<String>) -> Self {
        self.trusted_domains.push(domain.into());
        self
    }

    #[must_use]
    pub fn trusted_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trusted_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    #[must_use]
    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    #[must_use]
    pub fn space_margin(mut self, space_margin: u64) -> Self {
        self.space_margin = space_margin;
        self
    }

    #[must_use]
    pub fn partial_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.partial_suffix = suffix.into();
        self
    }

    pub fn final_path(&self, file_name: &str) -> PathBuf {
        self.storage_dir.join(file_name)
    }

    pub fn partial_path(&self, file_name: &str) -> PathBuf {
        self.storage_dir
            .join(format!("{file_name}{}", self.partial_suffix))
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_is_sibling_of_final() {
        let options = EngineOptions::new("/data/models");

        assert_eq!(
            options.final_path("asr.bin"),
            PathBuf::from("/data/models/asr.bin")
        );
        assert_eq!(
            options.partial_path("asr.bin"),
            PathBuf::from("/data/models/asr.bin.tmp")
        );
    }

    #[test]
    fn terminal_phases() {
        assert!(AcquirePhase::Done.is_terminal());
        assert!(AcquirePhase::Failed.is_terminal());
        assert!(AcquirePhase::Cancelled.is_terminal());
        assert!(!AcquirePhase::Transferring.is_terminal());
        assert!(!AcquirePhase::Idle.is_terminal());
    }
}
