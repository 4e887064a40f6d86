use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Receives `(bytes_done, total_bytes)` while the owner of an acquisition is
/// transferring. Counts are absolute offsets into the file, so a resumed
/// transfer starts at the resumed length rather than zero.
pub type ProgressSink = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// One call's worth of parameters for [`ensure_acquired`].
///
/// [`ensure_acquired`]: crate::AcquisitionEngine::ensure_acquired
///
/// # Examples
///
/// ```
/// use fieldkit_fetch::AcquisitionRequest;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let request = AcquisitionRequest::new("https://example.com/asr.bin", "asr.bin")
///     .credential("hf_token")
///     .timeout(Duration::from_secs(600))
///     .on_progress(Arc::new(|done: u64, total: Option<u64>| {
///         if let Some(total) = total {
///             println!("{done}/{total}");
///         }
///     }));
///
/// assert!(!request.force_fresh);
/// ```
#[derive(Clone)]
pub struct AcquisitionRequest {
    pub url: String,

    /// Bearer token; only sent to trusted hosts.
    pub credential: Option<String>,

    /// File name of the final asset inside the storage directory.
    pub file_name: String,

    /// Hard deadline for the transfer step.
    pub timeout: Duration,

    /// Ignore any existing final or partial file and download from zero.
    pub force_fresh: bool,

    pub on_progress: Option<ProgressSink>,
}

impl fmt::Debug for AcquisitionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquisitionRequest")
            .field("url", &self.url)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("file_name", &self.file_name)
            .field("timeout", &self.timeout)
            .field("force_fresh", &self.force_fresh)
            .field("on_progress", &self.on_progress.as_ref().map(|_| "{ ... }"))
            .finish()
    }
}

impl AcquisitionRequest {
    pub fn new(url: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            credential: None,
            file_name: file_name.into(),
            timeout: Duration::from_secs(30 * 60),
            force_fresh: false,
            on_progress: None,
        }
    }

    #[must_use]
    pub fn credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    #[must_use]
    pub fn maybe_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential.filter(|c| !c.is_empty());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn force_fresh(mut self, force_fresh: bool) -> Self {
        self.force_fresh = force_fresh;
        self
    }

    #[must_use]
    pub fn on_progress(mut self, on_progress: ProgressSink) -> Self {
        self.on_progress = Some(on_progress);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_credential() {
        let request = AcquisitionRequest::new("https://example.com/a", "a").credential("secret");
        let printed = format!("{request:?}");

        assert!(!printed.contains("secret"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn empty_credential_is_dropped() {
        let request =
            AcquisitionRequest::new("https://example.com/a", "a").maybe_credential(Some(String::new()));
        assert!(request.credential.is_none());
    }
}
