//! Error types for fieldkit-fetch.
//!
//! [`FetchError`] is what the probe and transfer layers report.
//! [`AcquireError`] is the classified, cloneable failure every caller of an
//! acquisition receives.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::core::{ErrorKind, classify, classify_status};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("server rejected byte range request for {url} (416 range not satisfiable)")]
    RangeNotSatisfiable { url: String },

    #[error("redirect loop detected (more than {0} redirects)")]
    TooManyRedirects(usize),

    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("request timeout")]
    Timeout,

    #[error("transfer cancelled")]
    Cancelled,

    #[error("network error: {0}")]
    Network(String),

    #[error("file I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Fs(#[from] fieldkit_fs::Error),
}

pub type Result<T> = std::result::Result<T, FetchError>;

impl FetchError {
    /// Flattens any client error, including its source chain, into
    /// [`FetchError::Network`]. Transport crates bury the useful part
    /// ("dns error", "operation timed out") in nested sources.
    pub fn network<E: std::error::Error + ?Sized>(err: &E) -> Self {
        FetchError::Network(error_chain(err))
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| FetchError::Io { path, source }
    }

    pub fn is_range_rejection(&self) -> bool {
        matches!(
            self,
            FetchError::RangeNotSatisfiable { .. } | FetchError::Status { status: 416, .. }
        )
    }
}

/// `"outer: inner: innermost"` for an error and all of its sources.
pub fn error_chain<E: std::error::Error + ?Sized>(err: &E) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        let inner_text = inner.to_string();
        if !text.contains(&inner_text) {
            text.push_str(": ");
            text.push_str(&inner_text);
        }
        source = inner.source();
    }
    text
}

/// A terminal acquisition failure.
///
/// Cheap to clone: the underlying cause is shared, so every caller waiting on
/// the same acquisition receives an identical value.
#[derive(Clone)]
pub struct AcquireError {
    kind: ErrorKind,
    message: String,
    cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl AcquireError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: kind.message().to_string(),
            cause: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    #[must_use]
    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Classifies a probe or transfer failure.
    ///
    /// Structured variants win; anything else is matched by token against
    /// the lower-cased error text.
    pub fn from_fetch(err: FetchError) -> Self {
        let kind = match &err {
            FetchError::Status { status, .. } => {
                classify_status(*status).unwrap_or(ErrorKind::Unclassified)
            }
            FetchError::RangeNotSatisfiable { .. } => ErrorKind::ResumeRejectedByServer,
            FetchError::SizeMismatch { .. } => ErrorKind::SizeMismatch,
            FetchError::Timeout => ErrorKind::NetworkTimeout,
            FetchError::Cancelled => ErrorKind::Cancelled,
            FetchError::Fs(fs) if fs.is_insufficient_space() => ErrorKind::InsufficientSpace,
            other => classify(&error_chain(other)),
        };
        Self::new(kind).with_cause(err)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    pub fn is_insufficient_space(&self) -> bool {
        self.kind == ErrorKind::InsufficientSpace
    }
}

impl fmt::Debug for AcquireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquireError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("cause", &self.cause.as_ref().map(|c| c.to_string()))
            .finish()
    }
}

impl fmt::Display for AcquireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for AcquireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn std::error::Error + 'static))
    }
}

impl PartialEq for AcquireError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.message == other.message
    }
}

impl Eq for AcquireError {}

impl From<FetchError> for AcquireError {
    fn from(err: FetchError) -> Self {
        Self::from_fetch(err)
    }
}
