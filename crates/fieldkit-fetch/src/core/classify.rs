use std::fmt;

/// Closed taxonomy of acquisition failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unauthorized,
    Forbidden,
    NetworkTimeout,
    InsufficientSpace,
    ResumeRejectedByServer,
    UnknownHost,
    SizeMismatch,
    Cancelled,
    Unclassified,
}

impl ErrorKind {
    /// Short, stable text suitable for showing to a user.
    pub fn message(self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "access token missing or invalid",
            ErrorKind::Forbidden => "access to the model file was refused",
            ErrorKind::NetworkTimeout => "download timed out",
            ErrorKind::InsufficientSpace => "not enough free storage space",
            ErrorKind::ResumeRejectedByServer => "server refused to resume the download",
            ErrorKind::UnknownHost => "could not resolve the download host",
            ErrorKind::SizeMismatch => "downloaded file size does not match the server",
            ErrorKind::Cancelled => "download cancelled",
            ErrorKind::Unclassified => "download failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

struct Rule {
    kind: ErrorKind,
    /// Whole tokens, e.g. status codes.
    tokens: &'static [&'static str],
    /// Substrings of the lower-cased description.
    phrases: &'static [&'static str],
}

// First match wins.
const RULES: &[Rule] = &[
    Rule {
        kind: ErrorKind::Cancelled,
        tokens: &[],
        phrases: &["cancelled", "canceled", "cancellation"],
    },
    Rule {
        kind: ErrorKind::InsufficientSpace,
        tokens: &["enospc", "507"],
        phrases: &[
            "no space left",
            "insufficient space",
            "not enough space",
            "insufficient storage",
            "disk full",
            "disk quota exceeded",
        ],
    },
    Rule {
        kind: ErrorKind::ResumeRejectedByServer,
        tokens: &["416"],
        phrases: &["range not satisfiable", "requested range", "byte range"],
    },
    Rule {
        kind: ErrorKind::Unauthorized,
        tokens: &["401"],
        phrases: &["unauthorized", "unauthorised"],
    },
    Rule {
        kind: ErrorKind::Forbidden,
        tokens: &["403"],
        phrases: &["forbidden", "access denied"],
    },
    Rule {
        kind: ErrorKind::NetworkTimeout,
        tokens: &["408", "etimedout"],
        phrases: &["timed out", "timeout", "time out", "deadline has elapsed"],
    },
    Rule {
        kind: ErrorKind::UnknownHost,
        tokens: &["enotfound"],
        phrases: &[
            "unknown host",
            "unknownhost",
            "dns error",
            "failed to lookup address",
            "name or service not known",
            "no such host",
            "unable to resolve host",
            "nodename nor servname",
        ],
    },
    Rule {
        kind: ErrorKind::SizeMismatch,
        tokens: &[],
        phrases: &["size mismatch", "length mismatch"],
    },
];

/// Classifies a failure from its description alone.
///
/// Used when the transfer layer gives no structured error code. Matching is
/// case-insensitive; status codes must appear as whole tokens so that a byte
/// count like `14012` does not read as a 401.
///
/// # Examples
///
/// ```
/// use fieldkit_fetch::core::{ErrorKind, classify};
///
/// assert_eq!(classify("HTTP status 403 from https://example.com"), ErrorKind::Forbidden);
/// assert_eq!(classify("No space left on device (os error 28)"), ErrorKind::InsufficientSpace);
/// assert_eq!(classify("wrote 14012 bytes"), ErrorKind::Unclassified);
/// ```
pub fn classify(description: &str) -> ErrorKind {
    let lower = description.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    RULES
        .iter()
        .find(|rule| {
            rule.tokens.iter().any(|t| tokens.contains(t))
                || rule.phrases.iter().any(|p| lower.contains(p))
        })
        .map_or(ErrorKind::Unclassified, |rule| rule.kind)
}

/// Classifies an HTTP status code, if it maps onto the taxonomy.
pub fn classify_status(status: u16) -> Option<ErrorKind> {
    match status {
        401 => Some(ErrorKind::Unauthorized),
        403 => Some(ErrorKind::Forbidden),
        408 | 504 => Some(ErrorKind::NetworkTimeout),
        416 => Some(ErrorKind::ResumeRejectedByServer),
        507 => Some(ErrorKind::InsufficientSpace),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_auth() {
        assert_eq!(classify("HTTP 401"), ErrorKind::Unauthorized);
        assert_eq!(classify("Unauthorized"), ErrorKind::Unauthorized);
        assert_eq!(classify("status: 403 Forbidden"), ErrorKind::Forbidden);
    }

    #[test]
    fn test_classify_timeout() {
        assert_eq!(classify("operation timed out"), ErrorKind::NetworkTimeout);
        assert_eq!(classify("SocketTimeoutException"), ErrorKind::NetworkTimeout);
        assert_eq!(classify("deadline has elapsed"), ErrorKind::NetworkTimeout);
    }

    #[test]
    fn test_classify_space() {
        assert_eq!(
            classify("No space left on device (os error 28)"),
            ErrorKind::InsufficientSpace
        );
        assert_eq!(classify("ENOSPC"), ErrorKind::InsufficientSpace);
    }

    #[test]
    fn test_classify_range() {
        assert_eq!(classify("416 Range Not Satisfiable"), ErrorKind::ResumeRejectedByServer);
    }

    #[test]
    fn test_classify_host() {
        assert_eq!(
            classify("error sending request: dns error: failed to lookup address information"),
            ErrorKind::UnknownHost
        );
        assert_eq!(
            classify("java.net.UnknownHostException: Unable to resolve host"),
            ErrorKind::UnknownHost
        );
    }

    #[test]
    fn test_classify_cancel_wins() {
        assert_eq!(classify("request cancelled after timeout"), ErrorKind::Cancelled);
    }

    #[test]
    fn test_status_codes_need_whole_tokens() {
        assert_eq!(classify("read 4010 bytes"), ErrorKind::Unclassified);
        assert_eq!(classify("offset 14160"), ErrorKind::Unclassified);
        assert_eq!(classify(""), ErrorKind::Unclassified);
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(401), Some(ErrorKind::Unauthorized));
        assert_eq!(classify_status(416), Some(ErrorKind::ResumeRejectedByServer));
        assert_eq!(classify_status(404), None);
        assert_eq!(classify_status(500), None);
    }
}
