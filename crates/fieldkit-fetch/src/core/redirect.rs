use url::Url;

use crate::error::{FetchError, Result};

/// Returns `true` if the HTTP status code indicates a redirect.
///
/// # Examples
///
/// ```
/// use fieldkit_fetch::core::is_redirect;
///
/// assert!(is_redirect(301));
/// assert!(is_redirect(307));
/// assert!(!is_redirect(200));
/// assert!(!is_redirect(304));
/// ```
pub fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Resolves a `Location` header against the URL that produced it.
pub fn resolve_location(current: &Url, location: &str) -> Result<Url> {
    current
        .join(location.trim())
        .map_err(|e| FetchError::InvalidUrl(format!("{location}: {e}")))
}

/// Whether `url`'s host is one of `trusted`, or a subdomain of one.
///
/// Only `https` URLs qualify, so a downgrade redirect never carries the
/// credential in clear text.
pub fn is_trusted_host(url: &Url, trusted: &[String]) -> bool {
    if url.scheme() != "https" {
        return false;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.trim_end_matches('.').to_ascii_lowercase();

    trusted.iter().any(|domain| {
        let domain = domain.trim().trim_start_matches('.').to_ascii_lowercase();
        !domain.is_empty()
            && (host == domain
                || host
                    .strip_suffix(&domain)
                    .is_some_and(|prefix| prefix.ends_with('.')))
    })
}

/// The `Authorization` header for `url`, if the credential may be sent there.
pub fn bearer_header(url: &Url, credential: Option<&str>, trusted: &[String]) -> Option<(String, String)> {
    let token = credential.filter(|t| !t.is_empty())?;
    is_trusted_host(url, trusted).then(|| ("Authorization".to_string(), format!("Bearer {token}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn trusted() -> Vec<String> {
        vec!["huggingface.co".to_string()]
    }

    #[test]
    fn test_is_redirect_edge_cases() {
        assert!(!is_redirect(300));
        assert!(!is_redirect(304));
        assert!(!is_redirect(305));
        assert!(!is_redirect(306));
        assert!(is_redirect(308));
    }

    #[test]
    fn test_resolve_relative_location() {
        let base = url("https://huggingface.co/org/model/resolve/main/asr.bin");
        assert_eq!(
            resolve_location(&base, "/api/blob/123").unwrap().as_str(),
            "https://huggingface.co/api/blob/123"
        );
        assert_eq!(
            resolve_location(&base, "https://cdn-lfs.hf.co/x?sig=1")
                .unwrap()
                .as_str(),
            "https://cdn-lfs.hf.co/x?sig=1"
        );
    }

    #[test]
    fn test_trusted_host_matching() {
        assert!(is_trusted_host(&url("https://huggingface.co/a"), &trusted()));
        assert!(is_trusted_host(&url("https://cdn.huggingface.co/a"), &trusted()));
        assert!(!is_trusted_host(&url("https://evilhuggingface.co/a"), &trusted()));
        assert!(!is_trusted_host(&url("https://huggingface.co.evil.net/a"), &trusted()));
        assert!(!is_trusted_host(&url("http://huggingface.co/a"), &trusted()));
        assert!(!is_trusted_host(&url("https://huggingface.co/a"), &[]));
    }

    #[test]
    fn test_bearer_header_only_for_trusted_hosts() {
        let header = bearer_header(&url("https://huggingface.co/a"), Some("tok"), &trusted());
        assert_eq!(
            header,
            Some(("Authorization".to_string(), "Bearer tok".to_string()))
        );
        assert_eq!(
            bearer_header(&url("https://cdn-lfs.hf.co/a"), Some("tok"), &trusted()),
            None
        );
        assert_eq!(
            bearer_header(&url("https://huggingface.co/a"), None, &trusted()),
            None
        );
    }
}
