use std::time::Duration;

use crate::data::EngineOptions;
use crate::effects::http::{HttpClient, RedirectPolicy, send_following};
use crate::error::{FetchError, Result};

/// Resolves the authoritative length of a remote asset with HEAD requests.
pub struct MetadataProbe<C> {
    client: C,
    trusted_domains: Vec<String>,
    max_redirects: usize,
    timeout: Duration,
}

impl<C: HttpClient> MetadataProbe<C> {
    pub fn new(client: C, options: &EngineOptions) -> Self {
        Self {
            client,
            trusted_domains: options.trusted_domains.clone(),
            max_redirects: options.max_redirects,
            timeout: options.probe_timeout,
        }
    }

    /// Content length of `url` after following redirects.
    ///
    /// `Ok(None)` means "unknown": the final response had no usable
    /// `Content-Length`, was not a success, or was a redirect with nowhere to
    /// go. `Err` is reserved for transport failures, timeouts, and redirect
    /// loops; callers treat those as "unknown" too.
    pub async fn probe_length(&self, url: &str, credential: Option<&str>) -> Result<Option<u64>> {
        let policy = RedirectPolicy {
            trusted_domains: &self.trusted_domains,
            max_redirects: self.max_redirects,
        };
        let headers = [("Accept-Encoding".to_string(), "identity".to_string())];
        let client = &self.client;

        let probe = send_following(policy, url, credential, &headers, move |hop_url, hop_headers| async move {
            client.head(hop_url.as_str(), &hop_headers).await
        });

        let (final_url, response) = tokio::time::timeout(self.timeout, probe)
            .await
            .map_err(|_| FetchError::Timeout)??;

        if !response.is_success() {
            tracing::debug!(url = %final_url, status = response.status, "probe returned no usable length");
            return Ok(None);
        }

        tracing::debug!(url = %final_url, length = ?response.content_length, "probed remote length");
        Ok(response.content_length)
    }
}
