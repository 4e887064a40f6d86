use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::Stream;
use url::Url;

use crate::core::{bearer_header, is_redirect, resolve_location};
use crate::error::{FetchError, Result};

/// A boxed stream type for HTTP response bodies.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// Response body yielded by [`HttpClient::get`].
pub type Body<E> = BoxStream<'static, std::result::Result<Bytes, E>>;

/// Status line and the headers the engine cares about.
pub struct HttpResponse<B> {
    pub status: u16,
    /// Parsed `Content-Length`, if present.
    pub content_length: Option<u64>,
    /// Raw `Location` header, if present.
    pub location: Option<String>,
    pub body: B,
}

impl<B> HttpResponse<B> {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Asynchronous HTTP client abstraction.
///
/// Implementations must **not** follow redirects on their own: the engine
/// follows them itself so it can decide, per hop, whether the bearer
/// credential may be attached.
///
/// # Implementations
///
/// - [`ReqwestClient`]: production implementation using `reqwest`
/// - Mock implementations for testing
pub trait HttpClient: Send + Sync {
    /// Error type for HTTP operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Issue a HEAD request.
    fn head(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> impl Future<Output = std::result::Result<HttpResponse<()>, Self::Error>> + Send;

    /// Issue a GET request and expose the body as a stream.
    fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> impl Future<Output = std::result::Result<HttpResponse<Body<Self::Error>>, Self::Error>> + Send;
}

impl<C: HttpClient> HttpClient for Arc<C> {
    type Error = C::Error;

    fn head(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> impl Future<Output = std::result::Result<HttpResponse<()>, Self::Error>> + Send {
        (**self).head(url, headers)
    }

    fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> impl Future<Output = std::result::Result<HttpResponse<Body<Self::Error>>, Self::Error>> + Send
    {
        (**self).get(url, headers)
    }
}

/// Credential and hop limits applied while following redirects.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RedirectPolicy<'a> {
    pub trusted_domains: &'a [String],
    pub max_redirects: usize,
}

/// Sends a request and follows redirects by hand.
///
/// `send` is called once per hop with the URL and the headers for that hop;
/// the bearer header is re-evaluated against every hop's host. Returns the
/// URL that produced the final (non-redirect) response. A redirect without a
/// `Location` is returned as-is.
pub(crate) async fn send_following<B, E, F, Fut>(
    policy: RedirectPolicy<'_>,
    url: &str,
    credential: Option<&str>,
    base_headers: &[(String, String)],
    mut send: F,
) -> Result<(Url, HttpResponse<B>)>
where
    F: FnMut(Url, Vec<(String, String)>) -> Fut,
    Fut: Future<Output = std::result::Result<HttpResponse<B>, E>>,
    E: std::error::Error,
{
    let mut current = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;

    for hop in 0..=policy.max_redirects {
        let mut headers = base_headers.to_vec();
        headers.extend(bearer_header(&current, credential, policy.trusted_domains));

        let response = send(current.clone(), headers)
            .await
            .map_err(|e| FetchError::network(&e))?;

        if !is_redirect(response.status) {
            return Ok((current, response));
        }
        let Some(location) = response.location.as_deref() else {
            return Ok((current, response));
        };

        let next = resolve_location(&current, location)?;
        tracing::debug!(hop, status = response.status, from = %current, to = %next, "following redirect");
        current = next;
    }

    Err(FetchError::TooManyRedirects(policy.max_redirects))
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use super::*;
    use reqwest::header::{CONTENT_LENGTH, HeaderMap, LOCATION};

    use crate::data::Timeouts;

    /// Production HTTP client implementation using reqwest.
    ///
    /// Built with redirects disabled and explicit connect/read timeouts.
    #[derive(Clone)]
    pub struct ReqwestClient {
        client: reqwest::Client,
    }

    impl ReqwestClient {
        pub fn new(timeouts: Timeouts) -> std::result::Result<Self, reqwest::Error> {
            let client = reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .connect_timeout(timeouts.connect)
                .read_timeout(timeouts.read)
                .build()?;
            Ok(Self { client })
        }
    }

    fn content_length(headers: &HeaderMap) -> Option<u64> {
        headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
    }

    fn location(headers: &HeaderMap) -> Option<String> {
        headers
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    impl HttpClient for ReqwestClient {
        type Error = reqwest::Error;

        async fn head(
            &self,
            url: &str,
            headers: &[(String, String)],
        ) -> std::result::Result<HttpResponse<()>, Self::Error> {
            let mut request = self.client.head(url);
            for (key, value) in headers {
                request = request.header(key, value);
            }

            let response = request.send().await?;
            Ok(HttpResponse {
                status: response.status().as_u16(),
                content_length: content_length(response.headers()),
                location: location(response.headers()),
                body: (),
            })
        }

        async fn get(
            &self,
            url: &str,
            headers: &[(String, String)],
        ) -> std::result::Result<HttpResponse<Body<Self::Error>>, Self::Error> {
            let mut request = self.client.get(url);
            for (key, value) in headers {
                request = request.header(key, value);
            }

            let response = request.send().await?;
            let status = response.status().as_u16();
            let content_length = content_length(response.headers());
            let location = location(response.headers());
            let body: Body<Self::Error> = Box::pin(response.bytes_stream());

            Ok(HttpResponse {
                status,
                content_length,
                location,
                body,
            })
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::ReqwestClient;
