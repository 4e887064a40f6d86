use std::future::Future;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::data::EngineOptions;
use crate::effects::http::{HttpClient, RedirectPolicy, send_following};
use crate::error::{FetchError, Result};

/// Progress callback handed to a [`TransferExecutor`].
///
/// Receives the absolute number of bytes in the partial file and the total,
/// if known. Returning [`ControlFlow::Break`] asks the executor to stop; it
/// must then return [`FetchError::Cancelled`] without waiting for more data.
pub type ProgressFn<'a> = dyn Fn(u64, Option<u64>) -> ControlFlow<()> + Send + Sync + 'a;

/// Everything an executor needs for one transfer attempt.
#[derive(Clone, Copy)]
pub struct TransferJob<'a> {
    pub url: &'a str,
    pub credential: Option<&'a str>,
    /// File to append to. May already hold a prefix of the asset.
    pub partial: &'a Path,
    pub on_progress: &'a ProgressFn<'a>,
}

impl TransferJob<'_> {
    /// Forwards a tick, mapping a stop request to [`FetchError::Cancelled`].
    pub fn report(&self, done: u64, total: Option<u64>) -> Result<()> {
        match (self.on_progress)(done, total) {
            ControlFlow::Continue(()) => Ok(()),
            ControlFlow::Break(()) => Err(FetchError::Cancelled),
        }
    }
}

/// Moves bytes from a URL into a partial file.
///
/// Implementations resume into a non-empty partial file when the server
/// allows it, report [`FetchError::RangeNotSatisfiable`] when it refuses, and
/// call the progress callback often enough (sub-second) for timeouts and
/// cancellation to take effect promptly. Returns the final length of the
/// partial file.
pub trait TransferExecutor: Send + Sync {
    fn transfer(&self, job: TransferJob<'_>) -> impl Future<Output = Result<u64>> + Send;
}

impl<T: TransferExecutor> TransferExecutor for Arc<T> {
    fn transfer(&self, job: TransferJob<'_>) -> impl Future<Output = Result<u64>> + Send {
        (**self).transfer(job)
    }
}

/// Default executor: HTTP GET with `Range: bytes=N-` resumption.
pub struct HttpTransfer<C> {
    client: C,
    trusted_domains: Vec<String>,
    max_redirects: usize,
}

impl<C: HttpClient> HttpTransfer<C> {
    pub fn new(client: C, options: &EngineOptions) -> Self {
        Self {
            client,
            trusted_domains: options.trusted_domains.clone(),
            max_redirects: options.max_redirects,
        }
    }
}

impl<C: HttpClient> TransferExecutor for HttpTransfer<C> {
    async fn transfer(&self, job: TransferJob<'_>) -> Result<u64> {
        let offset = fieldkit_fs::file_len(job.partial).unwrap_or(0);

        let mut headers = vec![("Accept-Encoding".to_string(), "identity".to_string())];
        if offset > 0 {
            headers.push(("Range".to_string(), format!("bytes={offset}-")));
        }

        let policy = RedirectPolicy {
            trusted_domains: &self.trusted_domains,
            max_redirects: self.max_redirects,
        };
        let client = &self.client;
        let (url, response) = send_following(
            policy,
            job.url,
            job.credential,
            &headers,
            move |hop_url, hop_headers| async move { client.get(hop_url.as_str(), &hop_headers).await },
        )
        .await?;

        let append = match response.status {
            206 if offset > 0 => true,
            // Either a fresh download or the server ignored the range.
            200..=299 => false,
            416 => {
                return Err(FetchError::RangeNotSatisfiable {
                    url: url.to_string(),
                });
            }
            status => {
                return Err(FetchError::Status {
                    status,
                    url: url.to_string(),
                });
            }
        };

        if offset > 0 && !append {
            tracing::warn!(url = %url, offset, "server ignored range request, restarting from zero");
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(job.partial)
            .await
            .map_err(FetchError::io(job.partial))?;

        let mut written = if append { offset } else { 0 };
        let total = response.content_length.map(|len| written + len);
        job.report(written, total)?;

        let mut body = response.body;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| FetchError::network(&e))?;
            file.write_all(&chunk)
                .await
                .map_err(FetchError::io(job.partial))?;
            written += chunk.len() as u64;

            if let Err(e) = job.report(written, total) {
                let _ = file.flush().await;
                return Err(e);
            }
        }

        file.flush().await.map_err(FetchError::io(job.partial))?;
        file.sync_all().await.map_err(FetchError::io(job.partial))?;

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::http::{Body, HttpResponse};
    use bytes::Bytes;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tempfile::tempdir;

    #[derive(Debug)]
    struct MockError(String);

    impl std::fmt::Display for MockError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for MockError {}

    /// Serves `data`, honouring `Range` unless `ignore_range` or `reject_range`.
    struct RangeServer {
        data: Vec<u8>,
        ignore_range: bool,
        reject_range: bool,
        ranges: Mutex<Vec<Option<String>>>,
    }

    impl RangeServer {
        fn new(data: Vec<u8>) -> Self {
            Self {
                data,
                ignore_range: false,
                reject_range: false,
                ranges: Mutex::new(Vec::new()),
            }
        }
    }

    impl HttpClient for RangeServer {
        type Error = MockError;

        async fn head(
            &self,
            _url: &str,
            _headers: &[(String, String)],
        ) -> std::result::Result<HttpResponse<()>, Self::Error> {
            Err(MockError("HEAD not scripted".into()))
        }

        async fn get(
            &self,
            _url: &str,
            headers: &[(String, String)],
        ) -> std::result::Result<HttpResponse<Body<Self::Error>>, Self::Error> {
            let range = headers
                .iter()
                .find(|(k, _)| k == "Range")
                .map(|(_, v)| v.clone());
            self.ranges.lock().unwrap().push(range.clone());

            let start = match range {
                Some(_) if self.reject_range => {
                    return Ok(HttpResponse {
                        status: 416,
                        content_length: None,
                        location: None,
                        body: Box::pin(futures_util::stream::empty()),
                    });
                }
                Some(r) if !self.ignore_range => r
                    .trim_start_matches("bytes=")
                    .trim_end_matches('-')
                    .parse::<usize>()
                    .unwrap(),
                _ => 0,
            };

            let rest = self.data[start..].to_vec();
            let chunks: Vec<std::result::Result<Bytes, MockError>> = rest
                .chunks(1024)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();

            Ok(HttpResponse {
                status: if start > 0 { 206 } else { 200 },
                content_length: Some(rest.len() as u64),
                location: None,
                body: Box::pin(futures_util::stream::iter(chunks)),
            })
        }
    }

    fn options() -> EngineOptions {
        EngineOptions::new("/unused")
    }

    fn continue_always(_: u64, _: Option<u64>) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    #[tokio::test]
    async fn test_fresh_transfer_writes_everything() {
        let dir = tempdir().unwrap();
        let partial = dir.path().join("asr.bin.tmp");
        let data: Vec<u8> = (0..10_000u32).map(|i| i as u8).collect();
        let transfer = HttpTransfer::new(RangeServer::new(data.clone()), &options());

        let written = transfer
            .transfer(TransferJob {
                url: "https://example.com/asr.bin",
                credential: None,
                partial: &partial,
                on_progress: &continue_always,
            })
            .await
            .unwrap();

        assert_eq!(written, 10_000);
        assert_eq!(std::fs::read(&partial).unwrap(), data);
        assert_eq!(transfer.client.ranges.lock().unwrap()[0], None);
    }

    #[tokio::test]
    async fn test_resume_appends_from_offset() {
        let dir = tempdir().unwrap();
        let partial = dir.path().join("asr.bin.tmp");
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&partial, &data[..4_000]).unwrap();
        let transfer = HttpTransfer::new(RangeServer::new(data.clone()), &options());

        let first_tick = AtomicU64::new(u64::MAX);
        let on_progress = |done: u64, total: Option<u64>| {
            let _ = first_tick.compare_exchange(u64::MAX, done, Ordering::SeqCst, Ordering::SeqCst);
            assert_eq!(total, Some(10_000));
            ControlFlow::Continue(())
        };

        let written = transfer
            .transfer(TransferJob {
                url: "https://example.com/asr.bin",
                credential: None,
                partial: &partial,
                on_progress: &on_progress,
            })
            .await
            .unwrap();

        assert_eq!(written, 10_000);
        assert_eq!(first_tick.load(Ordering::SeqCst), 4_000);
        assert_eq!(std::fs::read(&partial).unwrap(), data);
        assert_eq!(
            transfer.client.ranges.lock().unwrap()[0].as_deref(),
            Some("bytes=4000-")
        );
    }

    #[tokio::test]
    async fn test_ignored_range_restarts_file() {
        let dir = tempdir().unwrap();
        let partial = dir.path().join("asr.bin.tmp");
        std::fs::write(&partial, vec![0xFFu8; 3_000]).unwrap();
        let mut server = RangeServer::new(vec![1u8; 5_000]);
        server.ignore_range = true;
        let transfer = HttpTransfer::new(server, &options());

        let written = transfer
            .transfer(TransferJob {
                url: "https://example.com/asr.bin",
                credential: None,
                partial: &partial,
                on_progress: &continue_always,
            })
            .await
            .unwrap();

        assert_eq!(written, 5_000);
        assert_eq!(std::fs::read(&partial).unwrap(), vec![1u8; 5_000]);
    }

    #[tokio::test]
    async fn test_rejected_range_is_reported() {
        let dir = tempdir().unwrap();
        let partial = dir.path().join("asr.bin.tmp");
        std::fs::write(&partial, vec![0u8; 100]).unwrap();
        let mut server = RangeServer::new(vec![1u8; 5_000]);
        server.reject_range = true;
        let transfer = HttpTransfer::new(server, &options());

        let err = transfer
            .transfer(TransferJob {
                url: "https://example.com/asr.bin",
                credential: None,
                partial: &partial,
                on_progress: &continue_always,
            })
            .await
            .unwrap_err();

        assert!(err.is_range_rejection());
        assert_eq!(std::fs::read(&partial).unwrap().len(), 100);
    }

    #[tokio::test]
    async fn test_break_stops_transfer() {
        let dir = tempdir().unwrap();
        let partial = dir.path().join("asr.bin.tmp");
        let transfer = HttpTransfer::new(RangeServer::new(vec![2u8; 50_000]), &options());

        let stop_after = |done: u64, _: Option<u64>| {
            if done >= 2_048 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        };

        let err = transfer
            .transfer(TransferJob {
                url: "https://example.com/asr.bin",
                credential: None,
                partial: &partial,
                on_progress: &stop_after,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Cancelled));
        assert_eq!(std::fs::read(&partial).unwrap().len(), 2_048);
    }
}
