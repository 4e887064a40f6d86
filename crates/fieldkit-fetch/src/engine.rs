use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use fieldkit_fs::{CommitOptions, FsSpaceProbe, SpaceGuard, SpaceProbe, file_len, replace_commit};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::core::ErrorKind;
use crate::data::{AcquirePhase, AcquiredAsset, AcquisitionOutcome, AcquisitionRequest, EngineOptions, Origin};
use crate::effects::{HttpClient, HttpTransfer, MetadataProbe, TransferExecutor, TransferJob};
use crate::error::{AcquireError, FetchError};
use crate::gate::{Claim, SingleFlightGate};

/// Acquires one named asset into a storage directory, at most one transfer
/// at a time.
///
/// Every concurrent [`ensure_acquired`](Self::ensure_acquired) call shares
/// the outcome of the caller that got there first. The owner probes the
/// remote length, reuses or discards the partial file, checks free space,
/// runs the transfer under the request's deadline, verifies the length and
/// publishes the final file with [`replace_commit`].
pub struct AcquisitionEngine<C, T = HttpTransfer<C>, S = FsSpaceProbe> {
    probe: MetadataProbe<C>,
    transfer: T,
    space: SpaceGuard<S>,
    options: EngineOptions,
    gate: SingleFlightGate<AcquisitionOutcome>,
    cancel: Mutex<Option<(u64, CancellationToken)>>,
    phase: watch::Sender<AcquirePhase>,
}

impl<C: HttpClient + Clone> AcquisitionEngine<C> {
    /// Engine whose probe and transfer share one HTTP client.
    pub fn http(client: C, options: EngineOptions) -> Self {
        let transfer = HttpTransfer::new(client.clone(), &options);
        Self::new(client, transfer, options)
    }
}

impl<C: HttpClient, T: TransferExecutor> AcquisitionEngine<C, T> {
    pub fn new(client: C, transfer: T, options: EngineOptions) -> Self {
        let space = SpaceGuard::new(FsSpaceProbe).margin(options.space_margin);
        Self {
            probe: MetadataProbe::new(client, &options),
            transfer,
            space,
            options,
            gate: SingleFlightGate::new(),
            cancel: Mutex::new(None),
            phase: watch::channel(AcquirePhase::Idle).0,
        }
    }
}

impl<C: HttpClient, T: TransferExecutor, S: SpaceProbe> AcquisitionEngine<C, T, S> {
    /// Replaces the free-space source, keeping the configured margin.
    pub fn with_space_probe<P: SpaceProbe>(self, probe: P) -> AcquisitionEngine<C, T, P> {
        AcquisitionEngine {
            probe: self.probe,
            transfer: self.transfer,
            space: SpaceGuard::new(probe).margin(self.options.space_margin),
            options: self.options,
            gate: self.gate,
            cancel: self.cancel,
            phase: self.phase,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn final_path(&self, file_name: &str) -> PathBuf {
        self.options.final_path(file_name)
    }

    pub fn partial_path(&self, file_name: &str) -> PathBuf {
        self.options.partial_path(file_name)
    }

    /// Phase of the most recent acquisition.
    pub fn phase(&self) -> AcquirePhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<AcquirePhase> {
        self.phase.subscribe()
    }

    /// Makes sure the asset named by `request` is on disk.
    ///
    /// If an acquisition is already running, waits for it and returns its
    /// outcome; the progress sink of a joining caller is never invoked.
    pub async fn ensure_acquired(&self, request: AcquisitionRequest) -> AcquisitionOutcome {
        let owner = match self.gate.claim() {
            Claim::Owner(owner) => owner,
            Claim::InFlight(shared) => {
                tracing::debug!(flight = shared.flight_id(), file = %request.file_name, "joining in-flight acquisition");
                return shared
                    .wait()
                    .await
                    .unwrap_or_else(|_| Err(AcquireError::cancelled()));
            }
        };

        let flight = owner.id();
        let token = CancellationToken::new();
        *self.cancel.lock() = Some((flight, token.clone()));
        tracing::debug!(flight, url = %request.url, file = %request.file_name, "starting acquisition");

        let outcome = self.acquire(&request, &token).await;

        match &outcome {
            Ok(asset) => {
                self.set_phase(AcquirePhase::Done);
                tracing::info!(path = %asset.path.display(), len = asset.len, origin = ?asset.origin, "asset ready");
            }
            Err(err) if err.kind() == ErrorKind::Cancelled => {
                self.set_phase(AcquirePhase::Cancelled);
                tracing::info!(file = %request.file_name, "acquisition cancelled");
            }
            Err(err) => {
                self.set_phase(AcquirePhase::Failed);
                tracing::warn!(file = %request.file_name, kind = ?err.kind(), cause = ?err.cause().map(ToString::to_string), "acquisition failed");
            }
        }

        {
            let mut current = self.cancel.lock();
            if current.as_ref().is_some_and(|(id, _)| *id == flight) {
                *current = None;
            }
        }
        owner.complete(outcome.clone());
        outcome
    }

    /// Asks the running owner, if any, to stop at its next progress tick.
    pub fn cancel(&self) {
        if let Some((flight, token)) = self.cancel.lock().as_ref() {
            tracing::debug!(flight, "cancellation requested");
            token.cancel();
        }
    }

    /// Forgets the in-flight acquisition so the next call starts afresh.
    ///
    /// Test and debug harnesses only: the forgotten owner keeps running and
    /// may still write the partial file.
    pub fn reset_for_debug(&self) {
        self.gate.reset();
        self.cancel.lock().take();
        self.set_phase(AcquirePhase::Idle);
    }

    /// Local check only: the final file exists and is non-empty.
    pub fn is_present_locally(&self, file_name: &str) -> bool {
        file_len(self.final_path(file_name)).is_some_and(|len| len > 0)
    }

    /// Whether the final file is present and, when the server reports a
    /// length, matches it. A failed probe counts as a match.
    pub async fn is_already_complete(&self, request: &AcquisitionRequest) -> bool {
        let Some(local) = file_len(self.final_path(&request.file_name)).filter(|len| *len > 0) else {
            return false;
        };
        match self.probe_length(request).await {
            Some(remote) => remote == local,
            None => true,
        }
    }

    fn set_phase(&self, phase: AcquirePhase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            tracing::debug!(from = %previous, to = %phase, "phase");
        }
    }

    /// Probed remote length; any probe error degrades to unknown.
    async fn probe_length(&self, request: &AcquisitionRequest) -> Option<u64> {
        match self
            .probe
            .probe_length(&request.url, request.credential.as_deref())
            .await
        {
            Ok(len) => len,
            Err(err) => {
                tracing::warn!(url = %request.url, error = %err, "length probe failed, continuing without size verification");
                None
            }
        }
    }

    async fn acquire(&self, request: &AcquisitionRequest, token: &CancellationToken) -> AcquisitionOutcome {
        let final_path = self.final_path(&request.file_name);
        let partial_path = self.partial_path(&request.file_name);

        self.set_phase(AcquirePhase::Probing);
        let probed = self.probe_length(request).await;
        if token.is_cancelled() {
            return Err(AcquireError::cancelled());
        }

        if !request.force_fresh {
            if let Some(len) = complete_len(&final_path, probed) {
                self.set_phase(AcquirePhase::SkipAlreadyComplete);
                return Ok(AcquiredAsset {
                    path: final_path,
                    len,
                    origin: Origin::AlreadyComplete,
                });
            }
        }

        let storage_dir = self.options.storage_dir();
        tokio::fs::create_dir_all(storage_dir)
            .await
            .map_err(FetchError::io(storage_dir))?;

        if request.force_fresh {
            fieldkit_fs::remove_if_exists(&partial_path).map_err(FetchError::from)?;
        } else if let (Some(existing), Some(total)) = (file_len(&partial_path), probed) {
            if existing > total {
                tracing::warn!(path = %partial_path.display(), existing, total, "partial file longer than remote asset, discarding");
                fieldkit_fs::remove_if_exists(&partial_path).map_err(FetchError::from)?;
            }
        }

        let resumed_from = file_len(&partial_path).unwrap_or(0);

        if let Some(total) = probed {
            self.set_phase(AcquirePhase::SpaceCheck);
            match self.space.check(storage_dir, total.saturating_sub(resumed_from)) {
                Ok(()) => {}
                Err(err) if err.is_insufficient_space() => {
                    return Err(AcquireError::from_fetch(err.into()));
                }
                Err(err) => {
                    tracing::warn!(dir = %storage_dir.display(), error = %err, "could not read free space, skipping check");
                }
            }
        }

        let restarted = if probed.is_some_and(|total| total > 0 && total == resumed_from) {
            tracing::debug!(path = %partial_path.display(), "partial file already complete, skipping transfer");
            false
        } else {
            self.set_phase(AcquirePhase::Transferring);
            match self.transfer_with_deadline(request, &partial_path, token).await {
                Ok(restarted) => restarted,
                Err(err) => {
                    if request.force_fresh {
                        discard(&partial_path);
                    }
                    return Err(err);
                }
            }
        };

        self.set_phase(AcquirePhase::Verifying);
        let actual = file_len(&partial_path).unwrap_or(0);
        if let Some(expected) = probed {
            if actual != expected {
                discard(&partial_path);
                return Err(FetchError::SizeMismatch { expected, actual }.into());
            }
        }

        self.set_phase(AcquirePhase::Committing);
        let (from, to) = (partial_path.clone(), final_path.clone());
        let committed = tokio::task::spawn_blocking(move || replace_commit(&from, &to, CommitOptions::new())).await;
        match committed {
            Ok(Ok(method)) => {
                tracing::debug!(path = %final_path.display(), ?method, "committed");
            }
            Ok(Err(err)) => return Err(publish_failed(err)),
            Err(err) => return Err(publish_failed(err)),
        }

        let origin = if resumed_from > 0 && !restarted {
            Origin::Resumed
        } else {
            Origin::Transferred
        };
        Ok(AcquiredAsset {
            path: final_path,
            len: actual,
            origin,
        })
    }

    /// Runs the transfer under the request deadline, racing the owner's
    /// cancellation token. Returns whether the partial had to be restarted.
    async fn transfer_with_deadline(
        &self,
        request: &AcquisitionRequest,
        partial: &Path,
        token: &CancellationToken,
    ) -> Result<bool, AcquireError> {
        let sink = request.on_progress.as_deref();
        let high_water = AtomicU64::new(0);

        let on_progress = |done: u64, total: Option<u64>| {
            if token.is_cancelled() {
                return ControlFlow::Break(());
            }
            // Suppress ticks that go backwards after a restart from zero.
            if let Some(sink) = sink {
                if high_water.fetch_max(done, Ordering::Relaxed) <= done {
                    sink(done, total);
                }
            }
            ControlFlow::Continue(())
        };

        let job = TransferJob {
            url: &request.url,
            credential: request.credential.as_deref(),
            partial,
            on_progress: &on_progress,
        };

        let raced = async {
            tokio::select! {
                result = self.transfer_with_retry(job, request.force_fresh) => result,
                () = token.cancelled() => Err(FetchError::Cancelled),
            }
        };

        match tokio::time::timeout(request.timeout, raced).await {
            Ok(result) => result.map_err(AcquireError::from_fetch),
            Err(_) => {
                tracing::warn!(timeout = ?request.timeout, path = %partial.display(), "transfer deadline elapsed");
                Err(AcquireError::from_fetch(FetchError::Timeout))
            }
        }
    }

    /// One transfer, plus a single restart from zero if the server refuses
    /// to resume.
    async fn transfer_with_retry(&self, job: TransferJob<'_>, force_fresh: bool) -> Result<bool, FetchError> {
        match self.transfer.transfer(job).await {
            Err(err) if err.is_range_rejection() && !force_fresh => {
                tracing::warn!(path = %job.partial.display(), error = %err, "server refused to resume, restarting from zero");
                fieldkit_fs::remove_if_exists(job.partial)?;
                fieldkit_fs::recreate_empty(job.partial)?;
                self.transfer.transfer(job).await.map(|_| true)
            }
            other => other.map(|_| false),
        }
    }
}

/// Length of `path` if it counts as a finished download for `probed`.
fn complete_len(path: &Path, probed: Option<u64>) -> Option<u64> {
    let len = file_len(path)?;
    (len > 0 && probed.is_none_or(|remote| remote == len)).then_some(len)
}

fn discard(path: &Path) {
    match fieldkit_fs::remove_if_exists(path) {
        Ok(true) => tracing::debug!(path = %path.display(), "discarded partial file"),
        Ok(false) => {}
        Err(err) => tracing::warn!(path = %path.display(), error = %err, "could not discard partial file"),
    }
}

fn publish_failed(cause: impl std::error::Error + Send + Sync + 'static) -> AcquireError {
    AcquireError::new(ErrorKind::Unclassified)
        .with_message("could not publish downloaded file")
        .with_cause(cause)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_complete_len_rules() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("asr.bin");
        assert_eq!(complete_len(&path, None), None);

        std::fs::write(&path, b"").unwrap();
        assert_eq!(complete_len(&path, None), None);

        std::fs::write(&path, vec![0u8; 10]).unwrap();
        assert_eq!(complete_len(&path, None), Some(10));
        assert_eq!(complete_len(&path, Some(10)), Some(10));
        assert_eq!(complete_len(&path, Some(11)), None);
    }

    #[test]
    fn test_publish_failure_is_unclassified() {
        let err = publish_failed(std::io::Error::other("rename failed"));
        assert_eq!(err.kind(), ErrorKind::Unclassified);
        assert_eq!(err.message(), "could not publish downloaded file");
        assert!(err.cause().is_some());
    }
}
