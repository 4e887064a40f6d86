//! Single-flight, resumable acquisition of large assets over HTTP.
//!
//! # Architecture
//!
//! This crate follows the three-layer pattern:
//! - [`data`] - Immutable requests, options and outcomes
//! - [`core`] - Pure logic: redirect rules and error classification
//! - `effects` - I/O behind the [`HttpClient`] and [`TransferExecutor`] traits
//!
//! [`AcquisitionEngine`] ties them together behind a [`gate::SingleFlightGate`].
//!
//! # Key Features
//!
//! - **Single-Flight**: concurrent callers share one transfer and one outcome
//! - **Resumable**: partial files are continued with `Range` requests and
//!   discarded when they no longer fit the remote asset
//! - **Atomic Placement**: the final file appears only at full length
//! - **Scoped Credentials**: the bearer token follows redirects only to
//!   trusted hosts

pub mod core;
pub mod data;
mod effects;
mod engine;
mod error;
pub mod gate;

pub use core::{ErrorKind, classify};
pub use data::{
    AcquirePhase, AcquiredAsset, AcquisitionOutcome, AcquisitionRequest, EngineOptions, Origin,
    ProgressSink, Timeouts,
};
pub use effects::{
    Body, BoxStream, HttpClient, HttpResponse, HttpTransfer, MetadataProbe, ProgressFn,
    TransferExecutor, TransferJob,
};
pub use engine::AcquisitionEngine;
pub use error::{AcquireError, FetchError, Result, error_chain};

#[cfg(feature = "reqwest")]
pub use effects::ReqwestClient;

pub use fieldkit_fs::{FsSpaceProbe, SpaceProbe};
