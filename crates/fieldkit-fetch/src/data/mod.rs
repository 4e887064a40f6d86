//! Immutable request, option, and outcome types.

pub mod options;
pub mod outcome;
pub mod request;

pub use options::{AcquirePhase, EngineOptions, Timeouts};
pub use outcome::{AcquiredAsset, AcquisitionOutcome, Origin};
pub use request::{AcquisitionRequest, ProgressSink};
