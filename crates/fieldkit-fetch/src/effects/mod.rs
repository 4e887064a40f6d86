//! I/O seams: HTTP client, metadata probe, and transfer executor.

pub mod http;
pub mod probe;
pub mod transfer;

#[cfg(feature = "reqwest")]
pub use http::ReqwestClient;
pub use http::{Body, BoxStream, HttpClient, HttpResponse};
pub use probe::MetadataProbe;
pub use transfer::{HttpTransfer, ProgressFn, TransferExecutor, TransferJob};
