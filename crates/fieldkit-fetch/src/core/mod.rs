//! Pure logic: error classification and redirect handling.

mod classify;
mod redirect;

pub use classify::{ErrorKind, classify, classify_status};
pub use redirect::{bearer_header, is_redirect, is_trusted_host, resolve_location};
