//! Sync layer: talks to a remote annotation service over HTTP.

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{HttpStore, SyncError};
