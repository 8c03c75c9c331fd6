//! # Transport
//!
//! The seam between the typed API facade and whatever actually carries the
//! bytes. Production uses [`crate::io::http::HttpTransport`]; tests plug in
//! an in-memory spreadsheet.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Raw access to the remote data boundary.
///
/// Implementations return the decoded response body (normally an envelope)
/// and map network and HTTP-status failures to [`crate::ClientError`].
/// Envelope semantics are left to the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Read call: `?action=<action>&<params>`
    async fn get(&self, action: &str, params: &[(&str, String)]) -> Result<Value>;

    /// Write call; `body` already carries its `action` key
    async fn post(&self, body: Value) -> Result<Value>;
}
