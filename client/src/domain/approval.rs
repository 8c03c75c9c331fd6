//! Double-submission guard for approve/reject.
//!
//! A transaction id is "busy" from the moment an approval request is issued
//! until the request and the reload after it have finished. A second request
//! for a busy id is refused before it reaches the server. No idempotency key
//! is sent, so this only protects a single client.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::{ClientError, Result};

#[derive(Debug, Default)]
pub struct InFlightSet {
    ids: Mutex<HashSet<String>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn ids(&self) -> MutexGuard<'_, HashSet<String>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `id` busy until the returned guard is dropped
    pub fn begin(&self, id: &str) -> Result<InFlightGuard<'_>> {
        if !self.ids().insert(id.to_string()) {
            debug!("Refusing duplicate approval request for {}", id);
            return Err(ClientError::InFlight(id.to_string()));
        }
        Ok(InFlightGuard {
            set: self,
            id: id.to_string(),
        })
    }

    /// Lets a view disable the approve/reject buttons of a row
    pub fn is_busy(&self, id: &str) -> bool {
        self.ids().contains(id)
    }
}

#[derive(Debug)]
pub struct InFlightGuard<'a> {
    set: &'a InFlightSet,
    id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.ids().remove(&self.id);
    }
}
