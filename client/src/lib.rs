//! Async client for the school savings spreadsheet API.
//!
//! - [`io`]: the remote boundary (transport, HTTP, typed API)
//! - [`domain`]: per-screen reconciliation, approvals, polling
//! - [`storage`]: the persisted login session
//! - [`config`], [`logging`], [`error`]: ambient plumbing

pub mod config;
pub mod domain;
pub mod error;
pub mod io;
pub mod logging;
pub mod storage;

pub use config::ClientConfig;
pub use domain::{
    DepositForm, PeriodicRefresh, PeriodicRefreshConfig, ReconciliationController,
    ReconciliationPolicy, Screen, ScreenState, WithdrawForm,
};
pub use error::{ClientError, Result};
pub use io::{HttpTransport, SavingsApi, Transport};
pub use storage::SessionStore;
