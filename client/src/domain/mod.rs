//! # Domain Layer
//!
//! Screen state and the rules that keep it in step with the spreadsheet:
//! the reconciliation controller, the pending-write overlay, the approval
//! in-flight guard and passive polling.

pub mod approval;
pub mod pending_writes;
pub mod polling;
pub mod reconciliation;
pub mod screen;

pub use approval::InFlightSet;
pub use pending_writes::PendingWrites;
pub use polling::{PeriodicRefresh, PeriodicRefreshConfig};
pub use reconciliation::{DepositForm, ReconciliationController, ReconciliationPolicy, WithdrawForm};
pub use screen::{Fetched, Screen, ScreenState};
