//! Approval workflow for savings transactions.
//!
//! `pending` may move to `completed` (approve) or `rejected` (reject). Both
//! are terminal.

use thiserror::Error;

use crate::{Role, Transaction, TransactionStatus, TransactionType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApprovalAction {
    Approve,
    Reject,
}

impl ApprovalAction {
    /// Remote action name for this transition
    pub fn action_name(&self) -> &'static str {
        match self {
            ApprovalAction::Approve => "approveTransaction",
            ApprovalAction::Reject => "rejectTransaction",
        }
    }

    pub fn target(&self) -> TransactionStatus {
        match self {
            ApprovalAction::Approve => TransactionStatus::Completed,
            ApprovalAction::Reject => TransactionStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("transaction is already {0} and cannot change")]
    AlreadyFinal(TransactionStatus),
}

impl TransactionStatus {
    /// Status after `action`, or an error if this status is terminal
    pub fn apply(self, action: ApprovalAction) -> Result<TransactionStatus, TransitionError> {
        match self {
            TransactionStatus::Pending => Ok(action.target()),
            terminal => Err(TransitionError::AlreadyFinal(terminal)),
        }
    }
}

impl Transaction {
    /// Move this transaction through the approval workflow in place
    pub fn transition(&mut self, action: ApprovalAction) -> Result<(), TransitionError> {
        self.status = self.status.apply(action)?;
        Ok(())
    }
}

/// Status a freshly created transaction starts in.
///
/// Students can only ask; admins complete immediately unless they flag the
/// deposit as pending. Withdrawals are always paid out on the spot.
pub fn initial_status(
    kind: TransactionType,
    initiator: Role,
    flagged_pending: bool,
) -> TransactionStatus {
    match (kind, initiator) {
        (TransactionType::Withdraw, _) => TransactionStatus::Completed,
        (TransactionType::Deposit, Role::Student) => TransactionStatus::Pending,
        (TransactionType::Deposit, Role::Admin) if flagged_pending => TransactionStatus::Pending,
        (TransactionType::Deposit, Role::Admin) => TransactionStatus::Completed,
    }
}
