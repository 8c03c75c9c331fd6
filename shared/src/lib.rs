//! Canonical records and wire types shared by every layer of the savings client.
//!
//! Everything in this crate is pure: no network, no clock other than the
//! normalizer's "now" fallback, no storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub mod aggregate;
pub mod approval;
pub mod normalize;
pub mod validation;

pub use aggregate::{StudentFilter, TransactionFilter};
pub use approval::{ApprovalAction, TransitionError};
pub use normalize::{
    normalize_balance, normalize_dashboard_stats, normalize_student, normalize_students,
    normalize_transaction, normalize_transactions, normalize_user,
};
pub use validation::{parse_amount_input, AmountValidationError};

/// Lifecycle flag of a student record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    #[default]
    Active,
    Inactive,
}

impl StudentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudentStatus::Active => "active",
            StudentStatus::Inactive => "inactive",
        }
    }
}

/// A student as the rest of the client sees it, whatever casing the sheet used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    /// Student registration number
    pub nis: String,
    pub name: String,
    pub class: String,
    pub parent_name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub status: StudentStatus,
    pub created_at: String,
    /// Source keys the normalizer does not recognise, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Direction of a savings transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    #[default]
    Deposit,
    Withdraw,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdraw => "withdraw",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Approval status of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Completed,
    Rejected,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Rejected => "rejected",
        }
    }

    /// Completed and rejected transactions never change again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deposit or withdrawal in canonical form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// Weak reference to `Student::id`
    pub student_id: String,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// Always finite and non-negative; direction lives in `transaction_type`
    pub amount: f64,
    /// Payment channel, free text
    pub method: String,
    pub note: String,
    pub status: TransactionStatus,
    pub date: DateTime<Utc>,
    /// Actor label, free text
    pub created_by: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Transaction {
    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }

    pub fn is_deposit(&self) -> bool {
        self.transaction_type == TransactionType::Deposit
    }
}

/// Headline numbers for the admin dashboard
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_students: u64,
    pub total_savings: f64,
    pub today_deposits: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Student,
}

/// The logged-in account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub name: String,
    pub role: Role,
    /// Present only for student accounts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
}

/// Which records a session may see
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Student(String),
}

impl Scope {
    pub fn allows(&self, student_id: &str) -> bool {
        match self {
            Scope::All => true,
            Scope::Student(own) => own == student_id,
        }
    }
}

/// Login result kept for the lifetime of a browser-like session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user: User,
    pub token: String,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.user.role == Role::Admin
    }

    /// Own student id for student sessions, if the account carries one
    pub fn student_id(&self) -> Option<&str> {
        self.user
            .student_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
    }

    /// `None` for a student account that is not linked to a student record
    pub fn scope(&self) -> Option<Scope> {
        match self.user.role {
            Role::Admin => Some(Scope::All),
            Role::Student => self.student_id().map(|id| Scope::Student(id.to_string())),
        }
    }
}

/// Wrapper every response of the remote boundary uses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Admin form for creating or editing a student
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StudentForm {
    pub nis: String,
    pub name: String,
    pub class: String,
    pub parent_name: String,
    pub phone: String,
    #[serde(default)]
    pub photo_url: String,
}

/// Fields a student may change on their own record
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProfileForm {
    pub name: String,
    pub parent_name: String,
    pub phone: String,
    #[serde(default)]
    pub photo_url: String,
}

/// Deposit as sent to the remote boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositRequest {
    pub student_id: String,
    pub amount: f64,
    pub method: String,
    pub note: String,
    pub status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

/// Withdrawal as sent to the remote boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub student_id: String,
    pub amount: f64,
    pub method: String,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    /// Credentials are trimmed before they leave the client
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.trim().to_string(),
            password: password.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(role: Role, student_id: Option<&str>) -> Session {
        Session {
            user: User {
                id: "u1".to_string(),
                username: "budi".to_string(),
                name: "Budi".to_string(),
                role,
                student_id: student_id.map(str::to_string),
            },
            token: "tok".to_string(),
        }
    }

    #[test]
    fn test_admin_scope_sees_everything() {
        let session = user(Role::Admin, None);
        assert_eq!(session.scope(), Some(Scope::All));
        assert!(Scope::All.allows("anyone"));
    }

    #[test]
    fn test_student_scope_is_own_id_only() {
        let session = user(Role::Student, Some("S1"));
        let scope = session.scope().unwrap();
        assert!(scope.allows("S1"));
        assert!(!scope.allows("S2"));
    }

    #[test]
    fn test_student_without_link_has_no_scope() {
        assert_eq!(user(Role::Student, None).scope(), None);
        assert_eq!(user(Role::Student, Some("  ")).scope(), None);
    }

    #[test]
    fn test_status_terminality() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_envelope_tolerates_missing_data_and_message() {
        let envelope: Envelope<Value> = serde_json::from_value(json!({ "success": false })).unwrap();
        assert!(!envelope.success);
        assert_eq!(envelope.data, None);
        assert_eq!(envelope.message, None);
    }

    #[test]
    fn test_login_request_trims_credentials() {
        let request = LoginRequest::new("  budi ", " secret\n");
        assert_eq!(request.username, "budi");
        assert_eq!(request.password, "secret");
    }

    #[test]
    fn test_transaction_type_serializes_under_type_key() {
        let tx = normalize_transaction(&json!({ "id": "T1", "type": "withdraw" }));
        let value = serde_json::to_value(&tx).unwrap();
        assert_eq!(value["type"], "withdraw");
        assert!(value.get("transaction_type").is_none());
    }
}
