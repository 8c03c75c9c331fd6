//! # Savings API
//!
//! Typed facade over a [`Transport`]. Every response is unwrapped from its
//! `{ success, data, message }` envelope and run through the field
//! normalizer before it reaches the domain layer.
//!
//! ## Key Functions
//! - Reads: `get_students`, `get_student`, `get_transactions`, `get_balance`,
//!   `get_dashboard_stats`
//! - Writes: `create_student`, `update_student`, `update_profile`, `deposit`,
//!   `withdraw`, `set_approval`
//! - `login`

use std::sync::Arc;

use serde_json::Value;
use shared::{
    normalize_balance, normalize_dashboard_stats, normalize_student, normalize_students,
    normalize_transaction, normalize_transactions, normalize_user, ApprovalAction,
    DashboardStats, DepositRequest, Envelope, LoginRequest, ProfileForm, Session, Student,
    StudentForm, Transaction, WithdrawRequest,
};
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::io::payloads;
use crate::io::transport::Transport;

pub const GET_STUDENTS: &str = "getStudents";
pub const GET_STUDENT: &str = "getStudent";
pub const GET_TRANSACTIONS: &str = "getTransactions";
pub const GET_BALANCE: &str = "getBalance";
pub const GET_DASHBOARD_STATS: &str = "getDashboardStats";

const LOGIN_REJECTED: &str = "Invalid username or password";

pub struct SavingsApi<T> {
    transport: Arc<T>,
}

impl<T> Clone for SavingsApi<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}

/// Check the envelope and hand back its `data`, if any
fn unwrap_envelope(action: &str, body: Value) -> Result<Option<Value>> {
    let envelope: Envelope<Value> = serde_json::from_value(body).map_err(|e| {
        warn!("{} returned something that is not an envelope: {}", action, e);
        ClientError::Decode(e.to_string())
    })?;

    if !envelope.success {
        warn!("{} rejected: {:?}", action, envelope.message);
        return Err(ClientError::application(envelope.message));
    }
    Ok(envelope.data.filter(|data| !data.is_null()))
}

/// Normalize a single-record payload; a missing or non-object body yields `None`
fn record<R>(data: Option<Value>, normalize: fn(&Value) -> R) -> Option<R> {
    data.filter(Value::is_object).map(|raw| normalize(&raw))
}

impl<T: Transport> SavingsApi<T> {
    pub fn new(transport: T) -> Self {
        Self::from_arc(Arc::new(transport))
    }

    pub fn from_arc(transport: Arc<T>) -> Self {
        Self { transport }
    }

    async fn read(&self, action: &str, params: &[(&str, String)]) -> Result<Option<Value>> {
        let body = self.transport.get(action, params).await?;
        unwrap_envelope(action, body)
    }

    async fn write(&self, body: Value) -> Result<Option<Value>> {
        let action = body
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let response = self.transport.post(body).await?;
        unwrap_envelope(&action, response)
    }

    pub async fn get_students(&self) -> Result<Vec<Student>> {
        let data = self.read(GET_STUDENTS, &[]).await?.unwrap_or(Value::Null);
        let students = normalize_students(&data);
        debug!("Fetched {} students", students.len());
        Ok(students)
    }

    pub async fn get_student(&self, id: &str) -> Result<Option<Student>> {
        let data = self.read(GET_STUDENT, &[("id", id.to_string())]).await?;
        Ok(record(data, normalize_student))
    }

    pub async fn get_transactions(&self) -> Result<Vec<Transaction>> {
        let data = self.read(GET_TRANSACTIONS, &[]).await?.unwrap_or(Value::Null);
        let transactions = normalize_transactions(&data);
        debug!("Fetched {} transactions", transactions.len());
        Ok(transactions)
    }

    /// Server-side balance of one student; a missing payload reads as 0
    pub async fn get_balance(&self, student_id: &str) -> Result<f64> {
        let data = self
            .read(GET_BALANCE, &[("student_id", student_id.to_string())])
            .await?;
        Ok(data.as_ref().map(normalize_balance).unwrap_or(0.0))
    }

    pub async fn get_dashboard_stats(&self) -> Result<DashboardStats> {
        let data = self.read(GET_DASHBOARD_STATS, &[]).await?;
        Ok(data.as_ref().map(normalize_dashboard_stats).unwrap_or_default())
    }

    pub async fn create_student(&self, form: &StudentForm) -> Result<Option<Student>> {
        info!("Creating student {} ({})", form.name, form.nis);
        let data = self.write(payloads::create_student_body(form)).await?;
        Ok(record(data, normalize_student))
    }

    pub async fn update_student(&self, id: &str, form: &StudentForm) -> Result<Option<Student>> {
        info!("Updating student {}", id);
        let data = self.write(payloads::update_student_body(id, form)).await?;
        Ok(record(data, normalize_student))
    }

    pub async fn update_profile(&self, id: &str, form: &ProfileForm) -> Result<Option<Student>> {
        info!("Updating profile of student {}", id);
        let data = self.write(payloads::update_profile_body(id, form)).await?;
        Ok(record(data, normalize_student))
    }

    pub async fn deposit(&self, request: &DepositRequest) -> Result<Option<Transaction>> {
        info!(
            "Depositing {} for student {} ({})",
            request.amount, request.student_id, request.status
        );
        let data = self.write(payloads::deposit_body(request)).await?;
        Ok(record(data, normalize_transaction))
    }

    pub async fn withdraw(&self, request: &WithdrawRequest) -> Result<Option<Transaction>> {
        info!("Withdrawing {} for student {}", request.amount, request.student_id);
        let data = self.write(payloads::withdraw_body(request)).await?;
        Ok(record(data, normalize_transaction))
    }

    /// Approve or reject one transaction on the server
    pub async fn set_approval(&self, id: &str, action: ApprovalAction) -> Result<Option<Transaction>> {
        info!("{} {}", action.action_name(), id);
        let data = self.write(payloads::approval_body(id, action)).await?;
        Ok(record(data, normalize_transaction))
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<Session> {
        let body = self.transport.post(payloads::login_body(request)).await?;
        let data = match unwrap_envelope(payloads::LOGIN, body) {
            Err(ClientError::Application(message)) if message == ClientError::DEFAULT_REJECTION => {
                return Err(ClientError::Application(LOGIN_REJECTED.to_string()))
            }
            other => other?,
        };

        let data = data.ok_or_else(|| ClientError::Decode("login returned no data".to_string()))?;
        let user = data
            .get("user")
            .and_then(normalize_user)
            .ok_or_else(|| ClientError::Decode("login response has no user record".to_string()))?;
        let token = data
            .get("token")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        info!("Logged in as {} ({:?})", user.username, user.role);
        Ok(Session { user, token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::fake_sheet::FakeSheet;
    use serde_json::json;
    use shared::{Role, TransactionStatus, TransactionType};

    fn api(sheet: FakeSheet) -> (SavingsApi<FakeSheet>, Arc<FakeSheet>) {
        let sheet = Arc::new(sheet);
        (SavingsApi::from_arc(Arc::clone(&sheet)), sheet)
    }

    #[test]
    fn test_unwrap_envelope() {
        assert_eq!(
            unwrap_envelope("x", json!({ "success": true, "data": [1] })).unwrap(),
            Some(json!([1]))
        );
        assert_eq!(unwrap_envelope("x", json!({ "success": true, "data": null })).unwrap(), None);
        assert_eq!(
            unwrap_envelope("x", json!({ "success": false, "message": "Saldo tidak cukup" })).unwrap_err(),
            ClientError::Application("Saldo tidak cukup".to_string())
        );
        assert!(matches!(
            unwrap_envelope("x", json!("<html>")).unwrap_err(),
            ClientError::Decode(_)
        ));
    }

    #[tokio::test]
    async fn test_reads_are_normalized() {
        let (api, _) = api(FakeSheet::seeded());

        let students = api.get_students().await.unwrap();
        assert_eq!(students[0].id, "101");
        assert_eq!(students[0].name, "Budi");
        assert_eq!(students[0].class, "7A");

        let transactions = api.get_transactions().await.unwrap();
        let t1 = transactions.iter().find(|t| t.id == "T1").unwrap();
        assert_eq!(t1.student_id, "101");
        assert_eq!(t1.amount, 50000.0);
        assert_eq!(t1.status, TransactionStatus::Pending);

        assert_eq!(api.get_balance("101").await.unwrap(), 25000.0);
        assert_eq!(api.get_balance("nobody").await.unwrap(), 0.0);
        assert_eq!(api.get_dashboard_stats().await.unwrap().total_students, 2);
        assert_eq!(api.get_student("102").await.unwrap().unwrap().name, "Siti");
        assert_eq!(api.get_student("999").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_deposit_returns_the_created_record() {
        let (api, sheet) = api(FakeSheet::seeded());
        let created = api
            .deposit(&DepositRequest {
                student_id: "101".to_string(),
                amount: 15000.0,
                method: "Tunai".to_string(),
                note: String::new(),
                status: TransactionStatus::Pending,
                created_by: Some("Budi".to_string()),
            })
            .await
            .unwrap()
            .unwrap();

        assert!(!created.id.is_empty());
        assert_eq!(created.transaction_type, TransactionType::Deposit);
        assert_eq!(created.status, TransactionStatus::Pending);
        assert_eq!(sheet.last_post().unwrap()["StudentId"], "101");
    }

    #[tokio::test]
    async fn test_application_failure_surfaces_server_message() {
        let (api, _) = api(FakeSheet::seeded());
        let err = api.set_approval("T2", ApprovalAction::Approve).await.unwrap_err();
        assert_eq!(err, ClientError::Application("Transaction is not pending".to_string()));
    }

    #[tokio::test]
    async fn test_login() {
        let (api, _) = api(FakeSheet::seeded());

        let session = api.login(&LoginRequest::new(" budi ", "rahasia")).await.unwrap();
        assert_eq!(session.user.role, Role::Student);
        assert_eq!(session.user.student_id.as_deref(), Some("101"));
        assert!(!session.token.is_empty());

        let err = api.login(&LoginRequest::new("budi", "wrong")).await.unwrap_err();
        assert_eq!(err, ClientError::Application("Invalid username or password".to_string()));
    }
}
