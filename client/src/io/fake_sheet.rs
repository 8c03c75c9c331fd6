//! In-memory stand-in for the spreadsheet web app, used by the client's tests.
//!
//! Rows are stored the way the sheet stores them (PascalCase columns, some
//! numbers as strings) so every read goes through the real normalizer.
//! Individual calls can be scripted, delayed, or made to fail, and writes can
//! be held back from reads to imitate the sheet's propagation lag.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use shared::{normalize_student, normalize_transaction, TransactionStatus, TransactionType};

use crate::error::{ClientError, Result};
use crate::io::transport::Transport;

/// One scripted answer for the next call of an action
pub struct Scripted {
    delay: Option<Duration>,
    outcome: Result<Value>,
}

impl Scripted {
    /// `{ success: true, data }`
    pub fn data(data: Value) -> Self {
        Self::body(ok(data))
    }

    /// Raw response body, envelope or not
    pub fn body(body: Value) -> Self {
        Self { delay: None, outcome: Ok(body) }
    }

    pub fn fail(error: ClientError) -> Self {
        Self { delay: None, outcome: Err(error) }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

fn ok(data: Value) -> Value {
    json!({ "success": true, "data": data })
}

fn rejected(message: &str) -> Value {
    json!({ "success": false, "message": message })
}

#[derive(Default)]
struct SheetState {
    students: Vec<Value>,
    transactions: Vec<Value>,
    /// Created transactions not yet visible to reads
    unpublished: Vec<Value>,
    lagging: bool,
    /// Acknowledge deposits and withdrawals without echoing the stored row
    bare_acks: bool,
    /// Students whose balance lookup is refused
    failing_balances: HashSet<String>,
    next_id: u64,
    scripted: HashMap<String, VecDeque<Scripted>>,
    delays: HashMap<String, Duration>,
    calls: Vec<String>,
    posts: Vec<Value>,
}

#[derive(Default)]
pub struct FakeSheet {
    state: Mutex<SheetState>,
}

impl FakeSheet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Two students and four transactions:
    /// Budi (101, 7A) has T1 pending 50000 and T2 completed 25000;
    /// Siti (102, 8B) has T3 completed 40000 and T4 a completed 10000 withdrawal.
    pub fn seeded() -> Self {
        let sheet = Self::default();
        {
            let mut state = sheet.state.lock().unwrap();
            state.students = vec![
                json!({ "NIS": "101", "Name": "Budi", "Kelas": "7A", "ParentName": "Pak Harto", "Phone": "0811", "Status": "active" }),
                json!({ "NIS": 102, "Name": "Siti", "Kelas": "8B", "ParentName": "Bu Ani", "Phone": "0812", "Status": "active" }),
            ];
            state.transactions = vec![
                json!({ "ID": "T1", "StudentId": "101", "Type": "deposit", "Amount": "50000", "Status": "pending", "Method": "Transfer/Request", "Date": "2024-01-02 08:00:00", "CreatedBy": "Budi" }),
                json!({ "ID": "T2", "StudentId": "101", "Type": "deposit", "Amount": 25000, "Status": "completed", "Date": "2024-01-03 08:00:00" }),
                json!({ "ID": "T3", "StudentId": 102, "Type": "Deposit", "Amount": 40000, "Status": "Completed", "Date": "2024-01-04 08:00:00" }),
                json!({ "ID": "T4", "StudentId": "102", "Type": "withdraw", "Amount": "10000", "Status": "completed", "Date": "2024-01-05 08:00:00" }),
            ];
        }
        sheet
    }

    /// While lagging, new transactions are accepted but reads do not see them
    pub fn set_lagging(&self, lagging: bool) {
        self.state.lock().unwrap().lagging = lagging;
    }

    /// Answer deposits and withdrawals with `{ success: true }` and no row
    pub fn set_bare_acks(&self, bare: bool) {
        self.state.lock().unwrap().bare_acks = bare;
    }

    /// Refuse every balance lookup for `student_id`
    pub fn fail_balance_of(&self, student_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_balances
            .insert(student_id.to_string());
    }

    /// Make every held-back write visible
    pub fn publish(&self) {
        let mut state = self.state.lock().unwrap();
        let pending = std::mem::take(&mut state.unpublished);
        state.transactions.extend(pending);
    }

    pub fn script(&self, action: &str, reply: Scripted) {
        self.state
            .lock()
            .unwrap()
            .scripted
            .entry(action.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Every call of `action` waits this long before answering
    pub fn delay(&self, action: &str, delay: Duration) {
        self.state.lock().unwrap().delays.insert(action.to_string(), delay);
    }

    pub fn calls(&self, action: &str) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|c| *c == action).count()
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub fn last_post(&self) -> Option<Value> {
        self.state.lock().unwrap().posts.last().cloned()
    }

    /// Raw transaction row as the sheet currently stores it
    pub fn transaction(&self, id: &str) -> Option<Value> {
        let state = self.state.lock().unwrap();
        state
            .transactions
            .iter()
            .chain(state.unpublished.iter())
            .find(|row| normalize_transaction(row).id == id)
            .cloned()
    }

    async fn answer(&self, action: &str, compute: impl FnOnce(&mut SheetState) -> Value) -> Result<Value> {
        let (reply, delay) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(action.to_string());
            let delay = state.delays.get(action).copied();
            let scripted = state.scripted.get_mut(action).and_then(VecDeque::pop_front);
            let reply = match scripted {
                Some(reply) => reply,
                None => Scripted::body(compute(&mut state)),
            };
            (reply, delay)
        };

        if let Some(delay) = reply.delay.or(delay) {
            tokio::time::sleep(delay).await;
        }
        reply.outcome
    }
}

impl SheetState {
    fn balance(&self, student_id: &str) -> f64 {
        self.transactions
            .iter()
            .map(normalize_transaction)
            .filter(|t| t.student_id == student_id && t.status == TransactionStatus::Completed)
            .map(|t| match t.transaction_type {
                TransactionType::Deposit => t.amount,
                TransactionType::Withdraw => -t.amount,
            })
            .sum()
    }

    fn read(&self, action: &str, params: &[(&str, String)]) -> Value {
        let param = |name: &str| {
            params
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.clone())
                .unwrap_or_default()
        };

        match action {
            "getStudents" => ok(Value::Array(self.students.clone())),
            "getTransactions" => ok(Value::Array(self.transactions.clone())),
            "getStudent" => {
                let id = param("id");
                let student = self.students.iter().find(|s| normalize_student(s).id == id);
                ok(student.cloned().unwrap_or(Value::Null))
            }
            "getBalance" => {
                let student_id = param("student_id");
                if self.failing_balances.contains(&student_id) {
                    return rejected("Saldo tidak dapat dibaca");
                }
                ok(json!({ "Balance": self.balance(&student_id) }))
            }
            "getDashboardStats" => {
                let total: f64 = self
                    .students
                    .iter()
                    .map(|s| self.balance(&normalize_student(s).id))
                    .sum();
                let today = shared::aggregate::today_deposit_total(
                    &self.transactions.iter().map(normalize_transaction).collect::<Vec<_>>(),
                    Utc::now(),
                );
                ok(json!({
                    "totalStudents": self.students.len(),
                    "totalSavings": total,
                    "todayDeposits": today,
                }))
            }
            other => rejected(&format!("Unknown action: {}", other)),
        }
    }

    fn next_transaction_id(&mut self) -> String {
        self.next_id += 1;
        format!("T{}", 100 + self.next_id)
    }

    fn write(&mut self, body: &Value) -> Value {
        let field = |key: &str| body.get(key).cloned().unwrap_or(Value::Null);
        let action = body.get("action").and_then(Value::as_str).unwrap_or_default();

        match action {
            "createStudent" => {
                let mut row = fields_without_action(body);
                row.insert("id".to_string(), field("nis"));
                row.insert("created_at".to_string(), json!(Utc::now().to_rfc3339()));
                let row = Value::Object(row);
                self.students.push(row.clone());
                ok(row)
            }
            "updateStudent" => {
                let id = body.get("id").and_then(Value::as_str).unwrap_or_default();
                let Some(row) = self.students.iter_mut().find(|s| normalize_student(s).id == id) else {
                    return rejected("Student not found");
                };
                if let Value::Object(map) = row {
                    map.extend(fields_without_action(body));
                }
                ok(row.clone())
            }
            "deposit" | "withdraw" => {
                let kind = if action == "deposit" { "deposit" } else { "withdraw" };
                let status = match action {
                    "deposit" => body
                        .get("Status")
                        .and_then(Value::as_str)
                        .unwrap_or("completed")
                        .to_string(),
                    _ => "completed".to_string(),
                };
                let student_id = body.get("StudentId").and_then(Value::as_str).unwrap_or_default();
                let amount = body.get("Amount").and_then(Value::as_f64).unwrap_or_default();
                if kind == "withdraw" && amount > self.balance(student_id) {
                    return rejected("Saldo tidak mencukupi");
                }

                let row = json!({
                    "ID": self.next_transaction_id(),
                    "StudentId": student_id,
                    "Type": kind,
                    "Amount": amount,
                    "Status": status,
                    "Method": field("Method"),
                    "Note": field("Note"),
                    "CreatedBy": field("CreatedBy"),
                    "Date": Utc::now().to_rfc3339(),
                });
                if self.lagging {
                    self.unpublished.push(row.clone());
                } else {
                    self.transactions.push(row.clone());
                }
                if self.bare_acks {
                    json!({ "success": true })
                } else {
                    ok(row)
                }
            }
            "approveTransaction" | "rejectTransaction" => {
                let id = body.get("id").and_then(Value::as_str).unwrap_or_default();
                let Some(row) = self.transactions.iter_mut().find(|t| normalize_transaction(t).id == id) else {
                    return rejected("Transaction not found");
                };
                if !normalize_transaction(row).is_pending() {
                    return rejected("Transaction is not pending");
                }
                let target = if action == "approveTransaction" { "completed" } else { "rejected" };
                row["Status"] = json!(target);
                ok(row.clone())
            }
            "login" => {
                let username = body.get("username").and_then(Value::as_str).unwrap_or_default();
                let password = body.get("password").and_then(Value::as_str).unwrap_or_default();
                match (username, password) {
                    ("admin", "admin123") => ok(json!({
                        "user": { "id": "U1", "username": "admin", "name": "Admin Sekolah", "role": "admin" },
                        "token": "token-admin",
                    })),
                    ("budi", "rahasia") => ok(json!({
                        "user": { "id": "U2", "username": "budi", "name": "Budi", "role": "student", "student_id": "101" },
                        "token": "token-budi",
                    })),
                    _ => json!({ "success": false }),
                }
            }
            other => rejected(&format!("Unknown action: {}", other)),
        }
    }
}

fn fields_without_action(body: &Value) -> Map<String, Value> {
    let mut fields = body.as_object().cloned().unwrap_or_default();
    fields.remove("action");
    fields
}

#[async_trait]
impl Transport for FakeSheet {
    async fn get(&self, action: &str, params: &[(&str, String)]) -> Result<Value> {
        self.answer(action, |state| state.read(action, params)).await
    }

    async fn post(&self, body: Value) -> Result<Value> {
        let action = body
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.state.lock().unwrap().posts.push(body.clone());
        self.answer(&action, |state| state.write(&body)).await
    }
}
