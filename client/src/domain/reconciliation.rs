//! # Reconciliation Controller
//!
//! One controller per mounted screen. It owns the screen's [`ScreenState`]
//! and the [`Session`] the screen was mounted for, and it is the only thing
//! that writes to that state.
//!
//! ## Key Functions
//! - `load`: fetch what the screen needs, normalize, overlay pending writes,
//!   replace state. Loads are numbered when issued and a result is applied
//!   only if no later-issued load has been applied already.
//! - Mutations (`create_student`, `update_student`, `update_profile`,
//!   `deposit`, `request_deposit`, `withdraw`, `approve`, `reject`): send the
//!   write, apply the returned (or synthesized) record locally, remember it
//!   as a pending write and schedule a delayed re-fetch.
//!
//! The state mutex is never held across an `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};
use shared::approval::initial_status;
use shared::normalize::DEFAULT_METHOD;
use shared::{
    normalize_student, normalize_transaction, parse_amount_input, ApprovalAction, DepositRequest,
    ProfileForm, Role, Scope, Session, Student, StudentForm, Transaction, TransactionStatus,
    TransactionType, WithdrawRequest,
};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::domain::approval::InFlightSet;
use crate::domain::pending_writes::{upsert, PendingWrites, Placement, LOCAL_ID_PREFIX};
use crate::domain::screen::{Fetched, Screen, ScreenState};
use crate::error::{ClientError, Result};
use crate::io::{SavingsApi, Transport};

/// Method recorded on deposits students request from their dashboard
pub const STUDENT_REQUEST_METHOD: &str = "Transfer/Request";

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationPolicy {
    /// Wait between a successful write and the re-fetch that confirms it
    pub refetch_delay: Duration,
    pub recent_limit: usize,
}

impl Default for ReconciliationPolicy {
    fn default() -> Self {
        Self {
            refetch_delay: Duration::from_millis(3000),
            recent_limit: shared::aggregate::DEFAULT_RECENT_LIMIT,
        }
    }
}

impl From<&ClientConfig> for ReconciliationPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            refetch_delay: config.refetch_delay(),
            recent_limit: config.recent_limit,
        }
    }
}

/// Admin deposit form as typed by the user
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DepositForm {
    pub student_id: String,
    /// Raw input such as `"Rp 50,000"`
    pub amount: String,
    pub method: String,
    pub note: String,
    /// Record the deposit as awaiting approval instead of completing it
    pub mark_pending: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WithdrawForm {
    pub student_id: String,
    pub amount: String,
    pub method: String,
    pub note: String,
}

#[derive(Debug, Default)]
struct Inner {
    view: ScreenState,
    pending: PendingWrites,
    /// Issue number of the newest load whose result is on screen
    applied_seq: u64,
}

struct LoadCounter<'a>(&'a AtomicUsize);

impl<'a> LoadCounter<'a> {
    fn enter(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for LoadCounter<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ReconciliationController<T> {
    api: SavingsApi<T>,
    session: Session,
    screen: Screen,
    policy: ReconciliationPolicy,
    inner: Mutex<Inner>,
    issued_seq: AtomicU64,
    loads_in_flight: AtomicUsize,
    approvals: InFlightSet,
    refetches: Mutex<Vec<JoinHandle<()>>>,
    changes: watch::Sender<u64>,
}

fn local_id() -> String {
    format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4())
}

fn method_or_default(method: &str) -> String {
    match method.trim() {
        "" => DEFAULT_METHOD.to_string(),
        method => method.to_string(),
    }
}

fn required_student(student_id: &str) -> Result<String> {
    match student_id.trim() {
        "" => Err(ClientError::InvalidInput("Please choose a student".to_string())),
        id => Ok(id.to_string()),
    }
}

/// Record shown until the sheet returns the real row
fn synthesize_transaction(kind: TransactionType, fields: Value) -> Transaction {
    let mut transaction = normalize_transaction(&fields);
    transaction.transaction_type = kind;
    transaction.id = local_id();
    transaction
}

fn synthesize_student(fields: Value) -> Student {
    let mut student = normalize_student(&fields);
    if student.id.is_empty() {
        student.id = local_id();
    }
    student
}

impl<T: Transport + 'static> ReconciliationController<T> {
    pub fn new(api: SavingsApi<T>, session: Session, screen: Screen, policy: ReconciliationPolicy) -> Self {
        info!(
            "Mounting {} screen for {} ({:?})",
            screen, session.user.username, session.user.role
        );
        let (changes, _) = watch::channel(0);
        Self {
            api,
            session,
            screen,
            policy,
            inner: Mutex::new(Inner::default()),
            issued_seq: AtomicU64::new(0),
            loads_in_flight: AtomicUsize::new(0),
            approvals: InFlightSet::new(),
            refetches: Mutex::new(Vec::new()),
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version += 1);
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn policy(&self) -> &ReconciliationPolicy {
        &self.policy
    }

    /// Copy of the current state for rendering
    pub fn snapshot(&self) -> ScreenState {
        self.lock().view.clone()
    }

    /// Ticks whenever the state changes
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.loads_in_flight.load(Ordering::SeqCst) > 0
    }

    /// True while an approve/reject for `id` is running
    pub fn is_busy(&self, id: &str) -> bool {
        self.approvals.is_busy(id)
    }

    pub fn pending_writes(&self) -> usize {
        self.lock().pending.len()
    }

    fn scope(&self) -> Result<Scope> {
        self.session.scope().ok_or(ClientError::MissingStudentId)
    }

    fn require_admin(&self) -> Result<()> {
        if self.session.is_admin() {
            Ok(())
        } else {
            warn!("{} tried an admin-only action", self.session.user.username);
            Err(ClientError::Forbidden)
        }
    }

    /// Own student id; admins have none
    fn require_student(&self) -> Result<String> {
        if self.session.is_admin() {
            return Err(ClientError::Forbidden);
        }
        self.session
            .student_id()
            .map(str::to_string)
            .ok_or(ClientError::MissingStudentId)
    }

    /// Fetch everything this screen shows and replace the state with it.
    ///
    /// On failure the previous state stays, a notice is recorded and the
    /// error is returned.
    pub async fn load(&self) -> Result<()> {
        let seq = self.issued_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let issued_at = Instant::now();
        let _counter = LoadCounter::enter(&self.loads_in_flight);
        debug!("Load #{} issued for {} screen", seq, self.screen);

        let result = self.fetch().await;

        let mut inner = self.lock();
        if seq <= inner.applied_seq {
            debug!("Discarding load #{}; #{} is already applied", seq, inner.applied_seq);
            return result.map(|_| ());
        }

        match result {
            Ok(mut fetched) => {
                inner.applied_seq = seq;
                let settled = inner.pending.settle(issued_at);
                if settled > 0 {
                    debug!("Load #{} settled {} pending writes", seq, settled);
                }
                fetched.students = fetched.students.map(|s| inner.pending.overlay_students(s));
                fetched.transactions = fetched
                    .transactions
                    .map(|t| inner.pending.overlay_transactions(t));
                inner.view.apply(fetched);
                drop(inner);
                self.notify();
                Ok(())
            }
            Err(e) => {
                warn!("Load #{} for {} screen failed: {}", seq, self.screen, e);
                inner.view.notice = Some(e.to_string());
                drop(inner);
                self.notify();
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<Fetched> {
        let scope = self.scope()?;
        if self.screen.is_admin_only() && scope != Scope::All {
            return Err(ClientError::Forbidden);
        }
        let in_scope = |t: &Transaction| scope.allows(&t.student_id);

        let fetched = match (self.screen, &scope) {
            (Screen::Dashboard, Scope::All) => {
                let (stats, transactions, students) = tokio::try_join!(
                    self.api.get_dashboard_stats(),
                    self.api.get_transactions(),
                    self.api.get_students(),
                )?;
                Fetched {
                    stats: Some(stats),
                    transactions: Some(transactions),
                    students: Some(students),
                    ..Fetched::default()
                }
            }
            (Screen::Dashboard, Scope::Student(id)) => {
                let (transactions, balance, student) = tokio::try_join!(
                    self.api.get_transactions(),
                    self.api.get_balance(id),
                    self.api.get_student(id),
                )?;
                Fetched {
                    transactions: Some(transactions.into_iter().filter(in_scope).collect()),
                    own_balance: Some(balance),
                    students: Some(student.into_iter().collect()),
                    ..Fetched::default()
                }
            }
            (Screen::Students, _) => Fetched {
                students: Some(self.api.get_students().await?),
                ..Fetched::default()
            },
            (Screen::Transactions, _) => {
                let (transactions, students) =
                    tokio::try_join!(self.api.get_transactions(), self.api.get_students())?;
                Fetched {
                    transactions: Some(transactions.into_iter().filter(in_scope).collect()),
                    students: Some(
                        students
                            .into_iter()
                            .filter(|s| scope.allows(&s.id))
                            .collect(),
                    ),
                    ..Fetched::default()
                }
            }
            (Screen::Reports, _) => {
                let students = self.api.get_students().await?;
                let balances = self.fetch_balances(&students).await;
                Fetched {
                    students: Some(students),
                    balances: Some(balances),
                    ..Fetched::default()
                }
            }
            (Screen::Profile, Scope::Student(id)) => {
                let (student, balance) =
                    tokio::try_join!(self.api.get_student(id), self.api.get_balance(id))?;
                Fetched {
                    students: Some(student.into_iter().collect()),
                    own_balance: Some(balance),
                    ..Fetched::default()
                }
            }
            // Admin accounts have no student record behind them
            (Screen::Profile, Scope::All) => Fetched::default(),
        };
        Ok(fetched)
    }

    /// One balance lookup per student, concurrently; failed lookups are skipped
    async fn fetch_balances(&self, students: &[Student]) -> HashMap<String, f64> {
        let mut lookups = JoinSet::new();
        for student in students.iter().filter(|s| !s.id.is_empty()) {
            let api = self.api.clone();
            let id = student.id.clone();
            lookups.spawn(async move {
                let balance = api.get_balance(&id).await;
                (id, balance)
            });
        }

        let mut balances = HashMap::new();
        while let Some(joined) = lookups.join_next().await {
            match joined {
                Ok((id, Ok(balance))) => {
                    balances.insert(id, balance);
                }
                Ok((id, Err(e))) => warn!("Skipping balance of student {}: {}", id, e),
                Err(e) => warn!("Balance lookup task failed: {}", e),
            }
        }
        balances
    }

    fn settle_deadline(&self) -> Instant {
        Instant::now() + self.policy.refetch_delay
    }

    fn apply_optimistic_student(&self, student: Student) {
        let settle_at = self.settle_deadline();
        let mut inner = self.lock();
        inner.pending.record_student(student.clone(), settle_at);
        upsert(&mut inner.view.students, student, Placement::Front);
        drop(inner);
        self.notify();
    }

    fn apply_optimistic_transaction(&self, transaction: Transaction) {
        let settle_at = self.settle_deadline();
        let mut inner = self.lock();
        inner.pending.record_transaction(transaction.clone(), settle_at);
        upsert(&mut inner.view.transactions, transaction, Placement::Back);
        drop(inner);
        self.notify();
    }

    /// Re-read the screen once the sheet has had time to catch up
    fn schedule_refetch(self: &Arc<Self>) {
        let controller = Arc::downgrade(self);
        let delay = self.policy.refetch_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(controller) = controller.upgrade() else {
                return;
            };
            debug!("Running delayed re-fetch for {} screen", controller.screen);
            if let Err(e) = controller.load().await {
                warn!("Delayed re-fetch failed: {}", e);
            }
        });

        let mut refetches = self.refetches.lock().unwrap_or_else(PoisonError::into_inner);
        refetches.retain(|h| !h.is_finished());
        refetches.push(handle);
    }

    /// Cancel every scheduled re-fetch
    pub fn shutdown(&self) {
        let mut refetches = self.refetches.lock().unwrap_or_else(PoisonError::into_inner);
        for handle in refetches.drain(..) {
            handle.abort();
        }
    }

    pub async fn create_student(self: &Arc<Self>, form: StudentForm) -> Result<Student> {
        self.require_admin()?;
        let returned = self.api.create_student(&form).await?;
        let student = returned.unwrap_or_else(|| {
            let mut fields = json!(form);
            fields["status"] = json!("active");
            synthesize_student(fields)
        });

        info!("Student {} created as {}", student.name, student.id);
        self.apply_optimistic_student(student.clone());
        self.schedule_refetch();
        Ok(student)
    }

    pub async fn update_student(self: &Arc<Self>, id: &str, form: StudentForm) -> Result<Student> {
        self.require_admin()?;
        let returned = self.api.update_student(id, &form).await?;
        let student = match returned {
            Some(student) if student.id == id => student,
            _ => {
                let previous = self.lock().view.student(id).cloned();
                let mut fields = json!(form);
                fields["id"] = json!(id);
                let mut student = normalize_student(&fields);
                if let Some(previous) = previous {
                    student.status = previous.status;
                    student.created_at = previous.created_at;
                    student.extra = previous.extra;
                }
                student
            }
        };

        info!("Student {} updated", student.id);
        self.apply_optimistic_student(student.clone());
        self.schedule_refetch();
        Ok(student)
    }

    /// Students edit their own contact details and photo.
    ///
    /// The caller should mirror the new name into the stored session.
    pub async fn update_profile(self: &Arc<Self>, form: ProfileForm) -> Result<Student> {
        let own_id = self.require_student()?;
        let returned = self.api.update_profile(&own_id, &form).await?;
        let student = match returned {
            Some(student) if student.id == own_id => student,
            _ => {
                let previous = self.lock().view.student(&own_id).cloned();
                match previous {
                    Some(mut student) => {
                        student.name = form.name.clone();
                        student.parent_name = form.parent_name.clone();
                        student.phone = form.phone.clone();
                        student.photo_url = Some(form.photo_url.clone()).filter(|url| !url.is_empty());
                        student
                    }
                    None => {
                        let mut fields = json!(form);
                        fields["id"] = json!(own_id);
                        normalize_student(&fields)
                    }
                }
            }
        };

        info!("Profile of student {} updated", own_id);
        self.apply_optimistic_student(student.clone());
        self.schedule_refetch();
        Ok(student)
    }

    async fn submit_deposit(self: &Arc<Self>, request: DepositRequest) -> Result<Transaction> {
        let returned = self.api.deposit(&request).await?;
        let transaction = returned
            .unwrap_or_else(|| synthesize_transaction(TransactionType::Deposit, json!(request)));

        self.apply_optimistic_transaction(transaction.clone());
        self.schedule_refetch();
        Ok(transaction)
    }

    /// Admin deposit; completes immediately unless flagged pending
    pub async fn deposit(self: &Arc<Self>, form: DepositForm) -> Result<Transaction> {
        self.require_admin()?;
        let student_id = required_student(&form.student_id)?;
        let amount = parse_amount_input(&form.amount)?;

        let request = DepositRequest {
            student_id,
            amount,
            method: method_or_default(&form.method),
            note: form.note.trim().to_string(),
            status: initial_status(TransactionType::Deposit, Role::Admin, form.mark_pending),
            created_by: Some(self.session.user.name.clone()),
        };
        self.submit_deposit(request).await
    }

    /// Student asks for a deposit to be recorded; always starts pending
    pub async fn request_deposit(self: &Arc<Self>, amount: &str, note: &str) -> Result<Transaction> {
        let student_id = self.require_student()?;
        let amount = parse_amount_input(amount)?;

        let request = DepositRequest {
            student_id,
            amount,
            method: STUDENT_REQUEST_METHOD.to_string(),
            note: note.trim().to_string(),
            status: initial_status(TransactionType::Deposit, Role::Student, true),
            created_by: Some(self.session.user.name.clone()),
        };
        self.submit_deposit(request).await
    }

    pub async fn withdraw(self: &Arc<Self>, form: WithdrawForm) -> Result<Transaction> {
        self.require_admin()?;
        let request = WithdrawRequest {
            student_id: required_student(&form.student_id)?,
            amount: parse_amount_input(&form.amount)?,
            method: method_or_default(&form.method),
            note: form.note.trim().to_string(),
        };

        let returned = self.api.withdraw(&request).await?;
        let transaction = returned.unwrap_or_else(|| {
            let mut fields = json!(request);
            fields["status"] = json!(TransactionStatus::Completed.as_str());
            synthesize_transaction(TransactionType::Withdraw, fields)
        });

        self.apply_optimistic_transaction(transaction.clone());
        self.schedule_refetch();
        Ok(transaction)
    }

    pub async fn approve(self: &Arc<Self>, id: &str) -> Result<Transaction> {
        self.decide(id, ApprovalAction::Approve).await
    }

    pub async fn reject(self: &Arc<Self>, id: &str) -> Result<Transaction> {
        self.decide(id, ApprovalAction::Reject).await
    }

    async fn decide(self: &Arc<Self>, id: &str, action: ApprovalAction) -> Result<Transaction> {
        self.require_admin()?;
        let _busy = self.approvals.begin(id)?;

        let current = self
            .lock()
            .view
            .transaction(id)
            .cloned()
            .ok_or_else(|| ClientError::UnknownTransaction(id.to_string()))?;
        let target = current.status.apply(action)?;

        let returned = self.api.set_approval(id, action).await?;
        let mut transaction = match returned {
            Some(transaction) if transaction.id == id => transaction,
            _ => current,
        };
        transaction.status = target;

        info!("Transaction {} is now {}", id, target);
        self.apply_optimistic_transaction(transaction.clone());
        if let Err(e) = self.load().await {
            warn!("Reload after {} of {} failed: {}", action.action_name(), id, e);
        }
        self.schedule_refetch();
        Ok(transaction)
    }
}

impl<T> Drop for ReconciliationController<T> {
    fn drop(&mut self) {
        let refetches = self.refetches.get_mut().unwrap_or_else(PoisonError::into_inner);
        for handle in refetches.drain(..) {
            handle.abort();
        }
    }
}
