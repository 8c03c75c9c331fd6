//! Screens a controller can be mounted for, and the state each one holds.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use shared::aggregate;
use shared::{DashboardStats, Student, StudentFilter, Transaction, TransactionFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Screen {
    Dashboard,
    Students,
    Transactions,
    Reports,
    Profile,
}

impl Screen {
    /// Screens a student session may not open
    pub fn is_admin_only(&self) -> bool {
        matches!(self, Screen::Students | Screen::Reports)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Screen::Dashboard => "dashboard",
            Screen::Students => "students",
            Screen::Transactions => "transactions",
            Screen::Reports => "reports",
            Screen::Profile => "profile",
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of one load. `None` means the screen did not ask for that collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fetched {
    pub students: Option<Vec<Student>>,
    pub transactions: Option<Vec<Transaction>>,
    pub balances: Option<HashMap<String, f64>>,
    pub stats: Option<DashboardStats>,
    pub own_balance: Option<f64>,
}

/// What a mounted screen currently shows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScreenState {
    pub students: Vec<Student>,
    /// Chronological, as the sheet returns them
    pub transactions: Vec<Transaction>,
    /// Server balance per student id
    pub balances: HashMap<String, f64>,
    pub stats: Option<DashboardStats>,
    /// Balance of the logged-in student
    pub own_balance: Option<f64>,
    /// Message from the last failed load, cleared by the next good one
    pub notice: Option<String>,
    pub last_loaded: Option<DateTime<Utc>>,
}

impl ScreenState {
    /// Replace every collection the load fetched; the rest stays as it was
    pub fn apply(&mut self, fetched: Fetched) {
        if let Some(students) = fetched.students {
            self.students = students;
        }
        if let Some(transactions) = fetched.transactions {
            self.transactions = transactions;
        }
        if let Some(balances) = fetched.balances {
            self.balances = balances;
        }
        if let Some(stats) = fetched.stats {
            self.stats = Some(stats);
        }
        if let Some(balance) = fetched.own_balance {
            self.own_balance = Some(balance);
        }
        self.notice = None;
        self.last_loaded = Some(Utc::now());
    }

    pub fn is_loaded(&self) -> bool {
        self.last_loaded.is_some()
    }

    pub fn student(&self, id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    pub fn transaction(&self, id: &str) -> Option<&Transaction> {
        self.transactions.iter().find(|t| t.id == id)
    }

    pub fn pending_count(&self) -> usize {
        aggregate::pending_count(&self.transactions)
    }

    pub fn pending_deposit_total(&self, student_id: &str) -> f64 {
        aggregate::pending_deposit_total(&self.transactions, student_id)
    }

    pub fn recent_transactions(&self, n: usize) -> Vec<Transaction> {
        aggregate::recent_transactions(&self.transactions, n)
    }

    pub fn balance_of(&self, student_id: &str) -> f64 {
        self.balances.get(student_id).copied().unwrap_or(0.0)
    }

    pub fn filtered_students(&self, filter: &StudentFilter) -> Vec<Student> {
        filter.apply(&self.students)
    }

    /// Report total for the students the filter keeps
    pub fn filtered_balance_total(&self, filter: &StudentFilter) -> f64 {
        aggregate::filtered_balance_total(&self.students, &self.balances, |s| filter.matches(s))
    }

    /// Matching transactions, newest first
    pub fn filtered_transactions(&self, filter: &TransactionFilter) -> Vec<Transaction> {
        let mut matching = filter.apply(&self.transactions, &self.students);
        matching.reverse();
        matching
    }

    pub fn class_options(&self) -> Vec<String> {
        aggregate::class_options(&self.students)
    }
}
