//! Presentation aggregates derived from normalized collections.
//!
//! Nothing here fetches or mutates. Insertion order is the order the API
//! returned, which the sheet keeps chronological, so "recent" means "last".

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::{Student, Transaction, TransactionStatus, TransactionType};

/// Number of rows the dashboards show in their "recent activity" list
pub const DEFAULT_RECENT_LIMIT: usize = 5;

/// Label of the catch-all option in the class filter
pub const ALL_CLASSES: &str = "Semua";

pub fn pending_count(transactions: &[Transaction]) -> usize {
    transactions.iter().filter(|t| t.is_pending()).count()
}

/// Money a student has asked to deposit that an admin has not yet approved
pub fn pending_deposit_total(transactions: &[Transaction], student_id: &str) -> f64 {
    transactions
        .iter()
        .filter(|t| t.is_pending() && t.is_deposit() && t.student_id == student_id)
        .map(|t| t.amount)
        .sum()
}

/// Last `n` transactions, most recent first
pub fn recent_transactions(transactions: &[Transaction], n: usize) -> Vec<Transaction> {
    transactions.iter().rev().take(n).cloned().collect()
}

pub fn transactions_for_student(transactions: &[Transaction], student_id: &str) -> Vec<Transaction> {
    transactions
        .iter()
        .filter(|t| t.student_id == student_id)
        .cloned()
        .collect()
}

/// Sum of the balances of every student matching `predicate`; unknown balances count as 0
pub fn filtered_balance_total<P>(
    students: &[Student],
    balances: &HashMap<String, f64>,
    predicate: P,
) -> f64
where
    P: Fn(&Student) -> bool,
{
    students
        .iter()
        .filter(|s| predicate(s))
        .map(|s| balances.get(&s.id).copied().unwrap_or(0.0))
        .sum()
}

/// Completed deposits dated on the same UTC day as `now`.
///
/// Used to sanity-check the server's `todayDeposits` figure.
pub fn today_deposit_total(transactions: &[Transaction], now: DateTime<Utc>) -> f64 {
    let today = now.date_naive();
    transactions
        .iter()
        .filter(|t| {
            t.transaction_type == TransactionType::Deposit
                && t.status == TransactionStatus::Completed
                && t.date.date_naive() == today
        })
        .map(|t| t.amount)
        .sum()
}

/// Distinct classes in first-seen order, headed by the catch-all option
pub fn class_options(students: &[Student]) -> Vec<String> {
    let mut options = vec![ALL_CLASSES.to_string()];
    for student in students {
        if !options.contains(&student.class) {
            options.push(student.class.clone());
        }
    }
    options
}

/// Class + free-text filter used by the student list and the report
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentFilter {
    /// `None` or [`ALL_CLASSES`] keeps every class
    pub class: Option<String>,
    pub query: String,
}

impl StudentFilter {
    pub fn matches(&self, student: &Student) -> bool {
        let class_ok = match self.class.as_deref() {
            None | Some(ALL_CLASSES) => true,
            Some(class) => student.class == class,
        };
        let query = self.query.trim().to_lowercase();
        let query_ok = query.is_empty()
            || student.name.to_lowercase().contains(&query)
            || student.nis.to_lowercase().contains(&query)
            || student.class.to_lowercase().contains(&query);
        class_ok && query_ok
    }

    pub fn apply(&self, students: &[Student]) -> Vec<Student> {
        students.iter().filter(|s| self.matches(s)).cloned().collect()
    }
}

/// Status tab + search box of the transaction list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionFilter {
    /// `None` shows every status
    pub status: Option<TransactionStatus>,
    pub query: String,
}

impl TransactionFilter {
    /// Search hits the student's name and NIS (looked up by id) and the raw student id
    pub fn matches(&self, transaction: &Transaction, students: &[Student]) -> bool {
        if let Some(status) = self.status {
            if transaction.status != status {
                return false;
            }
        }

        let query = self.query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }

        let student = students.iter().find(|s| s.id == transaction.student_id);
        student.is_some_and(|s| {
            s.name.to_lowercase().contains(&query) || s.nis.to_lowercase().contains(&query)
        }) || transaction.student_id.to_lowercase().contains(&query)
    }

    pub fn apply(&self, transactions: &[Transaction], students: &[Student]) -> Vec<Transaction> {
        transactions
            .iter()
            .filter(|t| self.matches(t, students))
            .cloned()
            .collect()
    }
}
