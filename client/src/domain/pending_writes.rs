//! Optimistic records that outrank fetched data until the sheet catches up.
//!
//! The spreadsheet takes a few seconds to show a write. After a successful
//! mutation the controller records the resulting row here together with the
//! instant its delayed re-fetch is due. Any load issued before that instant
//! sees the optimistic row instead of (or in addition to) the fetched one;
//! the first load issued at or after it settles the entry.

use shared::{Student, Transaction};
use tokio::time::Instant;

/// Id prefix of records synthesized before the sheet assigned a real id
pub const LOCAL_ID_PREFIX: &str = "local-";

pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

/// Records with a stable id
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for Student {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Transaction {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Where a record missing from a collection is inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Student lists show newest first
    Front,
    /// Transaction lists are chronological, newest last
    Back,
}

/// Replace the record with the same id, or insert it at `placement`
pub fn upsert<R: Keyed>(records: &mut Vec<R>, record: R, placement: Placement) {
    match records.iter().position(|r| r.key() == record.key()) {
        Some(index) => records[index] = record,
        None => match placement {
            Placement::Front => records.insert(0, record),
            Placement::Back => records.push(record),
        },
    }
}

#[derive(Debug, Clone)]
struct PendingRecord<R> {
    record: R,
    settle_at: Instant,
}

fn remember<R: Keyed>(entries: &mut Vec<PendingRecord<R>>, record: R, settle_at: Instant) {
    entries.retain(|e| e.record.key() != record.key());
    entries.push(PendingRecord { record, settle_at });
}

fn overlay<R: Keyed + Clone>(entries: &[PendingRecord<R>], mut fetched: Vec<R>, placement: Placement) -> Vec<R> {
    for entry in entries {
        upsert(&mut fetched, entry.record.clone(), placement);
    }
    fetched
}

#[derive(Debug, Default)]
pub struct PendingWrites {
    students: Vec<PendingRecord<Student>>,
    transactions: Vec<PendingRecord<Transaction>>,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_student(&mut self, student: Student, settle_at: Instant) {
        remember(&mut self.students, student, settle_at);
    }

    pub fn record_transaction(&mut self, transaction: Transaction, settle_at: Instant) {
        remember(&mut self.transactions, transaction, settle_at);
    }

    /// Forget every entry a load issued at `issued_at` is fresh enough to replace.
    /// Returns how many were dropped.
    pub fn settle(&mut self, issued_at: Instant) -> usize {
        let before = self.len();
        self.students.retain(|e| e.settle_at > issued_at);
        self.transactions.retain(|e| e.settle_at > issued_at);
        before - self.len()
    }

    pub fn len(&self) -> usize {
        self.students.len() + self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overlay_students(&self, fetched: Vec<Student>) -> Vec<Student> {
        overlay(&self.students, fetched, Placement::Front)
    }

    /// Overlay pending transactions onto a fetch.
    ///
    /// A `local-` entry is left out once the fetch carries a sheet row with the
    /// same student, type, amount and status. Each fetched row stands in for
    /// at most one local entry.
    pub fn overlay_transactions(&self, fetched: Vec<Transaction>) -> Vec<Transaction> {
        let mut claimed = vec![false; fetched.len()];
        let mut merged = fetched.clone();
        for entry in &self.transactions {
            let record = &entry.record;
            if is_local_id(&record.id) {
                let arrived = fetched.iter().enumerate().position(|(index, row)| {
                    !claimed[index] && !is_local_id(&row.id) && same_request(row, record)
                });
                if let Some(index) = arrived {
                    claimed[index] = true;
                    continue;
                }
            }
            upsert(&mut merged, record.clone(), Placement::Back);
        }
        merged
    }
}

fn same_request(row: &Transaction, local: &Transaction) -> bool {
    row.student_id == local.student_id
        && row.transaction_type == local.transaction_type
        && row.amount == local.amount
        && row.status == local.status
}
