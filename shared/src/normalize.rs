//! Field normalizer for payloads coming back from the spreadsheet API.
//!
//! The sheet behind the API has been edited by hand for years, so the same
//! column can arrive as `student_id`, `StudentId`, `studentId` or even `NIS`,
//! and numbers may be strings. Every canonical field has exactly one alias
//! table below; the first alias holding a usable value wins. Normalization
//! never fails: anything missing or malformed falls back to a default.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    DashboardStats, Role, Student, StudentStatus, Transaction, TransactionStatus,
    TransactionType, User,
};

pub const STUDENT_ID: &[&str] = &["id", "ID", "Id", "nis", "NIS"];
pub const STUDENT_NIS: &[&str] = &["nis", "NIS"];
pub const STUDENT_NAME: &[&str] = &["name", "Name"];
pub const STUDENT_CLASS: &[&str] = &["class", "Class", "Kelas", "kelas"];
pub const STUDENT_PARENT_NAME: &[&str] = &["parent_name", "ParentName", "parentName"];
pub const STUDENT_PHONE: &[&str] = &["phone", "Phone"];
pub const STUDENT_PHOTO_URL: &[&str] = &["photo_url", "PhotoUrl", "photoUrl"];
pub const STUDENT_STATUS: &[&str] = &["status", "Status"];
pub const STUDENT_CREATED_AT: &[&str] = &["created_at", "CreatedAt", "createdAt"];

pub const TX_ID: &[&str] = &["id", "ID", "Id"];
pub const TX_ACCOUNT_ID: &[&str] = &["account_id", "AccountId", "accountId"];
pub const TX_STUDENT_ID: &[&str] = &["student_id", "StudentId", "studentId", "NIS", "nis"];
pub const TX_AMOUNT: &[&str] = &["amount", "Amount"];
pub const TX_TYPE: &[&str] = &["type", "Type"];
pub const TX_STATUS: &[&str] = &["status", "Status"];
pub const TX_DATE: &[&str] = &["date", "Date", "timestamp", "Timestamp"];
pub const TX_METHOD: &[&str] = &["method", "Method"];
pub const TX_NOTE: &[&str] = &["note", "Note"];
pub const TX_CREATED_BY: &[&str] = &["created_by", "CreatedBy", "createdBy"];

pub const BALANCE: &[&str] = &["balance", "Balance", "saldo", "Saldo"];
pub const STATS_TOTAL_STUDENTS: &[&str] = &["totalStudents", "total_students", "TotalStudents"];
pub const STATS_TOTAL_SAVINGS: &[&str] = &["totalSavings", "total_savings", "TotalSavings"];
pub const STATS_TODAY_DEPOSITS: &[&str] = &["todayDeposits", "today_deposits", "TodayDeposits"];

pub const USER_ID: &[&str] = &["id", "ID", "Id"];
pub const USER_USERNAME: &[&str] = &["username", "Username"];
pub const USER_NAME: &[&str] = &["name", "Name"];
pub const USER_ROLE: &[&str] = &["role", "Role"];
pub const USER_STUDENT_ID: &[&str] = &["student_id", "StudentId", "studentId"];

/// Name shown for students whose record has no name at all
pub const UNNAMED_STUDENT: &str = "Unnamed";
/// Payment channel assumed when the sheet leaves it blank (cash)
pub const DEFAULT_METHOD: &str = "Tunai";
/// One status fallback for every context
pub const DEFAULT_STATUS: TransactionStatus = TransactionStatus::Pending;

const STUDENT_FIELDS: &[&[&str]] = &[
    STUDENT_ID,
    STUDENT_NIS,
    STUDENT_NAME,
    STUDENT_CLASS,
    STUDENT_PARENT_NAME,
    STUDENT_PHONE,
    STUDENT_PHOTO_URL,
    STUDENT_STATUS,
    STUDENT_CREATED_AT,
];

const TRANSACTION_FIELDS: &[&[&str]] = &[
    TX_ID,
    TX_ACCOUNT_ID,
    TX_STUDENT_ID,
    TX_AMOUNT,
    TX_TYPE,
    TX_STATUS,
    TX_DATE,
    TX_METHOD,
    TX_NOTE,
    TX_CREATED_BY,
];

/// Build a canonical student from a record of unknown shape
pub fn normalize_student(raw: &Value) -> Student {
    Student {
        id: string_field(raw, STUDENT_ID).unwrap_or_default(),
        nis: string_field(raw, STUDENT_NIS).unwrap_or_default(),
        name: string_field(raw, STUDENT_NAME).unwrap_or_else(|| UNNAMED_STUDENT.to_string()),
        class: string_field(raw, STUDENT_CLASS).unwrap_or_default(),
        parent_name: string_field(raw, STUDENT_PARENT_NAME).unwrap_or_default(),
        phone: string_field(raw, STUDENT_PHONE).unwrap_or_default(),
        photo_url: string_field(raw, STUDENT_PHOTO_URL),
        status: match string_field(raw, STUDENT_STATUS) {
            Some(s) if s.trim().eq_ignore_ascii_case("inactive") => StudentStatus::Inactive,
            _ => StudentStatus::Active,
        },
        created_at: string_field(raw, STUDENT_CREATED_AT).unwrap_or_default(),
        extra: unrecognised_keys(raw, STUDENT_FIELDS),
    }
}

/// Build a canonical transaction from a record of unknown shape
pub fn normalize_transaction(raw: &Value) -> Transaction {
    Transaction {
        id: string_field(raw, TX_ID).unwrap_or_default(),
        account_id: string_field(raw, TX_ACCOUNT_ID),
        student_id: string_field(raw, TX_STUDENT_ID).unwrap_or_default(),
        transaction_type: parse_type(string_field(raw, TX_TYPE).as_deref()),
        amount: number_field(raw, TX_AMOUNT).map(f64::abs).unwrap_or(0.0),
        method: string_field(raw, TX_METHOD).unwrap_or_else(|| DEFAULT_METHOD.to_string()),
        note: string_field(raw, TX_NOTE).unwrap_or_default(),
        status: parse_status(string_field(raw, TX_STATUS).as_deref()),
        date: timestamp_field(raw, TX_DATE).unwrap_or_else(Utc::now),
        created_by: string_field(raw, TX_CREATED_BY).unwrap_or_default(),
        extra: unrecognised_keys(raw, TRANSACTION_FIELDS),
    }
}

/// Normalize a list payload; anything that is not an array yields no students
pub fn normalize_students(raw: &Value) -> Vec<Student> {
    records(raw).map(normalize_student).collect()
}

/// Normalize a list payload; anything that is not an array yields no transactions
pub fn normalize_transactions(raw: &Value) -> Vec<Transaction> {
    records(raw).map(normalize_transaction).collect()
}

/// Balance arrives as `{ balance }`, one of its aliases, or a bare number
pub fn normalize_balance(raw: &Value) -> f64 {
    match raw {
        Value::Object(_) => number_field(raw, BALANCE).unwrap_or(0.0),
        other => to_number(other).unwrap_or(0.0),
    }
}

pub fn normalize_dashboard_stats(raw: &Value) -> DashboardStats {
    DashboardStats {
        total_students: number_field(raw, STATS_TOTAL_STUDENTS)
            .map(|n| n.max(0.0).round() as u64)
            .unwrap_or(0),
        total_savings: number_field(raw, STATS_TOTAL_SAVINGS).unwrap_or(0.0),
        today_deposits: number_field(raw, STATS_TODAY_DEPOSITS).unwrap_or(0.0),
    }
}

/// Login payloads carry the user record; `None` when it is not an object
pub fn normalize_user(raw: &Value) -> Option<User> {
    raw.as_object()?;
    let username = string_field(raw, USER_USERNAME).unwrap_or_default();
    let role = match string_field(raw, USER_ROLE) {
        Some(role) if role.trim().eq_ignore_ascii_case("admin") => Role::Admin,
        _ => Role::Student,
    };
    Some(User {
        id: string_field(raw, USER_ID).unwrap_or_default(),
        name: string_field(raw, USER_NAME).unwrap_or_else(|| username.clone()),
        username,
        student_id: match role {
            Role::Admin => None,
            Role::Student => string_field(raw, USER_STUDENT_ID),
        },
        role,
    })
}

fn records(raw: &Value) -> impl Iterator<Item = &Value> {
    raw.as_array()
        .into_iter()
        .flatten()
        .filter(|record| record.is_object())
}

/// Scalars count as present unless they are null or a blank string
fn is_present(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.trim().is_empty(),
        Value::Number(_) | Value::Bool(_) => true,
        _ => false,
    }
}

fn first_present<'a>(raw: &'a Value, aliases: &[&str]) -> Option<&'a Value> {
    let object = raw.as_object()?;
    aliases
        .iter()
        .filter_map(|alias| object.get(*alias))
        .find(|value| is_present(value))
}

fn string_field(raw: &Value, aliases: &[&str]) -> Option<String> {
    first_present(raw, aliases).and_then(to_string)
}

fn number_field(raw: &Value, aliases: &[&str]) -> Option<f64> {
    let value = first_present(raw, aliases)?;
    let number = to_number(value);
    if number.is_none() {
        debug!("Unusable number {} for {:?}, treating as 0", value, aliases.first());
    }
    number
}

fn timestamp_field(raw: &Value, aliases: &[&str]) -> Option<DateTime<Utc>> {
    let object = raw.as_object()?;
    aliases
        .iter()
        .filter_map(|alias| object.get(*alias))
        .filter(|value| is_present(value))
        .find_map(parse_timestamp)
}

fn to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            (_, _, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        }),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn to_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(from_millis),
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|d| d.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
                        .iter()
                        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
                        .map(|naive| naive.and_utc())
                })
                .or_else(|| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .ok()
                        .and_then(|date| date.and_hms_opt(0, 0, 0))
                        .map(|naive| naive.and_utc())
                })
                .or_else(|| s.parse::<i64>().ok().and_then(from_millis))
        }
        _ => None,
    }
}

fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

fn parse_type(raw: Option<&str>) -> TransactionType {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("withdraw") | Some("withdrawal") | Some("penarikan") => TransactionType::Withdraw,
        _ => TransactionType::Deposit,
    }
}

fn parse_status(raw: Option<&str>) -> TransactionStatus {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("pending") => TransactionStatus::Pending,
        Some("completed") => TransactionStatus::Completed,
        Some("rejected") => TransactionStatus::Rejected,
        None => DEFAULT_STATUS,
        Some(other) => {
            debug!("Unknown transaction status '{}', using {}", other, DEFAULT_STATUS);
            DEFAULT_STATUS
        }
    }
}

fn unrecognised_keys(raw: &Value, fields: &[&[&str]]) -> Map<String, Value> {
    raw.as_object()
        .map(|object| {
            object
                .iter()
                .filter(|(key, _)| !fields.iter().any(|aliases| aliases.contains(&key.as_str())))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default()
}
