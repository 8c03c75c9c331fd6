//! Request bodies for the write actions of the remote boundary.
//!
//! Every body is a flat JSON object with an `action` key. The deposit and
//! withdraw scripts on older deployments read PascalCase columns, so those
//! bodies carry both spellings of each field.

use serde::Serialize;
use serde_json::{json, Map, Value};
use shared::{
    ApprovalAction, DepositRequest, LoginRequest, ProfileForm, StudentForm, StudentStatus,
    WithdrawRequest,
};

pub const CREATE_STUDENT: &str = "createStudent";
pub const UPDATE_STUDENT: &str = "updateStudent";
pub const DEPOSIT: &str = "deposit";
pub const WITHDRAW: &str = "withdraw";
pub const LOGIN: &str = "login";

/// Flatten `fields` into an object that starts with `action`
fn with_action<T: Serialize>(action: &str, fields: &T) -> Value {
    let mut body = Map::new();
    body.insert("action".to_string(), Value::String(action.to_string()));
    if let Ok(Value::Object(fields)) = serde_json::to_value(fields) {
        body.extend(fields);
    }
    Value::Object(body)
}

fn insert(body: &mut Value, key: &str, value: Value) {
    if let Value::Object(map) = body {
        map.insert(key.to_string(), value);
    }
}

pub fn create_student_body(form: &StudentForm) -> Value {
    let mut body = with_action(CREATE_STUDENT, form);
    insert(&mut body, "status", json!(StudentStatus::Active.as_str()));
    body
}

pub fn update_student_body(id: &str, form: &StudentForm) -> Value {
    let mut body = with_action(UPDATE_STUDENT, form);
    insert(&mut body, "id", json!(id));
    body
}

/// Profile edits go through `updateStudent` with only the editable fields
pub fn update_profile_body(id: &str, form: &ProfileForm) -> Value {
    let mut body = with_action(UPDATE_STUDENT, form);
    insert(&mut body, "id", json!(id));
    body
}

pub fn deposit_body(request: &DepositRequest) -> Value {
    let mut body = with_action(DEPOSIT, request);
    insert(&mut body, "Status", json!(request.status.as_str()));
    insert(&mut body, "StudentId", json!(request.student_id));
    insert(&mut body, "Amount", json!(request.amount));
    insert(&mut body, "Method", json!(request.method));
    insert(&mut body, "Note", json!(request.note));
    if let Some(created_by) = &request.created_by {
        insert(&mut body, "CreatedBy", json!(created_by));
    }
    body
}

pub fn withdraw_body(request: &WithdrawRequest) -> Value {
    let mut body = with_action(WITHDRAW, request);
    insert(&mut body, "StudentId", json!(request.student_id));
    insert(&mut body, "Amount", json!(request.amount));
    insert(&mut body, "Method", json!(request.method));
    insert(&mut body, "Note", json!(request.note));
    body
}

pub fn approval_body(id: &str, action: ApprovalAction) -> Value {
    json!({ "action": action.action_name(), "id": id })
}

pub fn login_body(request: &LoginRequest) -> Value {
    with_action(LOGIN, request)
}
