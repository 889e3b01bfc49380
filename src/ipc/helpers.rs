use crate::analytics::AnalyticsError;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::model::{self, Role};
use chrono::NaiveDate;
use rusqlite::Connection;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn query(e: impl std::fmt::Display) -> Self {
        Self::new("db_query_failed", e.to_string())
    }

    pub fn with_table(code: &'static str, e: impl std::fmt::Display, table: &str) -> Self {
        Self {
            code,
            message: e.to_string(),
            details: Some(serde_json::json!({ "table": table })),
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<AnalyticsError> for HandlerErr {
    fn from(e: AnalyticsError) -> Self {
        tracing::warn!(error = %e.message, "aggregation failed");
        Self::new(e.code, e.message)
    }
}

/// Response DTOs go through serde; a failure here is not a store failure.
pub fn to_json<T: serde::Serialize>(v: &T) -> Result<serde_json::Value, HandlerErr> {
    serde_json::to_value(v).map_err(|e| HandlerErr::new("serialize_failed", e.to_string()))
}

pub fn db_conn<'a>(state: &'a AppState) -> Result<&'a Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let s = params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    if s.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(s)
}

/// Missing, null and blank strings all read as `None`.
pub fn optional_str(params: &serde_json::Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(HandlerErr::bad_params(format!("{} must be a string", key)));
            };
            let t = s.trim();
            Ok(if t.is_empty() { None } else { Some(t.to_string()) })
        }
    }
}

pub fn optional_i64(params: &serde_json::Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn optional_date(params: &serde_json::Value, key: &str) -> Result<Option<NaiveDate>, HandlerErr> {
    match optional_str(params, key)? {
        None => Ok(None),
        Some(s) => model::parse_date(&s)
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key))),
    }
}

pub fn optional_semester(params: &serde_json::Value) -> Result<Option<i64>, HandlerErr> {
    match optional_i64(params, "semester")? {
        None => Ok(None),
        Some(s @ (1 | 2)) => Ok(Some(s)),
        Some(_) => Err(HandlerErr::bad_params("semester must be 1 or 2")),
    }
}

pub fn optional_tahun_ajaran(params: &serde_json::Value) -> Result<Option<String>, HandlerErr> {
    match optional_str(params, "tahunAjaran")? {
        None => Ok(None),
        Some(s) if model::is_valid_tahun_ajaran(&s) => Ok(Some(s)),
        Some(_) => Err(HandlerErr::bad_params("tahunAjaran must be YYYY/YYYY")),
    }
}

/// `asOf` override for date-relative queries; defaults to the local calendar day.
pub fn as_of(params: &serde_json::Value) -> Result<NaiveDate, HandlerErr> {
    Ok(optional_date(params, "asOf")?.unwrap_or_else(|| chrono::Local::now().date_naive()))
}

pub fn require_admin(req: &Request) -> Result<(), HandlerErr> {
    match &req.actor {
        Some(a) if a.role == Role::Guru => Err(HandlerErr::new(
            "forbidden",
            format!("{} requires an admin", req.method),
        )),
        _ => Ok(()),
    }
}

/// Resolves the teacher a request is about. A GURU actor may only address
/// itself; an omitted `guruId` falls back to the actor's own id.
pub fn scoped_guru_id(req: &Request, required: bool) -> Result<Option<String>, HandlerErr> {
    let param = optional_str(&req.params, "guruId")?;
    let own = match &req.actor {
        Some(a) if a.role == Role::Guru => match &a.guru_id {
            Some(id) => Some(id.clone()),
            None => return Err(HandlerErr::new("forbidden", "actor has no guruId")),
        },
        _ => None,
    };
    let resolved = match (param, own) {
        (Some(p), Some(o)) if p != o => {
            return Err(HandlerErr::new("forbidden", "cannot access another guru's data"));
        }
        (Some(p), _) => Some(p),
        (None, o) => o,
    };
    if required && resolved.is_none() {
        return Err(HandlerErr::bad_params("missing guruId"));
    }
    Ok(resolved)
}

/// For record-addressed requests: a GURU actor must own the record.
pub fn ensure_owner(req: &Request, owner_guru_id: &str) -> Result<(), HandlerErr> {
    match &req.actor {
        Some(a) if a.role == Role::Guru => {
            if a.guru_id.as_deref() == Some(owner_guru_id) {
                Ok(())
            } else {
                Err(HandlerErr::new("forbidden", "record belongs to another guru"))
            }
        }
        _ => Ok(()),
    }
}

/// Runs a handler body against the open workspace and wraps the envelope.
pub fn respond(
    state: &AppState,
    req: &Request,
    body: impl FnOnce(&Connection) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let result = db_conn(state).and_then(body);
    match result {
        Ok(v) => crate::ipc::error::ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn admin_only(
    state: &AppState,
    req: &Request,
    body: impl FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    if let Err(e) = require_admin(req) {
        return e.response(&req.id);
    }
    respond(state, req, |conn| body(conn, &req.params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn serialize_errors_have_their_own_code() {
        let ok = to_json(&vec![1, 2]).ok().expect("plain vec");
        assert_eq!(ok, serde_json::json!([1, 2]));

        // Tuple keys cannot become JSON object keys.
        let bad: HashMap<(i32, i32), i32> = HashMap::from([((1, 2), 3)]);
        let e = to_json(&bad).err().expect("non-string key");
        assert_eq!(e.code, "serialize_failed");
    }

    #[test]
    fn analytics_errors_keep_their_code() {
        let e = HandlerErr::from(AnalyticsError::failed("dashboard admin", "disk I/O error"));
        assert_eq!(e.code, "aggregation_failed");
        assert_eq!(e.message, "Failed to get dashboard admin: disk I/O error");
    }
}
