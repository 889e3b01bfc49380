use serde::Serialize;
use serde_json::{json, Value};

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

fn error_body(code: &str, message: String, details: Option<Value>) -> Value {
    serde_json::to_value(ErrorBody {
        code,
        message: message.clone(),
        details,
    })
    .unwrap_or_else(|_| json!({ "code": code, "message": message }))
}

pub fn ok(id: &str, result: Value) -> Value {
    json!({ "id": id, "ok": true, "result": result })
}

pub fn err(id: &str, code: &str, message: impl Into<String>, details: Option<Value>) -> Value {
    json!({
        "id": id,
        "ok": false,
        "error": error_body(code, message.into(), details),
    })
}

/// Reply to a line that did not parse as a request; there is no id to echo.
pub fn bad_json(message: impl Into<String>) -> Value {
    json!({
        "ok": false,
        "error": error_body("bad_json", message.into(), None),
    })
}
