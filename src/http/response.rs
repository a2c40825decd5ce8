//! Response payload helpers.
//!
//! Every failure answered by the gateway itself (handler errors, relay
//! failures, fatal pipeline errors) uses the same JSON shape:
//!
//! ```json
//! { "state": "error", "message": "...", "error": "..." }
//! ```

use serde_json::{json, Value};

/// Structured error payload.
pub fn error_body(message: &str, detail: Option<String>) -> Value {
    json!({
        "state": "error",
        "message": message,
        "error": detail,
    })
}

/// Wrap a data override unless it already carries its own truthy `state`.
pub fn success_envelope(data: Value) -> Value {
    if has_truthy_state(&data) {
        data
    } else {
        json!({ "state": "success", "data": data })
    }
}

fn has_truthy_state(value: &Value) -> bool {
    match value.get("state") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(_) => true,
    }
}
