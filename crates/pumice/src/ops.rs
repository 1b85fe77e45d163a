//! Built-in operations shipped with the `pumice-worker` binary.
//!
//! - `add`: sum of a numeric array
//! - `echo`: returns its payload unchanged
//! - `sleep`: sleeps `ms` milliseconds, then returns `value` with wall-clock timestamps
//! - `fail`: reports the payload string as a task failure
//! - `panic`: panics with the payload string
//! - `exit`: terminates the worker with the payload exit code, writing nothing

use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::operation::{OperationError, OperationRegistry};

/// Registry containing every built-in operation.
pub fn builtin_registry() -> OperationRegistry {
    let mut registry = OperationRegistry::new();
    let builtins: [(&str, fn(Value) -> Result<Value, OperationError>); 6] = [
        ("add", add),
        ("echo", echo),
        ("sleep", sleep),
        ("fail", fail),
        ("panic", panic),
        ("exit", exit),
    ];
    for (name, f) in builtins {
        registry
            .register_fn(name, f)
            .expect("built-in operation names are unique");
    }
    registry
}

fn add(payload: Value) -> Result<Value, OperationError> {
    let items = payload
        .as_array()
        .ok_or_else(|| OperationError::InvalidPayload("expected an array of numbers".into()))?;

    if items.iter().all(|v| v.is_i64()) {
        let mut total: i64 = 0;
        for v in items {
            // is_i64 was checked above
            let n = v.as_i64().unwrap_or_default();
            total = total
                .checked_add(n)
                .ok_or_else(|| OperationError::Failed("integer overflow".into()))?;
        }
        return Ok(json!(total));
    }

    let mut total = 0.0;
    for v in items {
        total += v
            .as_f64()
            .ok_or_else(|| OperationError::InvalidPayload(format!("not a number: {v}")))?;
    }
    Ok(json!(total))
}

fn echo(payload: Value) -> Result<Value, OperationError> {
    Ok(payload)
}

#[derive(Debug, Deserialize)]
struct SleepPayload {
    ms: u64,
    #[serde(default)]
    value: Value,
}

fn sleep(payload: Value) -> Result<Value, OperationError> {
    let req: SleepPayload = serde_json::from_value(payload)
        .map_err(|e| OperationError::InvalidPayload(e.to_string()))?;
    let started_ms = Utc::now().timestamp_millis();
    std::thread::sleep(Duration::from_millis(req.ms));
    let finished_ms = Utc::now().timestamp_millis();
    Ok(json!({
        "value": req.value,
        "started_ms": started_ms,
        "finished_ms": finished_ms,
    }))
}

fn message_of(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn fail(payload: Value) -> Result<Value, OperationError> {
    Err(OperationError::Failed(message_of(&payload)))
}

fn panic(payload: Value) -> Result<Value, OperationError> {
    panic!("{}", message_of(&payload));
}

fn exit(payload: Value) -> Result<Value, OperationError> {
    let code = payload
        .as_i64()
        .and_then(|code| i32::try_from(code).ok())
        .unwrap_or(1);
    std::process::exit(code);
}
