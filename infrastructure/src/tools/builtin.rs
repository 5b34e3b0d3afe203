//! Built-in tools with no side effects: echo and sleep

use super::registry::Tool;
use async_trait::async_trait;
use overmind_domain::ToolError;
use serde_json::{Value, json};
use std::time::Duration;

pub const ECHO: &str = "echo";
pub const SLEEP: &str = "sleep";

/// Longest pause `sleep` accepts (10 minutes)
const MAX_SLEEP_MS: u64 = 600_000;

/// Returns its arguments unchanged.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        ECHO
    }

    fn description(&self) -> &str {
        "Return the given arguments as the result"
    }

    async fn call(&self, args: &Value) -> Result<Value, ToolError> {
        match args {
            Value::Null => Ok(json!({})),
            other => Ok(other.clone()),
        }
    }
}

/// Waits `ms` milliseconds, then reports how long it slept.
pub struct SleepTool;

#[async_trait]
impl Tool for SleepTool {
    fn name(&self) -> &str {
        SLEEP
    }

    fn description(&self) -> &str {
        "Pause for the given number of milliseconds"
    }

    async fn call(&self, args: &Value) -> Result<Value, ToolError> {
        let ms = args
            .get("ms")
            .and_then(Value::as_u64)
            .ok_or_else(|| ToolError::invalid_argument("missing integer argument 'ms'"))?;
        if ms > MAX_SLEEP_MS {
            return Err(ToolError::invalid_argument(format!(
                "ms must not exceed {}",
                MAX_SLEEP_MS
            )));
        }
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(json!({ "slept_ms": ms }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_null_is_empty_object() {
        assert_eq!(EchoTool.call(&Value::Null).await.unwrap(), json!({}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_arguments() {
        assert_eq!(
            SleepTool.call(&json!({"ms": 5})).await.unwrap(),
            json!({"slept_ms": 5})
        );
        let err = SleepTool.call(&json!({"ms": "soon"})).await.unwrap_err();
        assert_eq!(err.code, ToolError::INVALID_ARGUMENT);
        assert!(SleepTool.call(&json!({"ms": MAX_SLEEP_MS + 1})).await.is_err());
    }
}
