//! Tool invoker port
//!
//! Tools are external collaborators. The application layer only knows how to
//! call one by name with structured arguments and a deadline.

use crate::resilience::{Classify, FailureClass};
use async_trait::async_trait;
use overmind_domain::{ToolError, ToolInvocation};
use serde_json::Value;
use std::time::Duration;

/// Port for tool invocation
///
/// Implementations must honour `timeout` themselves and report expiry as a
/// failed invocation with [`ToolError::TIMEOUT`].
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Names of the tools this invoker can run
    fn available_tools(&self) -> Vec<String>;

    fn has_tool(&self, name: &str) -> bool {
        self.available_tools().iter().any(|t| t == name)
    }

    async fn invoke(&self, tool_name: &str, args: &Value, timeout: Duration) -> ToolInvocation;
}

impl Classify for ToolError {
    fn failure_class(&self) -> FailureClass {
        match self.code.as_str() {
            ToolError::TIMEOUT => FailureClass::Timeout,
            ToolError::UNAVAILABLE => FailureClass::Transient,
            _ => FailureClass::Permanent,
        }
    }
}
