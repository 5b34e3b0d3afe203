//! Tool Registry
//!
//! The [`ToolRegistry`] maps tool names to [`Tool`] implementations and
//! implements [`ToolInvoker`]. It enforces the per-call deadline and reports
//! every outcome in the `{ok, data | error}` shape.
//!
//! # Usage
//!
//! ```ignore
//! use overmind_infrastructure::tools::ToolRegistry;
//!
//! let registry = ToolRegistry::with_builtin_tools();
//! assert!(registry.has_tool("read_file"));
//!
//! let invocation = registry
//!     .invoke("echo", &json!({"message": "hi"}), Duration::from_secs(5))
//!     .await;
//! assert!(invocation.ok);
//! ```

use super::builtin::{EchoTool, SleepTool};
use super::file::{ListDirTool, ReadFileTool, WriteFileTool};
use async_trait::async_trait;
use overmind_application::ToolInvoker;
use overmind_domain::{ToolError, ToolInvocation};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// One named capability a task can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn call(&self, args: &Value) -> Result<Value, ToolError>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `echo`, `sleep`, `read_file`, `write_file` and `list_dir`.
    pub fn with_builtin_tools() -> Self {
        Self::new()
            .register(EchoTool)
            .register(SleepTool)
            .register(ReadFileTool)
            .register(WriteFileTool)
            .register(ListDirTool)
    }

    /// Register a tool. A later registration under the same name wins.
    pub fn register<T: Tool + 'static>(self, tool: T) -> Self {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    /// `(name, description)` of every tool, sorted by name.
    pub fn describe(&self) -> Vec<(String, String)> {
        let mut tools: Vec<(String, String)> = self
            .tools
            .values()
            .map(|t| (t.name().to_string(), t.description().to_string()))
            .collect();
        tools.sort();
        tools
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.available_tools())
            .finish()
    }
}

#[async_trait]
impl ToolInvoker for ToolRegistry {
    fn available_tools(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    async fn invoke(&self, tool_name: &str, args: &Value, timeout: Duration) -> ToolInvocation {
        let Some(tool) = self.tools.get(tool_name) else {
            return ToolInvocation::failure(tool_name, ToolError::not_found(tool_name));
        };

        let start = Instant::now();
        let outcome = tokio::time::timeout(timeout, tool.call(args)).await;
        let elapsed = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let invocation = match outcome {
            Ok(Ok(data)) => {
                debug!(tool = tool_name, elapsed_ms = elapsed, "Tool succeeded");
                ToolInvocation::success(tool_name, data)
            }
            Ok(Err(error)) => {
                warn!(tool = tool_name, code = %error.code, "Tool failed: {}", error.message);
                ToolInvocation::failure(tool_name, error)
            }
            Err(_) => {
                warn!(tool = tool_name, "Tool timed out after {:?}", timeout);
                ToolInvocation::failure(tool_name, ToolError::timeout(tool_name))
            }
        };
        invocation.with_duration(elapsed)
    }
}

/// Required string argument.
pub(crate) fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::invalid_argument(format!("missing string argument '{}'", key)))
}
