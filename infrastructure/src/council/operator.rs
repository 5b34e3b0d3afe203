//! Executor that hands each task to the tool invoker.

use async_trait::async_trait;
use overmind_application::{Executor, ToolInvoker};
use overmind_domain::{Task, ToolInvocation};
use std::sync::Arc;
use std::time::Duration;

pub struct ToolOperator {
    invoker: Arc<dyn ToolInvoker>,
}

impl ToolOperator {
    pub fn new(invoker: Arc<dyn ToolInvoker>) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl Executor for ToolOperator {
    async fn execute(&self, task: &Task, timeout: Duration) -> ToolInvocation {
        self.invoker
            .invoke(&task.tool_name, &task.tool_args, timeout)
            .await
    }
}
