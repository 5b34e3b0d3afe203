//! Rule-based council members.
//!
//! Deterministic implementations of the four council roles. They need no
//! model backend, so the binary and the integration tests can run full
//! missions offline.

mod architect;
mod operator;
mod planner;
mod reflector;

pub use architect::BlueprintArchitect;
pub use operator::ToolOperator;
pub use planner::RulePlanner;
pub use reflector::PolicyReflector;

use overmind_application::{Council, ToolInvoker};
use std::sync::Arc;

/// A council whose planner and reflector know the tools `invoker` offers.
pub fn rule_based_council(invoker: Arc<dyn ToolInvoker>) -> Council {
    let tools = invoker.available_tools();
    Council::new(
        Arc::new(RulePlanner::new(tools.clone())),
        Arc::new(BlueprintArchitect::new()),
        Arc::new(PolicyReflector::new(tools)),
        Arc::new(ToolOperator::new(invoker)),
    )
}
