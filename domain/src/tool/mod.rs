//! Tool domain module
//!
//! A task is bound to exactly one tool. Tools are opaque async collaborators
//! that report pass/fail; this module holds the value types that describe one
//! invocation outcome. The invocation port itself lives in the application
//! layer and concrete tools in infrastructure.
//!
//! ```text
//! Task ──(tool_name, tool_args)──▶ ToolInvoker ──▶ ToolInvocation { ok, data | error }
//! ```

pub mod value_objects;

pub use value_objects::{ToolError, ToolInvocation};
