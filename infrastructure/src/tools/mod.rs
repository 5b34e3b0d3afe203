//! Tool implementations
//!
//! [`ToolRegistry`] is the [`ToolInvoker`](overmind_application::ToolInvoker)
//! adapter. Built-in tools:
//!
//! | Tool | Arguments | Result |
//! |------|-----------|--------|
//! | `echo` | any | the arguments |
//! | `sleep` | `ms` | `{slept_ms}` |
//! | `read_file` | `path` | `{path, content, bytes}` |
//! | `write_file` | `path`, `content`, `create_dirs?` | `{path, bytes}` |
//! | `list_dir` | `path` | `{path, entries}` |

pub mod builtin;
pub mod file;
mod registry;

pub use registry::{Tool, ToolRegistry};
