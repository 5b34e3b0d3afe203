//! Presentation layer for overmind
//!
//! This crate contains CLI definitions, console formatters and progress
//! reporters for followed missions.

pub mod cli;
pub mod output;
pub mod progress;

// Re-export commonly used types
pub use cli::commands::{Cli, Command, OutputFormat};
pub use output::console::ConsoleFormatter;
pub use progress::reporter::{ProgressReporter, ProgressView, SimpleProgress, follow};
