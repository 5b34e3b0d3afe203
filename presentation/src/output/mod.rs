//! Output formatting for mission results

pub mod console;
