//! Mission repository adapters.
//!
//! Both adapters implement [`MissionRepository`](overmind_application::MissionRepository)
//! with the same transition and task rules. Structured fields stay
//! `serde_json::Value` in memory; only the SQLite adapter encodes them, on
//! write, and decodes them, on read.

mod memory;
mod sqlite;

pub use memory::InMemoryMissionRepository;
pub use sqlite::SqliteMissionRepository;
