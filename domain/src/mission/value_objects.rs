//! Mission value objects: identifiers and task keys.
//!
//! Numeric identifiers are assigned by the repository; [`TaskKey`] is chosen
//! by the planner and is unique within one mission.

use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a mission.
    MissionId
);
numeric_id!(
    /// Identifier of a persisted mission plan.
    PlanId
);
numeric_id!(
    /// Identifier of a persisted task row.
    TaskId
);
numeric_id!(
    /// Identifier of an event in the mission log. Ids grow with append order.
    EventId
);

/// Planner-assigned key of a task, unique within a mission.
///
/// Dependencies between tasks are expressed as task keys, never as row ids,
/// so a plan can be validated before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskKey(String);

impl TaskKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key used when a re-plan reuses a key already taken by a task that did
    /// not succeed.
    pub fn revision(&self, plan_version: u32) -> Self {
        Self(format!("{}~v{}", self.0, plan_version))
    }
}

impl From<&str> for TaskKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TaskKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
