//! Core value types for the allocation engine.
//!
//! A [`Task`] is the atomic unit of field work. It is created by the daily
//! seeding step, lives in its city's pending queue until drawn, and is owned
//! by exactly one device assignment afterwards. A [`TaskDescriptor`] is the
//! wire-level answer to a fetch request.

use serde::{Deserialize, Serialize};

/// A single unit of field work, grouped under a city.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique within the owning city for a given day.
    pub task_id: String,
    pub city_name: String,
    /// Descriptive attributes carried through from the planning side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shop_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Set once the task has been handed to a device.
    #[serde(default)]
    pub granted: bool,
}

impl Task {
    /// Create a pending task for a city.
    pub fn new(city_name: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            city_name: city_name.into(),
            shop: None,
            shop_url: None,
            platform: None,
            granted: false,
        }
    }
}

/// The answer to a fetch request: which task in which city.
///
/// The pair of empty strings is the reserved "nothing available now" signal.
/// Real city names and task ids are non-empty by seeding construction, so the
/// sentinel can never collide with an actual task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    pub city: String,
    pub task_id: String,
}

impl TaskDescriptor {
    pub fn new(city: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            task_id: task_id.into(),
        }
    }

    /// The "nothing available now" sentinel.
    pub fn empty() -> Self {
        Self {
            city: String::new(),
            task_id: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.city.is_empty() && self.task_id.is_empty()
    }
}
