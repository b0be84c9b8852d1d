//! Per-day city/task inventory.
//!
//! Each calendar date maps to the list of cities seeded for it, and each city
//! holds a FIFO queue of not-yet-assigned tasks. The city set for a date is
//! fixed by a seeding generation; only queue contents shrink over the day.
//! Reading a date that was never seeded yields an empty list, never an error.

use std::collections::{HashMap, VecDeque};

use chrono::NaiveDate;
use tokio::sync::RwLock;

use crate::model::Task;

/// A named grouping of tasks with a FIFO pending queue.
///
/// This is the inventory-side instance. The per-device "tasks I hold from
/// this city today" record is a separate type ([`crate::registry::CityAssignment`])
/// and the two never share tasks.
#[derive(Debug, Clone)]
pub struct City {
    pub name: String,
    /// Earliest-seeded task sits at the front and is drawn first.
    pub pending: VecDeque<Task>,
}

impl City {
    pub fn new(name: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            name: name.into(),
            pending: tasks.into(),
        }
    }
}

/// In-memory store of the per-date city lists.
#[derive(Debug, Default)]
pub struct TaskInventory {
    days: RwLock<HashMap<NaiveDate, Vec<City>>>,
}

impl TaskInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) the city list for a date.
    pub async fn seed_date(&self, date: NaiveDate, cities: Vec<City>) {
        let task_total: usize = cities.iter().map(|c| c.pending.len()).sum();
        let mut days = self.days.write().await;
        if days.insert(date, cities).is_some() {
            tracing::info!("Replaced inventory for {date}: {task_total} pending tasks");
        } else {
            tracing::info!("Seeded inventory for {date}: {task_total} pending tasks");
        }
    }

    /// City names for a date, in seeded order. Empty if the date was never
    /// seeded.
    pub async fn cities_for_date(&self, date: NaiveDate) -> Vec<String> {
        let days = self.days.read().await;
        days.get(&date)
            .map(|cities| cities.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Whether a city exists on that date with at least one pending task.
    pub async fn has_pending(&self, date: NaiveDate, city_name: &str) -> bool {
        let days = self.days.read().await;
        days.get(&date)
            .and_then(|cities| cities.iter().find(|c| c.name == city_name))
            .map(|c| !c.pending.is_empty())
            .unwrap_or(false)
    }

    /// Pop the earliest-enqueued pending task of a city.
    ///
    /// Callers must hold the allocator's draw lock; the queue pop is only one
    /// half of the draw and the other half lives in the assignment registry.
    pub async fn pop_task(&self, date: NaiveDate, city_name: &str) -> Option<Task> {
        let mut days = self.days.write().await;
        let city = days
            .get_mut(&date)?
            .iter_mut()
            .find(|c| c.name == city_name)?;
        city.pending.pop_front()
    }

    /// Per-city pending counts for a date, in seeded order.
    pub async fn pending_summary(&self, date: NaiveDate) -> Vec<(String, usize)> {
        let days = self.days.read().await;
        days.get(&date)
            .map(|cities| {
                cities
                    .iter()
                    .map(|c| (c.name.clone(), c.pending.len()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop whole-day entries older than `cutoff`. Returns how many days were
    /// removed. Past days are never read by the allocator, only today's pool
    /// is.
    pub async fn evict_before(&self, cutoff: NaiveDate) -> usize {
        let mut days = self.days.write().await;
        let before = days.len();
        days.retain(|date, _| *date >= cutoff);
        before - days.len()
    }
}
