//! Per-device, per-day assignment records.
//!
//! The registry remembers which cities a device touched on a given day and
//! which tasks it was granted from each. The city list is kept in discovery
//! order (oldest first) because that order is the continuity signal the
//! allocator reads on subsequent days.
//!
//! Records are keyed by a structured [`AssignmentKey`] rather than a
//! concatenated `deviceId + date` string, so lookups stay typed and free of
//! formatting ambiguity.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::model::Task;

/// Composite key for one device's record on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssignmentKey {
    pub device_id: String,
    pub date: NaiveDate,
}

impl AssignmentKey {
    pub fn new(device_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            device_id: device_id.into(),
            date,
        }
    }
}

/// Tasks a device holds from one city today. Disjoint from the inventory-side
/// instance of the same city.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CityAssignment {
    pub city_name: String,
    pub tasks: Vec<Task>,
}

/// One device's full record for one day: cities in discovery order, each with
/// the tasks granted from it.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDayAssignment {
    pub cities: Vec<CityAssignment>,
}

impl DeviceDayAssignment {
    /// City names in discovery order.
    pub fn city_names(&self) -> Vec<String> {
        self.cities.iter().map(|c| c.city_name.clone()).collect()
    }

    /// Total tasks granted across all cities.
    pub fn total_tasks(&self) -> usize {
        self.cities.iter().map(|c| c.tasks.len()).sum()
    }

    pub fn has_city(&self, city_name: &str) -> bool {
        self.cities.iter().any(|c| c.city_name == city_name)
    }
}

/// Quota-relevant view of a record, taken before a draw.
#[derive(Debug, Clone, Copy)]
pub struct QuotaView {
    /// Whether the device already holds an entry for the candidate city.
    pub has_city: bool,
    /// Distinct cities the device has touched today.
    pub city_count: usize,
    /// Total tasks granted today.
    pub task_count: usize,
}

/// In-memory store of assignment records.
#[derive(Debug, Default)]
pub struct AssignmentRegistry {
    records: RwLock<HashMap<AssignmentKey, DeviceDayAssignment>>,
}

impl AssignmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a record, if one exists for that device and day.
    pub async fn get(&self, device_id: &str, date: NaiveDate) -> Option<DeviceDayAssignment> {
        let records = self.records.read().await;
        records.get(&AssignmentKey::new(device_id, date)).cloned()
    }

    /// Ensure an (initially empty) record exists for that device and day.
    /// Idempotent.
    pub async fn get_or_create(&self, device_id: &str, date: NaiveDate) -> DeviceDayAssignment {
        let mut records = self.records.write().await;
        records
            .entry(AssignmentKey::new(device_id, date))
            .or_default()
            .clone()
    }

    /// City names of a record in discovery order; empty if absent.
    pub async fn city_names(&self, device_id: &str, date: NaiveDate) -> Vec<String> {
        self.get(device_id, date)
            .await
            .map(|record| record.city_names())
            .unwrap_or_default()
    }

    /// Quota counters for a candidate city, read in one lock acquisition.
    pub async fn quota_view(
        &self,
        device_id: &str,
        date: NaiveDate,
        city_name: &str,
    ) -> QuotaView {
        let records = self.records.read().await;
        match records.get(&AssignmentKey::new(device_id, date)) {
            Some(record) => QuotaView {
                has_city: record.has_city(city_name),
                city_count: record.cities.len(),
                task_count: record.total_tasks(),
            },
            None => QuotaView {
                has_city: false,
                city_count: 0,
                task_count: 0,
            },
        }
    }

    /// Append a granted task to the device's record, opening a new city entry
    /// at the back if this is the device's first task from that city today.
    ///
    /// Callers must hold the allocator's draw lock: the quota check that
    /// justified this grant is only valid while no other draw interleaves.
    pub async fn record_grant(&self, device_id: &str, date: NaiveDate, task: Task) {
        let mut records = self.records.write().await;
        let record = records
            .entry(AssignmentKey::new(device_id, date))
            .or_default();
        let index = match record
            .cities
            .iter()
            .position(|c| c.city_name == task.city_name)
        {
            Some(index) => index,
            None => {
                record.cities.push(CityAssignment {
                    city_name: task.city_name.clone(),
                    tasks: Vec::new(),
                });
                record.cities.len() - 1
            }
        };
        record.cities[index].tasks.push(task);
    }

    /// Number of records currently retained.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Drop records dated before `cutoff`. Returns how many were removed.
    /// The continuity pass never looks further back than the idle lookback
    /// window, so older records are dead weight.
    pub async fn evict_before(&self, cutoff: NaiveDate) -> usize {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|key, _| key.date >= cutoff);
        before - records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 6, d).unwrap()
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let registry = AssignmentRegistry::new();
        assert!(registry.get("dev0", date(17)).await.is_none());

        let created = registry.get_or_create("dev0", date(17)).await;
        assert!(created.cities.is_empty());
        assert_eq!(registry.len().await, 1);

        registry.get_or_create("dev0", date(17)).await;
        assert_eq!(registry.len().await, 1);
        assert!(registry.get("dev0", date(17)).await.is_some());
    }

    #[tokio::test]
    async fn test_record_grant_keeps_discovery_order() {
        let registry = AssignmentRegistry::new();
        registry
            .record_grant("dev0", date(17), Task::new("Chongqing", "Chongqing0"))
            .await;
        registry
            .record_grant("dev0", date(17), Task::new("Hangzhou", "Hangzhou0"))
            .await;
        registry
            .record_grant("dev0", date(17), Task::new("Chongqing", "Chongqing1"))
            .await;

        let record = registry.get("dev0", date(17)).await.unwrap();
        assert_eq!(record.city_names(), vec!["Chongqing", "Hangzhou"]);
        assert_eq!(record.total_tasks(), 3);
        assert_eq!(record.cities[0].tasks.len(), 2);
    }

    #[tokio::test]
    async fn test_quota_view_counts() {
        let registry = AssignmentRegistry::new();
        let view = registry.quota_view("dev0", date(17), "Chongqing").await;
        assert!(!view.has_city);
        assert_eq!((view.city_count, view.task_count), (0, 0));

        registry
            .record_grant("dev0", date(17), Task::new("Chongqing", "Chongqing0"))
            .await;
        let view = registry.quota_view("dev0", date(17), "Chongqing").await;
        assert!(view.has_city);
        assert_eq!((view.city_count, view.task_count), (1, 1));

        let other = registry.quota_view("dev0", date(17), "Hangzhou").await;
        assert!(!other.has_city);
        assert_eq!((other.city_count, other.task_count), (1, 1));
    }

    #[tokio::test]
    async fn test_evict_before_drops_old_records() {
        let registry = AssignmentRegistry::new();
        registry.get_or_create("dev0", date(14)).await;
        registry.get_or_create("dev0", date(16)).await;
        registry.get_or_create("dev1", date(17)).await;

        let removed = registry.evict_before(date(16)).await;
        assert_eq!(removed, 1);
        assert!(registry.get("dev0", date(14)).await.is_none());
        assert!(registry.get("dev0", date(16)).await.is_some());
        assert!(registry.get("dev1", date(17)).await.is_some());
    }
}
