//! The allocation decision engine.
//!
//! On each request the allocator runs three passes over today's pool, in
//! strict priority order:
//!
//! 1. **Continuity** — the closest prior day (within the idle lookback
//!    window) that has a record for the device decides which cities to try
//!    first, in that record's stored order. This keeps a device working the
//!    same city across consecutive active days.
//! 2. **Refresh** — cities the device already holds today, in discovery
//!    order. Inventory can grow after the device's first touch of the day.
//! 3. **New city** — the pool in seeded order; first city that yields wins.
//!
//! A failed request is answered with the empty descriptor, never an error:
//! exhaustion and unseeded dates are ordinary outcomes here.
//!
//! Every draw runs under one coarse mutex. Both the queue pop and the quota
//! check-then-record are compound operations; interleaving them would lose
//! updates, overrun quotas, or grant the same task twice. Contention is low
//! (few cities, bounded per-device quotas), so the single lock is a
//! deliberate simplicity-over-throughput choice; narrowing it to per-city or
//! per-device locks would reintroduce exactly the races it exists to
//! prevent.

use std::sync::Arc;

use chrono::{Days, Local, NaiveDate};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::inventory::TaskInventory;
use crate::model::TaskDescriptor;
use crate::registry::AssignmentRegistry;

pub struct Allocator {
    config: Config,
    inventory: Arc<TaskInventory>,
    registry: Arc<AssignmentRegistry>,
    /// Serializes every draw. See the module docs.
    draw_lock: Mutex<()>,
}

impl Allocator {
    pub fn new(
        config: Config,
        inventory: Arc<TaskInventory>,
        registry: Arc<AssignmentRegistry>,
    ) -> Self {
        Self {
            config,
            inventory,
            registry,
            draw_lock: Mutex::new(()),
        }
    }

    /// Assign a task to a device for the current calendar day.
    pub async fn assign(&self, device_id: &str) -> TaskDescriptor {
        self.assign_on(device_id, Local::now().date_naive()).await
    }

    /// Assign a task to a device for an explicit day.
    pub async fn assign_on(&self, device_id: &str, date: NaiveDate) -> TaskDescriptor {
        let pool = self.inventory.cities_for_date(date).await;
        self.registry.get_or_create(device_id, date).await;

        if let Some(prior_cities) = self.continuity_cities(device_id, date).await {
            for city in &prior_cities {
                if let Some(found) = self.draw(city, device_id, date).await {
                    return found;
                }
            }
        }

        for city in self.registry.city_names(device_id, date).await {
            if let Some(found) = self.draw(&city, device_id, date).await {
                return found;
            }
        }

        for city in &pool {
            if let Some(found) = self.draw(city, device_id, date).await {
                return found;
            }
        }

        tracing::debug!("No task assignable for device {device_id} on {date}");
        TaskDescriptor::empty()
    }

    /// City list of the closest prior day with a record, scanning back from
    /// exactly one day before `date` through the idle lookback window.
    /// Records from different days are never merged.
    async fn continuity_cities(&self, device_id: &str, date: NaiveDate) -> Option<Vec<String>> {
        for back in 1..=self.config.max_idle_lookback_days {
            let prior = date.checked_sub_days(Days::new(back))?;
            if let Some(record) = self.registry.get(device_id, prior).await {
                return Some(record.city_names());
            }
        }
        None
    }

    /// Atomically transfer one pending task of `city_name` to the device.
    ///
    /// Fails without side effects when the city is missing from the pool or
    /// drained, when the city would be a new slot but the city cap is already
    /// reached, or when the task cap is already reached. A device at the city
    /// cap may still keep drawing from cities it already holds.
    async fn draw(
        &self,
        city_name: &str,
        device_id: &str,
        date: NaiveDate,
    ) -> Option<TaskDescriptor> {
        let _guard = self.draw_lock.lock().await;

        if !self.inventory.has_pending(date, city_name).await {
            return None;
        }
        let quota = self.registry.quota_view(device_id, date, city_name).await;
        if !quota.has_city && quota.city_count >= self.config.max_cities_per_day {
            return None;
        }
        if quota.task_count >= self.config.max_tasks_per_day {
            return None;
        }

        let mut task = self.inventory.pop_task(date, city_name).await?;
        task.granted = true;
        let descriptor = TaskDescriptor::new(task.city_name.clone(), task.task_id.clone());
        self.registry.record_grant(device_id, date, task).await;

        tracing::debug!(
            "Granted {} ({}) to device {device_id} on {date}",
            descriptor.task_id,
            descriptor.city
        );
        Some(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::City;
    use crate::model::Task;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 6, d).unwrap()
    }

    fn city(name: &str, count: usize) -> City {
        let tasks = (0..count)
            .map(|i| Task::new(name, format!("{name}{i}")))
            .collect();
        City::new(name, tasks)
    }

    fn city_with(name: &str, ids: &[&str]) -> City {
        let tasks = ids.iter().map(|id| Task::new(name, *id)).collect();
        City::new(name, tasks)
    }

    fn allocator(config: Config) -> Allocator {
        Allocator::new(
            config,
            Arc::new(TaskInventory::new()),
            Arc::new(AssignmentRegistry::new()),
        )
    }

    #[tokio::test]
    async fn test_unseeded_date_returns_empty_forever() {
        let allocator = allocator(Config::default());
        for _ in 0..3 {
            assert!(allocator.assign_on("dev0", date(17)).await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_task_cap_then_exhaustion_is_stable() {
        let allocator = allocator(Config::default());
        allocator
            .inventory
            .seed_date(date(17), vec![city("Chongqing", 10)])
            .await;

        for i in 0..4 {
            let got = allocator.assign_on("dev0", date(17)).await;
            assert_eq!(got.task_id, format!("Chongqing{i}"));
        }
        // Cap of 4 reached; further calls stay empty even with stock left.
        for _ in 0..3 {
            assert!(allocator.assign_on("dev0", date(17)).await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_city_cap_is_strict() {
        let allocator = allocator(Config::default());
        allocator
            .inventory
            .seed_date(
                date(17),
                vec![city("Chongqing", 1), city("Guangzhou", 1), city("Hangzhou", 1)],
            )
            .await;

        assert_eq!(allocator.assign_on("dev0", date(17)).await.city, "Chongqing");
        assert_eq!(allocator.assign_on("dev0", date(17)).await.city, "Guangzhou");
        // Two distinct cities reached; Hangzhou may not be opened even though
        // the task cap is not.
        assert!(allocator.assign_on("dev0", date(17)).await.is_empty());

        let record = allocator.registry.get("dev0", date(17)).await.unwrap();
        assert_eq!(record.cities.len(), 2);
    }

    #[tokio::test]
    async fn test_stickiness_beats_pool_order() {
        let allocator = allocator(Config::default());
        allocator
            .inventory
            .seed_date(date(17), vec![city("Chongqing", 2)])
            .await;
        assert_eq!(allocator.assign_on("dev0", date(17)).await.city, "Chongqing");

        // Next day Chongqing is seeded last, but yesterday's record wins.
        allocator
            .inventory
            .seed_date(
                date(18),
                vec![city("Guangzhou", 2), city_with("Chongqing", &["Chongqing2"])],
            )
            .await;
        let got = allocator.assign_on("dev0", date(18)).await;
        assert_eq!(got.city, "Chongqing");
        assert_eq!(got.task_id, "Chongqing2");
    }

    #[tokio::test]
    async fn test_continuity_draw_opens_todays_record() {
        let allocator = allocator(Config::default());
        allocator
            .inventory
            .seed_date(date(17), vec![city("Chongqing", 1)])
            .await;
        allocator.assign_on("dev0", date(17)).await;

        allocator
            .inventory
            .seed_date(date(18), vec![city_with("Chongqing", &["Chongqing1"])])
            .await;
        allocator.assign_on("dev0", date(18)).await;

        // The continuity draw must have opened a city entry for today, so
        // the chain keeps extending day after day.
        let record = allocator.registry.get("dev0", date(18)).await.unwrap();
        assert_eq!(record.city_names(), vec!["Chongqing"]);
    }

    #[tokio::test]
    async fn test_lookback_starts_one_day_back() {
        let allocator = allocator(Config::default());
        // Two prior records; the closest one decides, they are not merged.
        allocator
            .registry
            .record_grant("dev0", date(15), Task::new("Chongqing", "Chongqing0"))
            .await;
        allocator
            .registry
            .record_grant("dev0", date(16), Task::new("Guangzhou", "Guangzhou0"))
            .await;
        allocator
            .inventory
            .seed_date(date(17), vec![city("Chongqing", 1), city("Guangzhou", 1)])
            .await;

        assert_eq!(allocator.assign_on("dev0", date(17)).await.city, "Guangzhou");
    }

    #[tokio::test]
    async fn test_idle_day_does_not_break_continuity() {
        let allocator = allocator(Config::default());
        allocator
            .inventory
            .seed_date(date(17), vec![city("Chongqing", 1)])
            .await;
        allocator.assign_on("dev0", date(17)).await;

        // No requests on the 18th. With a lookback of 2 the record from the
        // 17th is still in reach on the 19th.
        allocator
            .inventory
            .seed_date(
                date(19),
                vec![city("Guangzhou", 1), city_with("Chongqing", &["Chongqing1"])],
            )
            .await;
        assert_eq!(allocator.assign_on("dev0", date(19)).await.city, "Chongqing");
    }

    #[tokio::test]
    async fn test_record_beyond_lookback_window_is_ignored() {
        let allocator = allocator(Config::default());
        allocator
            .registry
            .record_grant("dev0", date(14), Task::new("Chongqing", "Chongqing0"))
            .await;
        allocator
            .inventory
            .seed_date(date(17), vec![city("Guangzhou", 1), city("Chongqing", 1)])
            .await;

        // The 14th is three days back, outside the window of 2, so the pool
        // order decides.
        assert_eq!(allocator.assign_on("dev0", date(17)).await.city, "Guangzhou");
    }

    #[tokio::test]
    async fn test_stale_continuity_city_is_skipped() {
        let allocator = allocator(Config::default());
        allocator
            .registry
            .record_grant("dev0", date(16), Task::new("Shenzhen", "Shenzhen0"))
            .await;
        allocator
            .inventory
            .seed_date(date(17), vec![city("Hangzhou", 1)])
            .await;

        // Shenzhen no longer exists today; the request falls through to the
        // new-city pass instead of failing.
        assert_eq!(allocator.assign_on("dev0", date(17)).await.city, "Hangzhou");
    }

    #[tokio::test]
    async fn test_refresh_pass_prefers_held_city_after_reseed() {
        let allocator = allocator(Config::default());
        allocator
            .inventory
            .seed_date(date(17), vec![city("Chongqing", 1)])
            .await;
        allocator.assign_on("dev0", date(17)).await;

        // The day's plan grows: Chongqing gains a task but is now listed
        // after Guangzhou. The device already holds Chongqing, so the
        // refresh pass wins over the pool order.
        allocator
            .inventory
            .seed_date(
                date(17),
                vec![city("Guangzhou", 2), city_with("Chongqing", &["Chongqing1"])],
            )
            .await;
        let got = allocator.assign_on("dev0", date(17)).await;
        assert_eq!(got.task_id, "Chongqing1");
    }

    #[tokio::test]
    async fn test_no_double_grant_across_devices() {
        let allocator = allocator(Config::default());
        allocator
            .inventory
            .seed_date(date(17), vec![city("Chongqing", 3)])
            .await;

        let mut granted = Vec::new();
        for device in ["dev0", "dev1", "dev2"] {
            let got = allocator.assign_on(device, date(17)).await;
            assert!(!got.is_empty());
            granted.push(got.task_id);
        }
        granted.sort();
        granted.dedup();
        assert_eq!(granted.len(), 3);

        assert!(allocator.assign_on("dev3", date(17)).await.is_empty());
    }
}
