//! Daily seeding of the task inventory.
//!
//! A fixture is a plain text file with one city per line:
//!
//! ```text
//! 2023-06-17,Chongqing,3
//! 2023-06-17,Guangzhou,1
//! 2023-06-17,Hangzhou,4
//! ```
//!
//! Task ids are the city name followed by a zero-based index
//! (`Chongqing0`, `Chongqing1`, ...), so they are non-empty and unique
//! within a city-day by construction. Malformed lines fail seeding outright
//! rather than being skipped; a half-seeded day is worse than a loud start.

use std::path::Path;

use chrono::NaiveDate;
use thiserror::Error;

use crate::inventory::{City, TaskInventory};
use crate::model::Task;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Failed to read seed fixture: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed fixture line {line}: expected `date,city,count`, got `{content}`")]
    MalformedLine { line: usize, content: String },

    #[error("Invalid date on fixture line {line}: {value}")]
    InvalidDate { line: usize, value: String },

    #[error("Invalid task count on fixture line {line}: {value}")]
    InvalidCount { line: usize, value: String },

    #[error("Empty city name on fixture line {line}")]
    EmptyCityName { line: usize },

    #[error("City {city} listed twice for {date} (fixture line {line})")]
    DuplicateCity {
        line: usize,
        city: String,
        date: NaiveDate,
    },
}

/// One city's share of a day's plan.
#[derive(Debug, Clone)]
pub struct CitySpec {
    pub city_name: String,
    pub task_count: usize,
    pub platform: Option<String>,
}

impl CitySpec {
    pub fn new(city_name: impl Into<String>, task_count: usize) -> Self {
        Self {
            city_name: city_name.into(),
            task_count,
            platform: None,
        }
    }
}

/// Materialize a city with its pending queue of freshly numbered tasks.
pub fn build_city(spec: &CitySpec) -> City {
    let tasks = (0..spec.task_count)
        .map(|i| {
            let mut task = Task::new(&spec.city_name, format!("{}{}", spec.city_name, i));
            task.platform = spec.platform.clone();
            task
        })
        .collect();
    City::new(&spec.city_name, tasks)
}

/// Parse a fixture into per-date city lists, preserving line order within
/// each date.
pub fn parse_fixture(text: &str) -> Result<Vec<(NaiveDate, Vec<CitySpec>)>, SeedError> {
    let mut days: Vec<(NaiveDate, Vec<CitySpec>)> = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let content = raw.trim();
        if content.is_empty() {
            continue;
        }

        let fields: Vec<&str> = content.split(',').map(str::trim).collect();
        let &[date_field, city_field, count_field] = fields.as_slice() else {
            return Err(SeedError::MalformedLine {
                line,
                content: content.to_string(),
            });
        };

        let date: NaiveDate = date_field.parse().map_err(|_| SeedError::InvalidDate {
            line,
            value: date_field.to_string(),
        })?;
        if city_field.is_empty() {
            return Err(SeedError::EmptyCityName { line });
        }
        let task_count: usize = count_field.parse().map_err(|_| SeedError::InvalidCount {
            line,
            value: count_field.to_string(),
        })?;

        let day_index = match days.iter().position(|(d, _)| *d == date) {
            Some(index) => index,
            None => {
                days.push((date, Vec::new()));
                days.len() - 1
            }
        };
        let specs = &mut days[day_index].1;
        if specs.iter().any(|s| s.city_name == city_field) {
            return Err(SeedError::DuplicateCity {
                line,
                city: city_field.to_string(),
                date,
            });
        }
        specs.push(CitySpec::new(city_field, task_count));
    }

    Ok(days)
}

/// Seed the inventory from a fixture file.
pub async fn seed_from_file(
    inventory: &TaskInventory,
    path: impl AsRef<Path>,
) -> Result<(), SeedError> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let days = parse_fixture(&text)?;
    for (date, specs) in days {
        seed_date(inventory, date, &specs).await;
    }
    Ok(())
}

/// Seed one date from already-validated specs.
pub async fn seed_date(inventory: &TaskInventory, date: NaiveDate, specs: &[CitySpec]) {
    let cities = specs.iter().map(build_city).collect();
    inventory.seed_date(date, cities).await;
}

/// The built-in demo plan, used when no fixture file is configured.
pub fn demo_specs() -> Vec<CitySpec> {
    vec![
        CitySpec::new("Chongqing", 3),
        CitySpec::new("Guangzhou", 1),
        CitySpec::new("Hangzhou", 4),
    ]
}
