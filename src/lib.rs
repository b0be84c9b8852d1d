//! # Taskyard
//!
//! A service that hands out city-grouped field tasks to requesting devices,
//! one task per request.
//!
//! ## Architecture
//!
//! ```text
//!   GET /fetchTask?deviceId=...
//!            │
//!            ▼
//!     ┌─────────────┐     reads/writes     ┌───────────────────┐
//!     │  Allocator  │ ───────────────────▶ │   TaskInventory   │
//!     │ (3 passes + │                      │ (per-day city     │
//!     │ coarse draw │ ───────────────────▶ │  FIFO queues)     │
//!     │    lock)    │                      ├───────────────────┤
//!     └─────────────┘                      │ AssignmentRegistry│
//!                                          │ (device+day       │
//!                                          │  records)         │
//!                                          └───────────────────┘
//! ```
//!
//! ## Allocation policy
//! 1. Continuity: prefer the cities a device worked on its closest prior
//!    active day (within the idle lookback window).
//! 2. Refresh: then cities the device already holds today.
//! 3. New city: then the day's pool in seeded order.
//!
//! Per-day quotas cap how many tasks and distinct cities a device may touch;
//! an exhausted pool answers with an empty descriptor instead of an error.
//!
//! ## Modules
//! - `allocator`: the selection and quota-enforcement engine
//! - `inventory`: per-day city/task pool
//! - `registry`: per-device, per-day assignment records
//! - `seed`: fixture parsing and daily seeding
//! - `api`: axum entry point, stats, runtime seeding
//! - `config`: env-driven process configuration

pub mod allocator;
pub mod api;
pub mod config;
pub mod inventory;
pub mod model;
pub mod registry;
pub mod seed;

pub use allocator::Allocator;
pub use config::Config;
pub use inventory::{City, TaskInventory};
pub use model::{Task, TaskDescriptor};
pub use registry::AssignmentRegistry;
