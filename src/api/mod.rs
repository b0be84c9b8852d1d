//! HTTP entry point.

pub mod routes;

pub use routes::{serve, AppState};
