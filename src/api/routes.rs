//! HTTP route handlers and server wiring.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{Days, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::allocator::Allocator;
use crate::config::Config;
use crate::inventory::TaskInventory;
use crate::model::TaskDescriptor;
use crate::registry::AssignmentRegistry;
use crate::seed::{self, CitySpec};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub allocator: Allocator,
    pub inventory: Arc<TaskInventory>,
    pub registry: Arc<AssignmentRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let inventory = Arc::new(TaskInventory::new());
        let registry = Arc::new(AssignmentRegistry::new());
        let allocator = Allocator::new(
            config.clone(),
            Arc::clone(&inventory),
            Arc::clone(&registry),
        );
        Self {
            config,
            allocator,
            inventory,
            registry,
        }
    }
}

/// Start the HTTP server: seed the inventory, spawn the retention sweeper,
/// bind and serve until a shutdown signal arrives.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(config));

    match state.config.seed_file.clone() {
        Some(path) => {
            seed::seed_from_file(&state.inventory, &path).await?;
            tracing::info!("Seeded inventory from {}", path.display());
        }
        None => {
            let today = Local::now().date_naive();
            seed::seed_date(&state.inventory, today, &seed::demo_specs()).await;
            tracing::info!("No seed file configured, loaded built-in demo plan for {today}");
        }
    }

    spawn_retention_sweeper(Arc::clone(&state));

    let app = router(Arc::clone(&state));
    let addr = state.config.bind_addr.clone();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Assemble the router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/fetchTask", get(fetch_task))
        .route("/api/health", get(health))
        .route("/api/stats", get(get_stats))
        .route("/api/seed", post(seed_inventory))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Periodically drop inventory days that have passed and assignment records
/// the continuity pass can no longer reach. Without this both stores grow
/// without bound.
fn spawn_retention_sweeper(state: Arc<AppState>) {
    let period = Duration::from_secs(state.config.sweep_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep_once(&state).await;
        }
    });
}

async fn sweep_once(state: &AppState) {
    let today = Local::now().date_naive();
    let keep_days = state.config.max_idle_lookback_days + 1;
    let Some(registry_cutoff) = today.checked_sub_days(Days::new(keep_days)) else {
        return;
    };

    let dropped_records = state.registry.evict_before(registry_cutoff).await;
    let dropped_days = state.inventory.evict_before(today).await;
    if dropped_records > 0 || dropped_days > 0 {
        tracing::info!(
            "Retention sweep dropped {dropped_records} assignment records and {dropped_days} inventory days"
        );
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

// ─────────────────────────────────────────────────────────────────────────────
// Request/Response Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchTaskParams {
    pub device_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub max_tasks_per_day: usize,
    pub max_cities_per_day: usize,
    pub max_idle_lookback_days: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CityStats {
    pub city_name: String,
    pub pending_tasks: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub date: NaiveDate,
    pub cities: Vec<CityStats>,
    pub active_assignments: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedRequest {
    pub date: NaiveDate,
    pub cities: Vec<SeedCityRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedCityRequest {
    pub city_name: String,
    pub task_count: usize,
    #[serde(default)]
    pub platform: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedResponse {
    pub date: NaiveDate,
    pub cities_seeded: usize,
    pub tasks_seeded: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET /fetchTask - hand one task to the requesting device.
///
/// "Nothing available" is a 200 with both descriptor fields empty; the
/// endpoint never turns exhaustion or an unseeded day into an error.
async fn fetch_task(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FetchTaskParams>,
) -> Result<Json<TaskDescriptor>, (StatusCode, String)> {
    if params.device_id.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "deviceId cannot be empty".to_string(),
        ));
    }

    let descriptor = state.allocator.assign(&params.device_id).await;
    Ok(Json(descriptor))
}

/// GET /api/health - liveness plus the effective quota configuration.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        max_tasks_per_day: state.config.max_tasks_per_day,
        max_cities_per_day: state.config.max_cities_per_day,
        max_idle_lookback_days: state.config.max_idle_lookback_days,
    })
}

/// GET /api/stats - today's pending counts per city and the registry size.
async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let today = Local::now().date_naive();
    let cities = state
        .inventory
        .pending_summary(today)
        .await
        .into_iter()
        .map(|(city_name, pending_tasks)| CityStats {
            city_name,
            pending_tasks,
        })
        .collect();

    Json(StatsResponse {
        date: today,
        cities,
        active_assignments: state.registry.len().await,
    })
}

/// POST /api/seed - install (or replace) a day's plan.
///
/// Stands in for the planning system that would push daily inventory in a
/// full deployment. Tasks already granted from a replaced plan are
/// unaffected; they are owned by device assignment records, not the pool.
async fn seed_inventory(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SeedRequest>,
) -> Result<Json<SeedResponse>, (StatusCode, String)> {
    if req.cities.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "cities cannot be empty".to_string(),
        ));
    }

    let mut specs: Vec<CitySpec> = Vec::with_capacity(req.cities.len());
    for city in &req.cities {
        if city.city_name.trim().is_empty() {
            return Err((
                StatusCode::BAD_REQUEST,
                "cityName cannot be empty".to_string(),
            ));
        }
        if specs.iter().any(|s| s.city_name == city.city_name) {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("city {} listed twice", city.city_name),
            ));
        }
        let mut spec = CitySpec::new(&city.city_name, city.task_count);
        spec.platform = city.platform.clone();
        specs.push(spec);
    }

    let tasks_seeded: usize = specs.iter().map(|s| s.task_count).sum();
    seed::seed_date(&state.inventory, req.date, &specs).await;

    tracing::info!(
        "Seeded {} cities ({} tasks) for {}",
        specs.len(),
        tasks_seeded,
        req.date
    );

    Ok(Json(SeedResponse {
        date: req.date,
        cities_seeded: specs.len(),
        tasks_seeded,
    }))
}
