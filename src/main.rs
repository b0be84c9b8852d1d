use tracing_subscriber::EnvFilter;

use taskyard::api;
use taskyard::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        "Starting taskyard: max {} tasks / {} cities per device per day, lookback {} days",
        config.max_tasks_per_day,
        config.max_cities_per_day,
        config.max_idle_lookback_days
    );

    api::serve(config).await
}
