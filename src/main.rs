//! AIS anomaly API server

use std::sync::Arc;

use ais_anomaly_api::{
    api::{self, AppState},
    config::AppConfig,
    database::Database,
    errors::ServiceError,
    features::StatusEncoder,
    history::CsvHistory,
    scorer::IsolationForest,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    #[cfg(feature = "dotenvy")]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load()?;
    config.validate()?;

    // Model and status vocabulary are fixed for the lifetime of the process
    let scorer = IsolationForest::load(&config.model.path)?;

    let history = CsvHistory::new(&config.data.csv_path);
    let encoder = StatusEncoder::fit(history.distinct_statuses()?);
    info!(
        "Using history {} with {} known statuses",
        history.path().display(),
        encoder.len()
    );

    let database = Database::from_config(&config.database).await?;

    let state = AppState::new(
        history,
        encoder,
        Arc::new(scorer),
        config.model.anomaly_label,
        database,
    );

    api::serve(config.server.socket_addr()?, state).await
}
