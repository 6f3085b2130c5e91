//! HTTP API
//!
//! All endpoints take JSON `POST` bodies under `/api/`.

mod error;
mod handlers;
mod request;
mod responses;


use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::post, Router};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    database::Database,
    errors::ServiceError,
    features::{derive_features, FeatureMatrix, FeatureRow, Selection, StatusEncoder},
    history::CsvHistory,
    scorer::AnomalyScorer,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub history: CsvHistory,
    pub encoder: Arc<StatusEncoder>,
    pub scorer: Arc<dyn AnomalyScorer>,
    /// Scorer label counted as an anomaly
    pub anomaly_label: i32,
    pub database: Database,
}

/// A feature row together with the label the scorer gave it
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRow {
    pub row: FeatureRow,
    pub label: i32,
}

impl AppState {
    pub fn new(
        history: CsvHistory,
        encoder: StatusEncoder,
        scorer: Arc<dyn AnomalyScorer>,
        anomaly_label: i32,
        database: Database,
    ) -> Self {
        Self {
            history,
            encoder: Arc::new(encoder),
            scorer,
            anomaly_label,
            database,
        }
    }

    /// Read the history, derive features for `selection` and score them
    ///
    /// The scorer is not called when nothing matches.
    pub async fn scored_rows(&self, selection: Selection) -> Result<Vec<ScoredRow>, ServiceError> {
        let state = self.clone();
        tokio::task::spawn_blocking(move || {
            let positions = state.history.read_positions()?;
            let rows = derive_features(positions, &selection, &state.encoder);
            state.score(rows)
        })
        .await?
    }

    fn score(&self, rows: Vec<FeatureRow>) -> Result<Vec<ScoredRow>, ServiceError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let labels = self.scorer.predict(&FeatureMatrix::from_rows(&rows))?;
        if labels.len() != rows.len() {
            return Err(ServiceError::FeatureMismatch(format!(
                "scorer returned {} labels for {} rows",
                labels.len(),
                rows.len()
            )));
        }

        Ok(rows
            .into_iter()
            .zip(labels)
            .map(|(row, label)| ScoredRow { row, label })
            .collect())
    }

    pub fn is_anomaly(&self, label: i32) -> bool {
        label == self.anomaly_label
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600));

    let api = Router::new()
        // Submission
        .route("/submit-ais-data/", post(handlers::submit_ais_data))
        .route("/submit-sar-data/", post(handlers::submit_sar_data))
        .route("/submit-ais-record/", post(handlers::submit_ais_record))
        .route("/signup/", post(handlers::signup))
        // Retrieval
        .route("/get-latest-ais-data/", post(handlers::get_latest_ais_data))
        .route("/get-vessel-history/", post(handlers::get_vessel_history))
        .route("/get-vessel-details/", post(handlers::get_vessel_details))
        .route("/get-ship-trajectory/", post(handlers::get_ship_trajectory));

    Router::new()
        .nest("/api", api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Serve the API until Ctrl-C
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), ServiceError> {
    let listener = TcpListener::bind(addr).await?;
    info!("API server listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await
        }
    }
}
