use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

use super::{
    request::{
        field, json_body, parse_mmsi, parse_mmsi_list, parse_number, parse_time, record_payload,
        AisRecordPayload, SarPayload, SignupPayload,
    },
    responses::{HistoryEntry, ScoredPosition, Trajectory, TrajectoryPoint, VesselDetails},
    AppState,
};
use crate::{
    errors::ServiceError,
    features::Selection,
    models::{AisRecord, Mmsi, SarRecord, UserCredential},
};

type JsonBody = Result<Json<Value>, JsonRejection>;

fn bad_request(message: &str) -> ServiceError {
    ServiceError::BadRequest(message.to_string())
}

fn required_mmsi(body: &Value) -> Result<Mmsi, ServiceError> {
    let mmsi = field(body, "mmsi").ok_or_else(|| bad_request("MMSI is required."))?;
    parse_mmsi(mmsi)
}

async fn scored_positions_at(
    state: &AppState,
    time: DateTime<Utc>,
    mmsis: Vec<Mmsi>,
) -> Result<Json<Vec<ScoredPosition>>, ServiceError> {
    info!("Scoring {} vessels at {}", mmsis.len(), time);
    let rows = state
        .scored_rows(Selection::AtTime { time, mmsis })
        .await?;
    Ok(Json(rows.iter().map(ScoredPosition::from).collect()))
}

/// Score the listed vessels at one instant
pub async fn submit_ais_data(
    State(state): State<AppState>,
    body: JsonBody,
) -> Result<Json<Vec<ScoredPosition>>, ServiceError> {
    let body = json_body(body)?;

    let required = || bad_request("Time and MMSI list are required.");
    let time = field(&body, "time").ok_or_else(required)?;
    let list = field(&body, "mmsi_list").ok_or_else(required)?;
    if list.as_array().is_some_and(Vec::is_empty) {
        return Err(required());
    }

    let time = parse_time(time)?;
    let mmsis = parse_mmsi_list(Some(list))?;
    scored_positions_at(&state, time, mmsis).await
}

/// Periodic refresh for the map view, same rows as [`submit_ais_data`]
pub async fn get_latest_ais_data(
    State(state): State<AppState>,
    body: JsonBody,
) -> Result<Json<Vec<ScoredPosition>>, ServiceError> {
    let body = json_body(body)?;

    let mmsis = parse_mmsi_list(body.get("mmsi_list"))?;
    let time = field(&body, "time").ok_or_else(|| bad_request("Invalid time format."))?;
    let time = parse_time(time)?;
    scored_positions_at(&state, time, mmsis).await
}

pub async fn get_vessel_history(
    State(state): State<AppState>,
    body: JsonBody,
) -> Result<Json<Vec<HistoryEntry>>, ServiceError> {
    let body = json_body(body)?;
    let mmsi = required_mmsi(&body)?;

    info!("Fetching history for MMSI {}", mmsi);
    let rows = state.scored_rows(Selection::Vessel(mmsi)).await?;
    if rows.is_empty() {
        return Err(ServiceError::NotFound(
            "No data found for the given MMSI.".to_string(),
        ));
    }

    Ok(Json(rows.iter().map(HistoryEntry::from).collect()))
}

/// Raw fields of the first report matching MMSI, position and time exactly
pub async fn get_vessel_details(
    State(state): State<AppState>,
    body: JsonBody,
) -> Result<Json<VesselDetails>, ServiceError> {
    let body = json_body(body)?;

    let (Some(mmsi), Some(lat), Some(lon), Some(time)) = (
        field(&body, "mmsi"),
        field(&body, "lat"),
        field(&body, "lon"),
        field(&body, "time"),
    ) else {
        return Err(bad_request(
            "MMSI, latitude, longitude, and time are required.",
        ));
    };

    let mmsi = parse_mmsi(mmsi)?;
    let lat = parse_number(lat).ok_or_else(|| bad_request("Invalid latitude."))?;
    let lon = parse_number(lon).ok_or_else(|| bad_request("Invalid longitude."))?;
    let time = parse_time(time)?;

    let positions = state.history.load().await?;
    let position = positions
        .iter()
        .find(|p| p.mmsi == mmsi && p.lat == lat && p.lon == lon && p.timestamp == time)
        .ok_or_else(|| {
            ServiceError::NotFound(
                "No data found for the given MMSI, latitude, longitude, and time.".to_string(),
            )
        })?;

    Ok(Json(VesselDetails::from(position)))
}

/// Scored track of one vessel and whether any report on it is anomalous
pub async fn get_ship_trajectory(
    State(state): State<AppState>,
    body: JsonBody,
) -> Result<Json<Trajectory>, ServiceError> {
    let body = json_body(body)?;
    let mmsi = required_mmsi(&body)?;

    info!("Fetching trajectory for MMSI {}", mmsi);
    let rows = state.scored_rows(Selection::Vessel(mmsi)).await?;
    let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
        return Err(ServiceError::NotFound(
            "No data available for the specified ship.".to_string(),
        ));
    };

    Ok(Json(Trajectory {
        first_time: first.row.position.timestamp,
        last_time: last.row.position.timestamp,
        anomalies_present: rows.iter().any(|r| state.is_anomaly(r.label)),
        trajectory: rows.iter().map(TrajectoryPoint::from).collect(),
    }))
}

pub async fn submit_sar_data(
    State(state): State<AppState>,
    body: JsonBody,
) -> Result<(StatusCode, Json<SarRecord>), ServiceError> {
    let record = record_payload::<SarPayload>(json_body(body)?)?.validate()?;
    let record = state.database.insert_sar_record(&record).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn submit_ais_record(
    State(state): State<AppState>,
    body: JsonBody,
) -> Result<(StatusCode, Json<AisRecord>), ServiceError> {
    let record = record_payload::<AisRecordPayload>(json_body(body)?)?.validate()?;
    let record = state.database.insert_ais_record(&record).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Register a user account
pub async fn signup(
    State(state): State<AppState>,
    body: JsonBody,
) -> Result<(StatusCode, Json<UserCredential>), ServiceError> {
    let user = record_payload::<SignupPayload>(json_body(body)?)?.validate()?;
    let user = state.database.create_user(&user).await?;
    Ok((StatusCode::CREATED, Json(user)))
}
