//! Response bodies. Field names match what the map frontend reads.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::{
    api::ScoredRow,
    features::finite_or_zero,
    models::{Mmsi, VesselPosition},
};

/// Timestamps are rendered without offset, e.g. `2023-01-01T00:00:00`
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn serialize_time<S>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_time(time))
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// Scored position at a single instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPosition {
    #[serde(rename = "MMSI")]
    pub mmsi: Mmsi,
    #[serde(rename = "LAT")]
    pub lat: f64,
    #[serde(rename = "LON")]
    pub lon: f64,
    #[serde(rename = "SOG")]
    pub sog: f64,
    #[serde(rename = "COG")]
    pub cog: f64,
    pub anomaly: i32,
}

impl From<&ScoredRow> for ScoredPosition {
    fn from(scored: &ScoredRow) -> Self {
        let p = &scored.row.position;
        Self {
            mmsi: p.mmsi,
            lat: p.lat,
            lon: p.lon,
            sog: p.sog,
            cog: p.cog,
            anomaly: scored.label,
        }
    }
}

/// One entry of a vessel's scored history
///
/// Non-finite numbers are reported as 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    #[serde(rename = "MMSI")]
    pub mmsi: Mmsi,
    #[serde(rename = "LAT")]
    pub lat: f64,
    #[serde(rename = "LON")]
    pub lon: f64,
    #[serde(rename = "CallSign")]
    pub call_sign: Option<String>,
    #[serde(rename = "IMO")]
    pub imo: Option<String>,
    #[serde(rename = "SOG")]
    pub sog: f64,
    pub anomaly: i32,
}

impl From<&ScoredRow> for HistoryEntry {
    fn from(scored: &ScoredRow) -> Self {
        let p = &scored.row.position;
        Self {
            mmsi: p.mmsi,
            lat: finite_or_zero(p.lat),
            lon: finite_or_zero(p.lon),
            call_sign: p.call_sign.clone(),
            imo: p.imo.clone(),
            sog: finite_or_zero(p.sog),
            anomaly: scored.label,
        }
    }
}

/// Raw details of one position report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VesselDetails {
    #[serde(rename = "MMSI")]
    pub mmsi: Mmsi,
    #[serde(rename = "Call Sign")]
    pub call_sign: String,
    #[serde(rename = "IMO")]
    pub imo: String,
    #[serde(rename = "Speed (SOG)")]
    pub sog: f64,
    #[serde(rename = "Course (COG)")]
    pub cog: f64,
    #[serde(rename = "Latitude")]
    pub lat: f64,
    #[serde(rename = "Longitude")]
    pub lon: f64,
    #[serde(rename = "Time", serialize_with = "serialize_time")]
    pub time: DateTime<Utc>,
}

impl From<&VesselPosition> for VesselDetails {
    fn from(p: &VesselPosition) -> Self {
        let or_na = |value: &Option<String>| value.clone().unwrap_or_else(|| "N/A".to_string());
        Self {
            mmsi: p.mmsi,
            call_sign: or_na(&p.call_sign),
            imo: or_na(&p.imo),
            sog: p.sog,
            cog: p.cog,
            lat: p.lat,
            lon: p.lon,
            time: p.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrajectoryPoint {
    #[serde(rename = "BaseDateTime", serialize_with = "serialize_time")]
    pub time: DateTime<Utc>,
    #[serde(rename = "LAT")]
    pub lat: f64,
    #[serde(rename = "LON")]
    pub lon: f64,
    #[serde(rename = "SOG")]
    pub sog: f64,
    #[serde(rename = "COG")]
    pub cog: f64,
    pub anomaly: i32,
}

impl From<&ScoredRow> for TrajectoryPoint {
    fn from(scored: &ScoredRow) -> Self {
        let p = &scored.row.position;
        Self {
            time: p.timestamp,
            lat: p.lat,
            lon: p.lon,
            sog: p.sog,
            cog: p.cog,
            anomaly: scored.label,
        }
    }
}

/// Full track of one vessel between its first and last report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    #[serde(serialize_with = "serialize_time")]
    pub first_time: DateTime<Utc>,
    #[serde(serialize_with = "serialize_time")]
    pub last_time: DateTime<Utc>,
    pub trajectory: Vec<TrajectoryPoint>,
    pub anomalies_present: bool,
}
