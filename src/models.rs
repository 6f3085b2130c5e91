//! Data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;
use serde_helpers::*;

/// Maritime Mobile Service Identity (MMSI)
///
/// A unique nine-digit number for identifying vessels in AIS messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Mmsi(u32);

impl TryFrom<u32> for Mmsi {
    type Error = ServiceError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if value > 999_999_999 {
            return Err(ServiceError::InvalidMmsi(value.to_string()));
        }
        Ok(Self(value))
    }
}

impl TryFrom<i64> for Mmsi {
    type Error = ServiceError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        let value =
            u32::try_from(value).map_err(|_| ServiceError::InvalidMmsi(value.to_string()))?;
        Self::try_from(value)
    }
}

impl TryFrom<&str> for Mmsi {
    type Error = ServiceError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let parsed = value
            .trim()
            .parse::<u32>()
            .map_err(|_| ServiceError::InvalidMmsi(value.to_string()))?;
        Self::try_from(parsed)
    }
}

impl From<Mmsi> for u32 {
    fn from(mmsi: Mmsi) -> Self {
        mmsi.0
    }
}

impl Mmsi {
    /// Get the raw MMSI value
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Mmsi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One historical position report, a row of the history CSV.
///
/// Column names follow the MarineCadastre AIS export.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VesselPosition {
    #[serde(rename = "MMSI")]
    pub mmsi: Mmsi,
    /// Report time, `BaseDateTime`
    #[serde(rename = "BaseDateTime", deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Latitude in WGS84 decimal degrees
    #[serde(rename = "LAT")]
    pub lat: f64,
    /// Longitude in WGS84 decimal degrees
    #[serde(rename = "LON")]
    pub lon: f64,
    /// Speed over ground in knots
    #[serde(rename = "SOG")]
    pub sog: f64,
    /// Course over ground in degrees
    #[serde(rename = "COG")]
    pub cog: f64,
    /// True heading in degrees, 511 when not available
    #[serde(rename = "Heading")]
    pub heading: f64,
    /// Navigational status as free text, None if empty
    #[serde(
        rename = "Status",
        default,
        deserialize_with = "deserialize_trimmed_string"
    )]
    pub status: Option<String>,
    #[serde(
        rename = "CallSign",
        default,
        deserialize_with = "deserialize_trimmed_string"
    )]
    pub call_sign: Option<String>,
    #[serde(rename = "IMO", default, deserialize_with = "deserialize_trimmed_string")]
    pub imo: Option<String>,
}

/// AIS record submitted through the API and stored in `ais_records`
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct AisRecord {
    pub id: i64,
    pub vessel_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub course: f64,
    pub timestamp: DateTime<Utc>,
    pub anomaly_detected: bool,
}

/// Validated payload for a new [`AisRecord`]
#[derive(Debug, Clone, PartialEq)]
pub struct NewAisRecord {
    pub vessel_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub course: f64,
    pub timestamp: DateTime<Utc>,
    pub anomaly_detected: bool,
}

/// SAR image record, owned by exactly one [`AisRecord`]
///
/// Rows are removed together with the AIS record they refer to.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct SarRecord {
    pub id: i64,
    /// Stored image reference, e.g. `sar_images/scene_0042.tif`
    pub image: String,
    pub detected_spill: bool,
    #[serde(rename = "ais_data")]
    pub ais_record_id: i64,
}

/// Validated payload for a new [`SarRecord`]
#[derive(Debug, Clone, PartialEq)]
pub struct NewSarRecord {
    pub image: String,
    pub detected_spill: bool,
    pub ais_record_id: i64,
}

/// Registered user. The password is only ever kept as a bcrypt hash.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct UserCredential {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Validated registration payload, password still in clear text
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Parse a timestamp the way the history CSV and request bodies carry them.
///
/// Accepts RFC 3339 and naive `YYYY-MM-DDTHH:MM:SS` / `YYYY-MM-DD HH:MM:SS`
/// (with optional fractional seconds), naive values taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| chrono::NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

/// Custom deserializers
mod serde_helpers {
    use chrono::{DateTime, Utc};
    use serde::{self, de, Deserialize, Deserializer};

    pub fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_timestamp(&s)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", s)))
    }

    pub fn deserialize_trimmed_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        Ok(s.and_then(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }))
    }
}
