//! Request body parsing.
//!
//! Bodies are taken as untyped JSON so that a wrong type can be reported as a
//! 400 with a useful message instead of an extractor rejection. Record
//! payloads are then read into typed structs and validated field by field.

use axum::{extract::rejection::JsonRejection, Json};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use crate::{
    errors::{FieldErrors, ServiceError},
    models::{parse_timestamp, Mmsi, NewAisRecord, NewSarRecord, NewUser},
};

use fields::*;

const REQUIRED: &str = "This field is required.";

pub fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ServiceError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ServiceError::BadRequest(rejection.body_text()))
}

/// Field value, treating absent, `null` and `""` alike
pub fn field<'a>(body: &'a Value, name: &str) -> Option<&'a Value> {
    match body.get(name) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(value) => Some(value),
    }
}

pub fn parse_mmsi(value: &Value) -> Result<Mmsi, ServiceError> {
    let invalid = || ServiceError::BadRequest("Invalid MMSI format.".to_string());
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(invalid)
            .and_then(|n| Mmsi::try_from(n).map_err(|_| invalid())),
        Value::String(s) => Mmsi::try_from(s.as_str()).map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

/// A list of MMSIs; anything but a JSON array is rejected
pub fn parse_mmsi_list(value: Option<&Value>) -> Result<Vec<Mmsi>, ServiceError> {
    match value {
        Some(Value::Array(items)) => items.iter().map(parse_mmsi).collect(),
        _ => Err(ServiceError::BadRequest(
            "mmsi_list should be a list of MMSI numbers".to_string(),
        )),
    }
}

pub fn parse_time(value: &Value) -> Result<DateTime<Utc>, ServiceError> {
    value
        .as_str()
        .and_then(parse_timestamp)
        .ok_or_else(|| ServiceError::BadRequest("Invalid time format.".to_string()))
}

/// Number or numeric string
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// One field of a record payload as found in the body
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    Missing,
    Null,
    /// Present but not convertible, with the message to report
    Invalid(&'static str),
    Present(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Missing
    }
}

/// Deserialize a record payload from a JSON body.
///
/// Fields are read leniently into [`Field`] so that every field error of a
/// body can be reported at once by the payload's `validate`.
pub fn record_payload<T: DeserializeOwned>(body: Value) -> Result<T, ServiceError> {
    if !body.is_object() {
        let mut errors = FieldErrors::new();
        errors.add(
            "non_field_errors",
            "Invalid data. Expected a dictionary of fields.",
        );
        return Err(ServiceError::Validation(errors));
    }
    serde_json::from_value(body).map_err(|e| ServiceError::BadRequest(e.to_string()))
}

#[derive(Debug, Deserialize)]
pub struct SarPayload {
    #[serde(default, deserialize_with = "text")]
    pub image: Field<String>,
    #[serde(default, deserialize_with = "boolean")]
    pub detected_spill: Field<bool>,
    #[serde(default, deserialize_with = "primary_key")]
    pub ais_data: Field<i64>,
}

impl SarPayload {
    pub fn validate(self) -> Result<NewSarRecord, ServiceError> {
        let mut errors = FieldErrors::new();
        let image = check_text(&mut errors, "image", self.image, 100);
        let detected_spill =
            check_optional(&mut errors, "detected_spill", self.detected_spill, false);
        let ais_record_id = check_required(&mut errors, "ais_data", self.ais_data);

        match (image, detected_spill, ais_record_id) {
            (Some(image), Some(detected_spill), Some(ais_record_id)) if errors.is_empty() => {
                Ok(NewSarRecord {
                    image,
                    detected_spill,
                    ais_record_id,
                })
            }
            _ => Err(ServiceError::Validation(errors)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AisRecordPayload {
    #[serde(default, deserialize_with = "text")]
    pub vessel_name: Field<String>,
    #[serde(default, deserialize_with = "number")]
    pub latitude: Field<f64>,
    #[serde(default, deserialize_with = "number")]
    pub longitude: Field<f64>,
    #[serde(default, deserialize_with = "number")]
    pub speed: Field<f64>,
    #[serde(default, deserialize_with = "number")]
    pub course: Field<f64>,
    #[serde(default, deserialize_with = "timestamp")]
    pub timestamp: Field<DateTime<Utc>>,
    #[serde(default, deserialize_with = "boolean")]
    pub anomaly_detected: Field<bool>,
}

impl AisRecordPayload {
    pub fn validate(self) -> Result<NewAisRecord, ServiceError> {
        let mut errors = FieldErrors::new();
        let vessel_name = check_text(&mut errors, "vessel_name", self.vessel_name, 100);
        let latitude = check_required(&mut errors, "latitude", self.latitude);
        let longitude = check_required(&mut errors, "longitude", self.longitude);
        let speed = check_required(&mut errors, "speed", self.speed);
        let course = check_required(&mut errors, "course", self.course);
        let timestamp = check_required(&mut errors, "timestamp", self.timestamp);
        let anomaly_detected =
            check_optional(&mut errors, "anomaly_detected", self.anomaly_detected, false);

        match (
            vessel_name,
            latitude,
            longitude,
            speed,
            course,
            timestamp,
            anomaly_detected,
        ) {
            (
                Some(vessel_name),
                Some(latitude),
                Some(longitude),
                Some(speed),
                Some(course),
                Some(timestamp),
                Some(anomaly_detected),
            ) if errors.is_empty() => Ok(NewAisRecord {
                vessel_name,
                latitude,
                longitude,
                speed,
                course,
                timestamp,
                anomaly_detected,
            }),
            _ => Err(ServiceError::Validation(errors)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SignupPayload {
    #[serde(default, deserialize_with = "text")]
    pub username: Field<String>,
    #[serde(default, deserialize_with = "text")]
    pub email: Field<String>,
    #[serde(default, deserialize_with = "text")]
    pub password: Field<String>,
}

impl SignupPayload {
    pub fn validate(self) -> Result<NewUser, ServiceError> {
        let mut errors = FieldErrors::new();
        let username = check_text(&mut errors, "username", self.username, 100);
        let email = check_email(&mut errors, "email", self.email);
        let password = check_secret(&mut errors, "password", self.password);

        match (username, email, password) {
            (Some(username), Some(email), Some(password)) if errors.is_empty() => Ok(NewUser {
                username,
                email,
                password,
            }),
            _ => Err(ServiceError::Validation(errors)),
        }
    }
}

fn check_required<T>(errors: &mut FieldErrors, name: &str, field: Field<T>) -> Option<T> {
    match field {
        Field::Present(value) => Some(value),
        Field::Missing => {
            errors.add(name, REQUIRED);
            None
        }
        Field::Null => {
            errors.add(name, "This field may not be null.");
            None
        }
        Field::Invalid(message) => {
            errors.add(name, message);
            None
        }
    }
}

/// `default` when absent or null
fn check_optional<T>(
    errors: &mut FieldErrors,
    name: &str,
    field: Field<T>,
    default: T,
) -> Option<T> {
    match field {
        Field::Missing | Field::Null => Some(default),
        field => check_required(errors, name, field),
    }
}

/// Non-blank string of at most `max_len` characters, trimmed
fn check_text(
    errors: &mut FieldErrors,
    name: &str,
    field: Field<String>,
    max_len: usize,
) -> Option<String> {
    let value = check_required(errors, name, field)?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.add(name, "This field may not be blank.");
        None
    } else if value.chars().count() > max_len {
        errors.add(
            name,
            format!("Ensure this field has no more than {} characters.", max_len),
        );
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Non-empty string, kept verbatim
fn check_secret(errors: &mut FieldErrors, name: &str, field: Field<String>) -> Option<String> {
    let value = check_required(errors, name, field)?;
    if value.is_empty() {
        errors.add(name, "This field may not be blank.");
        return None;
    }
    Some(value)
}

fn check_email(errors: &mut FieldErrors, name: &str, field: Field<String>) -> Option<String> {
    let email = check_text(errors, name, field, 254)?;
    let plausible = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };
    if !plausible {
        errors.add(name, "Enter a valid email address.");
        return None;
    }
    Some(email)
}

/// Lenient field deserializers. These never fail; a value of the wrong
/// type is kept as [`Field::Invalid`].
mod fields {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::{parse_number, Field};
    use crate::models::parse_timestamp;

    fn read<'de, D, T>(
        deserializer: D,
        message: &'static str,
        convert: impl FnOnce(&Value) -> Option<T>,
    ) -> Result<Field<T>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => Field::Null,
            value => convert(&value).map_or(Field::Invalid(message), Field::Present),
        })
    }

    pub fn text<'de, D>(deserializer: D) -> Result<Field<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        read(deserializer, "Not a valid string.", |v| {
            v.as_str().map(str::to_string)
        })
    }

    pub fn number<'de, D>(deserializer: D) -> Result<Field<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        read(deserializer, "A valid number is required.", |v| {
            parse_number(v).filter(|n| n.is_finite())
        })
    }

    pub fn timestamp<'de, D>(deserializer: D) -> Result<Field<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        read(
            deserializer,
            "Datetime has wrong format. Use YYYY-MM-DDThh:mm[:ss[.uuuuuu]][+HH:MM|-HH:MM|Z].",
            |v| v.as_str().and_then(parse_timestamp),
        )
    }

    pub fn boolean<'de, D>(deserializer: D) -> Result<Field<bool>, D::Error>
    where
        D: Deserializer<'de>,
    {
        read(deserializer, "Must be a valid boolean.", |v| match v {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Some(false),
                Some(1) => Some(true),
                _ => None,
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" => Some(false),
                _ => None,
            },
            _ => None,
        })
    }

    pub fn primary_key<'de, D>(deserializer: D) -> Result<Field<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => Field::Null,
            Value::Number(n) => n.as_i64().map_or(
                Field::Invalid("Incorrect type. Expected pk value, received float."),
                Field::Present,
            ),
            Value::String(s) => s.trim().parse::<i64>().map_or(
                Field::Invalid("Incorrect type. Expected pk value, received str."),
                Field::Present,
            ),
            _ => Field::Invalid("Incorrect type. Expected pk value."),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field_errors(result: Result<impl std::fmt::Debug, ServiceError>) -> FieldErrors {
        match result {
            Err(ServiceError::Validation(errors)) => errors,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn field_treats_blank_as_missing() {
        let body = json!({"a": null, "b": "  ", "c": 0, "d": "x"});
        assert!(field(&body, "a").is_none());
        assert!(field(&body, "b").is_none());
        assert_eq!(field(&body, "c"), Some(&json!(0)));
        assert_eq!(field(&body, "d"), Some(&json!("x")));
        assert!(field(&body, "missing").is_none());
    }

    #[test]
    fn mmsi_from_number_or_string() {
        assert_eq!(parse_mmsi(&json!(123456789)).unwrap().value(), 123456789);
        assert_eq!(parse_mmsi(&json!("123456789")).unwrap().value(), 123456789);
        assert!(parse_mmsi(&json!("12ab")).is_err());
        assert!(parse_mmsi(&json!(1.5)).is_err());
        assert!(parse_mmsi(&json!(-1)).is_err());
        assert!(parse_mmsi(&json!([1])).is_err());
    }

    #[test]
    fn mmsi_list_must_be_an_array() {
        let list = parse_mmsi_list(Some(&json!([123456789, "987654321"]))).unwrap();
        assert_eq!(list.len(), 2);
        assert!(parse_mmsi_list(Some(&json!("123456789"))).is_err());
        assert!(parse_mmsi_list(None).is_err());
        assert!(parse_mmsi_list(Some(&json!([]))).unwrap().is_empty());
    }

    #[test]
    fn full_precision_numbers_parse_exactly() {
        let body: Value = serde_json::from_str(r#"{"lat": 14.168536774085865}"#).unwrap();
        assert_eq!(parse_number(&body["lat"]), Some(14.168536774085865));
        assert_eq!(parse_number(&json!("14.168536774085865")), Some(14.168536774085865));
    }

    #[test]
    fn sar_payload_collects_all_field_errors() {
        let payload: SarPayload =
            record_payload(json!({"image": "", "detected_spill": "maybe"})).unwrap();
        let errors = field_errors(payload.validate());

        assert_eq!(
            errors.get("image"),
            Some(&["This field may not be blank.".to_string()][..])
        );
        assert_eq!(
            errors.get("detected_spill"),
            Some(&["Must be a valid boolean.".to_string()][..])
        );
        assert_eq!(
            errors.get("ais_data"),
            Some(&["This field is required.".to_string()][..])
        );
    }

    #[test]
    fn sar_payload_reference_types() {
        let payload: SarPayload =
            record_payload(json!({"image": "scene.tif", "ais_data": "7"})).unwrap();
        let record = payload.validate().unwrap();
        assert_eq!(record.ais_record_id, 7);
        assert!(!record.detected_spill);

        let payload: SarPayload =
            record_payload(json!({"image": null, "ais_data": "seven"})).unwrap();
        let errors = field_errors(payload.validate());
        assert_eq!(
            errors.get("image"),
            Some(&["This field may not be null.".to_string()][..])
        );
        assert_eq!(
            errors.get("ais_data"),
            Some(&["Incorrect type. Expected pk value, received str.".to_string()][..])
        );
    }

    #[test]
    fn ais_record_payload_accepts_valid_fields() {
        let payload: AisRecordPayload = record_payload(json!({
            "vessel_name": " SEA STAR ",
            "latitude": "29.5",
            "longitude": -90.1,
            "speed": 10,
            "course": 180.0,
            "timestamp": "2023-01-01T00:00:00Z",
            "anomaly_detected": null,
        }))
        .unwrap();

        let record = payload.validate().unwrap();
        assert_eq!(record.vessel_name, "SEA STAR");
        assert_eq!(record.latitude, 29.5);
        assert_eq!(record.speed, 10.0);
        assert!(!record.anomaly_detected);
    }

    #[test]
    fn ais_record_payload_rejects_bad_types() {
        let payload: AisRecordPayload = record_payload(json!({
            "vessel_name": 42,
            "latitude": "north",
            "longitude": -90.1,
            "speed": 10,
            "course": 180.0,
            "timestamp": "yesterday",
            "anomaly_detected": 2,
        }))
        .unwrap();

        let errors = field_errors(payload.validate());
        assert_eq!(
            errors.get("vessel_name"),
            Some(&["Not a valid string.".to_string()][..])
        );
        assert!(errors.get("latitude").is_some());
        assert!(errors.get("timestamp").is_some());
        assert!(errors.get("anomaly_detected").is_some());
        assert!(errors.get("longitude").is_none());
    }

    #[test]
    fn signup_payload_rejects_long_names_and_bad_email() {
        let payload: SignupPayload = record_payload(json!({
            "username": "x".repeat(101),
            "email": "not-an-email",
            "password": "",
        }))
        .unwrap();

        let errors = field_errors(payload.validate());
        assert_eq!(
            errors.get("username"),
            Some(&["Ensure this field has no more than 100 characters.".to_string()][..])
        );
        assert_eq!(
            errors.get("email"),
            Some(&["Enter a valid email address.".to_string()][..])
        );
        assert_eq!(
            errors.get("password"),
            Some(&["This field may not be blank.".to_string()][..])
        );
    }

    #[test]
    fn signup_payload_keeps_password_verbatim() {
        let payload: SignupPayload = record_payload(json!({
            "username": "analyst",
            "email": "ops@example.com",
            "password": " s3cret ",
        }))
        .unwrap();

        let user = payload.validate().unwrap();
        assert_eq!(user.email, "ops@example.com");
        assert_eq!(user.password, " s3cret ");
    }

    #[test]
    fn record_payload_rejects_non_object_body() {
        let errors = field_errors(record_payload::<SarPayload>(json!([1, 2, 3])));
        assert!(errors.get("non_field_errors").is_some());
    }
}
