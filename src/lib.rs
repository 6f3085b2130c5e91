//! Vessel anomaly API: AIS/SAR records and scored ship positions over HTTP

pub mod api;
pub mod config;
pub mod database;
pub mod errors;
pub mod features;
pub mod history;
pub mod models;
pub mod scorer;
