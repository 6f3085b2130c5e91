// src/database.rs
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use crate::{
    config::DatabaseConfig,
    errors::{FieldErrors, ServiceError},
    models::{AisRecord, NewAisRecord, NewSarRecord, NewUser, SarRecord, UserCredential},
};

/// Relational store for submitted AIS/SAR records and users
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
    password_cost: u32,
}

impl Database {
    /// Connect using application configuration and apply migrations
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self, ServiceError> {
        config.validate()?;
        info!(
            "Connecting to database: max_connections={}",
            config.max_connections
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;

        Self::new(pool).await
    }

    /// Wrap an existing pool, applying pending migrations
    pub async fn new(pool: PgPool) -> Result<Self, ServiceError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool as is
    ///
    /// No connection is made until the first query.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            password_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Override the bcrypt cost used for new users
    pub fn with_password_cost(mut self, cost: u32) -> Self {
        self.password_cost = cost;
        self
    }

    /// Insert AIS record
    pub async fn insert_ais_record(&self, record: &NewAisRecord) -> Result<AisRecord, ServiceError> {
        let stored = sqlx::query_as::<_, AisRecord>(
            r#"
            INSERT INTO ais_records (
                vessel_name, latitude, longitude, speed, course, timestamp, anomaly_detected
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, vessel_name, latitude, longitude, speed, course, timestamp, anomaly_detected
            "#,
        )
        .bind(&record.vessel_name)
        .bind(record.latitude)
        .bind(record.longitude)
        .bind(record.speed)
        .bind(record.course)
        .bind(record.timestamp)
        .bind(record.anomaly_detected)
        .fetch_one(&self.pool)
        .await?;

        info!("Stored AIS record {} ({})", stored.id, stored.vessel_name);
        Ok(stored)
    }

    /// Insert SAR record
    ///
    /// A reference to a missing AIS record is reported as a field error on
    /// `ais_data`.
    pub async fn insert_sar_record(&self, record: &NewSarRecord) -> Result<SarRecord, ServiceError> {
        let result = sqlx::query_as::<_, SarRecord>(
            r#"
            INSERT INTO sar_records (image, detected_spill, ais_record_id)
            VALUES ($1, $2, $3)
            RETURNING id, image, detected_spill, ais_record_id
            "#,
        )
        .bind(&record.image)
        .bind(record.detected_spill)
        .bind(record.ais_record_id)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(stored) => {
                info!(
                    "Stored SAR record {} for AIS record {}",
                    stored.id, stored.ais_record_id
                );
                Ok(stored)
            }
            Err(sqlx::Error::Database(e)) if e.is_foreign_key_violation() => {
                let mut errors = FieldErrors::new();
                errors.add(
                    "ais_data",
                    format!(
                        "Invalid pk \"{}\" - object does not exist.",
                        record.ais_record_id
                    ),
                );
                Err(ServiceError::Validation(errors))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Register a user, storing only the bcrypt hash of the password
    pub async fn create_user(&self, user: &NewUser) -> Result<UserCredential, ServiceError> {
        let password = user.password.clone();
        let cost = self.password_cost;
        let password_hash =
            tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;

        let result = sqlx::query_as::<_, UserCredential>(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, username, email, password_hash, created_at
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&password_hash)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(created) => {
                info!("Registered user {}", created.username);
                Ok(created)
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(
                ServiceError::Conflict(format!("Username {} is already taken.", user.username)),
            ),
            Err(e) => Err(e.into()),
        }
    }
}
