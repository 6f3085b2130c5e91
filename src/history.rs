//! Historical position source backed by a CSV file.
//!
//! The file is the source of truth and is read in full on every call. Nothing
//! is cached between requests.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{errors::ServiceError, models::VesselPosition};

#[derive(Debug, Clone)]
pub struct CsvHistory {
    path: PathBuf,
}

impl CsvHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every position report from the file
    pub fn read_positions(&self) -> Result<Vec<VesselPosition>, ServiceError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .from_path(&self.path)?;

        let positions = reader
            .deserialize()
            .collect::<Result<Vec<VesselPosition>, _>>()?;

        debug!(
            "Read {} position reports from {}",
            positions.len(),
            self.path.display()
        );
        Ok(positions)
    }

    /// Read the file on the blocking pool
    pub async fn load(&self) -> Result<Vec<VesselPosition>, ServiceError> {
        let history = self.clone();
        tokio::task::spawn_blocking(move || history.read_positions()).await?
    }

    /// Distinct navigational status strings in the file, sorted
    ///
    /// Missing status is reported as the empty string.
    pub fn distinct_statuses(&self) -> Result<BTreeSet<String>, ServiceError> {
        Ok(self
            .read_positions()?
            .into_iter()
            .map(|p| p.status.unwrap_or_default())
            .collect())
    }
}
