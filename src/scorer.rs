//! Anomaly scorer.
//!
//! The production scorer is an isolation forest trained offline and exported
//! to JSON. The export carries, per tree, the node arrays of the fitted
//! decision tree (`children_left`, `children_right`, `feature`, `threshold`,
//! `n_node_samples`) plus the forest-level `offset` and `max_samples`.

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::{
    errors::ServiceError,
    features::{FeatureMatrix, FEATURE_COUNT, FEATURE_NAMES},
};

/// Label given to inliers
pub const INLIER: i32 = 1;
/// Label given to outliers
pub const OUTLIER: i32 = -1;

/// Child index marking a leaf node
const LEAF: i64 = -1;

/// Euler–Mascheroni constant
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Row classifier used by the request handlers
pub trait AnomalyScorer: Send + Sync {
    /// One label per matrix row, in row order
    fn predict(&self, matrix: &FeatureMatrix) -> Result<Vec<i32>, ServiceError>;
}

/// Reject matrices that do not have the trained column layout
fn check_columns(matrix: &FeatureMatrix) -> Result<(), ServiceError> {
    if matrix.columns.len() != FEATURE_COUNT {
        return Err(ServiceError::FeatureMismatch(format!(
            "expected {} columns, got {}",
            FEATURE_COUNT,
            matrix.columns.len()
        )));
    }
    if matrix.columns != &FEATURE_NAMES[..] {
        return Err(ServiceError::FeatureMismatch(format!(
            "unexpected column order {:?}",
            matrix.columns
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
struct IsolationTree {
    children_left: Vec<i64>,
    children_right: Vec<i64>,
    feature: Vec<i64>,
    threshold: Vec<f64>,
    n_node_samples: Vec<u64>,
    /// Column subset the tree was fitted on, all columns when absent
    #[serde(default)]
    features: Option<Vec<usize>>,
}

impl IsolationTree {
    fn validate(&self, index: usize) -> Result<(), ServiceError> {
        let nodes = self.children_left.len();
        let invalid = |reason: String| {
            ServiceError::InvalidModel(format!("estimator {}: {}", index, reason))
        };

        if nodes == 0 {
            return Err(invalid("tree has no nodes".to_string()));
        }
        if [
            self.children_right.len(),
            self.feature.len(),
            self.threshold.len(),
            self.n_node_samples.len(),
        ]
        .iter()
        .any(|&len| len != nodes)
        {
            return Err(invalid("node arrays differ in length".to_string()));
        }

        let width = match &self.features {
            Some(features) => {
                if let Some(&f) = features.iter().find(|&&f| f >= FEATURE_COUNT) {
                    return Err(invalid(format!("feature subset index {} out of range", f)));
                }
                features.len()
            }
            None => FEATURE_COUNT,
        };

        for node in 0..nodes {
            let (left, right) = (self.children_left[node], self.children_right[node]);
            if left == LEAF {
                continue;
            }
            // Children always come after their parent in the node arrays
            for child in [left, right] {
                if child <= node as i64 || child >= nodes as i64 {
                    return Err(invalid(format!("node {} has bad child {}", node, child)));
                }
            }
            let feature = self.feature[node];
            if feature < 0 || feature as usize >= width {
                return Err(invalid(format!(
                    "node {} splits on feature {}",
                    node, feature
                )));
            }
        }
        Ok(())
    }

    /// Path length of `row` through this tree, leaf depth plus the
    /// expected remaining depth of the samples left in that leaf
    fn path_length(&self, row: &[f64; FEATURE_COUNT]) -> f64 {
        let mut node = 0usize;
        let mut depth = 0.0;
        while self.children_left[node] != LEAF {
            let column = self.feature[node] as usize;
            let column = match &self.features {
                Some(features) => features[column],
                None => column,
            };
            // Trees are fitted on single precision inputs
            let value = row[column] as f32 as f64;
            node = if value <= self.threshold[node] {
                self.children_left[node] as usize
            } else {
                self.children_right[node] as usize
            };
            depth += 1.0;
        }
        depth + average_path_length(self.n_node_samples[node])
    }
}

/// Expected path length of an unsuccessful search in a binary search tree
/// of `n` samples
fn average_path_length(n: u64) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        n => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Isolation forest exported from the training environment
#[derive(Debug, Clone, Deserialize)]
pub struct IsolationForest {
    estimators: Vec<IsolationTree>,
    offset: f64,
    max_samples: u64,
    #[serde(default)]
    feature_names: Option<Vec<String>>,
}

impl IsolationForest {
    pub fn from_json(json: &str) -> Result<Self, ServiceError> {
        let forest: IsolationForest = serde_json::from_str(json)?;
        forest.validate()?;
        Ok(forest)
    }

    pub fn load(path: &Path) -> Result<Self, ServiceError> {
        let json = std::fs::read_to_string(path)?;
        let forest = Self::from_json(&json)?;
        info!(
            "Loaded isolation forest from {}: {} estimators, max_samples={}",
            path.display(),
            forest.estimators.len(),
            forest.max_samples
        );
        Ok(forest)
    }

    fn validate(&self) -> Result<(), ServiceError> {
        if self.estimators.is_empty() {
            return Err(ServiceError::InvalidModel("no estimators".to_string()));
        }
        if self.max_samples < 2 {
            return Err(ServiceError::InvalidModel(
                "max_samples must be at least 2".to_string(),
            ));
        }
        if let Some(names) = &self.feature_names {
            if names.len() != FEATURE_COUNT || names.iter().zip(FEATURE_NAMES).any(|(a, b)| a != b)
            {
                return Err(ServiceError::InvalidModel(format!(
                    "trained on features {:?}, expected {:?}",
                    names, FEATURE_NAMES
                )));
            }
        }
        for (index, tree) in self.estimators.iter().enumerate() {
            tree.validate(index)?;
        }
        Ok(())
    }

    /// Anomaly score in (0, 1], higher is more anomalous
    pub fn anomaly_score(&self, row: &[f64; FEATURE_COUNT]) -> f64 {
        let mean_depth = self
            .estimators
            .iter()
            .map(|tree| tree.path_length(row))
            .sum::<f64>()
            / self.estimators.len() as f64;
        2f64.powf(-mean_depth / average_path_length(self.max_samples))
    }

    /// Negative for outliers, non-negative for inliers
    pub fn decision_function(&self, row: &[f64; FEATURE_COUNT]) -> f64 {
        -self.anomaly_score(row) - self.offset
    }
}

impl AnomalyScorer for IsolationForest {
    fn predict(&self, matrix: &FeatureMatrix) -> Result<Vec<i32>, ServiceError> {
        check_columns(matrix)?;
        Ok(matrix
            .rows
            .iter()
            .map(|row| {
                if self.decision_function(row) < 0.0 {
                    OUTLIER
                } else {
                    INLIER
                }
            })
            .collect())
    }
}
