//! Feature derivation for the anomaly scorer.
//!
//! Features are derived per vessel over its whole history, ordered by report
//! time, and only then narrowed down to the requested rows. A row at time `t`
//! therefore always sees the reports that preceded it.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Datelike, Timelike, Utc};
use tracing::warn;

use crate::models::{Mmsi, VesselPosition};

/// Column order of the feature matrix, as used when the model was trained.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "SOG",
    "SOG_Change",
    "COG",
    "COG_Change",
    "Heading",
    "Heading_Change",
    "status_encoded",
    "SOG_Roll_Mean",
    "SOG_Roll_Std",
    "hour",
    "day_of_week",
];

pub const FEATURE_COUNT: usize = 11;

/// Trailing window for the SOG rolling statistics
const ROLLING_WINDOW: usize = 3;

/// Which position reports to derive features for
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Reports at exactly `time` from any of the listed vessels
    AtTime { time: DateTime<Utc>, mmsis: Vec<Mmsi> },
    /// Full history of a single vessel
    Vessel(Mmsi),
}

impl Selection {
    fn includes_vessel(&self, mmsi: Mmsi) -> bool {
        match self {
            Selection::AtTime { mmsis, .. } => mmsis.contains(&mmsi),
            Selection::Vessel(m) => *m == mmsi,
        }
    }

    fn includes_row(&self, position: &VesselPosition) -> bool {
        match self {
            Selection::AtTime { time, .. } => position.timestamp == *time,
            Selection::Vessel(_) => true,
        }
    }
}

/// Fixed mapping from navigational status text to an integer code.
///
/// Built once from the distinct statuses of the full history and reused for
/// every request, so a status always maps to the same code. Known statuses
/// are coded `0..n` in sorted order; anything else gets `n`.
#[derive(Debug, Clone, Default)]
pub struct StatusEncoder {
    codes: HashMap<String, u32>,
}

impl StatusEncoder {
    pub fn fit<I, S>(statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let vocabulary: BTreeSet<String> = statuses.into_iter().map(Into::into).collect();
        let codes = vocabulary
            .into_iter()
            .enumerate()
            .map(|(code, status)| (status, code as u32))
            .collect();
        Self { codes }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Code for `status`; missing status encodes as the empty string
    pub fn encode(&self, status: Option<&str>) -> u32 {
        let status = status.unwrap_or("");
        match self.codes.get(status) {
            Some(code) => *code,
            None => {
                warn!("Status {:?} not in vocabulary, using unknown code", status);
                self.codes.len() as u32
            }
        }
    }
}

/// A position report together with its derived features
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub position: VesselPosition,
    pub sog_change: f64,
    pub cog_change: f64,
    pub heading_change: f64,
    pub sog_roll_mean: f64,
    pub sog_roll_std: f64,
    pub status_code: u32,
    pub hour: u32,
    pub day_of_week: u32,
}

impl FeatureRow {
    /// Feature vector in [`FEATURE_NAMES`] order
    pub fn to_vector(&self) -> [f64; FEATURE_COUNT] {
        [
            self.position.sog,
            self.sog_change,
            self.position.cog,
            self.cog_change,
            self.position.heading,
            self.heading_change,
            self.status_code as f64,
            self.sog_roll_mean,
            self.sog_roll_std,
            self.hour as f64,
            self.day_of_week as f64,
        ]
    }
}

/// Row-major matrix handed to the scorer
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub columns: &'static [&'static str],
    pub rows: Vec<[f64; FEATURE_COUNT]>,
}

impl FeatureMatrix {
    pub fn from_rows(rows: &[FeatureRow]) -> Self {
        Self {
            columns: &FEATURE_NAMES,
            rows: rows.iter().map(FeatureRow::to_vector).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Derive features for the rows picked by `selection`.
///
/// Output is grouped by vessel (ascending MMSI) and ordered by report time
/// within each vessel. An empty result means nothing matched.
pub fn derive_features(
    positions: Vec<VesselPosition>,
    selection: &Selection,
    encoder: &StatusEncoder,
) -> Vec<FeatureRow> {
    let mut groups: BTreeMap<Mmsi, Vec<VesselPosition>> = BTreeMap::new();
    for position in positions {
        if selection.includes_vessel(position.mmsi) {
            groups.entry(position.mmsi).or_default().push(position);
        }
    }

    let mut rows = Vec::new();
    for (_, mut group) in groups {
        // Stable sort keeps file order for duplicate timestamps
        group.sort_by_key(|p| p.timestamp);
        rows.extend(
            derive_group(group, encoder)
                .into_iter()
                .filter(|row| selection.includes_row(&row.position)),
        );
    }
    rows
}

/// Derive features for one vessel's time-ordered reports
fn derive_group(group: Vec<VesselPosition>, encoder: &StatusEncoder) -> Vec<FeatureRow> {
    let sogs: Vec<f64> = group.iter().map(|p| p.sog).collect();
    let mut previous: Option<(f64, f64, f64)> = None;

    group
        .into_iter()
        .enumerate()
        .map(|(i, position)| {
            let (sog_change, cog_change, heading_change) = match previous {
                Some((sog, cog, heading)) => (
                    position.sog - sog,
                    position.cog - cog,
                    position.heading - heading,
                ),
                None => (0.0, 0.0, 0.0),
            };
            previous = Some((position.sog, position.cog, position.heading));

            let window = &sogs[(i + 1).saturating_sub(ROLLING_WINDOW)..=i];
            let (sog_roll_mean, sog_roll_std) = mean_std(window);

            FeatureRow {
                status_code: encoder.encode(position.status.as_deref()),
                hour: position.timestamp.hour(),
                day_of_week: position.timestamp.weekday().num_days_from_monday(),
                sog_change,
                cog_change,
                heading_change,
                sog_roll_mean,
                sog_roll_std,
                position,
            }
        })
        .collect()
}

/// Mean and sample standard deviation; std is 0 below two samples
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let sq_diff: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (mean, (sq_diff / (n - 1.0)).sqrt())
}

/// Replace infinite and NaN values with zero
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        // A Monday
        Utc.with_ymd_and_hms(2023, 1, 2, 13, 0, 0).unwrap()
    }

    fn position(mmsi: u32, minutes: i64, sog: f64, status: &str) -> VesselPosition {
        VesselPosition {
            mmsi: Mmsi::try_from(mmsi).unwrap(),
            timestamp: t0() + Duration::minutes(minutes),
            lat: 10.0,
            lon: 20.0,
            sog,
            cog: 90.0 + minutes as f64,
            heading: 100.0 - minutes as f64,
            status: if status.is_empty() {
                None
            } else {
                Some(status.to_string())
            },
            call_sign: None,
            imo: None,
        }
    }

    fn encoder() -> StatusEncoder {
        StatusEncoder::fit(["moored", "under way using engine", "at anchor"])
    }

    #[test]
    fn first_row_diffs_are_zero_per_vessel() {
        let positions = vec![
            position(111111111, 0, 5.0, "moored"),
            position(222222222, 0, 7.0, "moored"),
            position(111111111, 1, 6.0, "moored"),
            position(222222222, 1, 9.0, "moored"),
        ];
        let selection = Selection::AtTime {
            time: t0(),
            mmsis: vec![
                Mmsi::try_from(111111111u32).unwrap(),
                Mmsi::try_from(222222222u32).unwrap(),
            ],
        };

        let rows = derive_features(positions, &selection, &encoder());
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row.sog_change, 0.0);
            assert_eq!(row.cog_change, 0.0);
            assert_eq!(row.heading_change, 0.0);
        }
    }

    #[test]
    fn vessel_history_sog_change_in_time_order() {
        // File order is not time order
        let positions = vec![
            position(123456789, 1, 12.0, "moored"),
            position(123456789, 0, 10.0, "moored"),
        ];
        let selection = Selection::Vessel(Mmsi::try_from(123456789u32).unwrap());

        let rows = derive_features(positions, &selection, &encoder());
        let changes: Vec<f64> = rows.iter().map(|r| r.sog_change).collect();
        assert_eq!(changes, vec![0.0, 2.0]);
        assert_eq!(rows[1].cog_change, 1.0);
        assert_eq!(rows[1].heading_change, -1.0);
    }

    #[test]
    fn at_time_rows_see_preceding_history() {
        let positions = vec![
            position(123456789, 0, 10.0, "moored"),
            position(123456789, 1, 12.0, "moored"),
            position(123456789, 2, 15.0, "moored"),
        ];
        let selection = Selection::AtTime {
            time: t0() + Duration::minutes(2),
            mmsis: vec![Mmsi::try_from(123456789u32).unwrap()],
        };

        let rows = derive_features(positions, &selection, &encoder());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sog_change, 3.0);
        assert!((rows[0].sog_roll_mean - 37.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn rolling_statistics_short_groups() {
        let positions = vec![
            position(123456789, 0, 10.0, "moored"),
            position(123456789, 1, 12.0, "moored"),
        ];
        let selection = Selection::Vessel(Mmsi::try_from(123456789u32).unwrap());

        let rows = derive_features(positions, &selection, &encoder());
        assert_eq!(rows[0].sog_roll_mean, 10.0);
        assert_eq!(rows[0].sog_roll_std, 0.0);
        assert_eq!(rows[1].sog_roll_mean, 11.0);
        assert!((rows[1].sog_roll_std - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn rolling_window_is_three_rows() {
        let positions = vec![
            position(123456789, 0, 100.0, "moored"),
            position(123456789, 1, 1.0, "moored"),
            position(123456789, 2, 2.0, "moored"),
            position(123456789, 3, 3.0, "moored"),
        ];
        let selection = Selection::Vessel(Mmsi::try_from(123456789u32).unwrap());

        let rows = derive_features(positions, &selection, &encoder());
        assert_eq!(rows[3].sog_roll_mean, 2.0);
        assert_eq!(rows[3].sog_roll_std, 1.0);
    }

    #[test]
    fn time_features() {
        let positions = vec![position(123456789, 0, 1.0, "moored")];
        let selection = Selection::Vessel(Mmsi::try_from(123456789u32).unwrap());

        let rows = derive_features(positions, &selection, &encoder());
        assert_eq!(rows[0].hour, 13);
        assert_eq!(rows[0].day_of_week, 0);
    }

    #[test]
    fn empty_selection_yields_no_rows() {
        let positions = vec![position(123456789, 0, 1.0, "moored")];
        let selection = Selection::Vessel(Mmsi::try_from(987654321u32).unwrap());

        assert!(derive_features(positions, &selection, &encoder()).is_empty());

        let selection = Selection::AtTime {
            time: t0() + Duration::hours(5),
            mmsis: vec![Mmsi::try_from(123456789u32).unwrap()],
        };
        let positions = vec![position(123456789, 0, 1.0, "moored")];
        assert!(derive_features(positions, &selection, &encoder()).is_empty());
    }

    #[test]
    fn status_codes_are_stable_across_subsets() {
        let encoder = encoder();

        let only_moored = derive_features(
            vec![position(111111111, 0, 1.0, "moored")],
            &Selection::Vessel(Mmsi::try_from(111111111u32).unwrap()),
            &encoder,
        );
        let mixed = derive_features(
            vec![
                position(111111111, 0, 1.0, "moored"),
                position(222222222, 0, 1.0, "at anchor"),
            ],
            &Selection::AtTime {
                time: t0(),
                mmsis: vec![
                    Mmsi::try_from(111111111u32).unwrap(),
                    Mmsi::try_from(222222222u32).unwrap(),
                ],
            },
            &encoder,
        );

        assert_eq!(only_moored[0].status_code, mixed[0].status_code);
        assert_eq!(mixed[0].status_code, 1);
        assert_eq!(mixed[1].status_code, 0);
    }

    #[test]
    fn status_encoder_unknown_and_missing() {
        let encoder = StatusEncoder::fit(["", "moored"]);
        assert_eq!(encoder.len(), 2);
        assert_eq!(encoder.encode(None), 0);
        assert_eq!(encoder.encode(Some("moored")), 1);
        assert_eq!(encoder.encode(Some("aground")), 2);
    }

    #[test]
    fn feature_vector_order() {
        let rows = derive_features(
            vec![
                position(123456789, 0, 10.0, "moored"),
                position(123456789, 1, 12.0, "moored"),
            ],
            &Selection::Vessel(Mmsi::try_from(123456789u32).unwrap()),
            &encoder(),
        );
        let matrix = FeatureMatrix::from_rows(&rows);

        assert_eq!(matrix.columns, &FEATURE_NAMES);
        assert_eq!(matrix.len(), 2);
        assert_eq!(
            matrix.rows[1],
            [12.0, 2.0, 91.0, 1.0, 99.0, -1.0, 1.0, 11.0, 2f64.sqrt(), 13.0, 0.0]
        );
    }

    #[test]
    fn finite_or_zero_replaces_non_finite() {
        assert_eq!(finite_or_zero(f64::INFINITY), 0.0);
        assert_eq!(finite_or_zero(f64::NEG_INFINITY), 0.0);
        assert_eq!(finite_or_zero(f64::NAN), 0.0);
        assert_eq!(finite_or_zero(1.5), 1.5);
    }
}
