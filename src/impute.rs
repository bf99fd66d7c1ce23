/// Distance-weighted k-nearest-neighbour imputation across one snapshot.
///
/// The eight numeric fields of every measurement form a feature matrix with
/// one row per station. For each missing cell, the donors are the other
/// stations that report that field. Distance between the receiver and a
/// donor is the NaN-aware Euclidean distance over the fields both report,
/// scaled up by `total_fields / shared_fields` so rows with fewer shared
/// fields are not artificially close. The estimate is the inverse-distance
/// weighted mean of the `NEIGHBORS` closest donors; donors at distance zero,
/// if any, take all of the weight.
///
/// Imputation never fails the cycle. Every outcome comes back as an
/// `Imputation`, which tells the caller whether values were filled or the
/// input was passed through and why.

use crate::model::{Measurement, NumericField};
use thiserror::Error;

/// Fewer stations than this and the snapshot passes through unchanged.
pub const MIN_STATIONS: usize = 5;

/// Neighbours consulted per missing value.
pub const NEIGHBORS: usize = 5;

const FIELD_COUNT: usize = NumericField::ALL.len();

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImputeError {
    #[error("field {field} of station {station_id} holds a non-finite value")]
    NonFiniteInput {
        station_id: i32,
        field: &'static str,
    },

    #[error("estimate for {field} of station {station_id} is not finite")]
    NonFiniteEstimate {
        station_id: i32,
        field: &'static str,
    },
}

/// Why a snapshot was passed through without imputation.
#[derive(Debug, Clone, PartialEq)]
pub enum PassThrough {
    TooFewStations(usize),
    NothingMissing,
    Failed(ImputeError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Imputation {
    /// `filled` missing cells received an estimate. Cells whose field no
    /// station reports stay missing.
    Imputed {
        measurements: Vec<Measurement>,
        filled: usize,
    },
    Unchanged {
        measurements: Vec<Measurement>,
        reason: PassThrough,
    },
}

impl Imputation {
    pub fn measurements(&self) -> &[Measurement] {
        match self {
            Imputation::Imputed { measurements, .. } => measurements,
            Imputation::Unchanged { measurements, .. } => measurements,
        }
    }

    pub fn into_measurements(self) -> Vec<Measurement> {
        match self {
            Imputation::Imputed { measurements, .. } => measurements,
            Imputation::Unchanged { measurements, .. } => measurements,
        }
    }

    pub fn filled(&self) -> usize {
        match self {
            Imputation::Imputed { filled, .. } => *filled,
            Imputation::Unchanged { .. } => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Imputation
// ---------------------------------------------------------------------------

/// Fills missing numeric fields from the other stations in the snapshot.
///
/// On any failure the original measurements are returned untouched.
pub fn impute(measurements: Vec<Measurement>) -> Imputation {
    if measurements.len() < MIN_STATIONS {
        return Imputation::Unchanged {
            reason: PassThrough::TooFewStations(measurements.len()),
            measurements,
        };
    }

    if measurements.iter().all(|m| m.missing_fields() == 0) {
        return Imputation::Unchanged {
            measurements,
            reason: PassThrough::NothingMissing,
        };
    }

    match fill_missing(&measurements) {
        Ok((imputed, filled)) => Imputation::Imputed {
            measurements: imputed,
            filled,
        },
        Err(e) => Imputation::Unchanged {
            measurements,
            reason: PassThrough::Failed(e),
        },
    }
}

type Row = [Option<f64>; FIELD_COUNT];

fn feature_matrix(measurements: &[Measurement]) -> Result<Vec<Row>, ImputeError> {
    measurements
        .iter()
        .map(|m| {
            let mut row = [None; FIELD_COUNT];
            for (col, field) in NumericField::ALL.iter().enumerate() {
                let value = field.get(m);
                if value.is_some_and(|v| !v.is_finite()) {
                    return Err(ImputeError::NonFiniteInput {
                        station_id: m.station_id,
                        field: field.name(),
                    });
                }
                row[col] = value;
            }
            Ok(row)
        })
        .collect()
}

fn fill_missing(measurements: &[Measurement]) -> Result<(Vec<Measurement>, usize), ImputeError> {
    let matrix = feature_matrix(measurements)?;
    let mut output = measurements.to_vec();
    let mut filled = 0;

    for (col, field) in NumericField::ALL.iter().enumerate() {
        let donors: Vec<usize> = (0..matrix.len())
            .filter(|&row| matrix[row][col].is_some())
            .collect();

        if donors.is_empty() {
            continue;
        }

        for receiver in 0..matrix.len() {
            if matrix[receiver][col].is_some() {
                continue;
            }

            let estimate = estimate_cell(&matrix, receiver, col, &donors);
            if !estimate.is_finite() {
                return Err(ImputeError::NonFiniteEstimate {
                    station_id: measurements[receiver].station_id,
                    field: field.name(),
                });
            }

            field.set(&mut output[receiver], estimate);
            filled += 1;
        }
    }

    Ok((output, filled))
}

/// Weighted mean of the nearest donors' values in column `col`. Falls back
/// to the plain donor mean when the receiver shares no field with any donor.
fn estimate_cell(matrix: &[Row], receiver: usize, col: usize, donors: &[usize]) -> f64 {
    let mut ranked: Vec<(f64, f64)> = donors
        .iter()
        .filter_map(|&donor| {
            let distance = nan_euclidean(&matrix[receiver], &matrix[donor])?;
            let value = matrix[donor][col]?;
            Some((distance, value))
        })
        .collect();

    if ranked.is_empty() {
        let values: Vec<f64> = donors.iter().filter_map(|&d| matrix[d][col]).collect();
        return values.iter().sum::<f64>() / values.len() as f64;
    }

    // Stable: equal distances keep snapshot order.
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
    ranked.truncate(NEIGHBORS);

    if ranked.iter().any(|(distance, _)| *distance == 0.0) {
        let exact: Vec<f64> = ranked
            .iter()
            .filter(|(distance, _)| *distance == 0.0)
            .map(|(_, value)| *value)
            .collect();
        return exact.iter().sum::<f64>() / exact.len() as f64;
    }

    let (weighted, total_weight) = ranked
        .iter()
        .fold((0.0, 0.0), |(sum, weights), (distance, value)| {
            let weight = 1.0 / distance;
            (sum + weight * value, weights + weight)
        });

    weighted / total_weight
}

/// Euclidean distance over the coordinates present in both rows, scaled
/// by `FIELD_COUNT / shared`. `None` when the rows share no coordinate.
fn nan_euclidean(a: &Row, b: &Row) -> Option<f64> {
    let (squared, shared) = a
        .iter()
        .zip(b.iter())
        .filter_map(|(x, y)| Some((x.as_ref()? - y.as_ref()?).powi(2)))
        .fold((0.0, 0usize), |(sum, n), sq| (sum + sq, n + 1));

    if shared == 0 {
        return None;
    }

    Some((squared * FIELD_COUNT as f64 / shared as f64).sqrt())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
