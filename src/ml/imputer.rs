//! K-nearest-neighbour imputation of missing feature values.
//!
//! Distances use the nan-euclidean metric: squared differences over the
//! coordinates both rows have, scaled up by the share of coordinates
//! present. Ties are broken by row order so results are deterministic.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Fitted imputer; keeps the training rows as donors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnImputer {
    pub n_neighbors: usize,
    /// Feature columns, in matrix order
    pub feature_columns: Vec<String>,
    donors: Vec<Vec<Option<f64>>>,
    /// Column means of the donors, used when no neighbour has a value
    fallback: Vec<f64>,
}

impl KnnImputer {
    pub fn fit(
        n_neighbors: usize,
        feature_columns: Vec<String>,
        rows: &[Vec<Option<f64>>],
    ) -> Result<Self> {
        if n_neighbors == 0 {
            bail!("n_neighbors must be at least 1");
        }
        if rows.is_empty() {
            bail!("cannot fit an imputer on zero rows");
        }
        let width = feature_columns.len();
        if let Some(row) = rows.iter().find(|r| r.len() != width) {
            bail!("row has {} values, expected {}", row.len(), width);
        }

        let fallback = (0..width)
            .map(|col| {
                let present: Vec<f64> = rows.iter().filter_map(|r| r[col]).collect();
                if present.is_empty() {
                    0.0
                } else {
                    present.iter().sum::<f64>() / present.len() as f64
                }
            })
            .collect();

        Ok(Self {
            n_neighbors,
            feature_columns,
            donors: rows.to_vec(),
            fallback,
        })
    }

    /// Fill every missing value; rows without gaps pass through unchanged
    pub fn transform(&self, rows: &[Vec<Option<f64>>]) -> Result<Vec<Vec<f64>>> {
        let width = self.feature_columns.len();
        rows.iter()
            .map(|row| {
                if row.len() != width {
                    bail!("row has {} values, expected {}", row.len(), width);
                }
                Ok(self.impute_row(row))
            })
            .collect()
    }

    fn impute_row(&self, row: &[Option<f64>]) -> Vec<f64> {
        if row.iter().all(Option::is_some) {
            return row.iter().map(|v| v.unwrap_or_default()).collect();
        }

        let mut by_distance: Vec<(f64, usize)> = self
            .donors
            .iter()
            .enumerate()
            .filter_map(|(i, donor)| nan_euclidean(row, donor).map(|d| (d, i)))
            .collect();
        by_distance.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        row.iter()
            .enumerate()
            .map(|(col, value)| match value {
                Some(v) => *v,
                None => {
                    let neighbours: Vec<f64> = by_distance
                        .iter()
                        .filter_map(|(_, i)| self.donors[*i][col])
                        .take(self.n_neighbors)
                        .collect();
                    if neighbours.is_empty() {
                        self.fallback[col]
                    } else {
                        neighbours.iter().sum::<f64>() / neighbours.len() as f64
                    }
                }
            })
            .collect()
    }
}

/// None when the rows share no present coordinate
fn nan_euclidean(a: &[Option<f64>], b: &[Option<f64>]) -> Option<f64> {
    let mut sum = 0.0;
    let mut present = 0usize;
    for (x, y) in a.iter().zip(b) {
        if let (Some(x), Some(y)) = (x, y) {
            sum += (x - y) * (x - y);
            present += 1;
        }
    }
    if present == 0 {
        return None;
    }
    let weight = a.len() as f64 / present as f64;
    Some((weight * sum).sqrt())
}
