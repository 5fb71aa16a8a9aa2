//! Binary logistic regression trained by full-batch gradient descent.
//!
//! Features are standardized with the training mean and deviation, weights
//! start at zero, and every epoch walks the rows in order, so the same data
//! and hyperparameters always produce the same model.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainParams {
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// `[negative, positive]`, the sorted distinct training labels
    pub classes: [f64; 2],
    pub weights: Vec<f64>,
    pub bias: f64,
    means: Vec<f64>,
    scales: Vec<f64>,
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl LogisticRegression {
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: TrainParams) -> Result<Self> {
        if x.is_empty() {
            bail!("cannot train on zero rows");
        }
        if x.len() != y.len() {
            bail!("{} feature rows but {} labels", x.len(), y.len());
        }
        let width = x[0].len();
        if x.iter().any(|row| row.len() != width) {
            bail!("feature rows have differing widths");
        }
        if y.iter().any(|v| !v.is_finite()) {
            bail!("labels must be finite numbers");
        }

        let mut labels = y.to_vec();
        labels.sort_by(f64::total_cmp);
        labels.dedup();
        if labels.len() != 2 {
            bail!(
                "binary classification needs exactly 2 distinct labels, found {}",
                labels.len()
            );
        }
        let classes = [labels[0], labels[1]];

        let n = x.len() as f64;
        let means: Vec<f64> = (0..width)
            .map(|j| x.iter().map(|row| row[j]).sum::<f64>() / n)
            .collect();
        let scales: Vec<f64> = (0..width)
            .map(|j| {
                let var = x.iter().map(|row| (row[j] - means[j]).powi(2)).sum::<f64>() / n;
                let sd = var.sqrt();
                if sd > 1e-12 {
                    sd
                } else {
                    1.0
                }
            })
            .collect();

        let mut model = Self {
            classes,
            weights: vec![0.0; width],
            bias: 0.0,
            means,
            scales,
        };

        let scaled: Vec<Vec<f64>> = x.iter().map(|row| model.standardize(row)).collect();
        let targets: Vec<f64> = y
            .iter()
            .map(|&v| if v == classes[1] { 1.0 } else { 0.0 })
            .collect();

        for _ in 0..params.epochs {
            let mut grad_w = vec![0.0; width];
            let mut grad_b = 0.0;
            for (row, target) in scaled.iter().zip(&targets) {
                let err = sigmoid(model.linear(row)) - target;
                for (g, v) in grad_w.iter_mut().zip(row) {
                    *g += err * v;
                }
                grad_b += err;
            }
            for (w, g) in model.weights.iter_mut().zip(&grad_w) {
                *w -= params.learning_rate * (g / n + params.l2 * *w);
            }
            model.bias -= params.learning_rate * grad_b / n;
        }

        Ok(model)
    }

    fn standardize(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }

    fn linear(&self, scaled: &[f64]) -> f64 {
        self.bias
            + self
                .weights
                .iter()
                .zip(scaled)
                .map(|(w, v)| w * v)
                .sum::<f64>()
    }

    /// Probability of the positive class
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(self.linear(&self.standardize(row)))
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        let width = self.weights.len();
        x.iter()
            .map(|row| {
                if row.len() != width {
                    bail!("row has {} features, model expects {}", row.len(), width);
                }
                Ok(if self.predict_proba(row) >= 0.5 {
                    self.classes[1]
                } else {
                    self.classes[0]
                })
            })
            .collect()
    }

    pub fn positive_class(&self) -> f64 {
        self.classes[1]
    }
}
