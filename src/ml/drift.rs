//! Two-sample Kolmogorov–Smirnov test for dataset drift.

use serde::{Deserialize, Serialize};

/// KS statistic and asymptotic p-value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KsResult {
    pub statistic: f64,
    pub p_value: f64,
}

/// Compare two samples; missing values must already be filtered out.
///
/// An empty sample gives statistic 0 and p-value 1 (no evidence of drift).
pub fn ks_2samp(a: &[f64], b: &[f64]) -> KsResult {
    if a.is_empty() || b.is_empty() {
        return KsResult {
            statistic: 0.0,
            p_value: 1.0,
        };
    }

    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);

    let (n, m) = (a.len(), b.len());
    let (mut i, mut j) = (0usize, 0usize);
    let mut d: f64 = 0.0;

    while i < n && j < m {
        let x = a[i].min(b[j]);
        while i < n && a[i] <= x {
            i += 1;
        }
        while j < m && b[j] <= x {
            j += 1;
        }
        let diff = (i as f64 / n as f64 - j as f64 / m as f64).abs();
        d = d.max(diff);
    }

    let en = ((n * m) as f64 / (n + m) as f64).sqrt();
    let lambda = (en + 0.12 + 0.11 / en) * d;

    KsResult {
        statistic: d,
        p_value: kolmogorov_q(lambda),
    }
}

/// Survival function of the Kolmogorov distribution
fn kolmogorov_q(lambda: f64) -> f64 {
    if lambda < 1e-3 {
        return 1.0;
    }

    let a2 = -2.0 * lambda * lambda;
    let mut sum = 0.0;
    let mut sign = 1.0;
    let mut previous_term: f64 = 0.0;

    for k in 1..=100 {
        let kf = k as f64;
        let term = sign * 2.0 * (a2 * kf * kf).exp();
        sum += term;
        if term.abs() <= 1e-10 * previous_term.abs() || term.abs() <= 1e-12 * sum.abs() {
            return sum.clamp(0.0, 1.0);
        }
        sign = -sign;
        previous_term = term;
    }

    // Series did not converge (tiny lambda); treat as no evidence
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_samples_have_no_drift() {
        let a: Vec<f64> = (0..50).map(|i| (i % 3) as f64 - 1.0).collect();
        let result = ks_2samp(&a, &a);
        assert_eq!(result.statistic, 0.0);
        assert!(result.p_value > 0.99);
    }

    #[test]
    fn test_disjoint_samples_drift() {
        let a: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let b: Vec<f64> = (0..100).map(|i| 1000.0 + i as f64).collect();
        let result = ks_2samp(&a, &b);
        assert_eq!(result.statistic, 1.0);
        assert!(result.p_value < 1e-6);
    }

    #[test]
    fn test_statistic_of_shifted_samples() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [3.0, 4.0, 5.0, 6.0];
        let result = ks_2samp(&a, &b);
        assert!((result.statistic - 0.5).abs() < 1e-12);
        assert!(result.p_value > 0.05);
    }

    #[test]
    fn test_empty_sample() {
        let result = ks_2samp(&[], &[1.0]);
        assert_eq!(result.p_value, 1.0);
    }
}
