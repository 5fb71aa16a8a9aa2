//! Binary classification scores.

use crate::domain::ClassificationMetric;

/// f1, precision and recall of `predicted` against `actual` for the
/// `positive` label. A zero denominator scores 0.0.
pub fn classification_score(actual: &[f64], predicted: &[f64], positive: f64) -> ClassificationMetric {
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut fn_ = 0usize;

    for (&y, &p) in actual.iter().zip(predicted) {
        match (y == positive, p == positive) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };

    ClassificationMetric {
        f1_score: f1,
        precision_score: precision,
        recall_score: recall,
    }
}
