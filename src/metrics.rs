//! Classification metrics.

use crate::autograd::Tensor;

/// Predicted class per row of a `(batch, classes)` logit matrix.
///
/// Ties resolve to the lowest class index.
///
/// # Panics
///
/// Panics if `logits` is not 2-D or has zero classes.
#[must_use]
pub fn argmax_rows(logits: &Tensor) -> Vec<usize> {
    assert_eq!(logits.ndim(), 2, "argmax_rows expects 2-D logits");
    let classes = logits.shape()[1];
    assert!(classes > 0, "argmax_rows requires at least one class");

    logits
        .data()
        .chunks(classes)
        .map(|row| {
            let mut best = 0;
            for (ci, &v) in row.iter().enumerate() {
                if v > row[best] {
                    best = ci;
                }
            }
            best
        })
        .collect()
}

/// Fraction of predictions matching the true labels.
///
/// # Example
///
/// ```
/// use robustez::metrics::accuracy;
///
/// let acc = accuracy(&[0, 1, 2, 1], &[0, 1, 1, 1]);
/// assert!((acc - 0.75).abs() < 1e-6);
/// ```
///
/// # Panics
///
/// Panics if the slices differ in length or are empty.
#[must_use]
pub fn accuracy(y_pred: &[usize], y_true: &[usize]) -> f32 {
    assert_eq!(
        y_pred.len(),
        y_true.len(),
        "predictions and labels must have the same length"
    );
    assert!(!y_pred.is_empty(), "accuracy of an empty batch is undefined");

    let correct = y_pred
        .iter()
        .zip(y_true.iter())
        .filter(|(p, t)| p == t)
        .count();
    #[allow(clippy::cast_precision_loss)]
    {
        correct as f32 / y_pred.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_rows_basic() {
        let logits = Tensor::new(&[0.1, 0.9, 0.0, 2.0, -1.0, 1.0], &[2, 3]);
        assert_eq!(argmax_rows(&logits), vec![1, 0]);
    }

    #[test]
    fn test_argmax_rows_tie_takes_first() {
        let logits = Tensor::new(&[1.0, 1.0, 0.5], &[1, 3]);
        assert_eq!(argmax_rows(&logits), vec![0]);
    }

    #[test]
    fn test_accuracy_perfect_and_zero() {
        assert_eq!(accuracy(&[1, 2, 3], &[1, 2, 3]), 1.0);
        assert_eq!(accuracy(&[0, 0, 0], &[1, 2, 3]), 0.0);
    }

    #[test]
    #[should_panic(expected = "same length")]
    fn test_accuracy_length_mismatch_panics() {
        let _ = accuracy(&[0, 1], &[0]);
    }
}
