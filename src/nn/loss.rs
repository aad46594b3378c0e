//! Loss functions for classification.

use std::sync::Arc;

use crate::autograd::grad_fn::CrossEntropyBackward;
use crate::autograd::{is_grad_enabled, with_graph, Tensor};

/// How a per-example loss vector is reduced to the reported loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reduction {
    /// No reduction: return one loss value per example.
    None,
    /// Average over the batch.
    #[default]
    Mean,
    /// Sum over the batch.
    Sum,
}

/// Cross-entropy loss over raw logits.
///
/// Combines a numerically stable log-softmax with negative log-likelihood,
/// and registers a single fused backward op so the gradient is computed as
/// `softmax(logits) - onehot(targets)` in one pass instead of replaying
/// the softmax graph node by node.
///
/// # Example
///
/// ```
/// use robustez::autograd::Tensor;
/// use robustez::nn::CrossEntropyLoss;
///
/// let logits = Tensor::new(&[2.0, 0.5, 0.1, 1.0, 3.0, 0.2], &[2, 3]);
/// let targets = Tensor::from_slice(&[0.0, 1.0]);
///
/// let loss = CrossEntropyLoss::new().forward(&logits, &targets);
/// assert_eq!(loss.shape(), &[1]);
/// assert!(loss.item() > 0.0);
/// ```
pub struct CrossEntropyLoss {
    reduction: Reduction,
}

impl Default for CrossEntropyLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl CrossEntropyLoss {
    /// Create a loss with the default `Reduction::Mean`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reduction: Reduction::Mean,
        }
    }

    /// Create a loss with an explicit reduction.
    #[must_use]
    pub fn with_reduction(reduction: Reduction) -> Self {
        Self { reduction }
    }

    /// Compute the loss for a batch.
    ///
    /// `logits` must be `(batch, classes)`; `targets` holds one class index
    /// per example (stored as `f32`, truncated to `usize`).
    ///
    /// # Panics
    ///
    /// Panics if the shapes disagree or a target index is out of range.
    #[must_use]
    pub fn forward(&self, logits: &Tensor, targets: &Tensor) -> Tensor {
        assert_eq!(logits.ndim(), 2, "cross-entropy expects 2-D logits");
        let batch = logits.shape()[0];
        let classes = logits.shape()[1];
        assert_eq!(
            targets.numel(),
            batch,
            "expected {} targets, got {}",
            batch,
            targets.numel()
        );

        let target_idx: Vec<usize> = targets
            .data()
            .iter()
            .map(|&t| {
                let idx = t as usize;
                assert!(idx < classes, "target class {idx} out of range for {classes} classes");
                idx
            })
            .collect();

        // Stable softmax + per-example negative log-likelihood.
        let x = logits.data();
        let mut softmax = vec![0.0f32; batch * classes];
        let mut per_example = vec![0.0f32; batch];
        for bi in 0..batch {
            let row = &x[bi * classes..(bi + 1) * classes];
            let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let mut denom = 0.0f32;
            for (ci, &v) in row.iter().enumerate() {
                let e = (v - max).exp();
                softmax[bi * classes + ci] = e;
                denom += e;
            }
            for ci in 0..classes {
                softmax[bi * classes + ci] /= denom;
            }
            // -log softmax[target] = log(denom) - (logit - max)
            per_example[bi] = denom.ln() - (row[target_idx[bi]] - max);
        }

        let (mut result, loss_scale, reduced) = match self.reduction {
            Reduction::None => (Tensor::new(&per_example, &[batch]), 1.0, false),
            Reduction::Sum => {
                let total: f32 = per_example.iter().sum();
                (Tensor::new(&[total], &[1]), 1.0, true)
            }
            Reduction::Mean => {
                let total: f32 = per_example.iter().sum();
                #[allow(clippy::cast_precision_loss)]
                let scale = 1.0 / batch as f32;
                (Tensor::new(&[total * scale], &[1]), scale, true)
            }
        };

        if is_grad_enabled() && logits.requires_grad_enabled() {
            result.requires_grad_(true);
            let grad_fn = Arc::new(CrossEntropyBackward {
                softmax_output: Tensor::new(&softmax, &[batch, classes]),
                targets: target_idx,
                loss_scale,
                reduced,
            });
            result.set_grad_fn(grad_fn.clone());
            with_graph(|graph| {
                graph.register_tensor(logits.clone());
                graph.record(result.id(), grad_fn, vec![logits.id()]);
            });
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{clear_graph, get_grad};

    #[test]
    fn test_uniform_logits_loss_is_log_classes() {
        let logits = Tensor::zeros(&[2, 4]);
        let targets = Tensor::from_slice(&[0.0, 3.0]);
        let loss = CrossEntropyLoss::new().forward(&logits, &targets);
        let expected = (4.0f32).ln();
        assert!((loss.item() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_confident_correct_prediction_has_low_loss() {
        let logits = Tensor::new(&[10.0, 0.0, 0.0], &[1, 3]);
        let targets = Tensor::from_slice(&[0.0]);
        let loss = CrossEntropyLoss::new().forward(&logits, &targets);
        assert!(loss.item() < 0.01);
    }

    #[test]
    fn test_reduction_variants_agree() {
        let logits = Tensor::new(&[2.0, 0.5, 0.1, 1.0, 3.0, 0.2], &[2, 3]);
        let targets = Tensor::from_slice(&[0.0, 1.0]);

        let none = CrossEntropyLoss::with_reduction(Reduction::None).forward(&logits, &targets);
        let sum = CrossEntropyLoss::with_reduction(Reduction::Sum).forward(&logits, &targets);
        let mean = CrossEntropyLoss::with_reduction(Reduction::Mean).forward(&logits, &targets);

        assert_eq!(none.shape(), &[2]);
        let total: f32 = none.data().iter().sum();
        assert!((sum.item() - total).abs() < 1e-6);
        assert!((mean.item() - total / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_sum_gradient_is_softmax_minus_onehot() {
        clear_graph();
        let logits = Tensor::zeros(&[1, 2]).requires_grad();
        let logits_id = logits.id();
        let targets = Tensor::from_slice(&[1.0]);

        CrossEntropyLoss::with_reduction(Reduction::Sum)
            .forward(&logits, &targets)
            .backward();

        let grad = get_grad(logits_id).unwrap();
        // softmax of [0, 0] is [0.5, 0.5]; onehot of class 1 is [0, 1].
        assert!((grad.data()[0] - 0.5).abs() < 1e-6);
        assert!((grad.data()[1] + 0.5).abs() < 1e-6);
        clear_graph();
    }

    #[test]
    fn test_mean_gradient_scales_by_batch() {
        clear_graph();
        let logits = Tensor::zeros(&[2, 2]).requires_grad();
        let logits_id = logits.id();
        let targets = Tensor::from_slice(&[0.0, 0.0]);

        CrossEntropyLoss::new().forward(&logits, &targets).backward();

        let grad = get_grad(logits_id).unwrap();
        // (softmax - onehot) / batch = ([0.5, 0.5] - [1, 0]) / 2.
        assert!((grad.data()[0] + 0.25).abs() < 1e-6);
        assert!((grad.data()[1] - 0.25).abs() < 1e-6);
        clear_graph();
    }

    #[test]
    #[should_panic(expected = "target class 5 out of range")]
    fn test_target_out_of_range_panics() {
        let logits = Tensor::zeros(&[1, 3]);
        let targets = Tensor::from_slice(&[5.0]);
        let _ = CrossEntropyLoss::new().forward(&logits, &targets);
    }
}
