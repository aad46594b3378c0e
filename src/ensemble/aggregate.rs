//! Aggregation rules mapping a logits stack to combined logits.
//!
//! Both rules are pure functions over a `(models, batch, classes)` stack
//! and stay on the autograd tape, since the attack differentiates through
//! whichever rule the victim ensemble uses.

use std::sync::Arc;

use crate::autograd::grad_fn::CrossMaxBackward;
use crate::autograd::{is_grad_enabled, with_graph, Tensor};

/// Standard mean aggregation: arithmetic mean across the model axis.
///
/// # Panics
///
/// Panics if `stack` is not 3-dimensional.
#[must_use]
pub fn mean(stack: &Tensor) -> Tensor {
    assert_eq!(
        stack.ndim(),
        3,
        "aggregation expects a (models, batch, classes) stack, got {:?}",
        stack.shape()
    );
    stack.mean_axis0()
}

/// Robust CrossMax aggregation (Fort et al., 2024).
///
/// Three steps, all per example:
/// 1. subtract each model's max logit across classes — removes the model's
///    confidence scale;
/// 2. subtract the per-class max across models — removes class-wise
///    over-confidence outliers;
/// 3. take the per-class median across models.
///
/// The consensus score is resistant to any single member being pushed to
/// extreme confidence. For an even model count the median is the lower
/// middle order statistic, a single selected element, so the gradient
/// routes to one model slice; ties in max/median selection resolve to the
/// lowest index.
///
/// # Panics
///
/// Panics if `stack` is not 3-dimensional.
#[must_use]
pub fn crossmax(stack: &Tensor) -> Tensor {
    assert_eq!(
        stack.ndim(),
        3,
        "aggregation expects a (models, batch, classes) stack, got {:?}",
        stack.shape()
    );

    let (m, b, c) = (stack.shape()[0], stack.shape()[1], stack.shape()[2]);
    let x = stack.data();
    let at = |mi: usize, bi: usize, ci: usize| mi * b * c + bi * c + ci;

    // Step 1: per-model, per-example max over classes.
    let mut cmax_idx = vec![0usize; m * b];
    for mi in 0..m {
        for bi in 0..b {
            let mut best = 0;
            for ci in 1..c {
                if x[at(mi, bi, ci)] > x[at(mi, bi, best)] {
                    best = ci;
                }
            }
            cmax_idx[mi * b + bi] = best;
        }
    }

    let mut centered = vec![0.0; m * b * c];
    for mi in 0..m {
        for bi in 0..b {
            let row_max = x[at(mi, bi, cmax_idx[mi * b + bi])];
            for ci in 0..c {
                centered[at(mi, bi, ci)] = x[at(mi, bi, ci)] - row_max;
            }
        }
    }

    // Step 2: per-class, per-example max over models.
    let mut m2_idx = vec![0usize; b * c];
    for bi in 0..b {
        for ci in 0..c {
            let mut best = 0;
            for mi in 1..m {
                if centered[at(mi, bi, ci)] > centered[at(best, bi, ci)] {
                    best = mi;
                }
            }
            m2_idx[bi * c + ci] = best;
        }
    }

    // Step 3: per-class median across models.
    let mut med_idx = vec![0usize; b * c];
    let mut out = vec![0.0; b * c];
    let mut column: Vec<(f32, usize)> = Vec::with_capacity(m);
    for bi in 0..b {
        for ci in 0..c {
            let col_max = centered[at(m2_idx[bi * c + ci], bi, ci)];
            column.clear();
            for mi in 0..m {
                column.push((centered[at(mi, bi, ci)] - col_max, mi));
            }
            column.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

            // Lower middle order statistic for even counts.
            let (value, model) = column[(m - 1) / 2];
            out[bi * c + ci] = value;
            med_idx[bi * c + ci] = model;
        }
    }

    let mut result = Tensor::new(&out, &[b, c]);

    if is_grad_enabled() && stack.requires_grad_enabled() {
        result.requires_grad_(true);
        let grad_fn = Arc::new(CrossMaxBackward {
            num_models: m,
            batch: b,
            num_classes: c,
            cmax_idx,
            m2_idx,
            med_idx,
        });
        result.set_grad_fn(grad_fn.clone());

        with_graph(|graph| {
            graph.register_tensor(stack.clone());
            graph.record(result.id(), grad_fn, vec![stack.id()]);
        });
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{clear_graph, get_grad};

    #[test]
    fn test_mean_matches_elementwise_average() {
        let stack = Tensor::new(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0], &[2, 2, 2]);
        let combined = mean(&stack);
        assert_eq!(combined.shape(), &[2, 2]);
        assert_eq!(combined.data(), &[3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_crossmax_hand_computed() {
        // models: [1, 3], [2, 0], [0, 1]; one example, two classes.
        let stack = Tensor::new(&[1.0, 3.0, 2.0, 0.0, 0.0, 1.0], &[3, 1, 2]);
        let combined = crossmax(&stack);
        assert_eq!(combined.shape(), &[1, 2]);
        // centered rows: [-2, 0], [0, -2], [-1, 0]; column maxes 0, 0;
        // medians: class 0 of [-2, 0, -1] is -1, class 1 of [0, -2, 0] is 0.
        assert_eq!(combined.data(), &[-1.0, 0.0]);
    }

    #[test]
    fn test_crossmax_even_count_takes_lower_middle() {
        // Two models: median of two values is the smaller one.
        let stack = Tensor::new(&[0.0, 1.0, 5.0, 0.0], &[2, 1, 2]);
        let combined = crossmax(&stack);
        // centered: [-1, 0], [0, -5]; column maxes 0, 0;
        // class 0 of [-1, 0] -> -1; class 1 of [0, -5] -> -5.
        assert_eq!(combined.data(), &[-1.0, -5.0]);
    }

    #[test]
    fn test_crossmax_single_model_shift_invariance() {
        let base = Tensor::new(&[1.0, 3.0, 2.0, 0.0, 0.0, 1.0], &[3, 1, 2]);
        let reference = crossmax(&base);

        // Add a constant to every logit of model 1 only.
        let mut shifted = base.data().to_vec();
        for v in &mut shifted[2..4] {
            *v += 100.0;
        }
        let shifted = crossmax(&Tensor::new(&shifted, &[3, 1, 2]));

        for (a, b) in reference.data().iter().zip(shifted.data()) {
            assert!((a - b).abs() < 1e-5, "{a} vs {b}");
        }
    }

    /// Re-run the two centering steps without the median, for comparison.
    fn doubly_centered(stack: &Tensor) -> Tensor {
        let (m, b, c) = (stack.shape()[0], stack.shape()[1], stack.shape()[2]);
        let x = stack.data();
        let at = |mi: usize, bi: usize, ci: usize| mi * b * c + bi * c + ci;

        let mut z = vec![0.0; m * b * c];
        for mi in 0..m {
            for bi in 0..b {
                let row_max = (0..c).map(|ci| x[at(mi, bi, ci)]).fold(f32::MIN, f32::max);
                for ci in 0..c {
                    z[at(mi, bi, ci)] = x[at(mi, bi, ci)] - row_max;
                }
            }
        }
        for bi in 0..b {
            for ci in 0..c {
                let col_max = (0..m).map(|mi| z[at(mi, bi, ci)]).fold(f32::MIN, f32::max);
                for mi in 0..m {
                    z[at(mi, bi, ci)] -= col_max;
                }
            }
        }
        Tensor::new(&z, stack.shape())
    }

    #[test]
    fn test_crossmax_identical_members_median_collapses_to_mean() {
        let logits = [0.4, -1.2, 2.0, 0.9, 0.3, -0.7];
        let mut data = logits.to_vec();
        data.extend_from_slice(&logits);
        let stack = Tensor::new(&data, &[2, 2, 3]);

        // When every member agrees, the median across models equals the
        // mean across models of the doubly-centered stack (both are zero:
        // full agreement cancels under the cross-model centering).
        let robust = crossmax(&stack);
        let collapsed = mean(&doubly_centered(&stack));
        for (r, a) in robust.data().iter().zip(collapsed.data()) {
            assert!((r - a).abs() < 1e-6, "{r} vs {a}");
        }
        assert!(robust.data().iter().all(|&v| v.abs() < 1e-6));
    }

    #[test]
    fn test_crossmax_gradient_scatter() {
        clear_graph();
        // Tie-free margins except the structural zero-ties from row
        // centering, whose gradient contributions cancel.
        let stack =
            Tensor::new(&[1.0, 3.5, 2.2, 0.1, -0.3, 1.4], &[3, 1, 2]).requires_grad();
        let stack_id = stack.id();

        crossmax(&stack).sum().backward();

        // y[c0] = x[m2, c0] - x[m2, c1]; y[c1] = 0 with cancelling routes.
        let grad = get_grad(stack_id).expect("grad");
        assert_eq!(grad.shape(), &[3, 1, 2]);
        let expected = [0.0, 0.0, 0.0, 0.0, 1.0, -1.0];
        for (g, e) in grad.data().iter().zip(&expected) {
            assert!((g - e).abs() < 1e-6, "{g} vs {e}");
        }
    }

    #[test]
    #[should_panic(expected = "aggregation expects a (models, batch, classes) stack")]
    fn test_crossmax_rejects_2d() {
        let flat = Tensor::new(&[1.0, 2.0], &[1, 2]);
        let _ = crossmax(&flat);
    }
}
