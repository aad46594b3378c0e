//! Gradient function trait and per-operation backward implementations.
//!
//! Each differentiable operation records one of these to the tape; the
//! reverse pass calls `backward` with the upstream gradient and receives
//! one gradient per input, in forward-pass order.

use super::tensor::Tensor;

/// Trait for functions that compute gradients during the backward pass.
///
/// Implementations capture whatever forward-pass state they need (saved
/// inputs, outputs, or selection indices for max/median routing).
pub trait GradFn: Send + Sync {
    /// Compute gradients with respect to inputs.
    ///
    /// Returns one gradient per input tensor, matching the input order
    /// used during the forward pass.
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor>;

    /// Human-readable name for debugging.
    fn name(&self) -> &'static str;
}

// ============================================================================
// Element-wise operations
// ============================================================================

/// z = x + y (same shapes)
pub(crate) struct AddBackward;

impl GradFn for AddBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        // ∂(x+y)/∂x = 1, ∂(x+y)/∂y = 1
        vec![grad_output.clone(), grad_output.clone()]
    }

    fn name(&self) -> &'static str {
        "AddBackward"
    }
}

/// z = x - y (same shapes)
pub(crate) struct SubBackward;

impl GradFn for SubBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        // ∂(x-y)/∂x = 1, ∂(x-y)/∂y = -1
        let neg: Vec<f32> = grad_output.data().iter().map(|&g| -g).collect();
        vec![
            grad_output.clone(),
            Tensor::new(&neg, grad_output.shape()),
        ]
    }

    fn name(&self) -> &'static str {
        "SubBackward"
    }
}

/// z = x * scalar
pub(crate) struct MulScalarBackward {
    pub(crate) scalar: f32,
}

impl GradFn for MulScalarBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let scaled: Vec<f32> = grad_output.data().iter().map(|&g| g * self.scalar).collect();
        vec![Tensor::new(&scaled, grad_output.shape())]
    }

    fn name(&self) -> &'static str {
        "MulScalarBackward"
    }
}

/// z = max(0, x)
pub(crate) struct ReluBackward {
    pub(crate) x: Tensor,
}

impl GradFn for ReluBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        // ∂relu(x)/∂x = 1 if x > 0, else 0
        let grad: Vec<f32> = grad_output
            .data()
            .iter()
            .zip(self.x.data().iter())
            .map(|(&g, &x)| if x > 0.0 { g } else { 0.0 })
            .collect();
        vec![Tensor::new(&grad, grad_output.shape())]
    }

    fn name(&self) -> &'static str {
        "ReluBackward"
    }
}

// ============================================================================
// Reductions and shape operations
// ============================================================================

/// z = sum(x), scalar output
pub(crate) struct SumBackward {
    pub(crate) input_shape: Vec<usize>,
}

impl GradFn for SumBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        // ∂sum(x)/∂x_i = 1: broadcast the scalar upstream gradient
        let g = grad_output.item();
        let numel: usize = self.input_shape.iter().product();
        vec![Tensor::new(&vec![g; numel], &self.input_shape)]
    }

    fn name(&self) -> &'static str {
        "SumBackward"
    }
}

/// z = x reshaped
pub(crate) struct ViewBackward {
    pub(crate) input_shape: Vec<usize>,
}

impl GradFn for ViewBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![Tensor::new(grad_output.data(), &self.input_shape)]
    }

    fn name(&self) -> &'static str {
        "ViewBackward"
    }
}

/// z = x^T for a 2-D tensor
pub(crate) struct TransposeBackward;

impl GradFn for TransposeBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let (rows, cols) = (grad_output.shape()[0], grad_output.shape()[1]);
        let mut grad = vec![0.0; rows * cols];
        for i in 0..rows {
            for j in 0..cols {
                grad[j * rows + i] = grad_output.data()[i * cols + j];
            }
        }
        vec![Tensor::new(&grad, &[cols, rows])]
    }

    fn name(&self) -> &'static str {
        "TransposeBackward"
    }
}

/// z = stack([x_0, ..., x_{m-1}]) along a new leading axis
pub(crate) struct StackBackward {
    pub(crate) num_parts: usize,
    pub(crate) part_shape: Vec<usize>,
}

impl GradFn for StackBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        // The leading axis is contiguous, so each part's gradient is a
        // chunk of the flat upstream buffer.
        let part_len: usize = self.part_shape.iter().product();
        (0..self.num_parts)
            .map(|m| {
                let chunk = &grad_output.data()[m * part_len..(m + 1) * part_len];
                Tensor::new(chunk, &self.part_shape)
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "StackBackward"
    }
}

/// z = mean over the leading axis
pub(crate) struct MeanAxis0Backward {
    pub(crate) input_shape: Vec<usize>,
}

impl GradFn for MeanAxis0Backward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        // ∂mean_m(x)/∂x[m, i] = 1/m
        let m = self.input_shape[0];
        let inner: usize = self.input_shape[1..].iter().product();
        let mut grad = vec![0.0; m * inner];
        for slice in 0..m {
            for i in 0..inner {
                grad[slice * inner + i] = grad_output.data()[i] / m as f32;
            }
        }
        vec![Tensor::new(&grad, &self.input_shape)]
    }

    fn name(&self) -> &'static str {
        "MeanAxis0Backward"
    }
}

// ============================================================================
// Linear algebra
// ============================================================================

/// z = x @ y for 2-D tensors
pub(crate) struct MatmulBackward {
    pub(crate) x: Tensor,
    pub(crate) y: Tensor,
}

impl GradFn for MatmulBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        // ∂L/∂x = g @ y^T, ∂L/∂y = x^T @ g
        let (n, k) = (self.x.shape()[0], self.x.shape()[1]);
        let p = self.y.shape()[1];
        let g = grad_output.data();
        let x = self.x.data();
        let y = self.y.data();

        let mut grad_x = vec![0.0; n * k];
        for i in 0..n {
            for a in 0..k {
                let mut acc = 0.0;
                for j in 0..p {
                    acc += g[i * p + j] * y[a * p + j];
                }
                grad_x[i * k + a] = acc;
            }
        }

        let mut grad_y = vec![0.0; k * p];
        for a in 0..k {
            for j in 0..p {
                let mut acc = 0.0;
                for i in 0..n {
                    acc += x[i * k + a] * g[i * p + j];
                }
                grad_y[a * p + j] = acc;
            }
        }

        vec![Tensor::new(&grad_x, &[n, k]), Tensor::new(&grad_y, &[k, p])]
    }

    fn name(&self) -> &'static str {
        "MatmulBackward"
    }
}

/// z = matrix + row-broadcast vector
pub(crate) struct BroadcastAddBackward {
    pub(crate) rows: usize,
    pub(crate) cols: usize,
}

impl GradFn for BroadcastAddBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        // Matrix gradient passes through; the vector sums over rows.
        let g = grad_output.data();
        let mut grad_vec = vec![0.0; self.cols];
        for i in 0..self.rows {
            for j in 0..self.cols {
                grad_vec[j] += g[i * self.cols + j];
            }
        }
        vec![
            grad_output.clone(),
            Tensor::new(&grad_vec, &[self.cols]),
        ]
    }

    fn name(&self) -> &'static str {
        "BroadcastAddBackward"
    }
}

// ============================================================================
// Fused domain kernels
// ============================================================================

/// Backward for the fused CrossMax aggregation over a logits stack.
///
/// With x of shape (models, batch, classes), the forward pass selects, for
/// every (batch, class) cell: the per-model row-max class `cmax`, the
/// cross-model max index `m2` after row-max centering, and the median model
/// index `med`. The output cell is
///
/// ```text
/// y = x[med, b, c] - x[med, b, cmax[med, b]]
///   - x[m2,  b, c] + x[m2,  b, cmax[m2,  b]]
/// ```
///
/// so the gradient scatters the upstream value into those four positions.
pub(crate) struct CrossMaxBackward {
    pub(crate) num_models: usize,
    pub(crate) batch: usize,
    pub(crate) num_classes: usize,
    /// argmax class per (model, batch) cell
    pub(crate) cmax_idx: Vec<usize>,
    /// argmax model per (batch, class) cell, after row-max centering
    pub(crate) m2_idx: Vec<usize>,
    /// median model per (batch, class) cell
    pub(crate) med_idx: Vec<usize>,
}

impl GradFn for CrossMaxBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let (m, b, c) = (self.num_models, self.batch, self.num_classes);
        let mut grad = vec![0.0; m * b * c];
        let g = grad_output.data();

        let at = |model: usize, batch: usize, class: usize| model * b * c + batch * c + class;

        for bi in 0..b {
            for ci in 0..c {
                let go = g[bi * c + ci];
                if go == 0.0 {
                    continue;
                }
                let med = self.med_idx[bi * c + ci];
                let m2 = self.m2_idx[bi * c + ci];

                grad[at(med, bi, ci)] += go;
                grad[at(med, bi, self.cmax_idx[med * b + bi])] -= go;
                grad[at(m2, bi, ci)] -= go;
                grad[at(m2, bi, self.cmax_idx[m2 * b + bi])] += go;
            }
        }

        vec![Tensor::new(&grad, &[m, b, c])]
    }

    fn name(&self) -> &'static str {
        "CrossMaxBackward"
    }
}

/// Backward for fused softmax + negative log likelihood.
///
/// ∂L_b/∂logits[b, c] = softmax[b, c] - 1{c == target_b}, scaled by the
/// upstream gradient for the chosen reduction.
pub(crate) struct CrossEntropyBackward {
    /// softmax(logits), saved from the forward pass
    pub(crate) softmax_output: Tensor,
    /// target class indices
    pub(crate) targets: Vec<usize>,
    /// per-example upstream scale: 1 for sum, 1/batch for mean
    pub(crate) loss_scale: f32,
    /// whether the loss was reduced to a scalar
    pub(crate) reduced: bool,
}

impl GradFn for CrossEntropyBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let batch = self.softmax_output.shape()[0];
        let classes = self.softmax_output.shape()[1];
        let sm = self.softmax_output.data();

        let mut grad = vec![0.0; batch * classes];
        for (bi, &target) in self.targets.iter().enumerate() {
            // For reduced losses the upstream gradient is a scalar; for
            // Reduction::None it is one value per example.
            let upstream = if self.reduced {
                grad_output.item() * self.loss_scale
            } else {
                grad_output.data()[bi]
            };
            for ci in 0..classes {
                let indicator = if ci == target { 1.0 } else { 0.0 };
                grad[bi * classes + ci] = upstream * (sm[bi * classes + ci] - indicator);
            }
        }

        vec![Tensor::new(&grad, &[batch, classes])]
    }

    fn name(&self) -> &'static str {
        "CrossEntropyBackward"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_backward_passes_through() {
        let g = Tensor::from_slice(&[1.0, 2.0]);
        let grads = AddBackward.backward(&g);
        assert_eq!(grads.len(), 2);
        assert_eq!(grads[0].data(), &[1.0, 2.0]);
        assert_eq!(grads[1].data(), &[1.0, 2.0]);
    }

    #[test]
    fn test_sub_backward_negates_second() {
        let g = Tensor::from_slice(&[1.0, -2.0]);
        let grads = SubBackward.backward(&g);
        assert_eq!(grads[0].data(), &[1.0, -2.0]);
        assert_eq!(grads[1].data(), &[-1.0, 2.0]);
    }

    #[test]
    fn test_stack_backward_splits_chunks() {
        let g = Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let op = StackBackward {
            num_parts: 2,
            part_shape: vec![2],
        };
        let grads = op.backward(&g);
        assert_eq!(grads.len(), 2);
        assert_eq!(grads[0].data(), &[1.0, 2.0]);
        assert_eq!(grads[1].data(), &[3.0, 4.0]);
    }

    #[test]
    fn test_mean_axis0_backward_spreads() {
        let g = Tensor::from_slice(&[4.0, 8.0]);
        let op = MeanAxis0Backward {
            input_shape: vec![4, 2],
        };
        let grads = op.backward(&g);
        assert_eq!(grads[0].shape(), &[4, 2]);
        assert!(grads[0].data().chunks(2).all(|c| c == [1.0, 2.0]));
    }

    #[test]
    fn test_transpose_backward_transposes() {
        let g = Tensor::new(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let grads = TransposeBackward.backward(&g);
        assert_eq!(grads[0].shape(), &[3, 2]);
        assert_eq!(grads[0].data(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_broadcast_add_backward_sums_rows() {
        let g = Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let op = BroadcastAddBackward { rows: 2, cols: 2 };
        let grads = op.backward(&g);
        assert_eq!(grads[0].data(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(grads[1].data(), &[4.0, 6.0]);
    }

    #[test]
    fn test_cross_entropy_backward_softmax_minus_onehot() {
        // Uniform softmax over 2 classes, target 0, sum reduction.
        let op = CrossEntropyBackward {
            softmax_output: Tensor::new(&[0.5, 0.5], &[1, 2]),
            targets: vec![0],
            loss_scale: 1.0,
            reduced: true,
        };
        let grads = op.backward(&Tensor::from_slice(&[1.0]));
        assert_eq!(grads[0].data(), &[-0.5, 0.5]);
    }
}
