//! Differentiable tensor operations.
//!
//! Each operation computes its forward result, then records a `GradFn` to
//! the thread-local graph when gradient tracking is enabled and at least
//! one input requires gradients.

use std::sync::Arc;

use super::grad_fn::{
    AddBackward, BroadcastAddBackward, MatmulBackward, MeanAxis0Backward, MulScalarBackward,
    ReluBackward, StackBackward, SubBackward, SumBackward, TransposeBackward,
    ViewBackward,
};
use super::tensor::Tensor;
use super::{is_grad_enabled, with_graph};

impl Tensor {
    /// Element-wise addition: z = self + other.
    ///
    /// # Panics
    ///
    /// Panics if shapes differ.
    #[must_use]
    pub fn add(&self, other: &Tensor) -> Tensor {
        assert_eq!(
            self.shape(),
            other.shape(),
            "add requires matching shapes: {:?} vs {:?}",
            self.shape(),
            other.shape()
        );

        let data: Vec<f32> = self
            .data()
            .iter()
            .zip(other.data().iter())
            .map(|(&a, &b)| a + b)
            .collect();
        let mut result = Tensor::new(&data, self.shape());

        if is_grad_enabled() && (self.requires_grad_enabled() || other.requires_grad_enabled()) {
            result.requires_grad_(true);
            let grad_fn = Arc::new(AddBackward);
            result.set_grad_fn(grad_fn.clone());

            with_graph(|graph| {
                graph.register_tensor(self.clone());
                graph.register_tensor(other.clone());
                graph.record(result.id(), grad_fn, vec![self.id(), other.id()]);
            });
        }

        result
    }

    /// Element-wise subtraction: z = self - other.
    #[must_use]
    pub fn sub(&self, other: &Tensor) -> Tensor {
        assert_eq!(
            self.shape(),
            other.shape(),
            "sub requires matching shapes: {:?} vs {:?}",
            self.shape(),
            other.shape()
        );

        let data: Vec<f32> = self
            .data()
            .iter()
            .zip(other.data().iter())
            .map(|(&a, &b)| a - b)
            .collect();
        let mut result = Tensor::new(&data, self.shape());

        if is_grad_enabled() && (self.requires_grad_enabled() || other.requires_grad_enabled()) {
            result.requires_grad_(true);
            let grad_fn = Arc::new(SubBackward);
            result.set_grad_fn(grad_fn.clone());

            with_graph(|graph| {
                graph.register_tensor(self.clone());
                graph.register_tensor(other.clone());
                graph.record(result.id(), grad_fn, vec![self.id(), other.id()]);
            });
        }

        result
    }

    /// Scalar multiplication: z = self * scalar.
    #[must_use]
    pub fn mul_scalar(&self, scalar: f32) -> Tensor {
        let data: Vec<f32> = self.data().iter().map(|&a| a * scalar).collect();
        let mut result = Tensor::new(&data, self.shape());

        if is_grad_enabled() && self.requires_grad_enabled() {
            result.requires_grad_(true);
            let grad_fn = Arc::new(MulScalarBackward { scalar });
            result.set_grad_fn(grad_fn.clone());

            with_graph(|graph| {
                graph.register_tensor(self.clone());
                graph.record(result.id(), grad_fn, vec![self.id()]);
            });
        }

        result
    }

    /// `ReLU` activation: z = max(0, self).
    #[must_use]
    pub fn relu(&self) -> Tensor {
        let data: Vec<f32> = self.data().iter().map(|&a| a.max(0.0)).collect();
        let mut result = Tensor::new(&data, self.shape());

        if is_grad_enabled() && self.requires_grad_enabled() {
            result.requires_grad_(true);
            let grad_fn = Arc::new(ReluBackward { x: self.clone() });
            result.set_grad_fn(grad_fn.clone());

            with_graph(|graph| {
                graph.register_tensor(self.clone());
                graph.record(result.id(), grad_fn, vec![self.id()]);
            });
        }

        result
    }

    /// Sum of all elements: z = sum(self), shape [1].
    #[must_use]
    pub fn sum(&self) -> Tensor {
        let total: f32 = self.data().iter().sum();
        let mut result = Tensor::new(&[total], &[1]);

        if is_grad_enabled() && self.requires_grad_enabled() {
            result.requires_grad_(true);
            let grad_fn = Arc::new(SumBackward {
                input_shape: self.shape().to_vec(),
            });
            result.set_grad_fn(grad_fn.clone());

            with_graph(|graph| {
                graph.register_tensor(self.clone());
                graph.record(result.id(), grad_fn, vec![self.id()]);
            });
        }

        result
    }

    /// Reshape to `new_shape`; element count must match.
    #[must_use]
    pub fn view(&self, new_shape: &[usize]) -> Tensor {
        let old_numel: usize = self.shape().iter().product();
        let new_numel: usize = new_shape.iter().product();
        assert_eq!(
            old_numel, new_numel,
            "view: element count must match ({old_numel} vs {new_numel})"
        );

        let mut result = Tensor::new(self.data(), new_shape);

        if is_grad_enabled() && self.requires_grad_enabled() {
            result.requires_grad_(true);
            let grad_fn = Arc::new(ViewBackward {
                input_shape: self.shape().to_vec(),
            });
            result.set_grad_fn(grad_fn.clone());

            with_graph(|graph| {
                graph.register_tensor(self.clone());
                graph.record(result.id(), grad_fn, vec![self.id()]);
            });
        }

        result
    }

    /// Transpose a 2-D tensor.
    #[must_use]
    pub fn transpose(&self) -> Tensor {
        assert_eq!(self.ndim(), 2, "transpose requires a 2-D tensor");

        let (rows, cols) = (self.shape()[0], self.shape()[1]);
        let mut data = vec![0.0; rows * cols];
        for i in 0..rows {
            for j in 0..cols {
                data[j * rows + i] = self.data()[i * cols + j];
            }
        }

        let mut result = Tensor::new(&data, &[cols, rows]);

        if is_grad_enabled() && self.requires_grad_enabled() {
            result.requires_grad_(true);
            let grad_fn = Arc::new(TransposeBackward);
            result.set_grad_fn(grad_fn.clone());

            with_graph(|graph| {
                graph.register_tensor(self.clone());
                graph.record(result.id(), grad_fn, vec![self.id()]);
            });
        }

        result
    }

    /// Matrix multiplication for 2-D tensors: z = self @ other.
    #[must_use]
    pub fn matmul(&self, other: &Tensor) -> Tensor {
        assert_eq!(self.ndim(), 2, "matmul requires 2-D tensors");
        assert_eq!(other.ndim(), 2, "matmul requires 2-D tensors");

        let (n, k1) = (self.shape()[0], self.shape()[1]);
        let (k2, p) = (other.shape()[0], other.shape()[1]);
        assert_eq!(k1, k2, "matmul dimension mismatch: {k1} vs {k2}");

        let a = self.data();
        let b = other.data();
        let mut data = vec![0.0; n * p];
        for i in 0..n {
            for j in 0..p {
                let mut acc = 0.0;
                for k in 0..k1 {
                    acc += a[i * k1 + k] * b[k * p + j];
                }
                data[i * p + j] = acc;
            }
        }

        let mut result = Tensor::new(&data, &[n, p]);

        if is_grad_enabled() && (self.requires_grad_enabled() || other.requires_grad_enabled()) {
            result.requires_grad_(true);
            let grad_fn = Arc::new(MatmulBackward {
                x: self.clone(),
                y: other.clone(),
            });
            result.set_grad_fn(grad_fn.clone());

            with_graph(|graph| {
                graph.register_tensor(self.clone());
                graph.register_tensor(other.clone());
                graph.record(result.id(), grad_fn, vec![self.id(), other.id()]);
            });
        }

        result
    }

    /// Broadcast addition: matrix [n, m] + vector [m], over rows.
    #[must_use]
    pub fn broadcast_add(&self, other: &Tensor) -> Tensor {
        assert_eq!(self.ndim(), 2, "broadcast_add requires a 2-D matrix");
        assert_eq!(other.ndim(), 1, "broadcast_add requires a 1-D vector");
        assert_eq!(
            self.shape()[1],
            other.shape()[0],
            "matrix columns {} must match vector length {}",
            self.shape()[1],
            other.shape()[0]
        );

        let (rows, cols) = (self.shape()[0], self.shape()[1]);
        let mut data = vec![0.0; rows * cols];
        for i in 0..rows {
            for j in 0..cols {
                data[i * cols + j] = self.data()[i * cols + j] + other.data()[j];
            }
        }

        let mut result = Tensor::new(&data, self.shape());

        if is_grad_enabled() && (self.requires_grad_enabled() || other.requires_grad_enabled()) {
            result.requires_grad_(true);
            let grad_fn = Arc::new(BroadcastAddBackward { rows, cols });
            result.set_grad_fn(grad_fn.clone());

            with_graph(|graph| {
                graph.register_tensor(self.clone());
                graph.register_tensor(other.clone());
                graph.record(result.id(), grad_fn, vec![self.id(), other.id()]);
            });
        }

        result
    }

    /// Stack tensors of identical shape along a new leading axis.
    ///
    /// This is how per-model logits `(batch, classes)` become a logits
    /// stack `(models, batch, classes)`.
    ///
    /// # Panics
    ///
    /// Panics if `parts` is empty or the shapes differ — an ensemble whose
    /// members disagree on output shape fails here.
    #[must_use]
    pub fn stack(parts: &[Tensor]) -> Tensor {
        assert!(!parts.is_empty(), "stack requires at least one tensor");
        let part_shape = parts[0].shape().to_vec();
        for part in parts {
            assert_eq!(
                part.shape(),
                &part_shape[..],
                "stack requires identical shapes: {:?} vs {:?}",
                part.shape(),
                part_shape
            );
        }

        let part_len: usize = part_shape.iter().product();
        let mut data = Vec::with_capacity(parts.len() * part_len);
        for part in parts {
            data.extend_from_slice(part.data());
        }

        let mut out_shape = vec![parts.len()];
        out_shape.extend_from_slice(&part_shape);
        let mut result = Tensor::new(&data, &out_shape);

        let any_grad = parts.iter().any(Tensor::requires_grad_enabled);
        if is_grad_enabled() && any_grad {
            result.requires_grad_(true);
            let grad_fn = Arc::new(StackBackward {
                num_parts: parts.len(),
                part_shape,
            });
            result.set_grad_fn(grad_fn.clone());

            with_graph(|graph| {
                let mut input_ids = Vec::with_capacity(parts.len());
                for part in parts {
                    graph.register_tensor(part.clone());
                    input_ids.push(part.id());
                }
                graph.record(result.id(), grad_fn, input_ids);
            });
        }

        result
    }

    /// Mean over the leading axis: [m, ...] -> [...].
    #[must_use]
    pub fn mean_axis0(&self) -> Tensor {
        assert!(
            self.ndim() >= 2,
            "mean_axis0 requires at least 2 dimensions"
        );

        let m = self.shape()[0];
        let inner: usize = self.shape()[1..].iter().product();
        let mut data = vec![0.0; inner];
        for slice in 0..m {
            for i in 0..inner {
                data[i] += self.data()[slice * inner + i];
            }
        }
        for v in &mut data {
            *v /= m as f32;
        }

        let mut result = Tensor::new(&data, &self.shape()[1..]);

        if is_grad_enabled() && self.requires_grad_enabled() {
            result.requires_grad_(true);
            let grad_fn = Arc::new(MeanAxis0Backward {
                input_shape: self.shape().to_vec(),
            });
            result.set_grad_fn(grad_fn.clone());

            with_graph(|graph| {
                graph.register_tensor(self.clone());
                graph.record(result.id(), grad_fn, vec![self.id()]);
            });
        }

        result
    }
}
