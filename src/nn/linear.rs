//! Fully connected (linear) layer: y = xW^T + b.

use super::init::{xavier_uniform, zeros};
use crate::autograd::Tensor;

/// Fully connected layer with Xavier-initialized weights.
///
/// Parameters do not track gradients: robustez attacks frozen pre-trained
/// members (training happens outside this crate), so during a backward
/// pass the only gradient path through this layer runs to its input.
///
/// # Shape
///
/// - Input: `(batch, in_features)`
/// - Output: `(batch, out_features)`
pub struct Linear {
    /// Weight matrix, shape `[out_features, in_features]`
    weight: Tensor,

    /// Transposed weight `[in_features, out_features]`, cached so forward
    /// skips a transpose per call
    weight_t: Tensor,

    /// Bias vector, shape `[out_features]`
    bias: Tensor,

    in_features: usize,
    out_features: usize,
}

impl Linear {
    /// Create a new layer with Xavier initialization.
    #[must_use]
    pub fn new(in_features: usize, out_features: usize) -> Self {
        Self::with_seed(in_features, out_features, None)
    }

    /// Create a layer with a specific random seed.
    #[must_use]
    pub fn with_seed(in_features: usize, out_features: usize, seed: Option<u64>) -> Self {
        let weight = xavier_uniform(
            &[out_features, in_features],
            in_features,
            out_features,
            seed,
        );
        let weight_t = weight.transpose();
        let bias = zeros(&[out_features]);

        Self {
            weight,
            weight_t,
            bias,
            in_features,
            out_features,
        }
    }

    /// Number of input features.
    #[must_use]
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// Number of output features.
    #[must_use]
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Borrow the weight matrix `[out_features, in_features]`.
    #[must_use]
    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    /// Replace the weight matrix (e.g. with externally trained values).
    ///
    /// # Panics
    ///
    /// Panics if the shape is not `[out_features, in_features]`.
    pub fn set_weight(&mut self, weight: Tensor) {
        assert_eq!(
            weight.shape(),
            &[self.out_features, self.in_features],
            "weight must be [out_features, in_features]"
        );
        self.weight_t = weight.transpose();
        self.weight = weight;
    }

    /// Apply the layer: `x @ W^T + b`.
    ///
    /// # Panics
    ///
    /// Panics if `input` is not `(batch, in_features)`.
    #[must_use]
    pub fn forward(&self, input: &Tensor) -> Tensor {
        assert_eq!(input.ndim(), 2, "Linear expects a 2-D (batch, features) input");
        assert_eq!(
            input.shape()[1],
            self.in_features,
            "Linear expects {} input features, got {}",
            self.in_features,
            input.shape()[1]
        );

        input.matmul(&self.weight_t).broadcast_add(&self.bias)
    }
}
