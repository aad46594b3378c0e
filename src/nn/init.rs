//! Weight initialization.
//!
//! Xavier/Glorot initialization (Glorot & Bengio, 2010) for the toy
//! linear members used in tests and the experiment driver.

use crate::autograd::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Sample a tensor from U(low, high).
#[must_use]
pub fn uniform(shape: &[usize], low: f32, high: f32, seed: Option<u64>) -> Tensor {
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_os_rng(),
    };
    let len: usize = shape.iter().product();
    let data: Vec<f32> = (0..len).map(|_| rng.random_range(low..high)).collect();
    Tensor::new(&data, shape)
}

/// Xavier uniform initialization.
///
/// Samples from U(-a, a) with a = sqrt(6 / (fan_in + fan_out)).
#[must_use]
pub fn xavier_uniform(shape: &[usize], fan_in: usize, fan_out: usize, seed: Option<u64>) -> Tensor {
    let a = (6.0 / (fan_in + fan_out) as f32).sqrt();
    uniform(shape, -a, a, seed)
}

/// A zero-filled tensor (bias initialization).
#[must_use]
pub fn zeros(shape: &[usize]) -> Tensor {
    Tensor::zeros(shape)
}
