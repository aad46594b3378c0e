//! Per-channel image normalization.
//!
//! Image classifiers consume inputs shifted and scaled per channel; the
//! attack loop needs the inverse map to reason about raw pixels in `[0, 1]`.

use crate::autograd::Tensor;

/// Affine per-channel normalizer for NCHW image batches.
///
/// `normalize` maps raw pixels to `(x - mean) / std` per channel;
/// `denormalize` is the exact inverse. Both operate on plain data and
/// never record autograd ops.
pub struct ChannelNormalizer {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl ChannelNormalizer {
    /// Create a normalizer from per-channel statistics.
    ///
    /// # Panics
    ///
    /// Panics if the slices differ in length or any std is not positive.
    #[must_use]
    pub fn new(mean: &[f32], std: &[f32]) -> Self {
        assert_eq!(mean.len(), std.len(), "mean and std must cover the same channels");
        assert!(std.iter().all(|&s| s > 0.0), "channel std must be positive");
        Self {
            mean: mean.to_vec(),
            std: std.to_vec(),
        }
    }

    /// CIFAR-10 channel statistics.
    #[must_use]
    pub fn cifar10() -> Self {
        Self::new(&[0.4914, 0.4822, 0.4465], &[0.2470, 0.2435, 0.2616])
    }

    /// Number of channels this normalizer covers.
    #[must_use]
    pub fn num_channels(&self) -> usize {
        self.mean.len()
    }

    /// Map raw pixels to normalized space: `(x - mean) / std` per channel.
    ///
    /// # Panics
    ///
    /// Panics if `batch` is not 4-D NCHW with the expected channel count.
    #[must_use]
    pub fn normalize(&self, batch: &Tensor) -> Tensor {
        self.apply(batch, |v, mean, std| (v - mean) / std)
    }

    /// Map normalized values back to raw pixel space: `x * std + mean`.
    ///
    /// # Panics
    ///
    /// Panics if `batch` is not 4-D NCHW with the expected channel count.
    #[must_use]
    pub fn denormalize(&self, batch: &Tensor) -> Tensor {
        self.apply(batch, |v, mean, std| v * std + mean)
    }

    /// Snap a normalized batch onto the valid image manifold.
    ///
    /// Denormalizes, clips raw pixels to `[0, 1]`, and renormalizes. Values
    /// already corresponding to valid pixels pass through unchanged.
    #[must_use]
    pub fn project_valid(&self, batch: &Tensor) -> Tensor {
        self.apply(batch, |v, mean, std| {
            let pixel = (v * std + mean).clamp(0.0, 1.0);
            (pixel - mean) / std
        })
    }

    fn apply(&self, batch: &Tensor, f: impl Fn(f32, f32, f32) -> f32) -> Tensor {
        assert_eq!(batch.ndim(), 4, "expected a 4-D NCHW batch");
        let channels = batch.shape()[1];
        assert_eq!(
            channels,
            self.mean.len(),
            "normalizer covers {} channels, batch has {}",
            self.mean.len(),
            channels
        );

        let plane = batch.shape()[2] * batch.shape()[3];
        let data: Vec<f32> = batch
            .data()
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let ch = (i / plane) % channels;
                f(v, self.mean[ch], self.std[ch])
            })
            .collect();
        Tensor::new(&data, batch.shape())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max_abs_diff(a: &Tensor, b: &Tensor) -> f32 {
        a.data()
            .iter()
            .zip(b.data().iter())
            .map(|(&x, &y)| (x - y).abs())
            .fold(0.0, f32::max)
    }

    #[test]
    fn test_normalize_denormalize_round_trip() {
        let norm = ChannelNormalizer::cifar10();
        let raw = Tensor::new(
            &[0.0, 0.25, 0.5, 0.75, 1.0, 0.1, 0.9, 0.33, 0.67, 0.5, 0.2, 0.8],
            &[1, 3, 2, 2],
        );
        let round = norm.denormalize(&norm.normalize(&raw));
        assert!(max_abs_diff(&raw, &round) < 1e-6);
    }

    #[test]
    fn test_cifar10_covers_three_channels() {
        assert_eq!(ChannelNormalizer::cifar10().num_channels(), 3);
    }

    #[test]
    fn test_normalize_per_channel() {
        let norm = ChannelNormalizer::new(&[0.5, 0.0], &[0.5, 2.0]);
        let raw = Tensor::new(&[1.0, 1.0], &[1, 2, 1, 1]);
        let out = norm.normalize(&raw);
        assert_eq!(out.data(), &[1.0, 0.5]);
    }

    #[test]
    fn test_project_valid_clamps_out_of_range_pixels() {
        let norm = ChannelNormalizer::new(&[0.5], &[0.5]);
        // Pixels -0.5 and 1.5 in raw space: normalized -2.0 and 2.0.
        let batch = Tensor::new(&[-2.0, 2.0, 0.0], &[1, 1, 1, 3]);
        let projected = norm.project_valid(&batch);
        // Clamped to pixels 0 and 1: normalized -1.0 and 1.0; 0.0 untouched.
        assert_eq!(projected.data(), &[-1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_project_valid_is_identity_inside_range() {
        let norm = ChannelNormalizer::cifar10();
        let raw = Tensor::new(&[0.1, 0.5, 0.9], &[1, 3, 1, 1]);
        let normalized = norm.normalize(&raw);
        let projected = norm.project_valid(&normalized);
        assert!(max_abs_diff(&normalized, &projected) < 1e-6);
    }

    #[test]
    #[should_panic(expected = "channel std must be positive")]
    fn test_zero_std_rejected() {
        let _ = ChannelNormalizer::new(&[0.5], &[0.0]);
    }
}
