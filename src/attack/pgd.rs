//! Projected gradient descent in the input space of a classifier.

use crate::autograd::{clear_graph, get_grad, no_grad, Tensor};
use crate::error::{Result, RobustezError};
use crate::nn::{CrossEntropyLoss, Reduction};
use crate::preprocessing::ChannelNormalizer;
use crate::traits::Classifier;

/// Factor converting a pixel-space radius into normalized space.
///
/// Channel stds are roughly 0.25, so one pixel unit spans about four
/// normalized units; the radius and step size are scaled by this constant
/// before being applied to normalized inputs.
pub const NORM_SCALE: f32 = 4.0;

/// Targeted projected gradient descent attack.
///
/// Starting from a zero perturbation, each step takes a fixed-length move
/// along the unit loss gradient with respect to the input, pushing the
/// classifier's output toward the given target labels, then projects the
/// perturbation back onto the per-example L2 ball and onto deltas whose
/// sum with the input denormalizes into `[0, 1]` pixels.
///
/// The update subtracts the unit gradient, so the loss toward the targets
/// is driven down: callers aiming to *cause* misclassification pass
/// deliberately wrong target labels.
#[derive(Debug, Clone, Copy)]
pub struct Pgd {
    radius: f32,
    step_size: f32,
    steps: usize,
    epsilon: f32,
}

impl Pgd {
    /// Create an attack with pixel-space radius and step size.
    ///
    /// # Errors
    ///
    /// Returns `InvalidHyperparameter` if `radius` or `step_size` is not
    /// positive.
    pub fn new(radius: f32, step_size: f32, steps: usize) -> Result<Self> {
        if !(radius > 0.0) {
            return Err(RobustezError::InvalidHyperparameter {
                param: "radius".to_string(),
                value: radius.to_string(),
                constraint: "radius > 0".to_string(),
            });
        }
        if !(step_size > 0.0) {
            return Err(RobustezError::InvalidHyperparameter {
                param: "step_size".to_string(),
                value: step_size.to_string(),
                constraint: "step_size > 0".to_string(),
            });
        }

        Ok(Self {
            radius,
            step_size,
            steps,
            epsilon: 1e-5,
        })
    }

    /// Override the guard added to norms before division.
    #[must_use]
    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Pixel-space L2 radius of the perturbation ball.
    #[must_use]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Number of gradient steps.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Run the attack and return the perturbation delta in normalized space.
    ///
    /// `inputs` is a normalized 4-D NCHW batch, `targets` one class index
    /// per example. The returned delta is detached; `inputs + delta` is the
    /// adversarial batch.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if `inputs` is not 4-D or `targets`
    /// doesn't match the batch size, and `GradientUnavailable` if no
    /// gradient reaches the perturbation (e.g. a constant model).
    pub fn attack<C: Classifier>(
        &self,
        inputs: &Tensor,
        targets: &Tensor,
        model: &C,
        normalizer: &ChannelNormalizer,
    ) -> Result<Tensor> {
        if inputs.ndim() != 4 {
            return Err(RobustezError::DimensionMismatch {
                expected: "4-D image batch (N, C, H, W)".to_string(),
                actual: format!("{}-D", inputs.ndim()),
            });
        }
        let batch = inputs.shape()[0];
        if batch == 0 {
            return Err(RobustezError::DimensionMismatch {
                expected: "a non-empty batch".to_string(),
                actual: "0 examples".to_string(),
            });
        }
        if targets.numel() != batch {
            return Err(RobustezError::DimensionMismatch {
                expected: format!("{batch} target labels"),
                actual: targets.numel().to_string(),
            });
        }

        let example_len = inputs.numel() / batch;
        let norm_radius = self.radius * NORM_SCALE;
        let norm_step = self.step_size * NORM_SCALE;
        let loss_fn = CrossEntropyLoss::with_reduction(Reduction::Sum);

        let mut delta = Tensor::zeros_like(inputs).requires_grad();

        for _ in 0..self.steps {
            clear_graph();

            let adv = inputs.add(&delta);
            let logits = model.forward(&adv);
            let loss = loss_fn.forward(&logits, targets);
            loss.backward();

            let grad =
                get_grad(delta.id()).ok_or_else(|| RobustezError::GradientUnavailable {
                    what: "the input perturbation".to_string(),
                })?;

            // Per-example unit-gradient step, then L2 ball projection.
            {
                let g = grad.data();
                let d = delta.data_mut();
                for bi in 0..batch {
                    let lo = bi * example_len;
                    let hi = lo + example_len;

                    let gnorm = l2_norm(&g[lo..hi]);
                    for i in lo..hi {
                        d[i] -= norm_step * g[i] / (gnorm + self.epsilon);
                    }

                    let dnorm = l2_norm(&d[lo..hi]);
                    if dnorm > norm_radius {
                        let scale = norm_radius / (dnorm + self.epsilon);
                        for v in &mut d[lo..hi] {
                            *v *= scale;
                        }
                    }
                }
            }

            // Keep inputs + delta on the valid image manifold.
            let adv = no_grad(|| inputs.add(&delta));
            let projected = normalizer.project_valid(&adv);
            let x = inputs.data();
            let p = projected.data();
            for (i, v) in delta.data_mut().iter_mut().enumerate() {
                *v = p[i] - x[i];
            }
        }

        clear_graph();
        Ok(delta.detach())
    }
}

fn l2_norm(slice: &[f32]) -> f32 {
    slice.iter().map(|&v| v * v).sum::<f32>().sqrt()
}
