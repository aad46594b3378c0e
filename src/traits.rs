//! Core trait seams for robustez.

use crate::autograd::Tensor;

/// An image classifier producing per-class logits.
///
/// Pre-trained models enter robustez through this seam: anything that maps
/// a batch of images to unnormalized class scores can be a member of an
/// [`Ensemble`](crate::ensemble::Ensemble) or a victim of a
/// [`Pgd`](crate::attack::Pgd) attack.
///
/// # Contract
///
/// * Input: tensor of shape `(batch, channels, height, width)`.
/// * Output: tensor of shape `(batch, num_classes)`.
/// * The forward pass must go through autograd tensor operations if the
///   classifier is to be attacked — the attack differentiates through it.
pub trait Classifier {
    /// Compute logits for a batch of images.
    fn forward(&self, input: &Tensor) -> Tensor;
}

impl<C: Classifier + ?Sized> Classifier for &C {
    fn forward(&self, input: &Tensor) -> Tensor {
        (**self).forward(input)
    }
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn forward(&self, input: &Tensor) -> Tensor {
        (**self).forward(input)
    }
}
