//! Ensembles of independently trained classifiers.
//!
//! An [`Ensemble`] applies every member to the same input batch, stacks
//! the per-model logits along a new leading axis, and combines them with
//! an [`Aggregation`] rule. The wrapper itself implements
//! [`Classifier`], so attacks and accuracy evaluation treat single models
//! and ensembles uniformly.

pub mod aggregate;

use crate::autograd::Tensor;
use crate::error::{Result, RobustezError};
use crate::traits::Classifier;

/// How to combine a `(models, batch, classes)` logits stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Arithmetic mean across the model axis.
    Mean,
    /// Robust double-max-centered median ([`aggregate::crossmax`]).
    CrossMax,
}

/// A fixed set of member classifiers behind one aggregation rule.
///
/// Members are expected to be frozen (no parameter gradients) during
/// attack and evaluation; the ensemble adds no mutable state of its own.
///
/// # Example
///
/// ```ignore
/// let standard = Ensemble::new(members, Aggregation::Mean)?;
/// let logits = standard.forward(&images);
/// ```
pub struct Ensemble<C: Classifier> {
    members: Vec<C>,
    aggregation: Aggregation,
}

impl<C: Classifier> Ensemble<C> {
    /// Create an ensemble over `members` with the given aggregation rule.
    ///
    /// # Errors
    ///
    /// Returns [`RobustezError::EmptyEnsemble`] if `members` is empty.
    pub fn new(members: Vec<C>, aggregation: Aggregation) -> Result<Self> {
        if members.is_empty() {
            return Err(RobustezError::EmptyEnsemble);
        }
        Ok(Self {
            members,
            aggregation,
        })
    }

    /// Number of member classifiers.
    #[must_use]
    pub fn num_members(&self) -> usize {
        self.members.len()
    }

    /// The aggregation rule in use.
    #[must_use]
    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }
}

impl<C: Classifier> Classifier for Ensemble<C> {
    fn forward(&self, input: &Tensor) -> Tensor {
        let outputs: Vec<Tensor> = self
            .members
            .iter()
            .map(|member| member.forward(input))
            .collect();
        let stack = Tensor::stack(&outputs);

        match self.aggregation {
            Aggregation::Mean => aggregate::mean(&stack),
            Aggregation::CrossMax => aggregate::crossmax(&stack),
        }
    }
}
