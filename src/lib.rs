//! Robustez: adversarial robustness evaluation for classifier ensembles.
//!
//! Robustez builds ensembles of image classifiers, runs targeted projected
//! gradient descent (PGD) attacks against them, and measures how much
//! accuracy survives. Its centerpiece is the comparison between a standard
//! mean-logit ensemble and a robust ensemble that double-centers the
//! per-model logit stack and takes a per-class median across models.
//!
//! # Quick Start
//!
//! ```
//! use robustez::prelude::*;
//!
//! // Any type producing (batch, classes) logits can join an ensemble.
//! struct Uniform;
//!
//! impl Classifier for Uniform {
//!     fn forward(&self, input: &Tensor) -> Tensor {
//!         Tensor::zeros(&[input.shape()[0], 10])
//!     }
//! }
//!
//! let ensemble = Ensemble::new(vec![Uniform, Uniform], Aggregation::CrossMax)?;
//! let logits = ensemble.forward(&Tensor::zeros(&[4, 3, 8, 8]));
//! assert_eq!(logits.shape(), &[4, 10]);
//! # Ok::<(), RobustezError>(())
//! ```
//!
//! # Modules
//!
//! - [`autograd`]: Tape-based reverse-mode automatic differentiation
//! - [`nn`]: Linear layers, initialization, and cross-entropy loss
//! - [`ensemble`]: Ensembles and the mean / crossmax aggregation rules
//! - [`attack`]: Projected gradient descent in input space
//! - [`preprocessing`]: Per-channel image normalization
//! - [`metrics`]: Argmax predictions and accuracy

pub mod attack;
pub mod autograd;
pub mod ensemble;
pub mod error;
pub mod metrics;
pub mod nn;
pub mod prelude;
pub mod preprocessing;
pub mod traits;

pub use error::{Result, RobustezError};
pub use traits::Classifier;
