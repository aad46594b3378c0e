//! Convenience re-exports of the most commonly used items.
//!
//! ```
//! use robustez::prelude::*;
//! ```

pub use crate::attack::{Pgd, NORM_SCALE};
pub use crate::autograd::{no_grad, Tensor};
pub use crate::ensemble::{Aggregation, Ensemble};
pub use crate::error::{Result, RobustezError};
pub use crate::metrics::{accuracy, argmax_rows};
pub use crate::nn::{CrossEntropyLoss, Linear, Reduction};
pub use crate::preprocessing::ChannelNormalizer;
pub use crate::traits::Classifier;
