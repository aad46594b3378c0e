//! Neural network building blocks.
//!
//! robustez attacks pre-trained models rather than training its own, so
//! this module is deliberately small: a fully connected layer for toy
//! ensemble members, weight initialization, and the differentiable
//! cross-entropy loss the attack maximizes through.

pub mod init;
mod linear;
pub mod loss;

pub use linear::Linear;
pub use loss::{CrossEntropyLoss, Reduction};
