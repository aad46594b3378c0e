//! Gradient-based adversarial attacks.

mod pgd;

pub use pgd::{Pgd, NORM_SCALE};
