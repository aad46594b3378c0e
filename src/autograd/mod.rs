//! Reverse-mode automatic differentiation for the attack's gradient path.
//!
//! The engine is tape-based with a define-by-run graph: forward operations
//! record a backward function as they execute, and gradients are replayed
//! in reverse order on demand. This gives the attack loop an explicit
//! forward/backward pass pair over an owned tensor buffer with manual
//! reset-and-accumulate semantics per iteration.
//!
//! # Example
//!
//! ```ignore
//! use robustez::autograd::{clear_graph, get_grad, Tensor};
//!
//! let delta = Tensor::zeros(&[2, 3]).requires_grad();
//! let loss = delta.mul_scalar(2.0).sum();
//! loss.backward();
//! let grad = get_grad(delta.id()).unwrap();  // all 2.0
//! clear_graph();
//! ```

pub(crate) mod grad_fn;
mod graph;
mod ops;
mod tensor;

pub use grad_fn::GradFn;
pub use graph::ComputationGraph;
pub use tensor::{Tensor, TensorId};

use std::cell::RefCell;

thread_local! {
    /// Computation graph for the current thread.
    static GRAPH: RefCell<ComputationGraph> = RefCell::new(ComputationGraph::new());

    /// Flag to disable gradient tracking (for evaluation-only passes).
    static GRAD_ENABLED: RefCell<bool> = const { RefCell::new(true) };
}

/// Execute a closure without gradient tracking.
///
/// Operations inside the closure run forward-only and record nothing.
pub fn no_grad<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    GRAD_ENABLED.with(|enabled| {
        let prev = *enabled.borrow();
        *enabled.borrow_mut() = false;
        let result = f();
        *enabled.borrow_mut() = prev;
        result
    })
}

/// Check if gradient tracking is currently enabled.
#[must_use]
pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.with(|enabled| *enabled.borrow())
}

/// Get a reference to the thread-local computation graph.
pub(crate) fn with_graph<F, R>(f: F) -> R
where
    F: FnOnce(&mut ComputationGraph) -> R,
{
    GRAPH.with(|graph| f(&mut graph.borrow_mut()))
}

/// Clear the recorded tape and any accumulated gradients.
///
/// The attack loop calls this at the top of every step so each iteration
/// starts from a zeroed gradient.
pub fn clear_graph() {
    GRAPH.with(|graph| graph.borrow_mut().clear());
}

/// Get the gradient accumulated for a tensor, by ID, after `backward()`.
#[must_use]
pub fn get_grad(id: TensorId) -> Option<Tensor> {
    with_graph(|graph| graph.get_grad(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_grad_context() {
        assert!(is_grad_enabled());

        no_grad(|| {
            assert!(!is_grad_enabled());
        });

        assert!(is_grad_enabled());
    }

    #[test]
    fn test_nested_no_grad() {
        no_grad(|| {
            assert!(!is_grad_enabled());
            no_grad(|| {
                assert!(!is_grad_enabled());
            });
            assert!(!is_grad_enabled());
        });

        assert!(is_grad_enabled());
    }

    #[test]
    fn test_no_grad_records_nothing() {
        clear_graph();
        let x = Tensor::from_slice(&[1.0, 2.0]).requires_grad();
        let _y = no_grad(|| x.mul_scalar(3.0).sum());
        with_graph(|graph| assert!(graph.is_empty()));
    }
}
