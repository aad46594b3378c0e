//! Tape recording and the reverse pass.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::grad_fn::GradFn;
use super::tensor::{Tensor, TensorId};

/// One recorded operation.
#[derive(Clone)]
pub(crate) struct TapeEntry {
    /// ID of the output tensor
    pub output_id: TensorId,

    /// Backward function for the operation
    pub grad_fn: Arc<dyn GradFn>,

    /// IDs of input tensors, in forward-pass order
    pub input_ids: Vec<TensorId>,
}

/// Records operations during the forward pass and replays them in reverse
/// to compute gradients.
///
/// One graph exists per thread (`thread_local` in the parent module), so
/// single-threaded attack loops pay no synchronization cost and concurrent
/// callers on separate threads never share state.
#[allow(missing_debug_implementations)]
pub struct ComputationGraph {
    /// Recorded operations, in execution order
    tape: Vec<TapeEntry>,

    /// Registered tensors by ID (leaves that may receive gradients)
    tensors: HashMap<TensorId, Tensor>,

    /// IDs of tensors that require gradients
    requires_grad: HashSet<TensorId>,
}

impl ComputationGraph {
    /// Create a new empty computation graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tape: Vec::new(),
            tensors: HashMap::new(),
            requires_grad: HashSet::new(),
        }
    }

    /// Forget all recorded operations and gradients.
    pub fn clear(&mut self) {
        self.tape.clear();
        self.tensors.clear();
        self.requires_grad.clear();
    }

    /// Register a tensor so the backward pass can deposit its gradient.
    pub fn register_tensor(&mut self, tensor: Tensor) {
        if tensor.requires_grad_enabled() {
            self.requires_grad.insert(tensor.id());
        }
        self.tensors.insert(tensor.id(), tensor);
    }

    /// Append an operation to the tape.
    pub fn record(
        &mut self,
        output_id: TensorId,
        grad_fn: Arc<dyn GradFn>,
        input_ids: Vec<TensorId>,
    ) {
        self.tape.push(TapeEntry {
            output_id,
            grad_fn,
            input_ids,
        });
    }

    /// Reverse-mode gradient computation.
    ///
    /// Seeds `output_id` with `grad_output`, walks the tape backwards, and
    /// accumulates per-input gradients; multiple uses of the same tensor
    /// sum their contributions. Gradients land on registered leaf tensors
    /// that require them.
    pub fn backward(&mut self, output_id: TensorId, grad_output: Tensor) {
        let mut grads: HashMap<TensorId, Tensor> = HashMap::new();
        grads.insert(output_id, grad_output);

        for entry in self.tape.iter().rev() {
            let grad_out = match grads.get(&entry.output_id) {
                Some(g) => g.clone(),
                None => continue,
            };

            let input_grads = entry.grad_fn.backward(&grad_out);

            for (input_id, input_grad) in entry.input_ids.iter().zip(input_grads) {
                grads
                    .entry(*input_id)
                    .and_modify(|existing| {
                        let summed: Vec<f32> = existing
                            .data()
                            .iter()
                            .zip(input_grad.data().iter())
                            .map(|(a, b)| a + b)
                            .collect();
                        *existing = Tensor::new(&summed, existing.shape());
                    })
                    .or_insert(input_grad);
            }
        }

        for (id, grad) in grads {
            if let Some(tensor) = self.tensors.get_mut(&id) {
                if tensor.requires_grad_enabled() && tensor.is_leaf() {
                    tensor.accumulate_grad(grad);
                }
            }
        }
    }

    /// Number of recorded operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tape.len()
    }

    /// Check whether the tape is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tape.is_empty()
    }

    /// Gradient for a registered tensor, by ID, after `backward`.
    #[must_use]
    pub fn get_grad(&self, id: TensorId) -> Option<Tensor> {
        self.tensors.get(&id).and_then(|t| t.grad().cloned())
    }
}

impl Default for ComputationGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::grad_fn::MulScalarBackward;

    #[test]
    fn test_graph_starts_empty() {
        let graph = ComputationGraph::new();
        assert!(graph.is_empty());
        assert_eq!(graph.len(), 0);
    }

    #[test]
    fn test_clear_forgets_everything() {
        let mut graph = ComputationGraph::new();
        let t = Tensor::from_slice(&[1.0, 2.0]).requires_grad();
        graph.register_tensor(t.clone());
        graph.record(
            TensorId::new(),
            Arc::new(MulScalarBackward { scalar: 2.0 }),
            vec![t.id()],
        );

        graph.clear();
        assert!(graph.is_empty());
        assert!(graph.get_grad(t.id()).is_none());
    }

    #[test]
    fn test_backward_single_op() {
        let mut graph = ComputationGraph::new();

        let input = Tensor::from_slice(&[1.0, 2.0]).requires_grad();
        let input_id = input.id();
        graph.register_tensor(input);

        let output = Tensor::from_slice(&[3.0, 6.0]);
        let output_id = output.id();
        graph.record(
            output_id,
            Arc::new(MulScalarBackward { scalar: 3.0 }),
            vec![input_id],
        );

        graph.backward(output_id, Tensor::from_slice(&[1.0, 1.0]));

        let grad = graph.get_grad(input_id).expect("grad");
        assert_eq!(grad.data(), &[3.0, 3.0]);
    }

    #[test]
    fn test_backward_accumulates_repeated_use() {
        // y = 2x and z = 3x both flow into the seed; grads sum.
        let mut graph = ComputationGraph::new();

        let x = Tensor::from_slice(&[1.0]).requires_grad();
        let x_id = x.id();
        graph.register_tensor(x);

        let seed_id = TensorId::new();
        graph.record(
            seed_id,
            Arc::new(MulScalarBackward { scalar: 2.0 }),
            vec![x_id],
        );
        graph.record(
            seed_id,
            Arc::new(MulScalarBackward { scalar: 3.0 }),
            vec![x_id],
        );

        graph.backward(seed_id, Tensor::from_slice(&[1.0]));

        let grad = graph.get_grad(x_id).expect("grad");
        assert_eq!(grad.data(), &[5.0]);
    }

    #[test]
    fn test_backward_unknown_output_is_noop() {
        let mut graph = ComputationGraph::new();
        graph.backward(TensorId::new(), Tensor::from_slice(&[1.0]));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_no_grad_for_untracked_tensor() {
        let mut graph = ComputationGraph::new();
        let t = Tensor::from_slice(&[1.0]); // no requires_grad
        let id = t.id();
        graph.register_tensor(t);
        graph.backward(id, Tensor::from_slice(&[1.0]));
        assert!(graph.get_grad(id).is_none());
    }
}
