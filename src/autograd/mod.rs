//! Tape-based autograd engine.
//!
//! Operations build a computational graph as they run; [`backward`] walks it
//! in reverse dependency order. The routing graph is a DAG rather than a
//! chain (the discharge state and the spatial parameters feed every
//! timestep), so the walk counts consumers per node and fires each backward
//! op exactly once, after all ops consuming its result have fired.

mod backward;
mod ops;
mod tensor;

pub use backward::BackwardOp;
pub use ops::*;
pub use tensor::Tensor;

use std::collections::HashMap;
use std::rc::Rc;

/// Perform backward pass on a tensor.
pub fn backward(tensor: &mut Tensor, grad_output: Option<ndarray::Array1<f32>>) {
    if let Some(grad) = grad_output {
        tensor.set_grad(grad);
    } else {
        // Initialize with ones for scalar loss
        let ones = ndarray::Array1::ones(tensor.data().len());
        tensor.set_grad(ones);
    }

    let root = match tensor.backward_op() {
        Some(op) => op,
        None => return,
    };

    // Count, per op, how many ops in the reachable graph consume its result.
    let mut pending: HashMap<usize, usize> = HashMap::new();
    let mut stack = vec![Rc::clone(&root)];
    let mut seen: HashMap<usize, ()> = HashMap::new();
    seen.insert(op_key(&root), ());
    while let Some(op) = stack.pop() {
        for parent in op.parents() {
            let key = op_key(&parent);
            *pending.entry(key).or_insert(0) += 1;
            if seen.insert(key, ()).is_none() {
                stack.push(parent);
            }
        }
    }

    // Fire an op once every consumer has contributed its gradient.
    let mut ready = vec![root];
    while let Some(op) = ready.pop() {
        op.backward();
        for parent in op.parents() {
            let key = op_key(&parent);
            if let Some(count) = pending.get_mut(&key) {
                *count -= 1;
                if *count == 0 {
                    ready.push(parent);
                }
            }
        }
    }
}

fn op_key(op: &Rc<dyn BackwardOp>) -> usize {
    Rc::as_ptr(op) as *const () as usize
}
