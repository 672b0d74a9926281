//! Gradient-tracked tensor over a 1-D f32 array.

use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

use super::BackwardOp;

/// A 1-D f32 tensor with an optional gradient slot and tape node.
///
/// The gradient lives in a shared cell so that clones of a tensor (stored
/// by downstream operations for their backward pass) accumulate into the
/// same gradient as the original. The data itself is owned: a clone
/// snapshots the values at clone time, which is exactly what a backward
/// pass needs since parameters only change at optimizer steps, after the
/// tape has been consumed.
#[derive(Clone)]
pub struct Tensor {
    data: Array1<f32>,
    requires_grad: bool,
    grad: Rc<RefCell<Option<Array1<f32>>>>,
    backward_op: Option<Rc<dyn BackwardOp>>,
}

impl Tensor {
    /// Create a tensor from an ndarray.
    pub fn new(data: Array1<f32>, requires_grad: bool) -> Self {
        Tensor {
            data,
            requires_grad,
            grad: Rc::new(RefCell::new(None)),
            backward_op: None,
        }
    }

    /// Create a tensor from a Vec.
    pub fn from_vec(data: Vec<f32>, requires_grad: bool) -> Self {
        Self::new(Array1::from(data), requires_grad)
    }

    /// Create a zero-filled tensor.
    pub fn zeros(len: usize, requires_grad: bool) -> Self {
        Self::new(Array1::zeros(len), requires_grad)
    }

    /// Immutable view of the values.
    pub fn data(&self) -> &Array1<f32> {
        &self.data
    }

    /// Mutable view of the values (used by optimizers).
    pub fn data_mut(&mut self) -> &mut Array1<f32> {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Current gradient, if any has been accumulated.
    pub fn grad(&self) -> Option<Array1<f32>> {
        self.grad.borrow().clone()
    }

    /// Shared handle to the gradient slot, stored by backward ops.
    pub fn grad_cell(&self) -> Rc<RefCell<Option<Array1<f32>>>> {
        Rc::clone(&self.grad)
    }

    /// Replace the gradient.
    pub fn set_grad(&self, grad: Array1<f32>) {
        *self.grad.borrow_mut() = Some(grad);
    }

    /// Add into the gradient, initializing it on first use.
    pub fn accumulate_grad(&self, grad: Array1<f32>) {
        let mut slot = self.grad.borrow_mut();
        match slot.as_mut() {
            Some(existing) => *existing += &grad,
            None => *slot = Some(grad),
        }
    }

    /// Clear the gradient.
    pub fn zero_grad(&self) {
        *self.grad.borrow_mut() = None;
    }

    pub fn set_backward_op(&mut self, op: Rc<dyn BackwardOp>) {
        self.backward_op = Some(op);
    }

    pub fn backward_op(&self) -> Option<Rc<dyn BackwardOp>> {
        self.backward_op.clone()
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("data", &self.data)
            .field("requires_grad", &self.requires_grad)
            .field("has_grad", &self.grad.borrow().is_some())
            .finish()
    }
}
