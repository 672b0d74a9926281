//! Basic autograd operations: add, sub, mul, div, scale, add_scalar, sum, mean

use crate::autograd::{BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

fn parents_of(tensors: &[&Tensor]) -> Vec<Rc<dyn BackwardOp>> {
    tensors.iter().filter_map(|t| t.backward_op()).collect()
}

/// Add two tensors
pub fn add(a: &Tensor, b: &Tensor) -> Tensor {
    let data = a.data() + b.data();
    let requires_grad = a.requires_grad() || b.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(AddBackward {
            a: a.clone(),
            b: b.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct AddBackward {
    a: Tensor,
    b: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for AddBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad.clone());
            }
            if self.b.requires_grad() {
                self.b.accumulate_grad(grad.clone());
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        parents_of(&[&self.a, &self.b])
    }
}

/// Subtract two tensors element-wise
pub fn sub(a: &Tensor, b: &Tensor) -> Tensor {
    let data = a.data() - b.data();
    let requires_grad = a.requires_grad() || b.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(SubBackward {
            a: a.clone(),
            b: b.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct SubBackward {
    a: Tensor,
    b: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for SubBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad.clone());
            }
            if self.b.requires_grad() {
                self.b.accumulate_grad(grad.mapv(|g| -g));
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        parents_of(&[&self.a, &self.b])
    }
}

/// Multiply two tensors element-wise
pub fn mul(a: &Tensor, b: &Tensor) -> Tensor {
    let data = a.data() * b.data();
    let requires_grad = a.requires_grad() || b.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(MulBackward {
            a: a.clone(),
            b: b.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct MulBackward {
    a: Tensor,
    b: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for MulBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂a = ∂L/∂out * b
                let grad_a = grad * self.b.data();
                self.a.accumulate_grad(grad_a);
            }
            if self.b.requires_grad() {
                // ∂L/∂b = ∂L/∂out * a
                let grad_b = grad * self.a.data();
                self.b.accumulate_grad(grad_b);
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        parents_of(&[&self.a, &self.b])
    }
}

/// Divide two tensors element-wise
pub fn div(a: &Tensor, b: &Tensor) -> Tensor {
    let data = a.data() / b.data();
    let requires_grad = a.requires_grad() || b.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(DivBackward {
            a: a.clone(),
            b: b.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct DivBackward {
    a: Tensor,
    b: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for DivBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂a = ∂L/∂out / b
                let grad_a = grad / self.b.data();
                self.a.accumulate_grad(grad_a);
            }
            if self.b.requires_grad() {
                // ∂L/∂b = -∂L/∂out * a / b²
                let b_sq = self.b.data() * self.b.data();
                let grad_b = -(grad * self.a.data()) / &b_sq;
                self.b.accumulate_grad(grad_b);
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        parents_of(&[&self.a, &self.b])
    }
}

/// Multiply a tensor by a scalar
pub fn scale(a: &Tensor, factor: f32) -> Tensor {
    let data = a.data() * factor;
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(ScaleBackward {
            a: a.clone(),
            factor,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct ScaleBackward {
    a: Tensor,
    factor: f32,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for ScaleBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad * self.factor);
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        parents_of(&[&self.a])
    }
}

/// Add a scalar to every element
pub fn add_scalar(a: &Tensor, value: f32) -> Tensor {
    let data = a.data() + value;
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(AddScalarBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct AddScalarBackward {
    a: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for AddScalarBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad.clone());
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        parents_of(&[&self.a])
    }
}

/// Sum all elements into a length-1 tensor
pub fn sum(a: &Tensor) -> Tensor {
    let total = a.data().sum();
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(Array1::from(vec![total]), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(SumBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct SumBackward {
    a: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for SumBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                let grad_a = Array1::from_elem(self.a.len(), grad[0]);
                self.a.accumulate_grad(grad_a);
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        parents_of(&[&self.a])
    }
}

/// Mean of all elements as a length-1 tensor
pub fn mean(a: &Tensor) -> Tensor {
    let n = a.len().max(1) as f32;
    let avg = a.data().sum() / n;
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(Array1::from(vec![avg]), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(MeanBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct MeanBackward {
    a: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for MeanBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                let n = self.a.len().max(1) as f32;
                let grad_a = Array1::from_elem(self.a.len(), grad[0] / n);
                self.a.accumulate_grad(grad_a);
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        parents_of(&[&self.a])
    }
}
