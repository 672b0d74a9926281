//! Element-wise autograd operations: powf, ln, clamp, sigmoid, silu

use crate::autograd::{BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

fn parents_of(tensors: &[&Tensor]) -> Vec<Rc<dyn BackwardOp>> {
    tensors.iter().filter_map(|t| t.backward_op()).collect()
}

/// Element-wise power with a constant exponent
pub fn powf(a: &Tensor, exponent: f32) -> Tensor {
    let data = a.data().mapv(|x| x.powf(exponent));
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(PowfBackward {
            a: a.clone(),
            exponent,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct PowfBackward {
    a: Tensor,
    exponent: f32,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for PowfBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂a = ∂L/∂out * p * a^(p-1)
                let p = self.exponent;
                let grad_a = grad * &self.a.data().mapv(|x| p * x.powf(p - 1.0));
                self.a.accumulate_grad(grad_a);
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        parents_of(&[&self.a])
    }
}

/// Natural logarithm
pub fn ln(a: &Tensor) -> Tensor {
    let data = a.data().mapv(f32::ln);
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(LnBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct LnBackward {
    a: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for LnBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂a = ∂L/∂out / a
                let grad_a = grad / self.a.data();
                self.a.accumulate_grad(grad_a);
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        parents_of(&[&self.a])
    }
}

/// Clamp values to [min, max]. Use `f32::INFINITY` for a one-sided clamp.
///
/// Gradient passes through where the input lies inside the bounds and is
/// zero where the value was clamped, matching the saturating convention of
/// the routing formulation.
pub fn clamp(a: &Tensor, min: f32, max: f32) -> Tensor {
    let data = a.data().mapv(|x| x.clamp(min, max));
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(ClampBackward {
            a: a.clone(),
            min,
            max,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct ClampBackward {
    a: Tensor,
    min: f32,
    max: f32,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for ClampBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                let mask = self
                    .a
                    .data()
                    .mapv(|x| if x >= self.min && x <= self.max { 1.0 } else { 0.0 });
                self.a.accumulate_grad(grad * &mask);
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        parents_of(&[&self.a])
    }
}

/// Sigmoid activation
pub fn sigmoid(a: &Tensor) -> Tensor {
    let data = a.data().mapv(sigmoid_scalar);
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(SigmoidBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

pub(crate) fn sigmoid_scalar(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

struct SigmoidBackward {
    a: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for SigmoidBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂σ/∂x = σ(x)(1 - σ(x))
                let grad_a = grad
                    * &self.a.data().mapv(|x| {
                        let s = sigmoid_scalar(x);
                        s * (1.0 - s)
                    });
                self.a.accumulate_grad(grad_a);
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        parents_of(&[&self.a])
    }
}

/// SiLU activation: x * sigmoid(x)
pub fn silu(a: &Tensor) -> Tensor {
    let data = a.data().mapv(|x| x * sigmoid_scalar(x));
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(SiluBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct SiluBackward {
    a: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for SiluBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂(x·σ(x))/∂x = σ(x)(1 + x(1 - σ(x)))
                let grad_a = grad
                    * &self.a.data().mapv(|x| {
                        let s = sigmoid_scalar(x);
                        s * (1.0 + x * (1.0 - s))
                    });
                self.a.accumulate_grad(grad_a);
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        parents_of(&[&self.a])
    }
}
