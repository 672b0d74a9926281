//! Training objective: masked discharge RMSE plus parameter regularization.

use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

use crate::autograd::{add, add_scalar, concat, mean, mul, scale, BackwardOp, Tensor};

/// A scalar loss over a prediction/target pair, wired into the tape.
pub trait LossFn {
    /// Compute the loss as a length-1 tensor.
    fn forward(&self, prediction: &Tensor, target: &Tensor) -> Tensor;

    /// Loss name for logging.
    fn name(&self) -> &str;
}

/// Root-mean-square error over the gauge discharge.
///
/// Days without an observation carry NaN in the target and are excluded
/// from both the value and the gradient. An all-NaN window yields a zero
/// loss with a zero gradient, so the optimizer step is a no-op.
pub struct RmseLoss;

impl LossFn for RmseLoss {
    fn forward(&self, prediction: &Tensor, target: &Tensor) -> Tensor {
        let pred = prediction.data();
        let obs = target.data();

        let mut observed = 0usize;
        let mut sum_sq = 0.0f64;
        for (p, t) in pred.iter().zip(obs.iter()) {
            if !t.is_nan() {
                let diff = f64::from(p - t);
                sum_sq += diff * diff;
                observed += 1;
            }
        }
        let value = if observed == 0 {
            0.0
        } else {
            (sum_sq / observed as f64).sqrt() as f32
        };

        let mut result = Tensor::from_vec(vec![value], prediction.requires_grad());
        if prediction.requires_grad() {
            // d rmse / d p_i = (p_i - t_i) / (m * rmse) on observed steps;
            // zero at the minimum where the quotient is undefined.
            let mut grad = Array1::zeros(pred.len());
            if observed > 0 && value > 0.0 {
                let denom = observed as f32 * value;
                for (i, (p, t)) in pred.iter().zip(obs.iter()).enumerate() {
                    if !t.is_nan() {
                        grad[i] = (p - t) / denom;
                    }
                }
            }
            let op = Rc::new(RmseBackward {
                prediction: prediction.clone(),
                grad,
                result_grad: result.grad_cell(),
            });
            result.set_backward_op(op);
        }
        result
    }

    fn name(&self) -> &str {
        "rmse"
    }
}

struct RmseBackward {
    prediction: Tensor,
    grad: Array1<f32>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for RmseBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            self.prediction.accumulate_grad(&self.grad * grad[0]);
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        self.prediction.backward_op().into_iter().collect()
    }
}

/// Mean squared deviation of the normalized spatial parameters from the
/// midpoint of their range. Keeps the network out of the sigmoid's
/// saturated tails early in training.
pub fn midpoint_penalty(normalized: &[Tensor]) -> Tensor {
    let stacked = concat(normalized);
    let deviation = add_scalar(&stacked, -0.5);
    mean(&mul(&deviation, &deviation))
}

/// Discharge loss plus `alpha` times the midpoint penalty.
pub struct CompositeLoss {
    discharge: Box<dyn LossFn>,
    alpha: f32,
}

impl CompositeLoss {
    pub fn new(discharge: Box<dyn LossFn>, alpha: f32) -> Self {
        Self { discharge, alpha }
    }

    /// Total loss for one mini-batch. `normalized` holds the network
    /// outputs in [0, 1], one tensor per learnable parameter.
    pub fn forward(&self, prediction: &Tensor, target: &Tensor, normalized: &[Tensor]) -> Tensor {
        let data_term = self.discharge.forward(prediction, target);
        if self.alpha == 0.0 || normalized.is_empty() {
            return data_term;
        }
        add(&data_term, &scale(&midpoint_penalty(normalized), self.alpha))
    }

    pub fn name(&self) -> &str {
        self.discharge.name()
    }
}
