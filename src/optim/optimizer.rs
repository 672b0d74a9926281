//! Optimizer trait.

use crate::autograd::Tensor;

/// Trait for gradient-based parameter updates.
pub trait Optimizer {
    /// Perform a single optimization step on owned parameters.
    fn step(&mut self, params: &mut [Tensor]);

    /// Perform a step on parameters borrowed from a model.
    fn step_refs(&mut self, params: &mut [&mut Tensor]);

    /// Zero out all gradients.
    fn zero_grad(&mut self, params: &mut [Tensor]) {
        for param in params {
            param.zero_grad();
        }
    }

    /// Zero gradients on borrowed parameters.
    fn zero_grad_refs(&mut self, params: &mut [&mut Tensor]) {
        for param in params.iter_mut() {
            param.zero_grad();
        }
    }

    /// Get the learning rate.
    fn lr(&self) -> f32;

    /// Set the learning rate.
    fn set_lr(&mut self, lr: f32);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    /// Plain gradient descent, used to exercise the default trait methods.
    struct Descent {
        learning_rate: f32,
    }

    impl Optimizer for Descent {
        fn step(&mut self, params: &mut [Tensor]) {
            for param in params {
                if let Some(grad) = param.grad() {
                    *param.data_mut() = param.data() - &(grad * self.learning_rate);
                }
            }
        }

        fn step_refs(&mut self, params: &mut [&mut Tensor]) {
            for param in params.iter_mut() {
                if let Some(grad) = param.grad() {
                    *param.data_mut() = param.data() - &(grad * self.learning_rate);
                }
            }
        }

        fn lr(&self) -> f32 {
            self.learning_rate
        }

        fn set_lr(&mut self, lr: f32) {
            self.learning_rate = lr;
        }
    }

    #[test]
    fn test_step_refs_applies_update() {
        let mut opt = Descent { learning_rate: 0.1 };
        let mut param = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);
        param.set_grad(arr1(&[0.5, 1.0, 1.5]));

        opt.step_refs(&mut [&mut param]);

        let expected = [0.95, 1.9, 2.85];
        for (value, want) in param.data().iter().zip(expected) {
            assert!((value - want).abs() < 1e-6);
        }
    }

    #[test]
    fn test_step_skips_params_without_grad() {
        let mut opt = Descent { learning_rate: 0.1 };
        let mut params = vec![Tensor::from_vec(vec![1.0, 2.0], true)];

        opt.step(&mut params);

        assert_eq!(params[0].data().to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_zero_grad_refs_clears_gradients() {
        let mut opt = Descent { learning_rate: 0.1 };
        let mut param = Tensor::from_vec(vec![1.0], true);
        param.set_grad(arr1(&[2.0]));

        opt.zero_grad_refs(&mut [&mut param]);

        assert!(param.grad().is_none());
    }

    #[test]
    fn test_set_lr() {
        let mut opt = Descent { learning_rate: 0.1 };
        opt.set_lr(0.01);
        assert_eq!(opt.lr(), 0.01);
    }
}
