//! AdamW optimizer (Adam with decoupled weight decay).

use super::Optimizer;
use crate::autograd::Tensor;
use ndarray::Array1;

/// AdamW optimizer.
///
/// Weight decay is applied directly to the parameters instead of being
/// folded into the gradient:
///
/// θ_t = (1 - lr * λ) * θ_{t-1} - lr_t * m_t / (√v_t + ε)
///
/// where lr_t carries the usual Adam bias correction.
pub struct AdamW {
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    weight_decay: f32,
    t: u64,
    m: Vec<Option<Array1<f32>>>,
    v: Vec<Option<Array1<f32>>>,
}

impl AdamW {
    /// Create a new AdamW optimizer.
    pub fn new(lr: f32, beta1: f32, beta2: f32, epsilon: f32, weight_decay: f32) -> Self {
        Self { lr, beta1, beta2, epsilon, weight_decay, t: 0, m: Vec::new(), v: Vec::new() }
    }

    /// Create AdamW with the usual defaults (β1=0.9, β2=0.999, λ=0.01).
    pub fn default_params(lr: f32) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-8, 0.01)
    }

    fn ensure_moments(&mut self, count: usize) {
        if self.m.len() < count {
            self.m.resize(count, None);
            self.v.resize(count, None);
        }
    }

    fn bias_corrected_lr(&self) -> f32 {
        self.lr
            * ((1.0 - self.beta2.powi(self.t as i32)).sqrt()
                / (1.0 - self.beta1.powi(self.t as i32)))
    }

    fn update_param(&mut self, i: usize, param: &mut Tensor, lr_t: f32) {
        let Some(grad) = param.grad() else {
            return;
        };

        // m_t = β1 * m_{t-1} + (1 - β1) * g
        let m_t = match &self.m[i] {
            Some(m) => m * self.beta1 + &grad * (1.0 - self.beta1),
            None => &grad * (1.0 - self.beta1),
        };

        // v_t = β2 * v_{t-1} + (1 - β2) * g²
        let grad_sq = &grad * &grad;
        let v_t = match &self.v[i] {
            Some(v) => v * self.beta2 + &grad_sq * (1.0 - self.beta2),
            None => &grad_sq * (1.0 - self.beta2),
        };

        let adaptive = &m_t / &(v_t.mapv(f32::sqrt) + self.epsilon) * lr_t;
        let decay_factor = 1.0 - self.lr * self.weight_decay;
        *param.data_mut() = param.data() * decay_factor - &adaptive;

        self.m[i] = Some(m_t);
        self.v[i] = Some(v_t);
    }

    // Checkpoint state accessors.

    /// Optimizer step counter.
    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.t
    }

    /// Restore the step counter from a checkpoint.
    pub fn set_step_count(&mut self, t: u64) {
        self.t = t;
    }

    /// First moment buffers.
    #[must_use]
    pub fn first_moments(&self) -> &[Option<Array1<f32>>] {
        &self.m
    }

    /// Second moment buffers.
    #[must_use]
    pub fn second_moments(&self) -> &[Option<Array1<f32>>] {
        &self.v
    }

    /// Restore the first moment buffer at a parameter index.
    pub fn set_first_moment(&mut self, idx: usize, data: Array1<f32>) {
        self.ensure_moments(idx + 1);
        self.m[idx] = Some(data);
    }

    /// Restore the second moment buffer at a parameter index.
    pub fn set_second_moment(&mut self, idx: usize, data: Array1<f32>) {
        self.ensure_moments(idx + 1);
        self.v[idx] = Some(data);
    }
}

impl Optimizer for AdamW {
    fn step(&mut self, params: &mut [Tensor]) {
        self.ensure_moments(params.len());
        self.t += 1;
        let lr_t = self.bias_corrected_lr();

        for (i, param) in params.iter_mut().enumerate() {
            self.update_param(i, param, lr_t);
        }
    }

    fn step_refs(&mut self, params: &mut [&mut Tensor]) {
        self.ensure_moments(params.len());
        self.t += 1;
        let lr_t = self.bias_corrected_lr();

        for (i, param) in params.iter_mut().enumerate() {
            self.update_param(i, param, lr_t);
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;

    #[test]
    fn test_quadratic_convergence() {
        // f(x) = x², gradient 2x
        let mut params = vec![Tensor::from_vec(vec![5.0, -3.0, 2.0], true)];
        let mut optimizer = AdamW::default_params(0.1);

        for _ in 0..100 {
            let grad = params[0].data().mapv(|x| 2.0 * x);
            params[0].set_grad(grad);
            optimizer.step(&mut params);
        }

        for &value in params[0].data() {
            assert!(value.abs() < 0.5, "value {value} did not converge");
        }
    }

    #[test]
    fn test_zero_gradient_applies_only_weight_decay() {
        let mut params = vec![Tensor::from_vec(vec![1.0], true)];
        let mut optimizer = AdamW::new(0.1, 0.9, 0.999, 1e-8, 0.1);

        params[0].set_grad(arr1(&[0.0]));
        optimizer.step(&mut params);

        // θ_t = (1 - 0.1 * 0.1) * 1.0
        assert_abs_diff_eq!(params[0].data()[0], 0.99, epsilon = 1e-6);
    }

    #[test]
    fn test_no_grad_leaves_param_unchanged() {
        let mut params = vec![Tensor::from_vec(vec![1.0, 2.0], true)];
        let mut optimizer = AdamW::default_params(0.1);

        optimizer.step(&mut params);

        assert_eq!(params[0].data().to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_step_refs_matches_step() {
        let mut owned = vec![Tensor::from_vec(vec![2.0, -2.0], true)];
        let mut borrowed = Tensor::from_vec(vec![2.0, -2.0], true);
        let mut opt_a = AdamW::default_params(0.05);
        let mut opt_b = AdamW::default_params(0.05);

        for _ in 0..5 {
            owned[0].set_grad(arr1(&[1.0, -1.0]));
            borrowed.set_grad(arr1(&[1.0, -1.0]));
            opt_a.step(&mut owned);
            opt_b.step_refs(&mut [&mut borrowed]);
        }

        for (a, b) in owned[0].data().iter().zip(borrowed.data().iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_moment_accessors_round_trip() {
        let mut params = vec![Tensor::from_vec(vec![1.0, 2.0], true)];
        let mut optimizer = AdamW::default_params(0.1);
        params[0].set_grad(arr1(&[0.5, 0.5]));
        optimizer.step(&mut params);

        assert_eq!(optimizer.step_count(), 1);
        let m = optimizer.first_moments()[0].clone().unwrap();
        let v = optimizer.second_moments()[0].clone().unwrap();

        let mut restored = AdamW::default_params(0.1);
        restored.set_step_count(1);
        restored.set_first_moment(0, m.clone());
        restored.set_second_moment(0, v.clone());

        assert_eq!(restored.step_count(), 1);
        assert_eq!(restored.first_moments()[0].as_ref().unwrap(), &m);
        assert_eq!(restored.second_moments()[0].as_ref().unwrap(), &v);
    }

    #[test]
    fn test_second_moment_stays_non_negative() {
        let mut params = vec![Tensor::from_vec(vec![5.0, -3.0, 2.0, -1.0], true)];
        let mut optimizer = AdamW::default_params(0.01);

        for step in 0..50 {
            let grad = params[0].data().mapv(|x| ((x + step as f32) * 0.37).sin() * 5.0);
            params[0].set_grad(grad);
            optimizer.step(&mut params);
        }

        for v in optimizer.second_moments().iter().flatten() {
            for &value in v {
                assert!(value >= 0.0);
            }
        }
    }

    #[test]
    fn test_update_stays_finite_with_extreme_values() {
        let mut params = vec![Tensor::from_vec(vec![1e6, -1e6, 1e-6, -1e-6], true)];
        let mut optimizer = AdamW::default_params(0.001);

        let grad = params[0].data().mapv(|x| 2.0 * x);
        params[0].set_grad(grad);
        optimizer.step(&mut params);

        for &value in params[0].data() {
            assert!(value.is_finite());
        }
    }
}
