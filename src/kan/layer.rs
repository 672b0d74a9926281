//! A layer of learnable spline activations.
//!
//! Each input/output edge carries its own activation: a spline over the
//! shared basis plus a silu base branch, summed into the output unit. The
//! whole layer is one tape node; the backward pass replays the saved basis
//! evaluations instead of re-walking per-edge ops.

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::Rng;
use std::cell::RefCell;
use std::rc::Rc;

use crate::autograd::{BackwardOp, Tensor};

use super::spline::{basis_and_derivative, basis_count};

fn silu_scalar(x: f32) -> f32 {
    x / (1.0 + (-x).exp())
}

fn silu_slope(x: f32) -> f32 {
    let s = 1.0 / (1.0 + (-x).exp());
    s * (1.0 + x * (1.0 - s))
}

/// One spline layer mapping `in_dim` features to `out_dim` units.
///
/// Coefficients are laid out `[(input * n_basis + basis) * out_dim + output]`
/// and base weights `[input * out_dim + output]`; inputs and outputs are
/// row-major over samples.
#[derive(Debug)]
pub struct SplineLayer {
    in_dim: usize,
    out_dim: usize,
    grid: usize,
    k: usize,
    coefficients: Tensor,
    base_weight: Tensor,
}

impl SplineLayer {
    pub fn new(in_dim: usize, out_dim: usize, grid: usize, k: usize, rng: &mut StdRng) -> Self {
        let n_basis = basis_count(grid, k);
        let coef_scale = 0.1 / (in_dim as f32).sqrt();
        let base_scale = 1.0 / (in_dim as f32).sqrt();
        let coefficients = Tensor::from_vec(
            (0..in_dim * n_basis * out_dim)
                .map(|_| rng.gen_range(-coef_scale..coef_scale))
                .collect(),
            true,
        );
        let base_weight = Tensor::from_vec(
            (0..in_dim * out_dim)
                .map(|_| rng.gen_range(-base_scale..base_scale))
                .collect(),
            true,
        );
        SplineLayer {
            in_dim,
            out_dim,
            grid,
            k,
            coefficients,
            base_weight,
        }
    }

    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    pub fn coefficients(&self) -> &Tensor {
        &self.coefficients
    }

    pub fn coefficients_mut(&mut self) -> &mut Tensor {
        &mut self.coefficients
    }

    pub fn base_weight(&self) -> &Tensor {
        &self.base_weight
    }

    pub fn base_weight_mut(&mut self) -> &mut Tensor {
        &mut self.base_weight
    }

    pub(crate) fn tensors_mut(&mut self) -> (&mut Tensor, &mut Tensor) {
        (&mut self.coefficients, &mut self.base_weight)
    }

    /// Forward over a batch, `input` holding `samples * in_dim` values
    /// row-major. Returns `samples * out_dim` values row-major.
    pub fn forward(&self, input: &Tensor, samples: usize) -> Tensor {
        let n_basis = basis_count(self.grid, self.k);
        debug_assert_eq!(input.len(), samples * self.in_dim);

        let x = input.data();
        let coef = self.coefficients.data();
        let base_w = self.base_weight.data();

        let rows = samples * self.in_dim;
        let mut bases = Array2::<f32>::zeros((rows, n_basis));
        let mut bases_slope = Array2::<f32>::zeros((rows, n_basis));
        let mut base_act = Array1::<f32>::zeros(rows);
        let mut base_slope = Array1::<f32>::zeros(rows);

        let mut out = Array1::<f32>::zeros(samples * self.out_dim);
        for s in 0..samples {
            for i in 0..self.in_dim {
                let row = s * self.in_dim + i;
                let xi = x[row];
                let (b, db) = basis_and_derivative(xi, self.grid, self.k);
                base_act[row] = silu_scalar(xi);
                base_slope[row] = silu_slope(xi);
                for o in 0..self.out_dim {
                    let mut act = base_w[i * self.out_dim + o] * base_act[row];
                    for (bi, &bv) in b.iter().enumerate() {
                        act += coef[(i * n_basis + bi) * self.out_dim + o] * bv;
                    }
                    out[s * self.out_dim + o] += act;
                }
                for bi in 0..n_basis {
                    bases[[row, bi]] = b[bi];
                    bases_slope[[row, bi]] = db[bi];
                }
            }
        }

        let requires_grad = input.requires_grad()
            || self.coefficients.requires_grad()
            || self.base_weight.requires_grad();
        let mut result = Tensor::new(out, requires_grad);
        if requires_grad {
            let op = Rc::new(SplineLayerBackward {
                input: input.clone(),
                coefficients: self.coefficients.clone(),
                base_weight: self.base_weight.clone(),
                bases,
                bases_slope,
                base_act,
                base_slope,
                samples,
                in_dim: self.in_dim,
                out_dim: self.out_dim,
                n_basis,
                result_grad: result.grad_cell(),
            });
            result.set_backward_op(op);
        }
        result
    }
}

struct SplineLayerBackward {
    input: Tensor,
    coefficients: Tensor,
    base_weight: Tensor,
    bases: Array2<f32>,
    bases_slope: Array2<f32>,
    base_act: Array1<f32>,
    base_slope: Array1<f32>,
    samples: usize,
    in_dim: usize,
    out_dim: usize,
    n_basis: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for SplineLayerBackward {
    fn backward(&self) {
        let grad = self.result_grad.borrow();
        if let Some(grad) = grad.as_ref() {
            if self.coefficients.requires_grad() {
                let mut g = Array1::<f32>::zeros(self.coefficients.len());
                for s in 0..self.samples {
                    for i in 0..self.in_dim {
                        let row = s * self.in_dim + i;
                        for bi in 0..self.n_basis {
                            let bv = self.bases[[row, bi]];
                            if bv == 0.0 {
                                continue;
                            }
                            for o in 0..self.out_dim {
                                g[(i * self.n_basis + bi) * self.out_dim + o] +=
                                    bv * grad[s * self.out_dim + o];
                            }
                        }
                    }
                }
                self.coefficients.accumulate_grad(g);
            }
            if self.base_weight.requires_grad() {
                let mut g = Array1::<f32>::zeros(self.base_weight.len());
                for s in 0..self.samples {
                    for i in 0..self.in_dim {
                        let row = s * self.in_dim + i;
                        for o in 0..self.out_dim {
                            g[i * self.out_dim + o] +=
                                self.base_act[row] * grad[s * self.out_dim + o];
                        }
                    }
                }
                self.base_weight.accumulate_grad(g);
            }
            if self.input.requires_grad() {
                let coef = self.coefficients.data();
                let base_w = self.base_weight.data();
                let mut g = Array1::<f32>::zeros(self.input.len());
                for s in 0..self.samples {
                    for i in 0..self.in_dim {
                        let row = s * self.in_dim + i;
                        let mut acc = 0.0f32;
                        for o in 0..self.out_dim {
                            let mut slope = base_w[i * self.out_dim + o] * self.base_slope[row];
                            for bi in 0..self.n_basis {
                                slope += coef[(i * self.n_basis + bi) * self.out_dim + o]
                                    * self.bases_slope[[row, bi]];
                            }
                            acc += slope * grad[s * self.out_dim + o];
                        }
                        g[row] = acc;
                    }
                }
                self.input.accumulate_grad(g);
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        [&self.input, &self.coefficients, &self.base_weight]
            .iter()
            .filter_map(|t| t.backward_op())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{backward, sum};
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;

    fn loss_of(layer: &SplineLayer, input: &Tensor, samples: usize) -> f32 {
        layer.forward(input, samples).data().sum()
    }

    #[test]
    fn test_forward_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let layer = SplineLayer::new(2, 3, 5, 3, &mut rng);
        let input = Tensor::from_vec(vec![0.1, -0.4, 0.8, 0.3, -0.9, 0.0, 0.5, 0.7], false);
        let out = layer.forward(&input, 4);
        assert_eq!(out.len(), 12);
    }

    #[test]
    fn test_same_seed_same_init() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        let la = SplineLayer::new(3, 2, 5, 3, &mut a);
        let lb = SplineLayer::new(3, 2, 5, 3, &mut b);
        assert_eq!(la.coefficients().data(), lb.coefficients().data());
        assert_eq!(la.base_weight().data(), lb.base_weight().data());
    }

    #[test]
    fn test_coefficient_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut layer = SplineLayer::new(2, 2, 4, 2, &mut rng);
        let input = Tensor::from_vec(vec![0.3, -0.2, 0.7, 0.1], false);

        let mut loss = sum(&layer.forward(&input, 2));
        backward(&mut loss, None);
        let analytic = layer.coefficients().grad().unwrap();

        let eps = 1e-3f32;
        for &idx in &[0usize, 5, 11] {
            let base = layer.coefficients().data()[idx];
            layer.coefficients_mut().data_mut()[idx] = base + eps;
            let plus = loss_of(&layer, &input, 2);
            layer.coefficients_mut().data_mut()[idx] = base - eps;
            let minus = loss_of(&layer, &input, 2);
            layer.coefficients_mut().data_mut()[idx] = base;
            let numeric = (plus - minus) / (2.0 * eps);
            assert_abs_diff_eq!(analytic[idx], numeric, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_base_weight_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut layer = SplineLayer::new(2, 2, 4, 2, &mut rng);
        let input = Tensor::from_vec(vec![0.3, -0.2, 0.7, 0.1], false);

        let mut loss = sum(&layer.forward(&input, 2));
        backward(&mut loss, None);
        let analytic = layer.base_weight().grad().unwrap();

        let eps = 1e-3f32;
        for idx in 0..layer.base_weight().len() {
            let base = layer.base_weight().data()[idx];
            layer.base_weight_mut().data_mut()[idx] = base + eps;
            let plus = loss_of(&layer, &input, 2);
            layer.base_weight_mut().data_mut()[idx] = base - eps;
            let minus = loss_of(&layer, &input, 2);
            layer.base_weight_mut().data_mut()[idx] = base;
            let numeric = (plus - minus) / (2.0 * eps);
            assert_abs_diff_eq!(analytic[idx], numeric, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_input_gradient_flows_through_stacked_layers() {
        let mut rng = StdRng::seed_from_u64(11);
        let first = SplineLayer::new(2, 3, 4, 2, &mut rng);
        let second = SplineLayer::new(3, 1, 4, 2, &mut rng);
        let input = Tensor::from_vec(vec![0.2, -0.5], true);

        let hidden = first.forward(&input, 1);
        let mut loss = sum(&second.forward(&hidden, 1));
        backward(&mut loss, None);

        let grad = input.grad().unwrap();
        assert_eq!(grad.len(), 2);
        assert!(grad.iter().all(|g| g.is_finite()));
        // Both layers' parameters also received gradients.
        assert!(first.coefficients().grad().is_some());
        assert!(second.base_weight().grad().is_some());
    }
}
