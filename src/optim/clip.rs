//! Gradient clipping.

use crate::autograd::Tensor;

/// Clip gradients by global norm.
///
/// Computes the norm over all gradients together and scales every gradient
/// by `max_norm / norm` when the norm exceeds `max_norm`, preserving the
/// relative magnitudes across parameters.
///
/// Returns the global norm before clipping.
pub fn clip_grad_norm(params: &mut [Tensor], max_norm: f32) -> f32 {
    let mut total_norm_sq = 0.0;
    for param in params.iter() {
        if let Some(grad) = param.grad() {
            total_norm_sq += grad.iter().map(|&g| g * g).sum::<f32>();
        }
    }
    let global_norm = total_norm_sq.sqrt();

    if global_norm > max_norm {
        let clip_coef = max_norm / global_norm;
        for param in params.iter_mut() {
            if let Some(grad) = param.grad() {
                param.set_grad(grad * clip_coef);
            }
        }
    }

    global_norm
}

/// Clip gradients by global norm on borrowed parameter references.
pub fn clip_grad_norm_refs(params: &mut [&mut Tensor], max_norm: f32) -> f32 {
    let mut total_norm_sq = 0.0;
    for param in params.iter() {
        if let Some(grad) = param.grad() {
            total_norm_sq += grad.iter().map(|&g| g * g).sum::<f32>();
        }
    }
    let global_norm = total_norm_sq.sqrt();

    if global_norm > max_norm {
        let clip_coef = max_norm / global_norm;
        for param in params.iter_mut() {
            if let Some(grad) = param.grad() {
                param.set_grad(grad * clip_coef);
            }
        }
    }

    global_norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;

    #[test]
    fn test_norm_below_threshold_is_untouched() {
        let mut params = vec![Tensor::from_vec(vec![0.0, 0.0], true)];
        params[0].set_grad(arr1(&[0.3, 0.4]));

        let norm = clip_grad_norm(&mut params, 1.0);

        assert_abs_diff_eq!(norm, 0.5, epsilon = 1e-6);
        let grad = params[0].grad().unwrap();
        assert_abs_diff_eq!(grad[0], 0.3, epsilon = 1e-6);
        assert_abs_diff_eq!(grad[1], 0.4, epsilon = 1e-6);
    }

    #[test]
    fn test_norm_above_threshold_is_scaled() {
        let mut params = vec![Tensor::from_vec(vec![0.0, 0.0], true)];
        params[0].set_grad(arr1(&[3.0, 4.0]));

        let norm = clip_grad_norm(&mut params, 1.0);

        assert_abs_diff_eq!(norm, 5.0, epsilon = 1e-6);
        let grad = params[0].grad().unwrap();
        let clipped_norm = (grad[0] * grad[0] + grad[1] * grad[1]).sqrt();
        assert_abs_diff_eq!(clipped_norm, 1.0, epsilon = 1e-6);
        // Direction preserved
        assert_abs_diff_eq!(grad[0] / grad[1], 0.75, epsilon = 1e-6);
    }

    #[test]
    fn test_global_norm_spans_parameters() {
        let mut params = vec![
            Tensor::from_vec(vec![0.0], true),
            Tensor::from_vec(vec![0.0], true),
        ];
        params[0].set_grad(arr1(&[3.0]));
        params[1].set_grad(arr1(&[4.0]));

        let norm = clip_grad_norm(&mut params, 1.0);

        assert_abs_diff_eq!(norm, 5.0, epsilon = 1e-6);
        assert_abs_diff_eq!(params[0].grad().unwrap()[0], 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(params[1].grad().unwrap()[0], 0.8, epsilon = 1e-6);
    }

    #[test]
    fn test_refs_variant_matches() {
        let mut a = Tensor::from_vec(vec![0.0], true);
        let mut b = Tensor::from_vec(vec![0.0], true);
        a.set_grad(arr1(&[6.0]));
        b.set_grad(arr1(&[8.0]));

        let norm = clip_grad_norm_refs(&mut [&mut a, &mut b], 2.0);

        assert_abs_diff_eq!(norm, 10.0, epsilon = 1e-6);
        assert_abs_diff_eq!(a.grad().unwrap()[0], 1.2, epsilon = 1e-6);
        assert_abs_diff_eq!(b.grad().unwrap()[0], 1.6, epsilon = 1e-6);
    }
}
