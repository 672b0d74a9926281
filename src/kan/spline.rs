//! Uniform B-spline basis on [-1, 1].
//!
//! The basis underlying each learnable activation: `grid` intervals over
//! [-1, 1] with knots extended `k` deep on both sides, giving `grid + k`
//! basis functions of order `k`. Inputs are saturated into the grid domain
//! so z-scored attributes slightly outside it still land on support.

/// Number of basis functions for a grid/order pair.
pub fn basis_count(grid: usize, k: usize) -> usize {
    grid + k
}

fn knot(j: usize, grid: usize, k: usize) -> f32 {
    let h = 2.0 / grid as f32;
    -1.0 + (j as f32 - k as f32) * h
}

fn saturate(x: f32) -> f32 {
    // Upper end exclusive: degree-0 stencils use half-open intervals.
    x.clamp(-1.0, 1.0 - 1e-6)
}

/// Evaluate all `grid + k` basis functions at `x` by the Cox-de Boor
/// recurrence.
pub fn basis(x: f32, grid: usize, k: usize) -> Vec<f32> {
    basis_and_derivative(x, grid, k).0
}

/// Basis values and their first derivatives at `x`.
pub fn basis_and_derivative(x: f32, grid: usize, k: usize) -> (Vec<f32>, Vec<f32>) {
    let x = saturate(x);
    let n_knots = grid + 2 * k + 1;

    // Degree 0: indicator of the half-open knot interval.
    let mut b: Vec<f32> = (0..n_knots - 1)
        .map(|j| {
            let lo = knot(j, grid, k);
            let hi = knot(j + 1, grid, k);
            if x >= lo && x < hi {
                1.0
            } else {
                0.0
            }
        })
        .collect();

    let mut lower_order: Vec<f32> = b.clone();
    for d in 1..=k {
        lower_order = b.clone();
        let len = n_knots - 1 - d;
        let mut next = vec![0.0f32; len];
        for (j, slot) in next.iter_mut().enumerate() {
            let t_j = knot(j, grid, k);
            let t_jd = knot(j + d, grid, k);
            let t_j1 = knot(j + 1, grid, k);
            let t_jd1 = knot(j + d + 1, grid, k);
            let left = (x - t_j) / (t_jd - t_j) * b[j];
            let right = (t_jd1 - x) / (t_jd1 - t_j1) * b[j + 1];
            *slot = left + right;
        }
        b = next;
    }

    // Derivative from the order-(k-1) basis:
    // B'_{j,k} = k (B_{j,k-1}/(t_{j+k}-t_j) - B_{j+1,k-1}/(t_{j+k+1}-t_{j+1}))
    let deriv: Vec<f32> = if k == 0 {
        vec![0.0; b.len()]
    } else {
        (0..b.len())
            .map(|j| {
                let t_j = knot(j, grid, k);
                let t_jk = knot(j + k, grid, k);
                let t_j1 = knot(j + 1, grid, k);
                let t_jk1 = knot(j + k + 1, grid, k);
                k as f32 * (lower_order[j] / (t_jk - t_j) - lower_order[j + 1] / (t_jk1 - t_j1))
            })
            .collect()
    };

    (b, deriv)
}
