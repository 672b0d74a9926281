//! Differentiable Muskingum-Cunge routing over a river network.

use ndarray::{Array1, Array2};
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::autograd::{
    add, add_scalar, clamp, concat, div, gather, index_sum, ln, mul, powf, scale, Tensor,
};
use crate::config::ParameterRegistry;
use crate::dataset::Hydrofabric;
use crate::error::{DdrError, Result};
use crate::routing::sparse::{adjacency_matvec, solve_lower_triangular, CsrPattern, PatternMapper};
use crate::routing::denormalize;

/// Routing timestep in seconds.
const TIMESTEP_S: f32 = 3600.0;

/// Upper celerity clamp in m/s; kinematic-wave celerity is 5/3 of velocity.
const VELOCITY_UB: f32 = 15.0;
const CELERITY_FACTOR: f32 = 5.0 / 3.0;

/// Normalized spatial parameters produced by the parameterization network,
/// each one value per reach in [0, 1].
pub struct SpatialParameters {
    pub n: Tensor,
    pub q_spatial: Tensor,
    pub p_spatial: Tensor,
}

/// Routed discharge at the gauges, time-major: entry `t * gauges + g` is
/// the flow at gauge `g` and timestep `t`.
pub struct RoutedFlow {
    pub discharge: Tensor,
    pub timesteps: usize,
    pub gauges: usize,
}

impl RoutedFlow {
    pub fn value_at(&self, timestep: usize, gauge: usize) -> f32 {
        self.discharge.data()[timestep * self.gauges + gauge]
    }

    /// Copy into a gauges × timesteps matrix for the metrics suite.
    pub fn to_matrix(&self) -> Array2<f32> {
        let mut out = Array2::zeros((self.gauges, self.timesteps));
        for t in 0..self.timesteps {
            for g in 0..self.gauges {
                out[[g, t]] = self.value_at(t, g);
            }
        }
        out
    }
}

/// Muskingum-Cunge router with learnable Manning roughness and spatial
/// discharge/pressure exponents.
///
/// Velocity comes from Manning's equation with a width-derived depth, the
/// celerity is the kinematic-wave factor of the clamped velocity, and each
/// timestep solves the lower-triangular network system
/// `(I - c1 ∘ N) q_{t+1} = c2 ∘ (N q_t) + c3 ∘ q_t + c4 ∘ q_lateral`.
pub struct MuskingumCunge {
    t: f32,
    parameter_bounds: BTreeMap<String, [f32; 2]>,
    velocity_lb: f32,
    depth_lb: f32,
    discharge_lb: f32,
    length: Tensor,
    slope_sqrt: Tensor,
    width: Tensor,
    two_x: Tensor,
    two_one_minus_x: Tensor,
    two_t: Tensor,
    adjacency: Rc<CsrPattern>,
    mapper: PatternMapper,
    discharge_state: Option<Array1<f32>>,
}

impl MuskingumCunge {
    pub fn new(params: &ParameterRegistry, fabric: &Hydrofabric) -> Result<Self> {
        let n = fabric.reaches();
        let minimums = &params.attribute_minimums;
        let slope_clamped = fabric.slope.mapv(|s| s.max(minimums.slope));
        let adjacency = Rc::new(fabric.adjacency.clone());
        let mapper = PatternMapper::new(&adjacency)?;
        Ok(MuskingumCunge {
            t: TIMESTEP_S,
            parameter_bounds: params.parameter_ranges.range.clone(),
            velocity_lb: minimums.velocity,
            depth_lb: minimums.depth,
            discharge_lb: minimums.discharge,
            length: Tensor::new(fabric.length.clone(), false),
            slope_sqrt: Tensor::new(slope_clamped.mapv(f32::sqrt), false),
            width: Tensor::new(fabric.width.clone(), false),
            two_x: Tensor::new(fabric.musk_x.mapv(|x| 2.0 * x), false),
            two_one_minus_x: Tensor::new(fabric.musk_x.mapv(|x| 2.0 * (1.0 - x)), false),
            two_t: Tensor::new(Array1::from_elem(n, 2.0 * TIMESTEP_S), false),
            adjacency,
            mapper,
            discharge_state: None,
        })
    }

    /// Drop the carried discharge state; the next mini-batch starts from
    /// its own first lateral-inflow row.
    pub fn reset_state(&mut self) {
        self.discharge_state = None;
    }

    fn bounds(&self, name: &str) -> Result<[f32; 2]> {
        self.parameter_bounds.get(name).copied().ok_or_else(|| DdrError::ConfigValue {
            field: format!("params.parameter_ranges.range.{name}"),
            message: "no physical range for learnable parameter".into(),
            suggestion: "add [lower, upper] bounds for every learnable parameter".into(),
        })
    }

    /// Kinematic wave celerity from Manning's equation.
    ///
    /// depth = log_q(width / p); v = n⁻¹ · depth^(2/3) · s0^(1/2);
    /// c = clamp(v) · 5/3.
    fn celerity(&self, n: &Tensor, q_spatial: &Tensor, p_spatial: &Tensor) -> Tensor {
        let ratio = div(&self.width, p_spatial);
        let depth_raw = div(&ln(&ratio), &ln(q_spatial));
        let depth = clamp(&depth_raw, self.depth_lb, f32::INFINITY);
        let v = div(&mul(&powf(&depth, 2.0 / 3.0), &self.slope_sqrt), n);
        scale(&clamp(&v, self.velocity_lb, VELOCITY_UB), CELERITY_FACTOR)
    }

    /// Route lateral inflow through the network and read out the gauges.
    ///
    /// `q_prime` is timesteps × reaches; `gauge_reaches` lists, per gauge,
    /// the reach indices whose discharge the gauge observes. State carries
    /// across calls within an epoch and resets when `mini_batch` is 0.
    pub fn route(
        &mut self,
        q_prime: &Array2<f32>,
        spatial: &SpatialParameters,
        gauge_reaches: &[Vec<usize>],
        mini_batch: usize,
    ) -> Result<RoutedFlow> {
        let n = self.length.len();
        let timesteps = q_prime.nrows();
        if q_prime.ncols() != n {
            return Err(DdrError::ShapeMismatch {
                expected: vec![timesteps, n],
                actual: vec![timesteps, q_prime.ncols()],
            });
        }
        if timesteps == 0 {
            return Err(DdrError::ShapeMismatch { expected: vec![1, n], actual: vec![0, n] });
        }
        for t in [&spatial.n, &spatial.q_spatial, &spatial.p_spatial] {
            if t.len() != n {
                return Err(DdrError::ShapeMismatch {
                    expected: vec![n],
                    actual: vec![t.len()],
                });
            }
        }

        log::debug!(
            "routing {timesteps} timesteps over {n} reaches ({} gauges)",
            gauge_reaches.len()
        );

        let roughness = denormalize(&spatial.n, self.bounds("n")?);
        let q_sp = denormalize(&spatial.q_spatial, self.bounds("q_spatial")?);
        let p_sp = denormalize(&spatial.p_spatial, self.bounds("p_spatial")?);

        // The network inputs are constant over a routing window, so the
        // celerity and the Muskingum coefficients are too.
        let c = self.celerity(&roughness, &q_sp, &p_sp);
        let k = div(&self.length, &c);
        let kx2 = mul(&k, &self.two_x);
        let k1mx2 = mul(&k, &self.two_one_minus_x);
        let denom = add_scalar(&k1mx2, self.t);
        let c1 = div(&add_scalar(&scale(&kx2, -1.0), self.t), &denom);
        let c2 = div(&add_scalar(&kx2, self.t), &denom);
        let c3 = div(&add_scalar(&k1mx2, -self.t), &denom);
        let c4 = div(&self.two_t, &denom);

        // Matrix values: unit diagonal, -c1 on the upstream slots. The
        // head element feeds every diagonal slot; row 0 is a headwater and
        // contributes no off-diagonal coefficient.
        let c1_neg = scale(&c1, -1.0);
        let head = Tensor::from_vec(vec![1.0], false);
        let tail_indices: Vec<usize> = (1..n).collect();
        let a_vec = concat(&[head, gather(&c1_neg, &tail_indices)]);
        let a_values = self.mapper.map(&a_vec);

        if mini_batch == 0 || self.discharge_state.is_none() {
            self.discharge_state = Some(q_prime.row(0).to_owned());
        }
        let state = match &self.discharge_state {
            Some(s) => s.clone(),
            None => q_prime.row(0).to_owned(),
        };
        let mut q_t = Tensor::new(state, false);

        let mut outputs: Vec<Tensor> = Vec::with_capacity(timesteps);
        outputs.push(clamp(
            &index_sum(&q_t, gauge_reaches),
            self.discharge_lb,
            f32::INFINITY,
        ));

        for timestep in 1..timesteps {
            let q_lateral = Tensor::new(
                q_prime.row(timestep - 1).mapv(|q| q.max(self.discharge_lb)),
                false,
            );
            let i_t = adjacency_matvec(&self.adjacency, &q_t);
            let b = add(
                &add(&mul(&c2, &i_t), &mul(&c3, &q_t)),
                &mul(&c4, &q_lateral),
            );
            let solution = solve_lower_triangular(&a_values, &self.mapper, &b)?;
            let q_t1 = clamp(&solution, self.discharge_lb, f32::INFINITY);
            outputs.push(index_sum(&q_t1, gauge_reaches));
            q_t = q_t1;
        }

        self.discharge_state = Some(q_t.data().clone());

        Ok(RoutedFlow {
            discharge: concat(&outputs),
            timesteps,
            gauges: gauge_reaches.len(),
        })
    }
}
