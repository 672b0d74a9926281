//! Sparse river-network matrices and the differentiable triangular solve.
//!
//! The routing matrix has one row per reach: a unit diagonal plus one entry
//! per upstream connection. The pattern is fixed by the network topology,
//! so it is built once and per-timestep coefficient vectors are mapped into
//! the value slots.

use crate::autograd::{gather, BackwardOp, Tensor};
use crate::error::{DdrError, Result};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// CSR sparsity structure without values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrPattern {
    pub crow_indices: Vec<usize>,
    pub col_indices: Vec<usize>,
    pub dim: usize,
}

impl CsrPattern {
    /// Build a pattern from (row, col) pairs. Entries are sorted row-major
    /// and duplicates are an error in the caller's topology.
    pub fn from_edges(dim: usize, edges: &[(usize, usize)]) -> Self {
        let mut sorted: Vec<(usize, usize)> = edges.to_vec();
        sorted.sort_unstable();
        let mut crow_indices = vec![0usize; dim + 1];
        let mut col_indices = Vec::with_capacity(sorted.len());
        for &(row, col) in &sorted {
            crow_indices[row + 1] += 1;
            col_indices.push(col);
        }
        for i in 0..dim {
            crow_indices[i + 1] += crow_indices[i];
        }
        CsrPattern { crow_indices, col_indices, dim }
    }

    pub fn nnz(&self) -> usize {
        self.col_indices.len()
    }

    /// Expand the compressed rows into per-entry (rows, cols) vectors.
    pub fn row_col_indices(&self) -> (Vec<usize>, Vec<usize>) {
        let mut rows = Vec::with_capacity(self.nnz());
        let mut cols = Vec::with_capacity(self.nnz());
        for i in 0..self.dim {
            let (start, end) = (self.crow_indices[i], self.crow_indices[i + 1]);
            for slot in start..end {
                rows.push(i);
                cols.push(self.col_indices[slot]);
            }
        }
        (rows, cols)
    }

    /// Transposed pattern plus the value permutation: the transposed value
    /// array at position p equals the original value array at `perm[p]`.
    pub fn transpose(&self) -> (CsrPattern, Vec<usize>) {
        let n = self.dim;
        let nnz = self.nnz();
        let mut crow = vec![0usize; n + 1];
        for &j in &self.col_indices {
            crow[j + 1] += 1;
        }
        for i in 0..n {
            crow[i + 1] += crow[i];
        }
        let mut next = crow.clone();
        let mut col = vec![0usize; nnz];
        let mut perm = vec![0usize; nnz];
        for i in 0..n {
            for slot in self.crow_indices[i]..self.crow_indices[i + 1] {
                let j = self.col_indices[slot];
                let pos = next[j];
                next[j] += 1;
                col[pos] = i;
                perm[pos] = slot;
            }
        }
        (CsrPattern { crow_indices: crow, col_indices: col, dim: n }, perm)
    }
}

/// Maps per-reach data vectors into the value slots of the routing matrix.
///
/// Construction follows the index-fill scheme: an index vector offset by one
/// (so a zero index survives sparse pruning) is pushed through the fill
/// pattern `I + N`, and the recovered indices record which data element
/// feeds each CSR slot. Diagonal slots read element 0, the slot for an
/// upstream connection in row `i` reads element `i`. Reach 0 is the
/// smallest headwater and has no upstream slots, so forcing element 0 to
/// 1.0 yields the unit diagonal without losing any coefficient.
pub struct PatternMapper {
    pattern: Rc<CsrPattern>,
    transposed: Rc<CsrPattern>,
    perm: Rc<Vec<usize>>,
    sources: Vec<usize>,
}

impl PatternMapper {
    /// Build the mapper for `I + N`, where `N` is the strictly
    /// lower-triangular upstream adjacency.
    pub fn new(adjacency: &CsrPattern) -> Result<Self> {
        let n = adjacency.dim;
        // Fill with shifted indices, then recover the source of each slot.
        let ind_vec: Vec<usize> = (1..=n).collect();
        let mut edges: Vec<(usize, usize, usize)> = Vec::with_capacity(adjacency.nnz() + n);
        for i in 0..n {
            for slot in adjacency.crow_indices[i]..adjacency.crow_indices[i + 1] {
                let j = adjacency.col_indices[slot];
                if j >= i {
                    return Err(DdrError::Solver {
                        message: format!(
                            "adjacency entry ({i}, {j}) is not strictly lower triangular; \
                             reaches must be ordered by drainage area"
                        ),
                    });
                }
                edges.push((i, j, ind_vec[i]));
            }
            // Unit diagonal sources element 0 (stored as offset index 1).
            edges.push((i, i, ind_vec[0]));
        }
        edges.sort_unstable();
        let pattern = CsrPattern::from_edges(
            n,
            &edges.iter().map(|&(r, c, _)| (r, c)).collect::<Vec<_>>(),
        );
        let sources: Vec<usize> = edges.iter().map(|&(_, _, shifted)| shifted - 1).collect();
        let (transposed, perm) = pattern.transpose();
        Ok(PatternMapper {
            pattern: Rc::new(pattern),
            transposed: Rc::new(transposed),
            perm: Rc::new(perm),
            sources,
        })
    }

    pub fn pattern(&self) -> &Rc<CsrPattern> {
        &self.pattern
    }

    /// Map a per-reach data vector into the CSR value slots.
    pub fn map(&self, datvec: &Tensor) -> Tensor {
        gather(datvec, &self.sources)
    }
}

/// Sparse matrix-vector product against the 0/1 upstream adjacency:
/// `out[i] = Σ q[j]` over the upstream reaches `j` of `i`.
pub fn adjacency_matvec(adjacency: &Rc<CsrPattern>, q: &Tensor) -> Tensor {
    let mut data = Array1::zeros(adjacency.dim);
    for i in 0..adjacency.dim {
        let mut acc = 0.0;
        for slot in adjacency.crow_indices[i]..adjacency.crow_indices[i + 1] {
            acc += q.data()[adjacency.col_indices[slot]];
        }
        data[i] = acc;
    }
    let requires_grad = q.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(AdjacencyMatvecBackward {
            adjacency: Rc::clone(adjacency),
            q: q.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct AdjacencyMatvecBackward {
    adjacency: Rc<CsrPattern>,
    q: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for AdjacencyMatvecBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.q.requires_grad() {
                // ∂L/∂q = Nᵀ · ∂L/∂out
                let mut grad_q = Array1::zeros(self.q.len());
                for i in 0..self.adjacency.dim {
                    for slot in self.adjacency.crow_indices[i]..self.adjacency.crow_indices[i + 1]
                    {
                        grad_q[self.adjacency.col_indices[slot]] += grad[i];
                    }
                }
                self.q.accumulate_grad(grad_q);
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        self.q.backward_op().into_iter().collect()
    }
}

/// Solve the lower-triangular sparse system `A x = b` by forward
/// substitution, with gradients for both the matrix values and the
/// right-hand side.
///
/// Backward rule: `grad_b` solves the transposed (upper) system against the
/// output gradient, and each stored nonzero (i, j) receives
/// `grad_values = -grad_b[i] * x[j]`.
pub fn solve_lower_triangular(
    values: &Tensor,
    mapper: &PatternMapper,
    b: &Tensor,
) -> Result<Tensor> {
    let pattern = mapper.pattern();
    let x = lower_substitution(values.data(), pattern, b.data())?;
    let requires_grad = values.requires_grad() || b.requires_grad();

    let mut result = Tensor::new(x.clone(), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(TriangularSolveBackward {
            values: values.clone(),
            b: b.clone(),
            x,
            pattern: Rc::clone(pattern),
            transposed: Rc::clone(&mapper.transposed),
            perm: Rc::clone(&mapper.perm),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    Ok(result)
}

struct TriangularSolveBackward {
    values: Tensor,
    b: Tensor,
    x: Array1<f32>,
    pattern: Rc<CsrPattern>,
    transposed: Rc<CsrPattern>,
    perm: Rc<Vec<usize>>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for TriangularSolveBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            // Aᵀ grad_b = grad_x; A is lower so Aᵀ is upper.
            let t_values =
                Array1::from_iter(self.perm.iter().map(|&slot| self.values.data()[slot]));
            let grad_b = match upper_substitution(&t_values, &self.transposed, grad) {
                Ok(g) => g,
                Err(e) => {
                    log::error!("transposed triangular solve failed in backward: {e}");
                    return;
                }
            };

            if self.values.requires_grad() {
                let mut grad_values = Array1::zeros(self.values.len());
                for i in 0..self.pattern.dim {
                    for slot in self.pattern.crow_indices[i]..self.pattern.crow_indices[i + 1] {
                        let j = self.pattern.col_indices[slot];
                        grad_values[slot] = -grad_b[i] * self.x[j];
                    }
                }
                self.values.accumulate_grad(grad_values);
            }
            if self.b.requires_grad() {
                self.b.accumulate_grad(grad_b);
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        [&self.values, &self.b]
            .iter()
            .filter_map(|t| t.backward_op())
            .collect()
    }
}

fn lower_substitution(
    values: &Array1<f32>,
    pattern: &CsrPattern,
    b: &Array1<f32>,
) -> Result<Array1<f32>> {
    let n = pattern.dim;
    let mut x = Array1::zeros(n);
    for i in 0..n {
        let mut acc = b[i];
        let mut diag = None;
        for slot in pattern.crow_indices[i]..pattern.crow_indices[i + 1] {
            let j = pattern.col_indices[slot];
            if j == i {
                diag = Some(values[slot]);
            } else {
                acc -= values[slot] * x[j];
            }
        }
        x[i] = match diag {
            Some(d) if d != 0.0 && d.is_finite() => acc / d,
            _ => {
                return Err(DdrError::Solver {
                    message: format!("zero or non-finite diagonal at row {i}"),
                })
            }
        };
    }
    Ok(x)
}

fn upper_substitution(
    values: &Array1<f32>,
    pattern: &CsrPattern,
    b: &Array1<f32>,
) -> Result<Array1<f32>> {
    let n = pattern.dim;
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut acc = b[i];
        let mut diag = None;
        for slot in pattern.crow_indices[i]..pattern.crow_indices[i + 1] {
            let j = pattern.col_indices[slot];
            if j == i {
                diag = Some(values[slot]);
            } else {
                acc -= values[slot] * x[j];
            }
        }
        x[i] = match diag {
            Some(d) if d != 0.0 && d.is_finite() => acc / d,
            _ => {
                return Err(DdrError::Solver {
                    message: format!("zero or non-finite diagonal at row {i}"),
                })
            }
        };
    }
    Ok(x)
}
