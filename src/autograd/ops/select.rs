//! Indexing and assembly operations: concat, gather, index_sum

use crate::autograd::{BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Concatenate tensors into one. Gradients are split back by offset.
pub fn concat(parts: &[Tensor]) -> Tensor {
    let total: usize = parts.iter().map(Tensor::len).sum();
    let mut data = Array1::zeros(total);
    let mut offset = 0;
    for part in parts {
        data.slice_mut(ndarray::s![offset..offset + part.len()])
            .assign(part.data());
        offset += part.len();
    }
    let requires_grad = parts.iter().any(Tensor::requires_grad);

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(ConcatBackward {
            parts: parts.to_vec(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct ConcatBackward {
    parts: Vec<Tensor>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for ConcatBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let mut offset = 0;
            for part in &self.parts {
                if part.requires_grad() {
                    let grad_part = grad.slice(ndarray::s![offset..offset + part.len()]).to_owned();
                    part.accumulate_grad(grad_part);
                }
                offset += part.len();
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        self.parts.iter().filter_map(Tensor::backward_op).collect()
    }
}

/// Select elements by index: out[i] = a[indices[i]].
/// Gradients scatter-add back, so repeated indices accumulate.
pub fn gather(a: &Tensor, indices: &[usize]) -> Tensor {
    let data = Array1::from_iter(indices.iter().map(|&i| a.data()[i]));
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(GatherBackward {
            a: a.clone(),
            indices: indices.to_vec(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct GatherBackward {
    a: Tensor,
    indices: Vec<usize>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for GatherBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                let mut grad_a = Array1::zeros(self.a.len());
                for (out_idx, &src_idx) in self.indices.iter().enumerate() {
                    grad_a[src_idx] += grad[out_idx];
                }
                self.a.accumulate_grad(grad_a);
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        self.a.backward_op().into_iter().collect()
    }
}

/// Sum groups of elements: out[g] = Σ a[i] for i in groups[g].
/// Used for gauge readout where a gauge aggregates one or more reaches.
pub fn index_sum(a: &Tensor, groups: &[Vec<usize>]) -> Tensor {
    let data = Array1::from_iter(
        groups
            .iter()
            .map(|group| group.iter().map(|&i| a.data()[i]).sum::<f32>()),
    );
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(IndexSumBackward {
            a: a.clone(),
            groups: groups.to_vec(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct IndexSumBackward {
    a: Tensor,
    groups: Vec<Vec<usize>>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for IndexSumBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                let mut grad_a = Array1::zeros(self.a.len());
                for (g, group) in self.groups.iter().enumerate() {
                    for &i in group {
                        grad_a[i] += grad[g];
                    }
                }
                self.a.accumulate_grad(grad_a);
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        self.a.backward_op().into_iter().collect()
    }
}
