//! Backward-operation trait for the gradient tape.

use std::rc::Rc;

/// A node on the gradient tape.
///
/// Each operation that produces a gradient-tracked tensor registers one of
/// these on its result. `backward` reads the result's accumulated gradient
/// and pushes contributions into the operation's inputs. `parents` exposes
/// the backward ops of the inputs so the tape can be walked in dependency
/// order; an op must only be fired after every op consuming its result has
/// fired, otherwise a partially accumulated gradient would be propagated.
pub trait BackwardOp {
    /// Propagate the result gradient into the input gradients.
    fn backward(&self);

    /// Backward ops of the inputs, one entry per gradient-tracked input.
    /// Inputs that are leaves (no producing op) are not listed.
    fn parents(&self) -> Vec<Rc<dyn BackwardOp>>;
}
