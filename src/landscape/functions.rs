use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tensor::Tensor;

/// A 2D loss written against tensors, element-wise over same-shaped `x` and `y`
pub type LossFn = fn(&Tensor, &Tensor) -> Tensor;

/// Shallow valley along y, with a nearly flat floor in x.
///
/// `tanh(x)^2 + 0.01 * |x| + sigmoid(y)`
pub fn pathological_curve_loss(x: &Tensor, y: &Tensor) -> Tensor {
    let x_loss = x.tanh().pow(2.0).add(&x.abs().mul_scalar(0.01));
    let y_loss = y.sigmoid();
    x_loss.add(&y_loss)
}

/// `(1 - x)^2 + 100 * (y - x^2)^2`, minimum 0 at (1, 1)
pub fn rosenbrock_loss(x: &Tensor, y: &Tensor) -> Tensor {
    let a = x.mul_scalar(-1.0).add_scalar(1.0).pow(2.0);
    let b = y.sub(&x.pow(2.0)).pow(2.0).mul_scalar(100.0);
    a.add(&b)
}

/// `x^2 + y^2`
pub fn bowl_loss(x: &Tensor, y: &Tensor) -> Tensor {
    x.pow(2.0).add(&y.pow(2.0))
}

/// Loss functions selectable by name from an experiment config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    #[default]
    Pathological,
    Rosenbrock,
    Bowl,
}

impl LossKind {
    pub fn loss_fn(self) -> LossFn {
        match self {
            LossKind::Pathological => pathological_curve_loss,
            LossKind::Rosenbrock => rosenbrock_loss,
            LossKind::Bowl => bowl_loss,
        }
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LossKind::Pathological => "pathological curvature",
            LossKind::Rosenbrock => "rosenbrock",
            LossKind::Bowl => "bowl",
        };
        f.write_str(name)
    }
}
