use crate::Tensor;

/// Generic layer interface
pub trait Layer {
    fn forward(&self, input: &Tensor) -> Tensor;

    /// Handles to every learnable tensor, in a fixed order
    fn parameters(&self) -> Vec<Tensor>;
}

pub mod linear;
pub mod loss;

pub use linear::*;
pub use loss::*;
