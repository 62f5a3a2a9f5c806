//! Momentum SGD built from first principles
//!
//! This library provides a small reverse-mode autodiff tensor, an SGD optimizer
//! with momentum and weight decay, and tooling to trace optimizer trajectories
//! across 2D loss landscapes.

pub mod config;
pub mod error;
pub mod landscape;
pub mod nn;
pub mod optim;
pub mod plot;
pub mod tensor;

// Re-export commonly used types for convenience
pub use config::ExperimentConfig;
pub use error::{Error, Result};
pub use optim::{Optimizer, SgdConfig, SGD};
pub use tensor::Tensor;
