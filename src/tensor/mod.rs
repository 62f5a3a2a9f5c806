//! Tensor module: the differentiation engine behind the optimizer
//!
//! This module provides the core `Tensor` type, its differentiable operations,
//! and the matrix kernels they rely on.

mod core;
pub mod kernels;

// Re-export the main Tensor type and GraphNode for convenience
pub use core::{GraphNode, Storage, Tensor};
