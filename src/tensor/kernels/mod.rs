//! Kernel implementations for tensor operations
//!
//! Only the CPU matrix multiply lives here; it backs `Tensor::matmul` and its
//! backward pass.

pub mod gemm;

pub use gemm::{matmul, matmul_backward_left, matmul_backward_right};
