//! 2D loss landscapes: test functions, optimizer trajectories over them, and
//! grid samples of their surfaces.

pub mod functions;
pub mod surface;
pub mod trajectory;

pub use functions::{bowl_loss, pathological_curve_loss, rosenbrock_loss, LossKind};
pub use surface::LossSurface;
pub use trajectory::{opt_fn_with_sgd, optimize_fn};
