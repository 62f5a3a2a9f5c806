use tracing::{debug, instrument};

use crate::optim::{Optimizer, SgdConfig, SGD};
use crate::tensor::Tensor;

/// Optimize a 2D function starting from `xy`, recording the trajectory.
///
/// `xy` must be a shape-[2] tensor tracking gradients; it is updated in place
/// through `optimizer`, which must hold a handle to it.
///
/// Returns a `[n_iters, 2]` tensor of the point BEFORE each step, so row 0 is
/// the starting point.
#[instrument(skip(f, xy, optimizer))]
pub fn optimize_fn<F, O>(f: F, xy: &Tensor, optimizer: &mut O, n_iters: usize) -> Tensor
where
    F: Fn(&Tensor, &Tensor) -> Tensor,
    O: Optimizer + ?Sized,
{
    assert_eq!(xy.shape, vec![2], "Expected a single (x, y) point of shape [2]");
    assert!(xy.requires_grad, "The optimized point must track gradients");
    assert!(n_iters > 0, "Need at least one iteration");

    let mut history = Vec::with_capacity(n_iters);
    for _ in 0..n_iters {
        history.push(xy.detach());

        let loss = f(&xy.index(0), &xy.index(1));
        loss.backward();
        optimizer.step();
        optimizer.zero_grad();
    }

    let end = xy.to_vec();
    debug!(x = end[0], y = end[1], "trajectory finished");
    Tensor::stack(&history)
}

/// Run [`optimize_fn`] with a fresh point at `start` and a fresh [`SGD`].
///
/// `SgdConfig::default()` gives the usual lr = 0.001, momentum = 0.98 setting.
pub fn opt_fn_with_sgd<F>(f: F, start: [f32; 2], config: SgdConfig, n_iters: usize) -> Tensor
where
    F: Fn(&Tensor, &Tensor) -> Tensor,
{
    let xy = Tensor::new(start.to_vec(), vec![2]).requires_grad(true);
    let mut optimizer = SGD::with_config(vec![xy.clone()], config);
    optimize_fn(f, &xy, &mut optimizer, n_iters)
}
