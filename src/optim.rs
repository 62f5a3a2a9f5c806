use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::tensor::Tensor;

/// Updates a fixed set of parameters from the gradients accumulated on them.
pub trait Optimizer {
    /// Apply one update to every parameter.
    fn step(&mut self);

    /// Reset every parameter's gradient to zero.
    fn zero_grad(&self);
}

/// Hyperparameters for [`SGD`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SgdConfig {
    pub lr: f32,
    #[serde(default)]
    pub momentum: f32,
    #[serde(default)]
    pub weight_decay: f32,
}

impl SgdConfig {
    pub fn new(lr: f32) -> Self {
        Self {
            lr,
            momentum: 0.0,
            weight_decay: 0.0,
        }
    }

    pub fn with_momentum(mut self, momentum: f32) -> Self {
        self.momentum = momentum;
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }
}

/// The small-step, heavy-momentum setting used for landscape trajectories
impl Default for SgdConfig {
    fn default() -> Self {
        Self::new(0.001).with_momentum(0.98)
    }
}

impl fmt::Display for SgdConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SGD(lr={}, momentum={}, weight_decay={})",
            self.lr, self.momentum, self.weight_decay
        )
    }
}

/// Stochastic Gradient Descent with momentum and weight decay
///
/// Update rule, per parameter:
/// - g = grad + weight_decay * value + momentum * prev_g
/// - value = value - lr * g
/// - prev_g = g
///
/// `prev_g` starts at zero, so the first step is plain (decayed) gradient descent.
pub struct SGD {
    params: Vec<Tensor>,
    config: SgdConfig,
    // One buffer per parameter, same order and length as `params`
    prev_g: Vec<Vec<f32>>,
}

impl SGD {
    /// Create a new SGD optimizer with no momentum and no weight decay
    pub fn new(params: Vec<Tensor>, learning_rate: f32) -> Self {
        Self::with_config(params, SgdConfig::new(learning_rate))
    }

    /// # Panics
    /// If the learning rate is not positive.
    pub fn with_config(params: Vec<Tensor>, config: SgdConfig) -> Self {
        assert!(
            config.lr > 0.0,
            "Learning rate must be positive, got {}",
            config.lr
        );
        let prev_g = params.iter().map(|p| vec![0.0; p.numel()]).collect();

        Self {
            params,
            config,
            prev_g,
        }
    }

    pub fn with_momentum(mut self, momentum: f32) -> Self {
        self.config.momentum = momentum;
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.config.weight_decay = weight_decay;
        self
    }

    pub fn params(&self) -> &[Tensor] {
        &self.params
    }

    pub fn config(&self) -> SgdConfig {
        self.config
    }

    pub fn learning_rate(&self) -> f32 {
        self.config.lr
    }

    pub fn momentum(&self) -> f32 {
        self.config.momentum
    }

    pub fn weight_decay(&self) -> f32 {
        self.config.weight_decay
    }

    /// Effective gradients applied by the last step
    pub fn prev_grads(&self) -> &[Vec<f32>] {
        &self.prev_g
    }

    /// Update parameters using their gradients
    ///
    /// Writes straight into each parameter's value buffer, so the update never
    /// becomes part of a computation graph.
    ///
    /// # Panics
    /// If a parameter's gradient buffer no longer matches its value length.
    #[instrument(skip(self), fields(num_params = self.params.len(), lr = self.config.lr, momentum = self.config.momentum))]
    pub fn step(&mut self) {
        let SgdConfig {
            lr,
            momentum,
            weight_decay,
        } = self.config;

        for (i, (param, prev_g)) in self.params.iter().zip(self.prev_g.iter_mut()).enumerate() {
            let grad = param.grad.borrow();
            let mut value = param.data_mut();
            assert_eq!(
                grad.len(),
                value.len(),
                "Gradient length {} does not match parameter {} length {}",
                grad.len(),
                i,
                value.len()
            );
            assert_eq!(
                prev_g.len(),
                value.len(),
                "Momentum buffer out of sync with parameter {}",
                i
            );

            value
                .iter_mut()
                .zip(grad.iter())
                .zip(prev_g.iter_mut())
                .for_each(|((v, g), prev)| {
                    let effective = g + weight_decay * *v + momentum * *prev;
                    *v -= lr * effective;
                    *prev = effective;
                });
        }
    }

    /// Zero out all gradients
    #[instrument(skip(self), fields(num_params = self.params.len()))]
    pub fn zero_grad(&self) {
        self.params.iter().for_each(|param| param.zero_grad());
    }
}

impl Optimizer for SGD {
    fn step(&mut self) {
        SGD::step(self)
    }

    fn zero_grad(&self) {
        SGD::zero_grad(self)
    }
}

impl fmt::Display for SGD {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.config, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(values: &[f32]) -> Tensor {
        Tensor::new(values.to_vec(), vec![values.len()]).requires_grad(true)
    }

    fn set_grad(p: &Tensor, grad: &[f32]) {
        p.grad.borrow_mut().copy_from_slice(grad);
    }

    fn assert_close(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-6, "{:?} != {:?}", actual, expected);
        }
    }

    #[test]
    fn test_plain_gradient_descent() {
        let p = param(&[1.0, 2.0]);
        let mut sgd = SGD::new(vec![p.clone()], 0.1);

        set_grad(&p, &[0.5, -1.0]);
        sgd.step();
        assert_close(&p.to_vec(), &[0.95, 2.1]);

        // Without momentum the previous step has no influence
        set_grad(&p, &[1.0, 1.0]);
        sgd.step();
        assert_close(&p.to_vec(), &[0.85, 2.0]);
    }

    #[test]
    fn test_momentum_on_quadratic() {
        // f(x) = x^2, x0 = 1, lr = 0.1, momentum = 0.9
        let x = param(&[1.0]);
        let mut sgd = SGD::new(vec![x.clone()], 0.1).with_momentum(0.9);

        x.pow(2.0).backward();
        sgd.step();
        sgd.zero_grad();
        // g = 2
        assert_close(&x.to_vec(), &[0.8]);
        assert_close(&sgd.prev_grads()[0], &[2.0]);

        x.pow(2.0).backward();
        sgd.step();
        // g = 1.6 + 0.9 * 2 = 3.4
        assert_close(&x.to_vec(), &[0.46]);
        assert_close(&sgd.prev_grads()[0], &[3.4]);
    }

    #[test]
    fn test_weight_decay_only_after_zero_grad() {
        let p = param(&[2.0, -4.0]);
        let mut sgd = SGD::with_config(
            vec![p.clone()],
            SgdConfig::new(0.1).with_momentum(0.9).with_weight_decay(0.5),
        );

        set_grad(&p, &[3.0, 3.0]);
        sgd.zero_grad();
        sgd.step();
        // Only the decay term: value -= 0.1 * 0.5 * value
        assert_close(&p.to_vec(), &[1.9, -3.8]);
    }

    #[test]
    fn test_no_decay_no_grad_is_noop() {
        let p = param(&[2.0, -4.0]);
        let mut sgd = SGD::new(vec![p.clone()], 0.5);
        sgd.zero_grad();
        sgd.step();
        assert_eq!(p.to_vec(), vec![2.0, -4.0]);
    }

    #[test]
    fn test_zero_grad_resets_every_param() {
        let a = param(&[1.0, 2.0, 3.0]);
        let b = Tensor::new(vec![1.0; 4], vec![2, 2]).requires_grad(true);
        set_grad(&a, &[1.0, 1.0, 1.0]);
        b.grad.borrow_mut().fill(2.0);

        let sgd = SGD::new(vec![a.clone(), b.clone()], 0.1);
        sgd.zero_grad();
        assert_eq!(*a.grad.borrow(), vec![0.0; 3]);
        assert_eq!(*b.grad.borrow(), vec![0.0; 4]);
    }

    #[test]
    fn test_state_matches_params() {
        let a = param(&[1.0, 2.0, 3.0]);
        let b = param(&[1.0]);
        let sgd = SGD::new(vec![a, b], 0.1);
        assert_eq!(sgd.prev_grads().len(), 2);
        assert_eq!(sgd.prev_grads()[0], vec![0.0; 3]);
        assert_eq!(sgd.prev_grads()[1], vec![0.0; 1]);
    }

    #[test]
    fn test_step_through_trait_object() {
        let p = param(&[1.0]);
        let mut opt: Box<dyn Optimizer> = Box::new(SGD::new(vec![p.clone()], 1.0));
        set_grad(&p, &[0.25]);
        opt.step();
        opt.zero_grad();
        assert_eq!(p.to_vec(), vec![0.75]);
        assert_eq!(*p.grad.borrow(), vec![0.0]);
    }

    #[test]
    #[should_panic(expected = "Learning rate must be positive")]
    fn test_rejects_non_positive_lr() {
        SGD::new(vec![param(&[1.0])], 0.0);
    }

    #[test]
    #[should_panic(expected = "Gradient length")]
    fn test_mismatched_grad_panics() {
        let p = param(&[1.0, 2.0]);
        let mut sgd = SGD::new(vec![p.clone()], 0.1);
        p.grad.borrow_mut().push(1.0);
        sgd.step();
    }

    #[test]
    fn test_builders_set_config() {
        let p = param(&[1.0, 2.0]);
        let sgd = SGD::new(vec![p.clone()], 0.1)
            .with_momentum(0.9)
            .with_weight_decay(0.01);

        assert_eq!(sgd.learning_rate(), 0.1);
        assert_eq!(sgd.momentum(), 0.9);
        assert_eq!(sgd.weight_decay(), 0.01);
        assert_eq!(
            sgd.config(),
            SgdConfig::new(0.1).with_momentum(0.9).with_weight_decay(0.01)
        );

        // The optimizer holds a handle, not a copy
        assert_eq!(sgd.params().len(), 1);
        sgd.params()[0].data_mut()[0] = 5.0;
        assert_eq!(p.to_vec(), vec![5.0, 2.0]);
    }

    #[test]
    fn test_default_config() {
        let config = SgdConfig::default();
        assert_eq!(config, SgdConfig::new(0.001).with_momentum(0.98));
        assert_eq!(config.weight_decay, 0.0);
    }

    #[test]
    fn test_display() {
        let sgd = SGD::new(vec![], 0.5).with_momentum(0.9);
        assert_eq!(sgd.to_string(), "SGD(lr=0.5, momentum=0.9, weight_decay=0)");
    }
}
