use rand::Rng;

use crate::{nn::Layer, tensor::Tensor};

/// Linear (fully-connected) layer: y = xW + b
pub struct Linear {
    pub weight: Tensor,
    pub bias: Tensor,
    in_features: usize,
    out_features: usize,
}

impl Linear {
    pub fn new(in_features: usize, out_features: usize) -> Self {
        Self::new_with_rng(in_features, out_features, &mut rand::thread_rng())
    }

    /// Xavier-scaled uniform weights, zero bias
    pub fn new_with_rng<R: Rng + ?Sized>(in_features: usize, out_features: usize, rng: &mut R) -> Self {
        let weight = Tensor::randn_with_rng(vec![in_features, out_features], rng);
        let scale = (2.0 / in_features as f32).sqrt();
        weight.data_mut().iter_mut().for_each(|x| *x *= scale);

        Self::from_tensors(weight, Tensor::zeros(vec![1, out_features]))
    }

    /// Build a layer around existing weight `[in, out]` and bias `[1, out]` values
    pub fn from_tensors(weight: Tensor, bias: Tensor) -> Self {
        assert_eq!(weight.shape.len(), 2, "Weight must be 2D");
        let (in_features, out_features) = (weight.shape[0], weight.shape[1]);
        assert_eq!(bias.shape, vec![1, out_features], "Bias must have shape [1, out_features]");

        Linear {
            weight: weight.requires_grad(true),
            bias: bias.requires_grad(true),
            in_features,
            out_features,
        }
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Forward pass: y = xW + b
    pub fn forward(&self, input: &Tensor) -> Tensor {
        assert_eq!(input.shape[1], self.in_features, "Input feature mismatch");
        input.matmul(&self.weight).broadcast_add(&self.bias)
    }

    /// Handles to (weight, bias), sharing storage with the layer
    pub fn parameters(&self) -> Vec<Tensor> {
        vec![self.weight.clone(), self.bias.clone()]
    }
}

impl Layer for Linear {
    fn forward(&self, input: &Tensor) -> Tensor {
        self.forward(input)
    }

    fn parameters(&self) -> Vec<Tensor> {
        self.parameters()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_linear_shapes() {
        let layer = Linear::new_with_rng(3, 2, &mut StdRng::seed_from_u64(0));
        assert_eq!((layer.in_features(), layer.out_features()), (3, 2));
        let bound = (2.0f32 / 3.0).sqrt();
        assert!(layer.weight.data().iter().all(|w| w.abs() <= bound));
        assert_eq!(layer.bias.to_vec(), vec![0.0, 0.0]);

        let y = layer.forward(&Tensor::ones(vec![4, 3]));
        assert_eq!(y.shape, vec![4, 2]);
    }

    #[test]
    fn test_linear_forward_backward() {
        let layer = Linear::from_tensors(
            Tensor::new(vec![1.0, 0.0, 0.0, 1.0], vec![2, 2]),
            Tensor::new(vec![0.5, -0.5], vec![1, 2]),
        );
        let x = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
        assert_eq!(layer.in_features(), 2);
        let y = layer.forward(&x);
        assert_eq!(y.to_vec(), vec![1.5, 1.5, 3.5, 3.5]);

        y.sum().backward();
        // dW = x^T @ 1, db = column sums of 1
        assert_eq!(*layer.weight.grad.borrow(), vec![4.0, 4.0, 6.0, 6.0]);
        assert_eq!(*layer.bias.grad.borrow(), vec![2.0, 2.0]);
    }

    #[test]
    fn test_parameters_share_storage() {
        let layer = Linear::new(2, 1);
        let params = Layer::parameters(&layer);
        params[1].data_mut()[0] = 7.0;
        assert_eq!(layer.bias.to_vec(), vec![7.0]);
    }
}
