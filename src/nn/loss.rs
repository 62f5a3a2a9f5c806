use crate::tensor::Tensor;

/// Mean Squared Error loss: mean((predictions - targets)^2)
pub fn mse_loss(predictions: &Tensor, targets: &Tensor) -> Tensor {
    predictions.sub(targets).pow(2.0).mean()
}
