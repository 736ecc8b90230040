use burn::{
    module::Module,
    tensor::{self, backend::Backend, Tensor},
};

/// Exponential linear unit with `alpha = 1`.
#[derive(Module, Debug, Clone, Default)]
pub struct Elu {}
impl Elu {
    pub fn forward<B: Backend, const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        // x for x > 0, exp(x) - 1 otherwise
        let negative = input.clone().clamp_max(0.0).exp().sub_scalar(1.0);
        tensor::activation::relu(input) + negative
    }
}

/// Inputs above this value pass through softplus unchanged.
const SOFTPLUS_THRESHOLD: f64 = 20.0;

/// Softplus with `beta = 1`, a smooth non-negative output activation.
///
/// Linear above [`SOFTPLUS_THRESHOLD`], where `ln(1 + e^x)` equals `x` to float precision and
/// `e^x` would overflow.
#[derive(Module, Debug, Clone, Default)]
pub struct Softplus {}
impl Softplus {
    pub fn forward<B: Backend, const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        let linear = input.clone().greater_elem(SOFTPLUS_THRESHOLD);
        // Clamped so the masked-out branch stays finite for the backward pass too
        let smooth =
            tensor::activation::softplus(input.clone().clamp_max(SOFTPLUS_THRESHOLD), 1.0);
        smooth.mask_where(linear, input)
    }
}

/// Nonlinearity closing a convolutional stage.
#[derive(Module, Debug, Clone)]
pub enum Activation {
    Elu(Elu),
    Softplus(Softplus),
}

impl Activation {
    pub fn forward<B: Backend, const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Activation::Elu(act) => act.forward(input),
            Activation::Softplus(act) => act.forward(input),
        }
    }
}
