use burn::tensor::{backend::Backend, Tensor};

/// Prepend `steps` zeros along `dim`.
pub fn zero_pad_start<B: Backend>(input: Tensor<B, 4>, dim: usize, steps: usize) -> Tensor<B, 4> {
    if steps == 0 {
        return input;
    }
    let mut shape = input.dims();
    shape[dim] = steps;
    let zeros = Tensor::zeros(shape, &input.device());

    Tensor::cat(vec![zeros, input], dim)
}

/// Bring the frequency axis (last) to exactly `bins` entries.
///
/// A short axis gets zero bins prepended, a long one loses its trailing bins.
pub fn align_frequency<B: Backend>(input: Tensor<B, 4>, bins: usize) -> Tensor<B, 4> {
    let [_, _, _, current] = input.dims();
    if current < bins {
        zero_pad_start(input, 3, bins - current)
    } else if current > bins {
        input.narrow(3, 0, bins)
    } else {
        input
    }
}
