use burn::{
    config::Config,
    module::Module,
    tensor::{backend::Backend, Tensor},
};

/// Removes the trailing time steps a transposed convolution adds past the input length.
///
/// Operates on `[batch, channel, time, frequency]` activations and leaves every other axis
/// untouched.
#[derive(Module, Clone, Debug)]
pub struct Chomp {
    size: usize,
}

impl Chomp {
    /// Trim the last `size` time steps.
    ///
    /// # Panics
    ///
    /// If the time axis is shorter than the trim size.
    pub fn forward<B: Backend>(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, time, _] = input.dims();
        assert!(
            time >= self.size,
            "Cannot trim {} steps from a time axis of length {time}",
            self.size
        );

        input.narrow(2, 0, time - self.size)
    }
}

/// [Chomp](Chomp) configuration.
#[derive(Config, Debug)]
pub struct ChompConfig {
    #[config(default = "1")]
    pub size: usize,
}

impl ChompConfig {
    pub fn init(&self) -> Chomp {
        Chomp { size: self.size }
    }
}
