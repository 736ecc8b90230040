use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d,
    },
    tensor::{backend::Backend, Device, Tensor},
};

use super::{
    activation::Elu,
    pad::zero_pad_start,
    skip::SkipConnections,
    stage::{encoder_stages, StageConfig},
};

/// Causal pad -> Conv2d -> BatchNorm -> ELU.
///
/// The single time step of zero padding in front of the time axis compensates the time kernel
/// of 2, so the block keeps the time length and only looks at the current and previous frame.
#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B>,
    activation: Elu,
}

impl<B: Backend> EncoderBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = zero_pad_start(x, 2, 1);
        let x = self.conv.forward(x);
        let x = self.norm.forward(x);
        self.activation.forward(x)
    }
}

/// [Encoder block](EncoderBlock) configuration.
pub struct EncoderBlockConfig {
    conv: Conv2dConfig,
    norm: BatchNormConfig,
}

impl EncoderBlockConfig {
    /// Create the block configuration of one encoder stage.
    pub fn new(stage: StageConfig, frequency_padding: usize) -> Self {
        let conv = Conv2dConfig::new([stage.channels_in, stage.channels_out], stage.kernel_size)
            .with_stride(stage.stride)
            .with_padding(PaddingConfig2d::Explicit(0, frequency_padding));
        let norm = BatchNormConfig::new(stage.channels_out);

        Self { conv, norm }
    }

    /// Initialize a new [encoder block](EncoderBlock) module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> EncoderBlock<B> {
        EncoderBlock {
            conv: self.conv.init(device),
            norm: self.norm.init(device),
            activation: Elu::default(),
        }
    }
}

/// Downsampling half of the network.
///
/// Takes a `[batch, 1, time, frequency]` spectrogram through five blocks, each halving the
/// frequency axis, and returns the bottleneck together with every block output for the skip
/// connections.
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    blocks: Vec<EncoderBlock<B>>,
}

impl<B: Backend> Encoder<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> (Tensor<B, 4>, SkipConnections<B>) {
        let [_, _, _, bins] = input.dims();
        let mut skips = SkipConnections::new(bins);

        let mut x = input;
        for block in &self.blocks {
            x = block.forward(x);
            skips.push(x.clone());
        }

        (x, skips)
    }
}

/// [Encoder](Encoder) configuration.
#[derive(Config, Debug)]
pub struct EncoderConfig {
    /// Zero padding on each side of the frequency axis in every convolution.
    #[config(default = "1")]
    pub frequency_padding: usize,
}

impl EncoderConfig {
    pub fn init<B: Backend>(&self, device: &Device<B>) -> Encoder<B> {
        let blocks = encoder_stages()
            .into_iter()
            .map(|stage| EncoderBlockConfig::new(stage, self.frequency_padding).init(device))
            .collect();

        Encoder { blocks }
    }
}
