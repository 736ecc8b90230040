use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{ConvTranspose2d, ConvTranspose2dConfig},
        BatchNorm, BatchNormConfig,
    },
    tensor::{backend::Backend, Device, Tensor},
};
use tracing::debug;

use super::{
    activation::{Activation, Elu, Softplus},
    chomp::{Chomp, ChompConfig},
    pad::align_frequency,
    skip::{SkipConnections, SkipStage},
    stage::{decoder_stages, StageConfig, NUM_STAGES},
};

/// Skip concat -> ConvTranspose2d -> Chomp -> frequency alignment -> BatchNorm -> activation.
#[derive(Module, Debug)]
pub struct DecoderBlock<B: Backend> {
    pub(crate) deconv: ConvTranspose2d<B>,
    chomp: Chomp,
    norm: BatchNorm<B>,
    activation: Activation,
}

impl<B: Backend> DecoderBlock<B> {
    /// Upsample `x` together with its skip activation.
    ///
    /// The transposed convolution outputs one extra time step, removed by the chomp. The
    /// frequency axis is then aligned to `skip.target_bins`, which only changes anything when
    /// the encoder rounded an odd size down.
    pub fn forward(&self, x: Tensor<B, 4>, skip: SkipStage<B>) -> Tensor<B, 4> {
        let x = Tensor::cat(vec![x, skip.activation], 1);
        let x = self.deconv.forward(x);
        let x = self.chomp.forward(x);
        let x = align_frequency(x, skip.target_bins);
        let x = self.norm.forward(x);
        self.activation.forward(x)
    }
}

/// [Decoder block](DecoderBlock) configuration.
pub struct DecoderBlockConfig {
    deconv: ConvTranspose2dConfig,
    chomp: ChompConfig,
    norm: BatchNormConfig,
    last: bool,
}

impl DecoderBlockConfig {
    /// Create the block configuration of one decoder stage.
    ///
    /// The output padding matches the frequency padding so that a stage exactly doubles an
    /// even frequency axis. The last stage closes with a softplus instead of an ELU.
    pub fn new(stage: StageConfig, frequency_padding: usize, last: bool) -> Self {
        let deconv =
            ConvTranspose2dConfig::new([stage.channels_in, stage.channels_out], stage.kernel_size)
                .with_stride(stage.stride)
                .with_padding([0, frequency_padding])
                .with_padding_out([0, frequency_padding]);
        let chomp = ChompConfig::new().with_size(1);
        let norm = BatchNormConfig::new(stage.channels_out);

        Self {
            deconv,
            chomp,
            norm,
            last,
        }
    }

    /// Initialize a new [decoder block](DecoderBlock) module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> DecoderBlock<B> {
        let activation = if self.last {
            Activation::Softplus(Softplus::default())
        } else {
            Activation::Elu(Elu::default())
        };

        DecoderBlock {
            deconv: self.deconv.init(device),
            chomp: self.chomp.init(),
            norm: self.norm.init(device),
            activation,
        }
    }
}

/// Upsampling half of the network.
///
/// Walks the skip connections deepest first, doubling the frequency axis and halving the
/// channels at every block, down to a single non-negative output channel.
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    pub(crate) blocks: Vec<DecoderBlock<B>>,
}

impl<B: Backend> Decoder<B> {
    /// `[batch, 256, time, bins]` bottleneck -> `[batch, 1, time, frequency]`.
    pub fn forward(&self, x: Tensor<B, 4>, skips: SkipConnections<B>) -> Tensor<B, 4> {
        self.stages(x.clone(), skips).last().unwrap_or(x)
    }

    /// Same as [`forward`](Self::forward), keeping the output of every block.
    pub fn forward_stages(&self, x: Tensor<B, 4>, skips: SkipConnections<B>) -> Vec<Tensor<B, 4>> {
        self.stages(x, skips).collect()
    }

    /// Lazily run the blocks, yielding each block output.
    fn stages(
        &self,
        x: Tensor<B, 4>,
        skips: SkipConnections<B>,
    ) -> impl Iterator<Item = Tensor<B, 4>> + '_ {
        self.blocks
            .iter()
            .zip(skips.deepest_first())
            .enumerate()
            .scan(x, |x, (i, (block, skip))| {
                let out = block.forward(x.clone(), skip);
                debug!("decoder stage {i}: {:?}", out.dims());
                *x = out.clone();
                Some(out)
            })
    }
}

/// [Decoder](Decoder) configuration.
#[derive(Config, Debug)]
pub struct DecoderConfig {
    /// Zero padding on each side of the frequency axis, mirrored from the encoder.
    #[config(default = "1")]
    pub frequency_padding: usize,
}

impl DecoderConfig {
    pub fn init<B: Backend>(&self, device: &Device<B>) -> Decoder<B> {
        let blocks = decoder_stages()
            .into_iter()
            .enumerate()
            .map(|(i, stage)| {
                DecoderBlockConfig::new(stage, self.frequency_padding, i == NUM_STAGES - 1)
                    .init(device)
            })
            .collect();

        Decoder { blocks }
    }
}
