use std::path::Path;

use burn::{
    config::Config,
    module::Module,
    tensor::{backend::Backend, Device, Tensor},
};
use tracing::debug;

use super::{
    decoder::{Decoder, DecoderConfig},
    encoder::{Encoder, EncoderConfig},
    recurrent::{StackedLstm, StackedLstmConfig},
    stage::{self, BOTTLENECK_CHANNELS},
};
use crate::error::{self, CrnError};

/// Convolutional recurrent network for spectrogram enhancement.
///
/// A five stage convolutional encoder compresses the frequency axis, an LSTM runs over time at
/// the bottleneck, and a mirrored transposed-convolution decoder restores the input resolution
/// with skip connections from the encoder. The time axis is never resampled and every
/// convolution is causal in time.
#[derive(Module, Debug)]
pub struct CrnNet<B: Backend> {
    encoder: Encoder<B>,
    lstm: StackedLstm<B>,
    decoder: Decoder<B>,
}

impl<B: Backend> CrnNet<B> {
    /// Enhance a `[batch, time, frequency]` magnitude spectrogram.
    ///
    /// The output has the input shape and is element-wise non-negative. The frequency axis
    /// must leave `hidden_dim / 256` bins at the bottleneck (see
    /// [`CrnNetConfig::bottleneck_bins`]).
    pub fn forward(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch_size, seq_length, bins] = input.dims();

        // [B, T, F] -> [B, 1, T, F]
        let x = input.unsqueeze_dim::<4>(1);
        let (x, skips) = self.encoder.forward(x);
        debug!("bottleneck: {:?}, skips: {:?}", x.dims(), skips.frequency_bins());

        let [_, channels, _, bottleneck_bins] = x.dims();
        let x = flatten_bottleneck(x);
        let x = self.lstm.forward(x);
        let x = unflatten_bottleneck(x, channels, bottleneck_bins);

        let x = self.decoder.forward(x, skips);

        // [B, 1, T, F] -> [B, T, F]
        x.reshape([batch_size, seq_length, bins])
    }
}

/// `[batch, channels, time, bins]` -> `[batch, time, channels * bins]`
fn flatten_bottleneck<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 3> {
    let [batch_size, channels, seq_length, bins] = x.dims();
    x.swap_dims(1, 2)
        .reshape([batch_size, seq_length, channels * bins])
}

/// Inverse of [`flatten_bottleneck`].
fn unflatten_bottleneck<B: Backend>(x: Tensor<B, 3>, channels: usize, bins: usize) -> Tensor<B, 4> {
    let [batch_size, seq_length, _] = x.dims();
    x.reshape([batch_size, seq_length, channels, bins])
        .swap_dims(1, 2)
}

/// [CRN](CrnNet) configuration.
#[derive(Config, Debug)]
pub struct CrnNetConfig {
    /// LSTM width. Must equal `256 * bottleneck bins` of the inputs the model is fed.
    #[config(default = "1024")]
    pub hidden_dim: usize,

    #[config(default = "2")]
    pub num_layers: usize,

    /// Zero padding on each side of the frequency axis in every (transposed) convolution.
    ///
    /// With 1 each stage exactly halves an even frequency axis, so inputs with a multiple of
    /// 32 bins round-trip without correction. With 0 the stages follow plain strided
    /// convolution arithmetic (161 -> 80 -> 39 -> 19 -> 9 -> 4) and the decoder realigns odd
    /// sizes.
    #[config(default = "1")]
    pub frequency_padding: usize,
}

impl CrnNetConfig {
    /// Configuration with `hidden_dim` sized for inputs with `bins` frequency bins.
    ///
    /// Fails when the frequency axis is too narrow to survive the five encoder stages.
    pub fn for_frequency_bins(bins: usize) -> error::Result<Self> {
        let config = Self::new();
        let bottleneck_bins = config.bottleneck_bins(bins).ok_or_else(|| {
            CrnError::InvalidConfig(format!(
                "{bins} frequency bins are too few for {} encoder stages",
                stage::NUM_STAGES
            ))
        })?;
        Ok(config.with_hidden_dim(BOTTLENECK_CHANNELS * bottleneck_bins))
    }

    /// Frequency bins left after the encoder for an input with `bins` frequency bins.
    ///
    /// `None` when some encoder stage would receive fewer bins than its kernel covers.
    pub fn bottleneck_bins(&self, bins: usize) -> Option<usize> {
        stage::bottleneck_bins(bins, self.frequency_padding)
    }

    /// Check the configuration can produce a working model.
    pub fn validate(&self) -> error::Result<()> {
        if self.hidden_dim == 0 || self.hidden_dim % BOTTLENECK_CHANNELS != 0 {
            return Err(CrnError::InvalidConfig(format!(
                "hidden_dim must be a positive multiple of {BOTTLENECK_CHANNELS}, got {}",
                self.hidden_dim
            )));
        }
        if self.num_layers == 0 {
            return Err(CrnError::InvalidConfig(
                "num_layers must be at least 1".to_string(),
            ));
        }
        if self.frequency_padding > 1 {
            return Err(CrnError::InvalidConfig(format!(
                "frequency_padding must be 0 or 1, got {}",
                self.frequency_padding
            )));
        }
        Ok(())
    }

    /// Initialize a new [CRN](CrnNet) module with freshly initialized parameters.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> CrnNet<B> {
        CrnNet {
            encoder: EncoderConfig::new()
                .with_frequency_padding(self.frequency_padding)
                .init(device),
            lstm: StackedLstmConfig::new(self.hidden_dim, self.hidden_dim)
                .with_num_layers(self.num_layers)
                .init(device),
            decoder: DecoderConfig::new()
                .with_frequency_padding(self.frequency_padding)
                .init(device),
        }
    }

    /// Validate the configuration, create the model on `device` and, when a path is given,
    /// initialize it from that snapshot.
    pub fn build<B: Backend>(
        &self,
        device: &Device<B>,
        pretrain_path: Option<&Path>,
    ) -> error::Result<CrnNet<B>> {
        self.validate()?;
        let mut model = self.init(device);

        if let Some(path) = pretrain_path {
            model.load_snapshot(path)?;
        }

        Ok(model)
    }
}

/// Build a CRN on `device`, optionally initialized from a pretrained snapshot.
///
/// # Arguments
///
/// * `device` - Device to create the module on.
/// * `pretrain_path` - PyTorch (`.pt`, `.pth`) or Burnpack (`.bpk`) snapshot to load. Names
///   that exist on one side only are logged and skipped.
/// * `hidden_dim` - LSTM width, `256 * bottleneck bins`.
/// * `num_layers` - Number of stacked LSTM layers.
///
/// # Returns
///
/// The model, or an error when the configuration is invalid or the snapshot cannot be opened
/// or decoded.
///
/// # PyTorch checkpoints
///
/// This uses the default `frequency_padding = 1`. Checkpoints trained with the PyTorch CRN use
/// unpadded convolutions, for example on 161 bins, and load with identical parameter shapes
/// but only give matching outputs in the unpadded layout:
///
/// ```ignore
/// let model = CrnNetConfig::new()
///     .with_frequency_padding(0)
///     .build::<B>(&device, Some(Path::new("crn.pth")))?;
/// ```
pub fn build_crn<B: Backend>(
    device: &Device<B>,
    pretrain_path: Option<&Path>,
    hidden_dim: usize,
    num_layers: usize,
) -> error::Result<CrnNet<B>> {
    CrnNetConfig::new()
        .with_hidden_dim(hidden_dim)
        .with_num_layers(num_layers)
        .build(device, pretrain_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::{Distribution, TensorData, Tolerance};

    type B = NdArray<f32>;

    #[test]
    fn preserves_input_shape() {
        let device = Default::default();
        let model = build_crn::<B>(&device, None, 1024, 2).unwrap();
        let x = Tensor::<B, 3>::random([2, 50, 128], Distribution::Uniform(0.0, 1.0), &device);

        let (_, skips) = model.encoder.forward(x.clone().unsqueeze_dim::<4>(1));
        assert_eq!(skips.frequency_bins(), vec![64, 32, 16, 8, 4]);

        let out = model.forward(x);
        assert_eq!(out.dims(), [2, 50, 128]);

        let values = out.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn unpadded_layout_round_trips_161_bins() {
        let device = Default::default();
        let config = CrnNetConfig::new().with_frequency_padding(0);
        assert_eq!(config.bottleneck_bins(161), Some(4));

        let model = config.build::<B>(&device, None).unwrap();
        let x = Tensor::<B, 3>::random([1, 7, 161], Distribution::Uniform(0.0, 1.0), &device);

        assert_eq!(model.forward(x).dims(), [1, 7, 161]);
    }

    #[test]
    fn sizes_hidden_dim_from_bins() {
        let hidden_dim = |bins| CrnNetConfig::for_frequency_bins(bins).unwrap().hidden_dim;
        assert_eq!(hidden_dim(128), 1024);
        assert_eq!(hidden_dim(256), 2048);
        assert_eq!(hidden_dim(32), 256);
    }

    #[test]
    fn rejects_too_few_frequency_bins() {
        assert_eq!(CrnNetConfig::new().bottleneck_bins(0), None);
        assert_eq!(
            CrnNetConfig::new().with_frequency_padding(0).bottleneck_bins(20),
            None
        );
        assert!(matches!(
            CrnNetConfig::for_frequency_bins(0),
            Err(CrnError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_invalid_config() {
        let device = Default::default();

        for config in [
            CrnNetConfig::new().with_hidden_dim(1000),
            CrnNetConfig::new().with_hidden_dim(0),
            CrnNetConfig::new().with_num_layers(0),
            CrnNetConfig::new().with_frequency_padding(2),
        ] {
            let result = config.build::<B>(&device, None);
            assert!(matches!(result, Err(CrnError::InvalidConfig(_))));
        }
    }

    #[test]
    fn missing_snapshot_aborts_build() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crn.pth");

        let result = build_crn::<B>(&device, Some(&path), 256, 1);

        let err = result.unwrap_err();
        assert!(matches!(err, CrnError::SnapshotNotFound { .. }));
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.downcast_ref::<std::io::Error>().is_some());
    }

    #[test]
    fn bottleneck_reshape_round_trips() {
        let device = Default::default();
        let x = Tensor::<B, 4>::random([2, 3, 5, 4], Distribution::Normal(0.0, 1.0), &device);

        let seq = flatten_bottleneck(x.clone());
        assert_eq!(seq.dims(), [2, 5, 12]);

        // Features of one frame are channel-major
        let frame = seq.clone().narrow(1, 1, 1).reshape([2, 3, 4]);
        let expected = x.clone().narrow(2, 1, 1).reshape([2, 3, 4]);
        frame
            .into_data()
            .assert_approx_eq(&expected.into_data(), Tolerance::<f32>::rel_abs(1e-6, 1e-6));

        let back = unflatten_bottleneck(seq, 3, 4);
        back.into_data().assert_eq(&x.into_data(), true);
    }

    #[test]
    fn is_deterministic() {
        let device = Default::default();
        let model = CrnNetConfig::for_frequency_bins(64)
            .unwrap()
            .init::<B>(&device);
        let x = Tensor::<B, 3>::random([1, 6, 64], Distribution::Uniform(0.0, 1.0), &device);

        let a = model.forward(x.clone()).into_data();
        let b = model.forward(x).into_data();

        a.assert_eq(&b, true);
    }

    #[test]
    fn gradients_reach_every_stage() {
        type AB = Autodiff<NdArray<f32>>;
        let device = Default::default();
        let model = CrnNetConfig::for_frequency_bins(32)
            .unwrap()
            .with_num_layers(1)
            .init::<AB>(&device);
        let x = Tensor::<AB, 3>::random([2, 3, 32], Distribution::Uniform(0.0, 1.0), &device)
            .require_grad();

        let grads = model.forward(x.clone()).sum().backward();

        let grad = x.grad(&grads).expect("input gradient");
        assert_eq!(grad.dims(), [2, 3, 32]);
        let zeros = TensorData::zeros::<f32, _>([2, 3, 32]);
        assert_ne!(grad.into_data(), zeros);

        // The recurrent bottleneck and the deepest decoder stage both sit on the output path
        let grad = model.lstm.layers[0]
            .weight_ih
            .grad(&grads)
            .expect("lstm gradient");
        let zeros = TensorData::zeros::<f32, _>(grad.dims());
        assert_ne!(grad.into_data(), zeros);

        let grad = model.decoder.blocks[0]
            .deconv
            .weight
            .grad(&grads)
            .expect("decoder gradient");
        let zeros = TensorData::zeros::<f32, _>(grad.dims());
        assert_ne!(grad.into_data(), zeros);
    }
}
