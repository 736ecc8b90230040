use std::path::PathBuf;

use crn_burn::{build_crn, CrnNetConfig};

use burn::{
    backend::NdArray,
    tensor::{Distribution, Tensor},
};
use tracing_subscriber::EnvFilter;

const FRAMES: usize = 100;
const BINS: usize = 128;

pub fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Optional pretrained snapshot (.pth or .bpk)
    let pretrain_path = std::env::args().nth(1).map(PathBuf::from);

    let device = Default::default();
    let model = CrnNetConfig::for_frequency_bins(BINS)
        .and_then(|config| {
            build_crn::<NdArray>(&device, pretrain_path.as_deref(), config.hidden_dim, 2)
        })
        .map_err(|err| format!("Failed to build the model.\nError: {err}"))
        .unwrap();

    // Synthetic noisy magnitude spectrogram [B, T, F]
    let noisy = Tensor::<NdArray, 3>::random(
        [1, FRAMES, BINS],
        Distribution::Uniform(0.0, 1.0),
        &device,
    );

    let enhanced = model.forward(noisy.clone());
    let dims = enhanced.dims();

    let gain = enhanced.sum().into_scalar() / noisy.sum().into_scalar();
    println!(
        "Input: {:?}\nOutput: {dims:?}\nEnergy ratio: {gain:.4}",
        [1, FRAMES, BINS],
    );
}
