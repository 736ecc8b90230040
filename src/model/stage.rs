/// Channel depth at each encoder boundary: input, then the output of stages 1 to 5.
/// The decoder walks the same table backwards.
pub const ENCODER_CHANNELS: [usize; NUM_STAGES + 1] = [1, 16, 32, 64, 128, 256];

/// Number of encoder stages (and mirrored decoder stages).
pub const NUM_STAGES: usize = 5;

/// Kernel size `[time, frequency]` shared by every stage.
pub const KERNEL_SIZE: [usize; 2] = [2, 3];

/// Stride `[time, frequency]` shared by every stage.
pub const STRIDE: [usize; 2] = [1, 2];

/// Channel depth of the bottleneck fed to the recurrent stage.
pub const BOTTLENECK_CHANNELS: usize = ENCODER_CHANNELS[NUM_STAGES];

/// Shape parameters of one convolutional stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageConfig {
    pub channels_in: usize,
    pub channels_out: usize,
    pub kernel_size: [usize; 2],
    pub stride: [usize; 2],
}

/// Encoder stages, shallowest first (`1 -> 16`, ..., `128 -> 256`).
pub fn encoder_stages() -> [StageConfig; NUM_STAGES] {
    core::array::from_fn(|i| StageConfig {
        channels_in: ENCODER_CHANNELS[i],
        channels_out: ENCODER_CHANNELS[i + 1],
        kernel_size: KERNEL_SIZE,
        stride: STRIDE,
    })
}

/// Decoder stages, deepest first.
///
/// Stage `i` mirrors encoder stage `NUM_STAGES - 1 - i`. Its input carries twice the channels
/// of that encoder stage's output since the skip activation is concatenated to it.
pub fn decoder_stages() -> [StageConfig; NUM_STAGES] {
    core::array::from_fn(|i| {
        let mirrored = NUM_STAGES - 1 - i;
        StageConfig {
            channels_in: ENCODER_CHANNELS[mirrored + 1] * 2,
            channels_out: ENCODER_CHANNELS[mirrored],
            kernel_size: KERNEL_SIZE,
            stride: STRIDE,
        }
    })
}

/// Frequency bins after one encoder stage with the given frequency padding.
///
/// `None` when the padded axis is narrower than the kernel, which the convolution rejects.
pub fn downsampled_bins(bins: usize, padding: usize) -> Option<usize> {
    let [_, kernel] = KERNEL_SIZE;
    let [_, stride] = STRIDE;
    (bins + 2 * padding)
        .checked_sub(kernel)
        .map(|span| span / stride + 1)
}

/// Frequency bins after one decoder stage, before alignment to the mirrored encoder input.
///
/// The output padding equals the frequency padding, which undoes the rounding of
/// [`downsampled_bins`] for even inputs.
pub fn upsampled_bins(bins: usize, padding: usize) -> usize {
    let [_, kernel] = KERNEL_SIZE;
    let [_, stride] = STRIDE;
    // (bins - 1) * stride + kernel + output_padding - 2 * padding, output_padding == padding
    (bins - 1) * stride + kernel - padding
}

/// Frequency bins left at the bottleneck for an input with `bins` frequency bins.
///
/// `None` when some stage would receive fewer bins than its kernel covers.
pub fn bottleneck_bins(bins: usize, padding: usize) -> Option<usize> {
    (0..NUM_STAGES).try_fold(bins, |bins, _| downsampled_bins(bins, padding))
}
