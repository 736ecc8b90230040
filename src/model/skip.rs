use burn::tensor::{backend::Backend, Tensor};

/// Encoder activations kept for the decoder's skip connections.
///
/// Entries are stored shallowest first: index 0 is the output of the first encoder stage and
/// the last index is the bottleneck. The decoder reads them back deepest first through
/// [`SkipConnections::deepest_first`].
#[derive(Debug, Clone)]
pub struct SkipConnections<B: Backend> {
    activations: Vec<Tensor<B, 4>>,
    input_bins: usize,
}

/// One skip activation paired with the frequency size its decoder stage must produce.
#[derive(Debug, Clone)]
pub struct SkipStage<B: Backend> {
    pub activation: Tensor<B, 4>,
    pub target_bins: usize,
}

impl<B: Backend> SkipConnections<B> {
    /// Start an empty list for an encoder input with `input_bins` frequency bins.
    pub(crate) fn new(input_bins: usize) -> Self {
        Self {
            activations: Vec::new(),
            input_bins,
        }
    }

    /// Append the output of the next (deeper) encoder stage.
    pub(crate) fn push(&mut self, activation: Tensor<B, 4>) {
        self.activations.push(activation);
    }

    pub fn len(&self) -> usize {
        self.activations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activations.is_empty()
    }

    /// Activation of encoder stage `index`, 0 being the shallowest.
    pub fn get(&self, index: usize) -> Option<&Tensor<B, 4>> {
        self.activations.get(index)
    }

    /// Frequency bins of the encoder input.
    pub fn input_bins(&self) -> usize {
        self.input_bins
    }

    /// Frequency bins of every entry, shallowest first.
    pub fn frequency_bins(&self) -> Vec<usize> {
        self.activations.iter().map(|x| x.dims()[3]).collect()
    }

    /// Consume the list deepest first.
    ///
    /// The entry at index `i` is paired with the frequency size of the encoder stage input that
    /// produced it: the size of entry `i - 1`, or the encoder input size for `i == 0`. That is
    /// the exact size the mirrored decoder stage has to restore.
    pub fn deepest_first(self) -> impl Iterator<Item = SkipStage<B>> {
        let mut targets = Vec::with_capacity(self.activations.len());
        targets.push(self.input_bins);
        targets.extend(self.frequency_bins());

        self.activations
            .into_iter()
            .zip(targets)
            .rev()
            .map(|(activation, target_bins)| SkipStage {
                activation,
                target_bins,
            })
    }
}
