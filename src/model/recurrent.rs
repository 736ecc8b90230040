use burn::{
    config::Config,
    module::{Module, Param},
    nn::Initializer,
    tensor::{activation::sigmoid, backend::Backend, Device, Tensor},
};

/// One LSTM layer with the four gates packed in a single matrix.
///
/// Gate rows are ordered input, forget, cell, output, which is the layout of PyTorch
/// `nn.LSTM` parameters (`weight_ih_l{k}`, `weight_hh_l{k}`, `bias_ih_l{k}`, `bias_hh_l{k}`).
#[derive(Module, Debug)]
pub struct LstmLayer<B: Backend> {
    /// `[4 * d_hidden, d_input]`
    pub(crate) weight_ih: Param<Tensor<B, 2>>,
    /// `[4 * d_hidden, d_hidden]`
    weight_hh: Param<Tensor<B, 2>>,
    bias_ih: Param<Tensor<B, 1>>,
    bias_hh: Param<Tensor<B, 1>>,
    d_hidden: usize,
}

impl<B: Backend> LstmLayer<B> {
    /// Run the layer over a `[batch, seq, d_input]` sequence starting from a zero state.
    ///
    /// Returns the hidden state at every step, `[batch, seq, d_hidden]`.
    pub fn forward(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        let device = input.device();
        let [batch_size, seq_length, d_input] = input.dims();
        let d_gates = 4 * self.d_hidden;

        // Input projection of all steps at once, both biases folded in
        let bias = (self.bias_ih.val() + self.bias_hh.val()).unsqueeze::<2>();
        let projected = input
            .reshape([batch_size * seq_length, d_input])
            .matmul(self.weight_ih.val().transpose())
            .add(bias)
            .reshape([batch_size, seq_length, d_gates]);
        let weight_hh = self.weight_hh.val().transpose();

        let mut hidden = Tensor::<B, 2>::zeros([batch_size, self.d_hidden], &device);
        let mut cell = Tensor::<B, 2>::zeros([batch_size, self.d_hidden], &device);
        let mut outputs = Vec::with_capacity(seq_length);

        for t in 0..seq_length {
            let gates = projected
                .clone()
                .narrow(1, t, 1)
                .reshape([batch_size, d_gates])
                + hidden.matmul(weight_hh.clone());

            let gate = |k: usize| gates.clone().narrow(1, k * self.d_hidden, self.d_hidden);
            let i = sigmoid(gate(0));
            let f = sigmoid(gate(1));
            let g = gate(2).tanh();
            let o = sigmoid(gate(3));

            cell = f * cell + i * g;
            hidden = o * cell.clone().tanh();
            outputs.push(hidden.clone());
        }

        Tensor::stack(outputs, 1)
    }
}

/// Stack of LSTM layers run batch-first over the time axis.
///
/// Every call starts from zero hidden and cell states and the final states are dropped, so no
/// information is carried between calls.
#[derive(Module, Debug)]
pub struct StackedLstm<B: Backend> {
    pub(crate) layers: Vec<LstmLayer<B>>,
}

impl<B: Backend> StackedLstm<B> {
    /// `[batch, seq, d_input]` -> `[batch, seq, d_hidden]`
    pub fn forward(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        self.layers
            .iter()
            .fold(input, |x, layer| layer.forward(x))
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}

/// [Stacked LSTM](StackedLstm) configuration.
#[derive(Config, Debug)]
pub struct StackedLstmConfig {
    pub d_input: usize,
    pub d_hidden: usize,
    #[config(default = "1")]
    pub num_layers: usize,
}

impl StackedLstmConfig {
    /// Initialize the layers with `U(-1/sqrt(d_hidden), 1/sqrt(d_hidden))` weights and biases.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> StackedLstm<B> {
        let bound = 1.0 / (self.d_hidden as f64).sqrt();
        let initializer = Initializer::Uniform {
            min: -bound,
            max: bound,
        };
        let d_gates = 4 * self.d_hidden;

        let layers = (0..self.num_layers)
            .map(|k| {
                let d_input = if k == 0 { self.d_input } else { self.d_hidden };
                LstmLayer {
                    weight_ih: initializer.init([d_gates, d_input], device),
                    weight_hh: initializer.init([d_gates, self.d_hidden], device),
                    bias_ih: initializer.init([d_gates], device),
                    bias_hh: initializer.init([d_gates], device),
                    d_hidden: self.d_hidden,
                }
            })
            .collect();

        StackedLstm { layers }
    }
}
