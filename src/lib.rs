//! Convolutional recurrent network (CRN) for speech enhancement, built on Burn.
//!
//! The model maps a noisy magnitude spectrogram `[batch, time, frequency]` to an estimate of the
//! clean spectrogram with the same shape: a causal convolutional encoder, an LSTM over time at
//! the bottleneck, and a mirrored transposed-convolution decoder with skip connections.
//!
//! # Example
//!
//! ```ignore
//! use burn::backend::NdArray;
//! use crn_burn::build_crn;
//!
//! let device = Default::default();
//! // 128 frequency bins leave 4 bins at the bottleneck: hidden_dim = 256 * 4
//! let model = build_crn::<NdArray>(&device, Some("crn.pth".as_ref()), 1024, 2)?;
//! let enhanced = model.forward(noisy);
//! ```

pub mod checkpoint;
mod error;
pub mod model;

pub use error::{CrnError, Result};
pub use model::crn::{build_crn, CrnNet, CrnNetConfig};
pub use model::weights::{LoadReport, SnapshotFormat};
