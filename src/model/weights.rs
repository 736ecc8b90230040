use std::path::Path;

use burn::tensor::backend::Backend;
use burn_store::{ApplyResult, BurnpackStore, ModuleSnapshot, PytorchStore};
use tracing::{error, info};

use super::crn::CrnNet;
use crate::{
    checkpoint::{missing_parameters_message, unexpected_parameters_message},
    error::{CrnError, Result},
};

/// PyTorch batch norm step counters, which Burn's batch norm does not track.
const IGNORED_SUFFIX: &str = "num_batches_tracked";

/// Serialization format of a parameter snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    /// PyTorch `state_dict` pickle, keyed with the original PyTorch module names.
    Pytorch,
    /// Burn's native format, keyed with this crate's module paths.
    Burnpack,
}

impl SnapshotFormat {
    /// Pick the format from the file extension: `.bpk` is Burnpack, anything else PyTorch.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("bpk") => SnapshotFormat::Burnpack,
            _ => SnapshotFormat::Pytorch,
        }
    }
}

/// Outcome of a partial snapshot load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Model parameters initialized from the snapshot.
    pub applied: Vec<String>,
    /// Model parameters the snapshot did not provide; they keep their initial values.
    pub missing: Vec<String>,
    /// Snapshot entries no model parameter consumed.
    pub unexpected: Vec<String>,
}

impl LoadReport {
    fn from_result(result: ApplyResult) -> Self {
        let mut missing: Vec<String> = result.missing.into_iter().map(|(path, _)| path).collect();
        let mut unexpected: Vec<String> = result
            .unused
            .into_iter()
            .filter(|key| !key.ends_with(IGNORED_SUFFIX))
            .collect();
        missing.sort();
        unexpected.sort();

        Self {
            applied: result.applied,
            missing,
            unexpected,
        }
    }

    /// Whether every name matched on both sides.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }
}

/// Mapping of the original PyTorch module names onto this crate's module paths.
///
/// `nn.Sequential` indices: encoder stages are `[pad, conv, norm, act]`, decoder stages are
/// `[deconv, chomp, norm, act]` except stage 3, which has an extra pad in front of the chomp.
/// Patterns apply in order, each to the result of the previous ones.
///
/// Those checkpoints come from the unpadded layout, so the model must be configured with
/// `frequency_padding = 0` to reproduce their outputs.
const PYTORCH_KEY_MAPPINGS: [(&str, &str); 7] = [
    // DataParallel prefix
    ("^module\\.(.+)", "$1"),
    ("^en\\.en_module\\.([0-9]+)\\.1\\.(.+)", "encoder.blocks.$1.conv.$2"),
    ("^en\\.en_module\\.([0-9]+)\\.2\\.(.+)", "encoder.blocks.$1.norm.$2"),
    ("^de\\.de_module\\.([0-9]+)\\.0\\.(.+)", "decoder.blocks.$1.deconv.$2"),
    ("^de\\.de_module\\.3\\.3\\.(.+)", "decoder.blocks.3.norm.$1"),
    ("^de\\.de_module\\.([0-9]+)\\.2\\.(.+)", "decoder.blocks.$1.norm.$2"),
    // lstm.weight_ih_l0 -> lstm.layers.0.weight_ih
    (
        "^lstm\\.(weight|bias)_(ih|hh)_l([0-9]+)$",
        "lstm.layers.${3}.${1}_${2}",
    ),
];

impl<B: Backend> CrnNet<B> {
    /// Initialize parameters from the snapshot at `path`, tolerating name mismatches.
    ///
    /// Parameters absent from the snapshot keep their current values and snapshot entries
    /// without a matching parameter are ignored; both sets are logged and returned in the
    /// [report](LoadReport). Fails when the file cannot be opened, cannot be decoded, or a
    /// matched tensor has the wrong shape.
    ///
    /// PyTorch snapshots of the original CRN share every parameter shape with the default
    /// configuration and load completely, but they were trained without frequency padding.
    /// Build the model with `CrnNetConfig::new().with_frequency_padding(0)` before loading them.
    pub fn load_snapshot(&mut self, path: impl AsRef<Path>) -> Result<LoadReport> {
        let path = path.as_ref();

        if let Err(source) = std::fs::metadata(path) {
            error!("{} is not found! Please check this path.", path.display());
            return Err(CrnError::SnapshotNotFound {
                path: path.to_path_buf(),
                source,
            });
        }

        let format = SnapshotFormat::from_path(path);
        let result = match format {
            SnapshotFormat::Pytorch => {
                let mut store = PYTORCH_KEY_MAPPINGS.iter().fold(
                    PytorchStore::from_file(path).allow_partial(true),
                    |store, &(from, to)| store.with_key_remapping(from, to),
                );
                self.load_from(&mut store).map_err(|err| err.to_string())
            }
            SnapshotFormat::Burnpack => {
                let mut store = BurnpackStore::from_file(path).allow_partial(true);
                self.load_from(&mut store).map_err(|err| err.to_string())
            }
        };

        let result = result.map_err(|reason| {
            error!("State dict keys error! Please check the state dict: {reason}");
            CrnError::MalformedSnapshot {
                path: path.to_path_buf(),
                reason,
            }
        })?;

        if !result.errors.is_empty() {
            let errors: Vec<String> = result.errors.iter().map(|err| format!("{err:?}")).collect();
            error!(
                "{} tensors in {} do not fit the model",
                errors.len(),
                path.display()
            );
            return Err(CrnError::IncompatibleTensors {
                path: path.to_path_buf(),
                errors,
            });
        }

        let report = LoadReport::from_result(result);
        info!(
            "Loading pretrained model from {} ({format:?}, {} tensors applied)",
            path.display(),
            report.applied.len()
        );
        if !report.missing.is_empty() {
            info!("{}", missing_parameters_message(&report.missing));
        }
        if !report.unexpected.is_empty() {
            info!("{}", unexpected_parameters_message(&report.unexpected));
        }

        Ok(report)
    }

    /// Write every parameter to a Burnpack snapshot at `path`.
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut store = BurnpackStore::from_file(path);

        self.save_into(&mut store)
            .map_err(|err| CrnError::SnapshotWrite {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;
        info!("Saved model snapshot to {}", path.display());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::crn::CrnNetConfig;
    use burn::backend::NdArray;
    use burn::tensor::{Distribution, Tensor, Tolerance};

    type B = NdArray<f32>;

    // Small bottleneck: 32 input bins leave one bin, so hidden_dim = 256
    fn config(num_layers: usize) -> CrnNetConfig {
        CrnNetConfig::for_frequency_bins(32)
            .unwrap()
            .with_num_layers(num_layers)
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            SnapshotFormat::from_path(Path::new("crn.bpk")),
            SnapshotFormat::Burnpack
        );
        assert_eq!(
            SnapshotFormat::from_path(Path::new("crn.pth")),
            SnapshotFormat::Pytorch
        );
        assert_eq!(
            SnapshotFormat::from_path(Path::new("crn")),
            SnapshotFormat::Pytorch
        );
    }

    #[test]
    fn missing_file_keeps_io_error() {
        let device = Default::default();
        let mut model = config(1).init::<B>(&device);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.pth");

        let err = model.load_snapshot(&path).unwrap_err();

        match err {
            CrnError::SnapshotNotFound { path: p, source } => {
                assert_eq!(p, path);
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn complete_snapshot_round_trip() {
        let device = Default::default();
        let model = config(1).init::<B>(&device);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crn.bpk");
        model.save_snapshot(&path).unwrap();

        let mut loaded = config(1).init::<B>(&device);
        let report = loaded.load_snapshot(&path).unwrap();

        assert!(report.is_complete());
        assert!(!report.applied.is_empty());

        let x = Tensor::<B, 3>::random([1, 4, 32], Distribution::Normal(0.0, 1.0), &device);
        model
            .forward(x.clone())
            .into_data()
            .assert_approx_eq(
                &loaded.forward(x).into_data(),
                Tolerance::<f32>::rel_abs(1e-5, 1e-5),
            );
    }

    #[test]
    fn superset_snapshot_reports_unexpected() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep.bpk");
        config(2).init::<B>(&device).save_snapshot(&path).unwrap();

        let mut model = config(1).init::<B>(&device);
        let report = model.load_snapshot(&path).unwrap();

        assert!(report.missing.is_empty());
        assert_eq!(
            report.unexpected,
            vec![
                "lstm.layers.1.bias_hh",
                "lstm.layers.1.bias_ih",
                "lstm.layers.1.weight_hh",
                "lstm.layers.1.weight_ih",
            ]
        );
    }

    #[test]
    fn subset_snapshot_reports_missing() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shallow.bpk");
        config(1).init::<B>(&device).save_snapshot(&path).unwrap();

        let mut model = config(2).init::<B>(&device);
        let report = model.load_snapshot(&path).unwrap();

        assert!(report.unexpected.is_empty());
        assert_eq!(
            report.missing,
            vec![
                "lstm.layers.1.bias_hh",
                "lstm.layers.1.bias_ih",
                "lstm.layers.1.weight_hh",
                "lstm.layers.1.weight_ih",
            ]
        );
    }

    /// Parameter names of the PyTorch CRN `state_dict`, in its registration order.
    fn pytorch_state_dict_keys(num_layers: usize) -> Vec<String> {
        let norm = ["weight", "bias", "running_mean", "running_var", "num_batches_tracked"];
        let mut keys = vec![];

        for i in 0..5 {
            keys.extend(["weight", "bias"].map(|p| format!("en.en_module.{i}.1.{p}")));
            keys.extend(norm.map(|p| format!("en.en_module.{i}.2.{p}")));
        }
        for k in 0..num_layers {
            for p in ["weight_ih", "weight_hh", "bias_ih", "bias_hh"] {
                keys.push(format!("lstm.{p}_l{k}"));
            }
        }
        for i in 0..5 {
            let norm_index = if i == 3 { 3 } else { 2 };
            keys.extend(["weight", "bias"].map(|p| format!("de.de_module.{i}.0.{p}")));
            keys.extend(norm.map(|p| format!("de.de_module.{i}.{norm_index}.{p}")));
        }
        keys
    }

    /// Apply the key mappings the way the PyTorch store does, then the batch norm renames
    /// (`weight` -> `gamma`, `bias` -> `beta`) of its Burn adapter.
    fn remap(key: &str) -> String {
        let key = PYTORCH_KEY_MAPPINGS.iter().fold(key.to_string(), |key, (from, to)| {
            regex::Regex::new(from)
                .unwrap()
                .replace_all(&key, *to)
                .into_owned()
        });
        match key.rsplit_once('.') {
            Some((module, "weight")) if module.ends_with(".norm") => format!("{module}.gamma"),
            Some((module, "bias")) if module.ends_with(".norm") => format!("{module}.beta"),
            _ => key,
        }
    }

    #[test]
    fn pytorch_keys_land_on_module_paths() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crn.bpk");
        config(2).init::<B>(&device).save_snapshot(&path).unwrap();
        let mut module_paths = config(2)
            .init::<B>(&device)
            .load_snapshot(&path)
            .unwrap()
            .applied;
        module_paths.sort();

        for prefix in ["", "module."] {
            let mut remapped: Vec<String> = pytorch_state_dict_keys(2)
                .iter()
                .filter(|key| !key.ends_with(IGNORED_SUFFIX))
                .map(|key| remap(&format!("{prefix}{key}")))
                .collect();
            remapped.sort();

            assert_eq!(remapped, module_paths);
        }

        assert_eq!(remap("de.de_module.3.3.weight"), "decoder.blocks.3.norm.gamma");
        assert_eq!(remap("de.de_module.3.3.running_var"), "decoder.blocks.3.norm.running_var");
        assert_eq!(remap("de.de_module.2.2.bias"), "decoder.blocks.2.norm.beta");
        assert_eq!(remap("de.de_module.3.0.weight"), "decoder.blocks.3.deconv.weight");
        assert_eq!(remap("en.en_module.4.2.weight"), "encoder.blocks.4.norm.gamma");
        assert_eq!(remap("module.lstm.weight_ih_l1"), "lstm.layers.1.weight_ih");
        assert_eq!(remap("lstm.bias_hh_l0"), "lstm.layers.0.bias_hh");
    }

    #[test]
    fn garbage_snapshot_is_malformed() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.pth");
        std::fs::write(&path, b"not a pickle").unwrap();

        let mut model = config(1).init::<B>(&device);
        let err = model.load_snapshot(&path).unwrap_err();

        assert!(matches!(err, CrnError::MalformedSnapshot { .. }));
    }
}
