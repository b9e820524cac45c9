//! Checkpoints and partial weight transfer.
//!
//! A [`Checkpoint`] is a mapping from parameter name to tensor value,
//! persisted as a safetensors file. [`Checkpoint::transfer_into`] installs a
//! checkpoint into a target network non-strictly: every name present in both
//! sides with an identical shape is copied, everything else is left at the
//! target's current (freshly initialized) value. Skips are reported, never
//! fatal — the engine is name-and-shape-driven, not tied to any particular
//! layer layout.

use crate::core::error::{Error, Result};
use crate::core::types::ParamId;
use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// A named-tensor snapshot of a network's learnable parameters.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    tensors: HashMap<String, Tensor>,
}

/// Why a source parameter was not copied into the target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// The target network has no parameter with this name.
    MissingInTarget,
    /// Both sides have the name, but the tensor shapes disagree.
    ShapeMismatch {
        source: Vec<usize>,
        target: Vec<usize>,
    },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingInTarget => write!(f, "missing in target"),
            SkipReason::ShapeMismatch { source, target } => {
                write!(f, "shape mismatch: source {source:?} vs target {target:?}")
            }
        }
    }
}

/// A source parameter left out of a transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedParam {
    pub name: String,
    pub reason: SkipReason,
}

/// Outcome of one partial weight transfer.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TransferReport {
    /// Names copied into the target, in layer order.
    pub copied: Vec<String>,
    /// Source names skipped, with reasons.
    pub skipped: Vec<SkippedParam>,
}

impl Checkpoint {
    /// Build a checkpoint from an explicit name → tensor mapping.
    pub fn from_tensors(tensors: HashMap<String, Tensor>) -> Self {
        Self { tensors }
    }

    /// Snapshot a network's current parameter values.
    ///
    /// The tensors are materialized into fresh storage so later optimizer
    /// steps do not bleed into the snapshot.
    pub fn capture(vars: &VarMap) -> Result<Self> {
        let data = vars.data().lock().unwrap();
        let mut tensors = HashMap::with_capacity(data.len());
        for (name, var) in data.iter() {
            tensors.insert(name.clone(), var.as_tensor().affine(1.0, 0.0)?);
        }
        Ok(Self { tensors })
    }

    /// Read a checkpoint from a safetensors file.
    pub fn load(path: impl AsRef<Path>, device: &Device) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::CheckpointMissing(path.to_path_buf()));
        }
        Ok(Self {
            tensors: candle_core::safetensors::load(path, device)?,
        })
    }

    /// Write the checkpoint to a safetensors file, replacing any previous
    /// snapshot at that path.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        candle_core::safetensors::save(&self.tensors, path)?;
        Ok(())
    }

    /// Number of stored parameters.
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// True when the checkpoint stores nothing; transferring it is a no-op.
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Look up a stored tensor by name.
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    /// Copy every name-and-shape-compatible parameter into the target.
    ///
    /// Target parameters absent from this checkpoint are untouched; source
    /// parameters the target cannot accept are skipped and reported. Partial
    /// application is the expected outcome, not a failure mode.
    pub fn transfer_into(&self, target: &VarMap) -> Result<TransferReport> {
        let mut report = TransferReport::default();
        let data = target.data().lock().unwrap();

        // Layer order where names parse, lexical order otherwise.
        let mut names: Vec<&String> = self.tensors.keys().collect();
        names.sort_by_cached_key(|name| match ParamId::from_str(name) {
            Ok(id) => (0, id.layer, id.role),
            Err(_) => (1, 0, (*name).clone()),
        });

        for name in names {
            let source = &self.tensors[name];
            match data.get(name) {
                None => report.skipped.push(SkippedParam {
                    name: name.clone(),
                    reason: SkipReason::MissingInTarget,
                }),
                Some(var) if var.dims() != source.dims() => {
                    report.skipped.push(SkippedParam {
                        name: name.clone(),
                        reason: SkipReason::ShapeMismatch {
                            source: source.dims().to_vec(),
                            target: var.dims().to_vec(),
                        },
                    })
                }
                Some(var) => {
                    var.set(source)?;
                    report.copied.push(name.clone());
                }
            }
        }
        drop(data);

        info!(
            copied = report.copied.len(),
            skipped = report.skipped.len(),
            "partial weight transfer complete"
        );
        for name in &report.copied {
            debug!(param = %name, "copied");
        }
        for skip in &report.skipped {
            debug!(param = %skip.name, reason = %skip.reason, "skipped");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Var;

    fn tensor2(values: [[f32; 2]; 2]) -> Tensor {
        Tensor::from_vec(values.concat(), (2, 2), &Device::Cpu).unwrap()
    }

    fn varmap_with(entries: Vec<(&str, Tensor)>) -> VarMap {
        let vars = VarMap::new();
        {
            let mut data = vars.data().lock().unwrap();
            for (name, t) in entries {
                data.insert(name.to_string(), Var::from_tensor(&t).unwrap());
            }
        }
        vars
    }

    fn values_of(vars: &VarMap, name: &str) -> Vec<f32> {
        vars.data()
            .lock()
            .unwrap()
            .get(name)
            .unwrap()
            .as_tensor()
            .flatten_all()
            .unwrap()
            .to_vec1::<f32>()
            .unwrap()
    }

    #[test]
    fn test_empty_checkpoint_is_noop() {
        let target = varmap_with(vec![("layer0.weight", tensor2([[1.0, 2.0], [3.0, 4.0]]))]);
        let ckpt = Checkpoint::from_tensors(HashMap::new());
        let report = ckpt.transfer_into(&target).unwrap();
        assert!(report.copied.is_empty());
        assert!(report.skipped.is_empty());
        assert_eq!(values_of(&target, "layer0.weight"), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_full_override_when_all_shapes_match() {
        let target = varmap_with(vec![
            ("layer0.weight", tensor2([[0.0, 0.0], [0.0, 0.0]])),
            ("layer1.weight", tensor2([[0.0, 0.0], [0.0, 0.0]])),
        ]);
        let mut tensors = HashMap::new();
        tensors.insert("layer0.weight".to_string(), tensor2([[1.0, 1.0], [1.0, 1.0]]));
        tensors.insert("layer1.weight".to_string(), tensor2([[2.0, 2.0], [2.0, 2.0]]));
        let report = Checkpoint::from_tensors(tensors).transfer_into(&target).unwrap();
        assert_eq!(report.copied, vec!["layer0.weight", "layer1.weight"]);
        assert!(report.skipped.is_empty());
        assert_eq!(values_of(&target, "layer0.weight"), vec![1.0; 4]);
        assert_eq!(values_of(&target, "layer1.weight"), vec![2.0; 4]);
    }

    #[test]
    fn test_interior_layers_transfer_boundary_layers_kept() {
        // Source L1..L5 weights; only L2..L4 shapes match the target.
        let wide = Tensor::from_vec(vec![9.0f32; 6], (2, 3), &Device::Cpu).unwrap();
        let target = varmap_with(vec![
            ("layer1.w", tensor2([[10.0, 10.0], [10.0, 10.0]])),
            ("layer2.w", tensor2([[0.0, 0.0], [0.0, 0.0]])),
            ("layer3.w", tensor2([[0.0, 0.0], [0.0, 0.0]])),
            ("layer4.w", tensor2([[0.0, 0.0], [0.0, 0.0]])),
            ("layer5.w", tensor2([[20.0, 20.0], [20.0, 20.0]])),
        ]);
        let mut tensors = HashMap::new();
        tensors.insert("layer1.w".to_string(), wide.clone());
        tensors.insert("layer2.w".to_string(), tensor2([[1.0, 2.0], [3.0, 4.0]]));
        tensors.insert("layer3.w".to_string(), tensor2([[5.0, 6.0], [7.0, 8.0]]));
        tensors.insert("layer4.w".to_string(), tensor2([[9.0, 8.0], [7.0, 6.0]]));
        tensors.insert("layer5.w".to_string(), wide);

        let report = Checkpoint::from_tensors(tensors).transfer_into(&target).unwrap();

        assert_eq!(report.copied, vec!["layer2.w", "layer3.w", "layer4.w"]);
        assert_eq!(report.skipped.len(), 2);
        assert!(report.skipped.iter().all(|s| matches!(
            s.reason,
            SkipReason::ShapeMismatch { .. }
        )));

        // Interior layers hold source values.
        assert_eq!(values_of(&target, "layer2.w"), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(values_of(&target, "layer3.w"), vec![5.0, 6.0, 7.0, 8.0]);
        assert_eq!(values_of(&target, "layer4.w"), vec![9.0, 8.0, 7.0, 6.0]);
        // Boundary layers keep their pre-transfer values.
        assert_eq!(values_of(&target, "layer1.w"), vec![10.0; 4]);
        assert_eq!(values_of(&target, "layer5.w"), vec![20.0; 4]);
    }

    #[test]
    fn test_source_only_names_reported_missing() {
        let target = varmap_with(vec![("layer0.weight", tensor2([[1.0, 2.0], [3.0, 4.0]]))]);
        let mut tensors = HashMap::new();
        tensors.insert("layer9.weight".to_string(), tensor2([[0.0; 2]; 2]));
        let report = Checkpoint::from_tensors(tensors).transfer_into(&target).unwrap();
        assert!(report.copied.is_empty());
        assert_eq!(
            report.skipped,
            vec![SkippedParam {
                name: "layer9.weight".to_string(),
                reason: SkipReason::MissingInTarget,
            }]
        );
    }

    #[test]
    fn test_target_only_names_untouched() {
        let target = varmap_with(vec![
            ("layer0.weight", tensor2([[1.0, 2.0], [3.0, 4.0]])),
            ("layer0.bias", Tensor::from_vec(vec![5.0f32, 6.0], 2, &Device::Cpu).unwrap()),
        ]);
        let mut tensors = HashMap::new();
        tensors.insert("layer0.weight".to_string(), tensor2([[0.5; 2]; 2]));
        let report = Checkpoint::from_tensors(tensors).transfer_into(&target).unwrap();
        assert_eq!(report.copied, vec!["layer0.weight"]);
        assert_eq!(values_of(&target, "layer0.bias"), vec![5.0, 6.0]);
    }

    #[test]
    fn test_capture_is_a_frozen_snapshot() {
        let target = varmap_with(vec![("layer0.weight", tensor2([[1.0, 2.0], [3.0, 4.0]]))]);
        let ckpt = Checkpoint::capture(&target).unwrap();
        // Mutate the live network after the snapshot.
        {
            let data = target.data().lock().unwrap();
            data.get("layer0.weight")
                .unwrap()
                .set(&tensor2([[0.0; 2]; 2]))
                .unwrap();
        }
        let frozen = ckpt
            .get("layer0.weight")
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        assert_eq!(frozen, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ckpt.safetensors");
        let source = varmap_with(vec![("layer0.weight", tensor2([[1.5, 2.5], [3.5, 4.5]]))]);
        Checkpoint::capture(&source).unwrap().save(&path).unwrap();

        let loaded = Checkpoint::load(&path, &Device::Cpu).unwrap();
        assert_eq!(loaded.len(), 1);
        let values = loaded
            .get("layer0.weight")
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        assert_eq!(values, vec![1.5, 2.5, 3.5, 4.5]);
    }

    #[test]
    fn test_load_missing_file_is_explicit_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Checkpoint::load(dir.path().join("absent.safetensors"), &Device::Cpu);
        assert!(matches!(result, Err(Error::CheckpointMissing(_))));
    }
}
