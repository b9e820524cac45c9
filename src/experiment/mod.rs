//! End-to-end transfer experiment driver.
//!
//! An [`Experiment`] runs the full pipeline for one layer family: pretrain a
//! classifier on the source graph, persist the best-accuracy checkpoint,
//! build a fresh classifier sized for the target graph, install the
//! checkpoint partially, then fine-tune on the target. The two networks may
//! disagree in feature width and class count; the transfer engine copies
//! whatever still fits and the report records the rest.

use crate::core::error::{Error, Result};
use crate::data::CitationGraph;
use crate::nn::{LayerFamily, ModelConfig, NodeClassifier};
use crate::train::{self, Metrics, PhaseConfig};
use crate::transfer::{Checkpoint, TransferReport};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Full configuration of one transfer experiment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Convolution family used by both networks.
    pub family: LayerFamily,
    /// Hidden width of every interior layer.
    pub hidden_dim: usize,
    /// Total layer count per network.
    pub depth: usize,
    /// Dropout probability between layers during training.
    pub dropout: f32,
    /// Attention heads (attention family only).
    pub heads: usize,
    /// Leading sample-aggregate layers (hybrid family only).
    pub sage_layers: usize,
    /// Seed for the source network; the target network uses `seed + 1`.
    pub seed: u64,
    /// Pretraining phase hyperparameters.
    pub pretrain: PhaseConfig,
    /// Fine-tuning phase hyperparameters.
    pub finetune: PhaseConfig,
    /// Where the best pretraining checkpoint is written and read back.
    pub checkpoint_path: PathBuf,
}

impl ExperimentConfig {
    /// Default experiment for a family: 5 layers of width 64, dropout 0.5,
    /// 200 epochs per phase, fine-tuning at a tenth of the pretrain rate.
    pub fn new(family: LayerFamily, checkpoint_path: impl Into<PathBuf>) -> Self {
        Self {
            family,
            hidden_dim: 64,
            depth: 5,
            dropout: 0.5,
            heads: 4,
            sage_layers: 1,
            seed: 42,
            pretrain: PhaseConfig::new(200, 0.01, 5e-4),
            finetune: PhaseConfig::new(200, 0.001, 5e-4),
            checkpoint_path: checkpoint_path.into(),
        }
    }

    /// Check phase settings; network settings are validated when the
    /// networks are built.
    pub fn validate(&self) -> Result<()> {
        if self.pretrain.epochs == 0 || self.finetune.epochs == 0 {
            return Err(Error::InvalidConfiguration(
                "each phase must run at least one epoch".to_string(),
            ));
        }
        Ok(())
    }

    fn model_config(&self, graph: &CitationGraph, seed: u64) -> ModelConfig {
        let mut config = ModelConfig::new(self.family, graph.num_features(), graph.num_classes());
        config.hidden_dim = self.hidden_dim;
        config.depth = self.depth;
        config.dropout = self.dropout;
        config.heads = self.heads;
        config.sage_layers = self.sage_layers;
        config.seed = seed;
        config
    }
}

/// Aggregate record of one training phase.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhaseSummary {
    /// Epochs run.
    pub epochs: usize,
    /// Epoch (1-based) that reached the best accuracy.
    pub best_epoch: usize,
    /// Best full-graph accuracy seen during the phase.
    pub best_accuracy: f64,
    /// Mean training loss over the phase.
    pub mean_loss: f64,
    /// Per-epoch metrics averaged over the phase.
    pub mean: Metrics,
}

/// Everything one experiment run produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub pretrain: PhaseSummary,
    pub transfer: TransferReport,
    pub finetune: PhaseSummary,
}

/// One pretrain → transfer → fine-tune pipeline.
#[derive(Clone, Debug)]
pub struct Experiment {
    config: ExperimentConfig,
}

impl Experiment {
    pub fn new(config: ExperimentConfig) -> Self {
        Self { config }
    }

    /// Run the pipeline: pretrain on `source`, transfer, fine-tune on
    /// `target`.
    pub fn run(
        &self,
        source: &CitationGraph,
        target: &CitationGraph,
    ) -> Result<ExperimentReport> {
        self.config.validate()?;
        info!(family = %self.config.family, "starting transfer experiment");

        let model_a = NodeClassifier::new(
            self.config.model_config(source, self.config.seed),
            source.device(),
        )?;
        let pretrain = run_phase(
            "pretrain",
            &model_a,
            source,
            &self.config.pretrain,
            Some(&self.config.checkpoint_path),
        )?;

        let checkpoint = Checkpoint::load(&self.config.checkpoint_path, target.device())?;
        let model_b = NodeClassifier::new(
            self.config.model_config(target, self.config.seed + 1),
            target.device(),
        )?;
        let transfer = checkpoint.transfer_into(model_b.vars())?;

        let finetune = run_phase("finetune", &model_b, target, &self.config.finetune, None)?;

        info!(
            family = %self.config.family,
            pretrain_best = pretrain.best_accuracy,
            finetune_best = finetune.best_accuracy,
            copied = transfer.copied.len(),
            skipped = transfer.skipped.len(),
            "experiment complete"
        );
        Ok(ExperimentReport {
            pretrain,
            transfer,
            finetune,
        })
    }
}

/// Train for a full phase, logging one metric line per epoch.
///
/// When `checkpoint_path` is set, a snapshot of the network is written each
/// time full-graph accuracy strictly improves, so the file on disk always
/// reflects the best epoch seen so far.
fn run_phase(
    phase: &str,
    model: &NodeClassifier,
    graph: &CitationGraph,
    config: &PhaseConfig,
    checkpoint_path: Option<&Path>,
) -> Result<PhaseSummary> {
    let mut opt = train::optimizer(model, config)?;
    let mut best_epoch = 0;
    let mut best_accuracy = f64::NEG_INFINITY;
    let mut loss_sum = 0.0;
    let mut sums = Metrics::default();

    for epoch in 1..=config.epochs {
        let loss = train::train_step(model, graph, &mut opt)?;
        let m = train::evaluate(model, graph)?;
        info!(
            phase,
            epoch,
            loss = loss as f64,
            accuracy = m.accuracy,
            precision = m.precision,
            recall = m.recall,
            f1 = m.f1,
            log_loss = m.log_loss,
        );

        loss_sum += loss as f64;
        sums.accuracy += m.accuracy;
        sums.precision += m.precision;
        sums.recall += m.recall;
        sums.f1 += m.f1;
        sums.log_loss += m.log_loss;

        if m.accuracy > best_accuracy {
            best_accuracy = m.accuracy;
            best_epoch = epoch;
            if let Some(path) = checkpoint_path {
                Checkpoint::capture(model.vars())?.save(path)?;
            }
        }
    }

    let n = config.epochs as f64;
    Ok(PhaseSummary {
        epochs: config.epochs,
        best_epoch,
        best_accuracy,
        mean_loss: loss_sum / n,
        mean: Metrics {
            accuracy: sums.accuracy / n,
            precision: sums.precision / n,
            recall: sums.recall / n,
            f1: sums.f1 / n,
            log_loss: sums.log_loss / n,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Device, Tensor};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Ring graph with random features, round-robin labels and a striped
    /// train/val/test split.
    fn ring_graph(nodes: usize, features: usize, classes: usize, seed: u64) -> CitationGraph {
        let mut rng = StdRng::seed_from_u64(seed);
        let data: Vec<f32> = (0..nodes * features).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let x = Tensor::from_vec(data, (nodes, features), &Device::Cpu).unwrap();
        let mut src = Vec::new();
        let mut dst = Vec::new();
        for i in 0..nodes as u32 {
            let next = (i + 1) % nodes as u32;
            src.push(i);
            dst.push(next);
            src.push(next);
            dst.push(i);
        }
        let labels: Vec<u32> = (0..nodes as u32).map(|i| i % classes as u32).collect();
        let train: Vec<bool> = (0..nodes).map(|i| i % 3 == 0).collect();
        let val: Vec<bool> = (0..nodes).map(|i| i % 3 == 1).collect();
        let test: Vec<bool> = (0..nodes).map(|i| i % 3 == 2).collect();
        CitationGraph::new(x, src, dst, labels, train, val, test).unwrap()
    }

    fn quick_config(family: LayerFamily, path: impl Into<PathBuf>) -> ExperimentConfig {
        let mut config = ExperimentConfig::new(family, path);
        config.hidden_dim = 16;
        config.depth = 3;
        config.dropout = 0.0;
        config.pretrain = PhaseConfig::new(2, 0.01, 0.0);
        config.finetune = PhaseConfig::new(2, 0.001, 0.0);
        config
    }

    #[test]
    fn test_end_to_end_across_mismatched_graphs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spectral.safetensors");
        // Different feature widths and class counts on purpose.
        let source = ring_graph(24, 10, 4, 7);
        let target = ring_graph(18, 6, 3, 8);

        let config = quick_config(LayerFamily::Spectral, &path);
        let report = Experiment::new(config).run(&source, &target).unwrap();

        assert!(path.exists());
        assert!(report.pretrain.best_accuracy >= 0.0 && report.pretrain.best_accuracy <= 1.0);
        assert!(report.finetune.best_accuracy >= 0.0 && report.finetune.best_accuracy <= 1.0);
        assert!(report.pretrain.best_epoch >= 1);
        assert_eq!(report.pretrain.epochs, 2);

        // Interior layer is shape-compatible across both networks, boundary
        // layers are not.
        assert!(report.transfer.copied.contains(&"layer1.weight".to_string()));
        let skipped: Vec<&str> = report.transfer.skipped.iter().map(|s| s.name.as_str()).collect();
        assert!(skipped.contains(&"layer0.weight"));
        assert!(skipped.contains(&"layer2.weight"));
    }

    #[test]
    fn test_identical_graphs_transfer_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iso.safetensors");
        let source = ring_graph(24, 8, 4, 7);
        let target = ring_graph(24, 8, 4, 9);

        let config = quick_config(LayerFamily::Isomorphism, &path);
        let report = Experiment::new(config).run(&source, &target).unwrap();
        assert!(report.transfer.skipped.is_empty());
        // 3 layers, each with a two-layer perceptron: 4 tensors per layer.
        assert_eq!(report.transfer.copied.len(), 12);
    }

    #[test]
    fn test_zero_epoch_phase_rejected() {
        let mut config = quick_config(LayerFamily::Spectral, "unused.safetensors");
        config.pretrain.epochs = 0;
        let source = ring_graph(12, 4, 2, 1);
        let target = ring_graph(12, 4, 2, 2);
        let result = Experiment::new(config).run(&source, &target);
        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn test_missing_checkpoint_surfaces_before_finetune() {
        let dir = tempfile::tempdir().unwrap();
        let result = Checkpoint::load(dir.path().join("never-written.safetensors"), &Device::Cpu);
        assert!(matches!(result, Err(Error::CheckpointMissing(_))));
    }
}
