//! Training and evaluation for node classifiers.
//!
//! One [`train_step`] call performs exactly one optimization step: forward in
//! training mode, negative-log-likelihood loss restricted to the training
//! mask, backward, one optimizer step. [`evaluate`] runs a deterministic
//! inference pass over all nodes and reports metrics.

pub mod metrics;

use crate::core::error::Result;
use crate::data::CitationGraph;
use crate::nn::NodeClassifier;
use candle_nn::{loss, AdamW, Optimizer, ParamsAdamW};
use serde::{Deserialize, Serialize};

pub use metrics::Metrics;

/// Hyperparameters for one training phase.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PhaseConfig {
    /// Number of epochs to run.
    pub epochs: usize,
    /// Optimizer learning rate.
    pub learning_rate: f64,
    /// Decoupled weight decay.
    pub weight_decay: f64,
}

impl PhaseConfig {
    pub fn new(epochs: usize, learning_rate: f64, weight_decay: f64) -> Self {
        Self {
            epochs,
            learning_rate,
            weight_decay,
        }
    }
}

/// Build a fresh optimizer over a classifier's parameters.
///
/// Optimizer state belongs to exactly one network instance; it is never
/// carried across to a transplanted network.
pub fn optimizer(model: &NodeClassifier, config: &PhaseConfig) -> Result<AdamW> {
    Ok(AdamW::new(
        model.vars().all_vars(),
        ParamsAdamW {
            lr: config.learning_rate,
            weight_decay: config.weight_decay,
            ..Default::default()
        },
    )?)
}

/// Run one forward/backward/step cycle and return the scalar loss.
pub fn train_step(
    model: &NodeClassifier,
    graph: &CitationGraph,
    opt: &mut AdamW,
) -> Result<f32> {
    let log_probs = model.forward_t(graph, true)?;
    let idx = graph.train_index()?;
    let masked = log_probs.index_select(&idx, 0)?;
    let targets = graph.label_tensor().index_select(&idx, 0)?;
    let loss = loss::nll(&masked, &targets)?;
    opt.backward_step(&loss)?;
    Ok(loss.to_scalar::<f32>()?)
}

/// Evaluate the classifier over all nodes in inference mode.
pub fn evaluate(model: &NodeClassifier, graph: &CitationGraph) -> Result<Metrics> {
    let log_probs = model.forward_t(graph, false)?;
    metrics::from_log_probs(&log_probs, graph.labels())
}
