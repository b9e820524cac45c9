//! Evaluation metrics for node classification.
//!
//! Accuracy over all nodes, macro-averaged precision/recall/F1, and
//! cross-entropy log-loss. Macro averaging treats every class equally: a
//! class with no true members (or no predicted members) contributes a perfect
//! 1.0 to the averaged recall (or precision) rather than an undefined value.

use crate::core::error::{Error, Result};
use candle_core::Tensor;
use serde::{Deserialize, Serialize};

/// Probabilities are clipped to `[EPS, 1 - EPS]` before taking logs so a
/// saturated prediction never yields an infinite loss.
pub const LOG_LOSS_EPS: f64 = 1e-15;

/// Per-evaluation metrics record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Fraction of correctly classified nodes.
    pub accuracy: f64,
    /// Macro-averaged precision.
    pub precision: f64,
    /// Macro-averaged recall.
    pub recall: f64,
    /// Macro-averaged F1.
    pub f1: f64,
    /// Mean negative log-likelihood of the true class.
    pub log_loss: f64,
}

/// Compute the full metrics record from log-probabilities and true labels.
pub fn from_log_probs(log_probs: &Tensor, labels: &[u32]) -> Result<Metrics> {
    let (n, classes) = log_probs.dims2()?;
    if labels.len() != n {
        return Err(Error::InvalidDataset(format!(
            "{} labels for {n} predictions",
            labels.len()
        )));
    }
    if let Some(&bad) = labels.iter().find(|&&l| l as usize >= classes) {
        return Err(Error::InvalidDataset(format!(
            "label {bad} out of range for {classes} classes"
        )));
    }
    let rows = log_probs.to_vec2::<f32>()?;
    let preds: Vec<u32> = rows.iter().map(|row| argmax(row)).collect();

    let correct = preds
        .iter()
        .zip(labels)
        .filter(|(p, t)| p == t)
        .count();
    let accuracy = correct as f64 / n as f64;

    let (precision, recall, f1) = macro_scores(labels, &preds, classes);

    let log_loss = -labels
        .iter()
        .enumerate()
        .map(|(i, &label)| {
            let p = (rows[i][label as usize] as f64).exp();
            p.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS).ln()
        })
        .sum::<f64>()
        / n as f64;

    Ok(Metrics {
        accuracy,
        precision,
        recall,
        f1,
        log_loss,
    })
}

fn argmax(row: &[f32]) -> u32 {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best as u32
}

/// Macro precision/recall/F1 over `classes` classes.
fn macro_scores(truth: &[u32], preds: &[u32], classes: usize) -> (f64, f64, f64) {
    let mut precision_sum = 0.0;
    let mut recall_sum = 0.0;
    let mut f1_sum = 0.0;
    for class in 0..classes as u32 {
        let mut tp = 0usize;
        let mut fp = 0usize;
        let mut fn_ = 0usize;
        for (&t, &p) in truth.iter().zip(preds) {
            match (t == class, p == class) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (true, false) => fn_ += 1,
                (false, false) => {}
            }
        }
        let precision = if tp + fp == 0 {
            1.0
        } else {
            tp as f64 / (tp + fp) as f64
        };
        let recall = if tp + fn_ == 0 {
            1.0
        } else {
            tp as f64 / (tp + fn_) as f64
        };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        precision_sum += precision;
        recall_sum += recall;
        f1_sum += f1;
    }
    let c = classes as f64;
    (precision_sum / c, recall_sum / c, f1_sum / c)
}
