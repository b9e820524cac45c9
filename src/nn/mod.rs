//! Network construction for citation-graph node classifiers.
//!
//! A [`NodeClassifier`] is a fixed ordered stack of [`GraphLayer`]s of one
//! [`LayerFamily`]: the first layer maps the input feature width to the hidden
//! width, interior layers map hidden to hidden, and the last layer maps hidden
//! to the class count. ReLU and dropout sit between layers (dropout only in
//! training mode), and the output is log-softmax-normalized class scores.
//!
//! All randomness is driven by the explicit seed in [`ModelConfig`]; two
//! networks built from identical configurations start bit-identical.

pub mod aggregate;
pub mod conv;

use crate::core::error::{Error, Result};
use crate::core::types::ParamId;
use crate::data::CitationGraph;
use aggregate::PropagationContext;
use candle_core::{Device, Tensor, Var, D};
use candle_nn::{ops, VarMap};
use conv::{GatConv, GcnConv, GinConv, SageConv};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The four supported convolution families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerFamily {
    /// Normalized neighborhood aggregation with a shared linear transform.
    Spectral,
    /// Sum aggregation followed by a two-layer MLP.
    Isomorphism,
    /// Learned per-edge attention over one or more heads.
    Attention,
    /// Sample-and-aggregate first layer(s), spectral layers after.
    Hybrid,
}

impl LayerFamily {
    /// All families, in a stable order.
    pub const ALL: [LayerFamily; 4] = [
        LayerFamily::Spectral,
        LayerFamily::Isomorphism,
        LayerFamily::Attention,
        LayerFamily::Hybrid,
    ];
}

impl fmt::Display for LayerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayerFamily::Spectral => "spectral",
            LayerFamily::Isomorphism => "isomorphism",
            LayerFamily::Attention => "attention",
            LayerFamily::Hybrid => "hybrid",
        };
        write!(f, "{name}")
    }
}

/// Configuration for a node classifier.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Convolution family.
    pub family: LayerFamily,
    /// Input feature width.
    pub input_dim: usize,
    /// Hidden width.
    pub hidden_dim: usize,
    /// Output class count.
    pub output_dim: usize,
    /// Total layer count, at least 2.
    pub depth: usize,
    /// Dropout probability between layers during training.
    pub dropout: f32,
    /// Attention heads on hidden layers (attention family only).
    pub heads: usize,
    /// Leading layers using sample-and-aggregate (hybrid family only).
    pub sage_layers: usize,
    /// Seed for weight initialization.
    pub seed: u64,
}

impl ModelConfig {
    /// Create a configuration with the default hyperparameters.
    pub fn new(family: LayerFamily, input_dim: usize, output_dim: usize) -> Self {
        Self {
            family,
            input_dim,
            hidden_dim: 64,
            output_dim,
            depth: 5,
            dropout: 0.5,
            heads: 4,
            sage_layers: 1,
            seed: 42,
        }
    }

    /// Validate the configuration, failing with a descriptive error.
    pub fn validate(&self) -> Result<()> {
        if self.input_dim == 0 || self.hidden_dim == 0 || self.output_dim == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "dimensions must be positive: input={}, hidden={}, output={}",
                self.input_dim, self.hidden_dim, self.output_dim
            )));
        }
        if self.depth < 2 {
            return Err(Error::InvalidConfiguration(format!(
                "depth must be at least 2 (one hidden layer), got {}",
                self.depth
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(Error::InvalidConfiguration(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if self.family == LayerFamily::Attention {
            if self.heads == 0 {
                return Err(Error::InvalidConfiguration(
                    "attention family needs at least one head".to_string(),
                ));
            }
            if self.hidden_dim % self.heads != 0 {
                return Err(Error::InvalidConfiguration(format!(
                    "hidden width {} is not divisible by {} heads",
                    self.hidden_dim, self.heads
                )));
            }
        }
        if self.family == LayerFamily::Hybrid
            && !(1..self.depth).contains(&self.sage_layers)
        {
            return Err(Error::InvalidConfiguration(format!(
                "hybrid family needs 1 <= sage_layers < depth, got {} for depth {}",
                self.sage_layers, self.depth
            )));
        }
        Ok(())
    }
}

/// Seeded factory for learnable parameters, backing them with a [`VarMap`]
/// keyed by [`ParamId`] names.
pub struct ParamStore {
    vars: VarMap,
    rng: StdRng,
    device: Device,
}

impl ParamStore {
    /// Create a store seeded for reproducible initialization.
    pub fn new(seed: u64, device: &Device) -> Self {
        Self {
            vars: VarMap::new(),
            rng: StdRng::seed_from_u64(seed),
            device: device.clone(),
        }
    }

    /// Register a He-initialized weight matrix `[rows, cols]`.
    pub fn weight(&mut self, id: ParamId, rows: usize, cols: usize) -> Result<Tensor> {
        let scale = (2.0 / rows as f32).sqrt();
        let data: Vec<f32> = (0..rows * cols)
            .map(|_| self.rng.gen_range(-scale..scale))
            .collect();
        let init = Tensor::from_vec(data, (rows, cols), &self.device)?;
        self.register(id, init)
    }

    /// Register a He-initialized rank-1 parameter of the given length.
    pub fn vector(&mut self, id: ParamId, len: usize) -> Result<Tensor> {
        let scale = (2.0 / len as f32).sqrt();
        let data: Vec<f32> = (0..len).map(|_| self.rng.gen_range(-scale..scale)).collect();
        let init = Tensor::from_vec(data, len, &self.device)?;
        self.register(id, init)
    }

    /// Register a zero-initialized bias vector of the given length.
    pub fn bias(&mut self, id: ParamId, len: usize) -> Result<Tensor> {
        let init = Tensor::zeros(len, candle_core::DType::F32, &self.device)?;
        self.register(id, init)
    }

    fn register(&mut self, id: ParamId, init: Tensor) -> Result<Tensor> {
        let var = Var::from_tensor(&init)?;
        let handle = var.as_tensor().clone();
        self.vars
            .data()
            .lock()
            .unwrap()
            .insert(id.to_string(), var);
        Ok(handle)
    }

    /// Consume the store, yielding the underlying variable map.
    pub fn into_vars(self) -> VarMap {
        self.vars
    }
}

/// A single polymorphic graph convolution layer.
#[derive(Debug, Clone)]
pub enum GraphLayer {
    Spectral(GcnConv),
    Isomorphism(GinConv),
    Attention(GatConv),
    Sample(SageConv),
}

impl GraphLayer {
    /// Aggregate neighbors and transform one representation matrix.
    pub fn forward(&self, xs: &Tensor, ctx: &PropagationContext) -> Result<Tensor> {
        match self {
            GraphLayer::Spectral(conv) => conv.forward(xs, ctx),
            GraphLayer::Isomorphism(conv) => conv.forward(xs, ctx),
            GraphLayer::Attention(conv) => conv.forward(xs, ctx),
            GraphLayer::Sample(conv) => conv.forward(xs, ctx),
        }
    }
}

/// A graph neural network node classifier.
pub struct NodeClassifier {
    layers: Vec<GraphLayer>,
    config: ModelConfig,
    vars: VarMap,
}

impl NodeClassifier {
    /// Build a classifier from a validated configuration.
    pub fn new(config: ModelConfig, device: &Device) -> Result<Self> {
        config.validate()?;
        let mut store = ParamStore::new(config.seed, device);
        let mut layers = Vec::with_capacity(config.depth);
        for i in 0..config.depth {
            let in_dim = if i == 0 { config.input_dim } else { config.hidden_dim };
            let last = i + 1 == config.depth;
            let out_dim = if last { config.output_dim } else { config.hidden_dim };
            let layer = match config.family {
                LayerFamily::Spectral => {
                    GraphLayer::Spectral(GcnConv::new(&mut store, i, in_dim, out_dim)?)
                }
                LayerFamily::Isomorphism => {
                    GraphLayer::Isomorphism(GinConv::new(&mut store, i, in_dim, out_dim)?)
                }
                LayerFamily::Attention => {
                    // Hidden layers concatenate `heads` heads; the output
                    // layer averages a single head.
                    let (heads, concat) = if last { (1, false) } else { (config.heads, true) };
                    GraphLayer::Attention(GatConv::new(
                        &mut store, i, in_dim, out_dim, heads, concat,
                    )?)
                }
                LayerFamily::Hybrid => {
                    if i < config.sage_layers {
                        GraphLayer::Sample(SageConv::new(&mut store, i, in_dim, out_dim)?)
                    } else {
                        GraphLayer::Spectral(GcnConv::new(&mut store, i, in_dim, out_dim)?)
                    }
                }
            };
            layers.push(layer);
        }
        Ok(Self {
            layers,
            config,
            vars: store.into_vars(),
        })
    }

    /// Forward pass producing log-probabilities, shape `[N, classes]`.
    ///
    /// With `train` set, dropout is active between layers; inference passes
    /// are fully deterministic.
    pub fn forward_t(&self, graph: &CitationGraph, train: bool) -> Result<Tensor> {
        let ctx = PropagationContext::new(graph)?;
        let mut h = graph.features().clone();
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            h = layer.forward(&h, &ctx)?;
            if i < last {
                h = h.relu()?;
                if train && self.config.dropout > 0.0 {
                    h = ops::dropout(&h, self.config.dropout)?;
                }
            }
        }
        Ok(ops::log_softmax(&h, D::Minus1)?)
    }

    /// The classifier's learnable parameters.
    pub fn vars(&self) -> &VarMap {
        &self.vars
    }

    /// The configuration the classifier was built from.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Number of layers.
    pub fn depth(&self) -> usize {
        self.layers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn test_graph(nodes: usize, features: usize, classes: u32) -> CitationGraph {
        let device = Device::Cpu;
        let mut rng = StdRng::seed_from_u64(9);
        let data: Vec<f32> = (0..nodes * features).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let x = Tensor::from_vec(data, (nodes, features), &device).unwrap();
        let mut src = Vec::new();
        let mut dst = Vec::new();
        for i in 0..nodes as u32 {
            let j = (i + 1) % nodes as u32;
            src.push(i);
            dst.push(j);
            src.push(j);
            dst.push(i);
        }
        let labels: Vec<u32> = (0..nodes as u32).map(|i| i % classes).collect();
        let train: Vec<bool> = (0..nodes).map(|i| i % 10 < 6).collect();
        let val: Vec<bool> = (0..nodes).map(|i| (6..8).contains(&(i % 10))).collect();
        let test: Vec<bool> = (0..nodes).map(|i| i % 10 >= 8).collect();
        CitationGraph::new(x, src, dst, labels, train, val, test).unwrap()
    }

    #[test]
    fn test_forward_shape_all_families() {
        let graph = test_graph(12, 6, 3);
        for family in LayerFamily::ALL {
            let mut config = ModelConfig::new(family, 6, 3);
            config.hidden_dim = 8;
            config.depth = 3;
            config.heads = 2;
            let model = NodeClassifier::new(config, &Device::Cpu).unwrap();
            let out = model.forward_t(&graph, false).unwrap();
            assert_eq!(out.dims2().unwrap(), (12, 3), "family {family}");
        }
    }

    #[test]
    fn test_log_probs_normalized() {
        let graph = test_graph(10, 4, 2);
        let mut config = ModelConfig::new(LayerFamily::Spectral, 4, 2);
        config.hidden_dim = 8;
        config.depth = 2;
        let model = NodeClassifier::new(config, &Device::Cpu).unwrap();
        let out = model.forward_t(&graph, false).unwrap();
        for row in out.exp().unwrap().to_vec2::<f32>().unwrap() {
            let total: f32 = row.iter().sum();
            assert_abs_diff_eq!(total, 1.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_inference_deterministic() {
        let graph = test_graph(10, 4, 2);
        let mut config = ModelConfig::new(LayerFamily::Attention, 4, 2);
        config.hidden_dim = 8;
        config.depth = 3;
        config.heads = 2;
        let model = NodeClassifier::new(config, &Device::Cpu).unwrap();
        let a = model.forward_t(&graph, false).unwrap().to_vec2::<f32>().unwrap();
        let b = model.forward_t(&graph, false).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_same_seed_same_init() {
        let config = ModelConfig::new(LayerFamily::Spectral, 4, 2);
        let a = NodeClassifier::new(config.clone(), &Device::Cpu).unwrap();
        let b = NodeClassifier::new(config, &Device::Cpu).unwrap();
        let data_a = a.vars().data().lock().unwrap().clone();
        let data_b = b.vars().data().lock().unwrap().clone();
        for (name, var) in data_a.iter() {
            let va = var.as_tensor().flatten_all().unwrap().to_vec1::<f32>().unwrap();
            let vb = data_b[name]
                .as_tensor()
                .flatten_all()
                .unwrap()
                .to_vec1::<f32>()
                .unwrap();
            assert_eq!(va, vb, "parameter {name}");
        }
    }

    #[test]
    fn test_rejects_shallow_depth() {
        let mut config = ModelConfig::new(LayerFamily::Spectral, 4, 2);
        config.depth = 1;
        assert!(matches!(
            NodeClassifier::new(config, &Device::Cpu),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_rejects_indivisible_heads() {
        let mut config = ModelConfig::new(LayerFamily::Attention, 4, 2);
        config.hidden_dim = 10;
        config.heads = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_layer_count() {
        let mut config = ModelConfig::new(LayerFamily::Hybrid, 4, 2);
        config.depth = 4;
        config.hidden_dim = 8;
        let model = NodeClassifier::new(config, &Device::Cpu).unwrap();
        assert_eq!(model.depth(), 4);
    }
}
