//! Citation graph datasets.
//!
//! A [`CitationGraph`] is an immutable record holding a node feature matrix,
//! a directed edge list, per-node class labels, and three disjoint boolean
//! masks selecting the train/validation/test nodes. Graphs are loaded once by
//! name from a safetensors file and are read-only afterwards.

use crate::core::error::{Error, Result};
use candle_core::{DType, Device, Tensor};
use std::path::Path;
use tracing::info;

/// An immutable node-classification dataset over a citation graph.
///
/// Message passing follows edge direction (source → destination); loaders for
/// undirected graphs are expected to provide both directions of every edge.
#[derive(Debug, Clone)]
pub struct CitationGraph {
    x: Tensor,
    y: Tensor,
    src: Vec<u32>,
    dst: Vec<u32>,
    labels: Vec<u32>,
    train_mask: Vec<bool>,
    val_mask: Vec<bool>,
    test_mask: Vec<bool>,
    num_nodes: usize,
    num_features: usize,
    num_classes: usize,
}

impl CitationGraph {
    /// Build a dataset from raw parts, validating it eagerly.
    ///
    /// Rejects empty graphs, out-of-range edge endpoints, mask length
    /// mismatches, overlapping masks, and an empty training mask. The class
    /// count is derived from the largest label.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        x: Tensor,
        src: Vec<u32>,
        dst: Vec<u32>,
        labels: Vec<u32>,
        train_mask: Vec<bool>,
        val_mask: Vec<bool>,
        test_mask: Vec<bool>,
    ) -> Result<Self> {
        let (num_nodes, num_features) = x.dims2()?;
        if num_nodes == 0 {
            return Err(Error::InvalidDataset("graph has no nodes".to_string()));
        }
        if num_features == 0 {
            return Err(Error::InvalidDataset(
                "node feature matrix has zero width".to_string(),
            ));
        }
        if src.len() != dst.len() {
            return Err(Error::InvalidDataset(format!(
                "edge list is ragged: {} sources vs {} destinations",
                src.len(),
                dst.len()
            )));
        }
        if let Some(&bad) = src.iter().chain(dst.iter()).find(|&&i| i as usize >= num_nodes) {
            return Err(Error::InvalidDataset(format!(
                "edge endpoint {bad} out of range for {num_nodes} nodes"
            )));
        }
        if labels.len() != num_nodes {
            return Err(Error::InvalidDataset(format!(
                "{} labels for {num_nodes} nodes",
                labels.len()
            )));
        }
        for (name, mask) in [
            ("train", &train_mask),
            ("val", &val_mask),
            ("test", &test_mask),
        ] {
            if mask.len() != num_nodes {
                return Err(Error::InvalidDataset(format!(
                    "{name} mask has {} entries for {num_nodes} nodes",
                    mask.len()
                )));
            }
        }
        if train_mask.iter().zip(&val_mask).zip(&test_mask).any(
            |((&tr, &va), &te)| (tr && va) || (tr && te) || (va && te),
        ) {
            return Err(Error::InvalidDataset(
                "train/val/test masks overlap".to_string(),
            ));
        }
        if !train_mask.iter().any(|&m| m) {
            return Err(Error::InvalidDataset("training mask is empty".to_string()));
        }
        let num_classes = labels.iter().max().copied().unwrap_or(0) as usize + 1;

        let x = x.to_dtype(DType::F32)?;
        let y = Tensor::from_vec(labels.clone(), num_nodes, x.device())?;
        Ok(Self {
            x,
            y,
            src,
            dst,
            labels,
            train_mask,
            val_mask,
            test_mask,
            num_nodes,
            num_features,
            num_classes,
        })
    }

    /// Number of nodes in the graph.
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Width of each node's feature vector.
    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Number of distinct classes.
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Number of directed edges.
    pub fn num_edges(&self) -> usize {
        self.src.len()
    }

    /// Node feature matrix, shape `[num_nodes, num_features]`.
    pub fn features(&self) -> &Tensor {
        &self.x
    }

    /// Label tensor, shape `[num_nodes]`, dtype u32.
    pub fn label_tensor(&self) -> &Tensor {
        &self.y
    }

    /// Per-node class labels.
    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    /// Edge endpoints as parallel source/destination slices.
    pub fn edges(&self) -> (&[u32], &[u32]) {
        (&self.src, &self.dst)
    }

    /// Device the feature matrix lives on.
    pub fn device(&self) -> &Device {
        self.x.device()
    }

    /// Indices of training nodes as a u32 tensor.
    pub fn train_index(&self) -> Result<Tensor> {
        mask_to_index(&self.train_mask, self.x.device())
    }

    /// Indices of validation nodes as a u32 tensor.
    pub fn val_index(&self) -> Result<Tensor> {
        mask_to_index(&self.val_mask, self.x.device())
    }

    /// Indices of test nodes as a u32 tensor.
    pub fn test_index(&self) -> Result<Tensor> {
        mask_to_index(&self.test_mask, self.x.device())
    }
}

/// Convert a boolean node mask into a u32 index tensor.
pub fn mask_to_index(mask: &[bool], device: &Device) -> Result<Tensor> {
    let idx: Vec<u32> = mask
        .iter()
        .enumerate()
        .filter_map(|(i, &m)| m.then_some(i as u32))
        .collect();
    let len = idx.len();
    Ok(Tensor::from_vec(idx, len, device)?)
}

/// Load a citation graph by name from `dir/{name}.safetensors`.
///
/// Expected tensors: `x` (f32 `[N, F]`), `edge_index` (`[2, E]` integer),
/// `y` (`[N]` integer), `train_mask`/`val_mask`/`test_mask` (`[N]` u8).
pub fn load_citation_graph(
    dir: impl AsRef<Path>,
    name: &str,
    device: &Device,
) -> Result<CitationGraph> {
    let path = dir.as_ref().join(format!("{name}.safetensors"));
    if !path.exists() {
        return Err(Error::DatasetNotFound(path.display().to_string()));
    }
    let tensors = candle_core::safetensors::load(&path, device)?;
    let get = |key: &str| {
        tensors
            .get(key)
            .cloned()
            .ok_or_else(|| Error::InvalidDataset(format!("{name}: missing tensor {key:?}")))
    };

    let x = get("x")?;
    let edge_index = get("edge_index")?.to_dtype(DType::U32)?;
    let (two, _) = edge_index.dims2()?;
    if two != 2 {
        return Err(Error::InvalidDataset(format!(
            "{name}: edge_index must have shape [2, E], got {:?}",
            edge_index.dims()
        )));
    }
    let src = edge_index.get(0)?.to_vec1::<u32>()?;
    let dst = edge_index.get(1)?.to_vec1::<u32>()?;
    let labels = get("y")?.to_dtype(DType::U32)?.to_vec1::<u32>()?;
    let mask = |key: &str| -> Result<Vec<bool>> {
        let raw = get(key)?.to_dtype(DType::U8)?.to_vec1::<u8>()?;
        Ok(raw.into_iter().map(|v| v != 0).collect())
    };

    let graph = CitationGraph::new(
        x,
        src,
        dst,
        labels,
        mask("train_mask")?,
        mask("val_mask")?,
        mask("test_mask")?,
    )?;
    info!(
        graph = name,
        nodes = graph.num_nodes(),
        edges = graph.num_edges(),
        features = graph.num_features(),
        classes = graph.num_classes(),
        "loaded citation graph"
    );
    Ok(graph)
}
