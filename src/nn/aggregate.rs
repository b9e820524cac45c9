//! Neighbor aggregation primitives shared by all convolution families.
//!
//! Each forward pass builds one [`PropagationContext`] from the graph and
//! every layer reads from it: plain edge tensors for sum/mean aggregation,
//! self-loop-augmented edges plus symmetric normalization coefficients for
//! the spectral and attention families.

use crate::core::error::Result;
use crate::data::CitationGraph;
use candle_core::{DType, Tensor};

/// Per-forward-pass view of the graph structure as device tensors.
#[derive(Debug)]
pub struct PropagationContext {
    /// Edge sources, `[E]` u32.
    pub src: Tensor,
    /// Edge destinations, `[E]` u32.
    pub dst: Tensor,
    /// Edge sources with self-loops appended, `[E + N]` u32.
    pub sl_src: Tensor,
    /// Edge destinations with self-loops appended, `[E + N]` u32.
    pub sl_dst: Tensor,
    /// Symmetric normalization coefficient per self-loop-augmented edge,
    /// `1 / sqrt(deg(src) * deg(dst))` with degrees counting the self-loop.
    pub gcn_norm: Tensor,
    /// In-degree per node over the original edges, clamped to at least one
    /// so mean aggregation never divides by zero. `[N]` f32.
    pub in_degree: Tensor,
    /// Number of nodes.
    pub num_nodes: usize,
}

impl PropagationContext {
    /// Build the context for one graph.
    pub fn new(graph: &CitationGraph) -> Result<Self> {
        let device = graph.device();
        let n = graph.num_nodes();
        let (src, dst) = graph.edges();
        let e = src.len();

        // Degrees counting the implicit self-loop, for spectral normalization.
        let mut deg = vec![1f32; n];
        for &d in dst {
            deg[d as usize] += 1.0;
        }

        let mut sl_src = src.to_vec();
        let mut sl_dst = dst.to_vec();
        sl_src.extend(0..n as u32);
        sl_dst.extend(0..n as u32);
        let norm: Vec<f32> = sl_src
            .iter()
            .zip(&sl_dst)
            .map(|(&s, &d)| 1.0 / (deg[s as usize] * deg[d as usize]).sqrt())
            .collect();

        let mut in_degree = vec![0f32; n];
        for &d in dst {
            in_degree[d as usize] += 1.0;
        }
        for d in &mut in_degree {
            if *d < 1.0 {
                *d = 1.0;
            }
        }

        Ok(Self {
            src: Tensor::from_vec(src.to_vec(), e, device)?,
            dst: Tensor::from_vec(dst.to_vec(), e, device)?,
            sl_src: Tensor::from_vec(sl_src, e + n, device)?,
            sl_dst: Tensor::from_vec(sl_dst, e + n, device)?,
            gcn_norm: Tensor::from_vec(norm, e + n, device)?,
            in_degree: Tensor::from_vec(in_degree, n, device)?,
            num_nodes: n,
        })
    }
}

/// Sum per-edge messages `[E, F]` into their destination nodes, `[N, F]`.
pub fn scatter_sum(messages: &Tensor, dst: &Tensor, num_nodes: usize) -> Result<Tensor> {
    let (e, f) = messages.dims2()?;
    let zeros = Tensor::zeros((num_nodes, f), messages.dtype(), messages.device())?;
    if e == 0 {
        return Ok(zeros);
    }
    let idx = dst.unsqueeze(1)?.broadcast_as((e, f))?.contiguous()?;
    Ok(zeros.scatter_add(&idx, messages, 0)?)
}

/// Average per-edge messages into their destination nodes, dividing each
/// node's sum by its (clamped) in-degree.
pub fn scatter_mean(
    messages: &Tensor,
    dst: &Tensor,
    in_degree: &Tensor,
    num_nodes: usize,
) -> Result<Tensor> {
    let sums = scatter_sum(messages, dst, num_nodes)?;
    Ok(sums.broadcast_div(&in_degree.unsqueeze(1)?)?)
}

/// Sum rank-1 per-edge values `[E]` into their destination nodes, `[N]`.
pub fn scatter_sum1(values: &Tensor, dst: &Tensor, num_nodes: usize) -> Result<Tensor> {
    let zeros = Tensor::zeros(num_nodes, DType::F32, values.device())?;
    if values.dims1()? == 0 {
        return Ok(zeros);
    }
    Ok(zeros.scatter_add(dst, values, 0)?)
}
