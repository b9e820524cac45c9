//! Graph convolution layers.
//!
//! Four families, each computing a node's next representation from its own
//! features and its neighbors' features:
//!
//! - [`GcnConv`]: symmetric-normalized neighborhood aggregation with a shared
//!   linear transform (self-loops included).
//! - [`GinConv`]: neighbor sum plus self, followed by a two-layer MLP.
//! - [`GatConv`]: learned per-edge attention over one or more heads; hidden
//!   layers concatenate head outputs, output layers average.
//! - [`SageConv`]: independent self transform plus neighbor-mean transform.

use crate::core::error::Result;
use crate::core::types::ParamId;
use crate::nn::aggregate::{scatter_mean, scatter_sum, scatter_sum1, PropagationContext};
use crate::nn::ParamStore;
use candle_core::{Tensor, D};

/// Negative slope of the leaky ReLU applied to raw attention scores.
const ATTENTION_SLOPE: f64 = 0.2;

/// Spectral graph convolution: `out = scatter(norm * (x W))[dst] + b`.
#[derive(Debug, Clone)]
pub struct GcnConv {
    weight: Tensor,
    bias: Tensor,
}

impl GcnConv {
    pub fn new(store: &mut ParamStore, layer: usize, in_dim: usize, out_dim: usize) -> Result<Self> {
        Ok(Self {
            weight: store.weight(ParamId::new(layer, "weight"), in_dim, out_dim)?,
            bias: store.bias(ParamId::new(layer, "bias"), out_dim)?,
        })
    }

    pub fn forward(&self, xs: &Tensor, ctx: &PropagationContext) -> Result<Tensor> {
        let h = xs.matmul(&self.weight)?;
        let msgs = h
            .index_select(&ctx.sl_src, 0)?
            .broadcast_mul(&ctx.gcn_norm.unsqueeze(1)?)?;
        let agg = scatter_sum(&msgs, &ctx.sl_dst, ctx.num_nodes)?;
        Ok(agg.broadcast_add(&self.bias)?)
    }
}

/// Isomorphism-network convolution: neighbor sum plus self, then a
/// linear → ReLU → linear transform.
#[derive(Debug, Clone)]
pub struct GinConv {
    w1: Tensor,
    b1: Tensor,
    w2: Tensor,
    b2: Tensor,
}

impl GinConv {
    pub fn new(store: &mut ParamStore, layer: usize, in_dim: usize, out_dim: usize) -> Result<Self> {
        Ok(Self {
            w1: store.weight(ParamId::new(layer, "mlp0.weight"), in_dim, out_dim)?,
            b1: store.bias(ParamId::new(layer, "mlp0.bias"), out_dim)?,
            w2: store.weight(ParamId::new(layer, "mlp1.weight"), out_dim, out_dim)?,
            b2: store.bias(ParamId::new(layer, "mlp1.bias"), out_dim)?,
        })
    }

    pub fn forward(&self, xs: &Tensor, ctx: &PropagationContext) -> Result<Tensor> {
        let gathered = xs.index_select(&ctx.src, 0)?;
        let neigh = scatter_sum(&gathered, &ctx.dst, ctx.num_nodes)?;
        let summed = (xs + &neigh)?;
        let h = summed.matmul(&self.w1)?.broadcast_add(&self.b1)?.relu()?;
        Ok(h.matmul(&self.w2)?.broadcast_add(&self.b2)?)
    }
}

/// One attention head: a shared projection plus source/destination score
/// vectors.
#[derive(Debug, Clone)]
struct GatHead {
    weight: Tensor,
    att_src: Tensor,
    att_dst: Tensor,
}

/// Attention convolution with multi-head support.
///
/// Attention coefficients are softmax-normalized over each node's incoming
/// self-loop-augmented edges. With `concat` the head outputs are concatenated
/// (hidden layers); otherwise they are averaged (output layer).
#[derive(Debug, Clone)]
pub struct GatConv {
    heads: Vec<GatHead>,
    bias: Tensor,
    concat: bool,
}

impl GatConv {
    pub fn new(
        store: &mut ParamStore,
        layer: usize,
        in_dim: usize,
        out_dim: usize,
        num_heads: usize,
        concat: bool,
    ) -> Result<Self> {
        let head_dim = if concat { out_dim / num_heads } else { out_dim };
        let mut heads = Vec::with_capacity(num_heads);
        for h in 0..num_heads {
            heads.push(GatHead {
                weight: store.weight(ParamId::new(layer, format!("head{h}.weight")), in_dim, head_dim)?,
                att_src: store.vector(ParamId::new(layer, format!("head{h}.att_src")), head_dim)?,
                att_dst: store.vector(ParamId::new(layer, format!("head{h}.att_dst")), head_dim)?,
            });
        }
        Ok(Self {
            heads,
            bias: store.bias(ParamId::new(layer, "bias"), out_dim)?,
            concat,
        })
    }

    fn head_forward(&self, head: &GatHead, xs: &Tensor, ctx: &PropagationContext) -> Result<Tensor> {
        let h = xs.matmul(&head.weight)?;
        // Per-node score halves, gathered onto edges.
        let score_src = h.broadcast_mul(&head.att_src)?.sum(D::Minus1)?;
        let score_dst = h.broadcast_mul(&head.att_dst)?.sum(D::Minus1)?;
        let e = (score_src.index_select(&ctx.sl_src, 0)?
            + score_dst.index_select(&ctx.sl_dst, 0)?)?;
        let e = e.maximum(&(&e * ATTENTION_SLOPE)?)?;

        // Softmax over each destination's incoming edges, stabilized against
        // the global maximum.
        let max = e.max(0)?;
        let exp = e.broadcast_sub(&max)?.exp()?;
        let denom = scatter_sum1(&exp, &ctx.sl_dst, ctx.num_nodes)?.affine(1.0, 1e-16)?;
        let alpha = exp.div(&denom.index_select(&ctx.sl_dst, 0)?)?;

        let msgs = h
            .index_select(&ctx.sl_src, 0)?
            .broadcast_mul(&alpha.unsqueeze(1)?)?;
        scatter_sum(&msgs, &ctx.sl_dst, ctx.num_nodes)
    }

    pub fn forward(&self, xs: &Tensor, ctx: &PropagationContext) -> Result<Tensor> {
        let mut outs = Vec::with_capacity(self.heads.len());
        for head in &self.heads {
            outs.push(self.head_forward(head, xs, ctx)?);
        }
        let combined = if self.concat {
            Tensor::cat(&outs, 1)?
        } else {
            let mut acc = outs[0].clone();
            for out in &outs[1..] {
                acc = (acc + out)?;
            }
            acc.affine(1.0 / self.heads.len() as f64, 0.0)?
        };
        Ok(combined.broadcast_add(&self.bias)?)
    }
}

/// Sample-and-aggregate convolution: `out = x W_self + mean(x[neigh]) W_neigh + b`.
#[derive(Debug, Clone)]
pub struct SageConv {
    w_self: Tensor,
    w_neigh: Tensor,
    bias: Tensor,
}

impl SageConv {
    pub fn new(store: &mut ParamStore, layer: usize, in_dim: usize, out_dim: usize) -> Result<Self> {
        Ok(Self {
            w_self: store.weight(ParamId::new(layer, "self.weight"), in_dim, out_dim)?,
            w_neigh: store.weight(ParamId::new(layer, "neigh.weight"), in_dim, out_dim)?,
            bias: store.bias(ParamId::new(layer, "bias"), out_dim)?,
        })
    }

    pub fn forward(&self, xs: &Tensor, ctx: &PropagationContext) -> Result<Tensor> {
        let gathered = xs.index_select(&ctx.src, 0)?;
        let mean = scatter_mean(&gathered, &ctx.dst, &ctx.in_degree, ctx.num_nodes)?;
        let h = (xs.matmul(&self.w_self)? + mean.matmul(&self.w_neigh)?)?;
        Ok(h.broadcast_add(&self.bias)?)
    }
}
