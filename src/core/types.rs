//! Common types used across graft modules.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Structured identifier for a learnable parameter: a layer index plus the
/// parameter's role within that layer (e.g. `weight`, `mlp0.bias`,
/// `head2.att_src`).
///
/// Every parameter a network registers is named by a `ParamId`, and checkpoints
/// key their tensors by the rendered form `layer{index}.{role}`. Keeping the
/// layer index structured lets transfer reports order parameters by layer
/// without re-parsing ad-hoc strings.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParamId {
    /// Zero-based index of the owning layer.
    pub layer: usize,
    /// Role of the parameter within the layer.
    pub role: String,
}

impl ParamId {
    /// Create a new parameter identifier.
    pub fn new(layer: usize, role: impl Into<String>) -> Self {
        Self {
            layer,
            role: role.into(),
        }
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer{}.{}", self.layer, self.role)
    }
}

impl FromStr for ParamId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (prefix, role) = s
            .split_once('.')
            .ok_or_else(|| Error::MalformedParamName(s.to_string()))?;
        let layer = prefix
            .strip_prefix("layer")
            .and_then(|n| n.parse::<usize>().ok())
            .ok_or_else(|| Error::MalformedParamName(s.to_string()))?;
        if role.is_empty() {
            return Err(Error::MalformedParamName(s.to_string()));
        }
        Ok(Self::new(layer, role))
    }
}
