//! graft: partial weight transfer between graph neural networks.
//!
//! The crate trains node classifiers on citation graphs with four
//! convolution families (spectral, isomorphism, attention, hybrid), then
//! studies how much of a pretrained network survives transplantation into a
//! network built for a different graph. The core is a name-and-shape-driven
//! transfer engine: parameters are keyed as `layer{n}.{role}`, and a
//! checkpoint installs into any target network by copying exactly the
//! entries whose name and shape both match.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use candle_core::Device;
//! use graft::data::load_citation_graph;
//! use graft::experiment::{Experiment, ExperimentConfig};
//! use graft::nn::LayerFamily;
//!
//! fn main() -> graft::Result<()> {
//!     let device = Device::Cpu;
//!     let source = load_citation_graph("datasets", "cora", &device)?;
//!     let target = load_citation_graph("datasets", "citeseer", &device)?;
//!
//!     let config = ExperimentConfig::new(LayerFamily::Spectral, "checkpoints/spectral.safetensors");
//!     let report = Experiment::new(config).run(&source, &target)?;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod data;
pub mod experiment;
pub mod nn;
pub mod train;
pub mod transfer;

pub use crate::core::error::{Error, Result};
