//! Run the transfer experiment for every convolution family.
//!
//! Expects `datasets/cora.safetensors` and `datasets/citeseer.safetensors`
//! relative to the working directory; writes one checkpoint per family under
//! `checkpoints/` and prints each experiment report as JSON.

use candle_core::Device;
use graft::data::load_citation_graph;
use graft::experiment::{Experiment, ExperimentConfig};
use graft::nn::LayerFamily;
use tracing::info;

const DATA_DIR: &str = "datasets";
const SOURCE_GRAPH: &str = "cora";
const TARGET_GRAPH: &str = "citeseer";
const CHECKPOINT_DIR: &str = "checkpoints";

fn main() -> graft::Result<()> {
    tracing_subscriber::fmt().init();

    let device = Device::Cpu;
    let source = load_citation_graph(DATA_DIR, SOURCE_GRAPH, &device)?;
    let target = load_citation_graph(DATA_DIR, TARGET_GRAPH, &device)?;

    for family in LayerFamily::ALL {
        let checkpoint = format!("{CHECKPOINT_DIR}/{family}.safetensors");
        info!(%family, %checkpoint, "running experiment");
        let config = ExperimentConfig::new(family, checkpoint);
        let report = Experiment::new(config).run(&source, &target)?;
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
