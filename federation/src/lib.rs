pub mod aggregation;
pub mod allocation;
pub mod capacity;
pub mod configs;
pub mod data;
pub mod error;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod seed;
pub mod submodel;
pub mod sweep;
pub mod training;

use configs::{Adapter, ExperimentConfig};
use data::FederatedData;
use metrics::{RunRecord, write_record};
use orchestrator::RoundOrchestrator;
use seed::SeedTree;
use training::SgdTrainer;

pub use error::{FlError, Result};

/// Runs one experiment tuple on synthetic data, writing its record when a results directory
/// is configured.
///
/// # Errors
/// Returns a configuration error before any round runs if `config` is invalid, and
/// `FatalNumeric` if the global model stops being finite.
pub fn run(config: &ExperimentConfig) -> Result<RunRecord> {
    log::info!("adapting config {}", config.tuple_key());
    let plan = Adapter::new().adapt(config)?;
    let seeds = SeedTree::new(config.seed);

    let data = FederatedData::synthetic(&plan, &seeds)?;
    let trainer = SgdTrainer::new(plan.training);
    let record = RoundOrchestrator::new(plan, seeds, data, trainer)?.run()?;

    if let Some(dir) = &config.results_dir {
        let path = write_record(dir, config, &record)?;
        log::info!("wrote {}", path.display());
    }

    Ok(record)
}
