use std::{path::PathBuf, process::ExitCode};

use clap::{Args, Parser, Subcommand};
use federation::{
    configs::{
        AllocationPolicy, DatasetName, ExperimentConfig, Framework, TierAssignment, WeightInit,
    },
    sweep::{SweepPlan, run_sweep},
};
use log::{error, info};

/// Simulates heterogeneous federated learning.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs a single (framework, dataset, allocation, seed) tuple.
    Run(RunArgs),
    /// Runs the cross product of the given frameworks, datasets, allocations and seeds.
    Sweep(SweepArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(long, value_enum, default_value_t = Framework::Fedavg)]
    framework: Framework,

    #[arg(long, value_enum, default_value_t = DatasetName::Mnist)]
    dataset: DatasetName,

    #[arg(long, value_enum, default_value_t = AllocationPolicy::Full)]
    allocation: AllocationPolicy,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct SweepArgs {
    #[arg(long, value_enum, value_delimiter = ',', required = true)]
    frameworks: Vec<Framework>,

    #[arg(long, value_enum, value_delimiter = ',', required = true)]
    datasets: Vec<DatasetName>,

    #[arg(long, value_enum, value_delimiter = ',', required = true)]
    allocations: Vec<AllocationPolicy>,

    #[arg(long, value_delimiter = ',', default_value = "42")]
    seeds: Vec<u64>,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct CommonArgs {
    #[arg(long, default_value_t = 10)]
    rounds: usize,

    #[arg(long, default_value_t = 32)]
    batch_size: usize,

    /// Defaults to the amount of classes of the dataset.
    #[arg(long)]
    clients: Option<usize>,

    #[arg(long, default_value_t = 1)]
    epochs: usize,

    #[arg(long)]
    steps_per_epoch: Option<usize>,

    /// Fraction of the clients taking part in each round.
    #[arg(short = 'C', long, default_value_t = 1.0)]
    proportion_clients: f32,

    #[arg(long, default_value_t = 0.1)]
    learning_rate: f32,

    #[arg(long, value_delimiter = ',', default_value = "100,100")]
    hidden: Vec<usize>,

    #[arg(long, default_value_t = 0.1)]
    stride_fraction: f32,

    #[arg(long, value_enum, default_value_t = TierAssignment::RoundRobin)]
    tier_assignment: TierAssignment,

    /// JSON tier tables keyed by framework.
    #[arg(long)]
    tiers_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = WeightInit::Kaiming)]
    init: WeightInit,

    #[arg(long, default_value_t = 2000)]
    train_samples: usize,

    #[arg(long, default_value_t = 500)]
    test_samples: usize,

    /// Partition iid even for datasets split with a Dirichlet prior by default.
    #[arg(long)]
    iid: bool,

    #[arg(long, default_value_t = 0.5)]
    alpha: f32,

    /// Train the clients of a round one after the other.
    #[arg(long)]
    sequential: bool,

    #[arg(long, default_value = "results")]
    results_dir: PathBuf,

    /// Don't write any results file.
    #[arg(long)]
    no_results: bool,
}

impl CommonArgs {
    fn into_config(self) -> ExperimentConfig {
        ExperimentConfig {
            rounds: self.rounds,
            batch_size: self.batch_size,
            clients: self.clients,
            epochs: self.epochs,
            steps_per_epoch: self.steps_per_epoch,
            proportion_clients: self.proportion_clients,
            learning_rate: self.learning_rate,
            hidden: self.hidden,
            stride_fraction: self.stride_fraction,
            tier_assignment: self.tier_assignment,
            tiers_file: self.tiers_file,
            init: self.init,
            train_samples: self.train_samples,
            test_samples: self.test_samples,
            iid: self.iid,
            alpha: self.alpha,
            sequential: self.sequential,
            results_dir: (!self.no_results).then_some(self.results_dir),
            ..Default::default()
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();

    match Cli::parse().command {
        Command::Run(args) => {
            let config = ExperimentConfig {
                framework: args.framework,
                dataset: args.dataset,
                allocation: args.allocation,
                seed: args.seed,
                ..args.common.into_config()
            };

            match federation::run(&config) {
                Ok(record) => {
                    println!(
                        "{}: accuracy {:.4}, loss {:.4}",
                        config.tuple_key(),
                        record.evaluation.accuracy,
                        record.evaluation.loss
                    );
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!("{} failed: {e}", config.tuple_key());
                    ExitCode::FAILURE
                }
            }
        }
        Command::Sweep(args) => {
            let plan = SweepPlan {
                base: args.common.into_config(),
                frameworks: args.frameworks,
                datasets: args.datasets,
                allocations: args.allocations,
                seeds: args.seeds,
            };

            let summary = run_sweep(&plan, federation::run);

            for failed in &summary.failed {
                println!("FAILED {}: {}", failed.tuple, failed.error);
            }

            info!("{} tuples completed", summary.completed.len());

            if summary.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
