use std::num::NonZeroUsize;

use super::{AllocationPolicy, ExperimentConfig, TierTable};
use crate::{
    allocation::MaskGeometry,
    error::{FlError, Result},
    model::Architecture,
};

/// How the training samples are spread over the clients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PartitionScheme {
    Iid,
    Dirichlet { alpha: f32 },
}

/// The local training hyper parameters of every client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingPlan {
    pub epochs: NonZeroUsize,
    pub batch_size: NonZeroUsize,
    pub steps_per_epoch: Option<NonZeroUsize>,
    pub learning_rate: f32,
}

/// A validated run, with every default resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub config: ExperimentConfig,
    pub architecture: Architecture,
    pub tiers: TierTable,
    pub clients: usize,
    pub per_round: usize,
    pub partition: PartitionScheme,
    pub training: TrainingPlan,
}

/// Validates experiment configurations and resolves them into run plans.
pub struct Adapter;

impl Adapter {
    pub fn new() -> Self {
        Self
    }

    /// Resolves `config` into a `RunPlan`.
    ///
    /// # Returns
    /// A configuration error if the run must be rejected before round 0.
    pub fn adapt(&self, config: &ExperimentConfig) -> Result<RunPlan> {
        self.validate(config)?;

        let (input, classes) = config.dataset.shape();
        let architecture = Architecture::new(input, config.hidden.clone(), classes);
        let clients = config.clients.unwrap_or(classes);
        let tiers = self.adapt_tiers(config, &architecture)?;

        let partition = if config.iid || config.dataset.naturally_iid() {
            PartitionScheme::Iid
        } else {
            PartitionScheme::Dirichlet {
                alpha: config.alpha,
            }
        };

        let per_round = ((config.proportion_clients as f64 * clients as f64).round() as usize)
            .clamp(1, clients);

        Ok(RunPlan {
            config: config.clone(),
            architecture,
            tiers,
            clients,
            per_round,
            partition,
            training: self.adapt_training(config)?,
        })
    }

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------

    fn validate(&self, config: &ExperimentConfig) -> Result<()> {
        if !config.framework.accepts(config.allocation) {
            return Err(FlError::UnsupportedAllocation {
                framework: config.framework,
                allocation: config.allocation,
            });
        }

        let counts = [
            ("rounds", config.rounds),
            ("batch size", config.batch_size),
            ("epochs", config.epochs),
            ("train samples", config.train_samples),
            ("test samples", config.test_samples),
        ];

        for (what, count) in counts {
            if count == 0 {
                return Err(FlError::InvalidConfig(format!("{what} must be greater than 0")));
            }
        }

        if config.clients == Some(0) {
            return Err(FlError::InvalidConfig(
                "at least one client is required".into(),
            ));
        }

        if config.steps_per_epoch == Some(0) {
            return Err(FlError::InvalidConfig(
                "steps per epoch must be greater than 0".into(),
            ));
        }

        if config.hidden.is_empty() || config.hidden.contains(&0) {
            return Err(FlError::InvalidConfig(format!(
                "hidden widths must be a non empty list of positive widths, got {:?}",
                config.hidden
            )));
        }

        let fractions = [
            ("proportion of clients", config.proportion_clients),
            ("stride fraction", config.stride_fraction),
        ];

        for (what, fraction) in fractions {
            if !(fraction > 0.0 && fraction <= 1.0) {
                return Err(FlError::InvalidConfig(format!(
                    "{what} must lie in (0, 1], got {fraction}"
                )));
            }
        }

        if !(config.learning_rate > 0.0 && config.learning_rate.is_finite()) {
            return Err(FlError::InvalidConfig(format!(
                "learning rate must be positive, got {}",
                config.learning_rate
            )));
        }

        if !(config.alpha > 0.0 && config.alpha.is_finite()) {
            return Err(FlError::InvalidConfig(format!(
                "dirichlet alpha must be positive, got {}",
                config.alpha
            )));
        }

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Adaptation
    // -------------------------------------------------------------------------

    fn adapt_tiers(
        &self,
        config: &ExperimentConfig,
        architecture: &Architecture,
    ) -> Result<TierTable> {
        if config.allocation == AllocationPolicy::Full {
            return Ok(TierTable::full());
        }

        let tiers = match (&config.tiers, &config.tiers_file) {
            (Some(tiers), _) => tiers.clone(),
            (None, Some(path)) => TierTable::load(path, config.framework)?,
            (None, None) => TierTable::default_for(config.framework),
        }
        .for_framework(config.framework);

        tiers.validate()?;

        let uneven = config.hidden.windows(2).any(|w| w[0] != w[1]);
        if tiers.has_partial_depth() && uneven {
            return Err(FlError::InvalidConfig(format!(
                "tiers dropping hidden layers need equal hidden widths, got {:?}",
                config.hidden
            )));
        }

        self.check_strides(config, architecture, &tiers)?;

        Ok(tiers)
    }

    /// Windows only move by whole strides, so a stride wider than the narrowest window would
    /// leave units that tier never trains.
    fn check_strides(
        &self,
        config: &ExperimentConfig,
        architecture: &Architecture,
        tiers: &TierTable,
    ) -> Result<()> {
        let narrowest = tiers.widths.iter().copied().fold(1.0, f32::min);
        let geometry = MaskGeometry::new(architecture, config.stride_fraction);

        for (l, &width) in config.hidden.iter().enumerate() {
            let window = MaskGeometry::window_len(narrowest, width);

            if geometry.stride(l) > window {
                return Err(FlError::InvalidConfig(format!(
                    "a stride of {} units is wider than the {window} unit windows of hidden \
                     layer {l}",
                    geometry.stride(l)
                )));
            }
        }

        Ok(())
    }

    fn adapt_training(&self, config: &ExperimentConfig) -> Result<TrainingPlan> {
        let non_zero = |what: &str, n: usize| {
            NonZeroUsize::new(n)
                .ok_or_else(|| FlError::InvalidConfig(format!("{what} must be greater than 0")))
        };

        Ok(TrainingPlan {
            epochs: non_zero("epochs", config.epochs)?,
            batch_size: non_zero("batch size", config.batch_size)?,
            steps_per_epoch: config.steps_per_epoch.and_then(NonZeroUsize::new),
            learning_rate: config.learning_rate,
        })
    }
}

impl Default for Adapter {
    fn default() -> Self {
        Self::new()
    }
}
