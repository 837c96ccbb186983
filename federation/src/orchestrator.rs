use log::{debug, info, warn};
use rand::seq::index;
use rayon::prelude::*;

use crate::{
    aggregation::{CoverageCount, aggregate},
    allocation::{AllocationHistory, AllocationMask, Allocator, MaskGeometry, build_allocator},
    capacity::{CapacityProfile, ClientCapacity},
    configs::{AllocationPolicy, Framework, RunPlan},
    data::FederatedData,
    error::{FlError, Result},
    metrics::{EvalSummary, RoundMetrics, RunRecord, Spread},
    model::GlobalModel,
    seed::SeedTree,
    submodel::Submodel,
    training::{ClientContext, ClientOutcome, LocalTrainer, train_client},
};

type Job = (ClientContext, AllocationMask, Submodel);

/// The state of the round being run.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundState {
    pub round: usize,
    pub participants: Vec<usize>,
    /// The root of the round's `training` streams.
    pub seeds: SeedTree,
}

/// Drives a federated run: select, allocate, train, aggregate and evaluate, once per round.
///
/// The global model is only ever mutated by the aggregation step, clients train on copies.
pub struct RoundOrchestrator<T: LocalTrainer> {
    plan: RunPlan,
    seeds: SeedTree,
    profile: CapacityProfile,
    geometry: MaskGeometry,
    allocator: Box<dyn Allocator>,
    history: AllocationHistory,
    model: GlobalModel,
    /// Every client's own model, only used by the local framework.
    locals: Vec<GlobalModel>,
    data: FederatedData,
    trainer: T,
    state: Option<RoundState>,
}

impl<T: LocalTrainer> RoundOrchestrator<T> {
    /// Creates a new `RoundOrchestrator`, building the capacity profile and the global model.
    ///
    /// # Arguments
    /// * `plan` - The validated run.
    /// * `seeds` - The root of the run's seed tree.
    /// * `data` - The client shards and the test set.
    /// * `trainer` - The local trainer of every client.
    ///
    /// # Returns
    /// An error if the data doesn't fit the plan or the tiers are invalid.
    pub fn new(plan: RunPlan, seeds: SeedTree, data: FederatedData, trainer: T) -> Result<Self> {
        let config = &plan.config;
        let arch = &plan.architecture;

        if data.clients() != plan.clients {
            return Err(FlError::InvalidConfig(format!(
                "got {} client shards for {} clients",
                data.clients(),
                plan.clients
            )));
        }

        if data.test().x_size() != arch.input || data.test().y_size() != arch.classes {
            return Err(FlError::InvalidConfig(format!(
                "data of shape {}x{} doesn't fit a {}x{} model",
                data.test().x_size(),
                data.test().y_size(),
                arch.input,
                arch.classes
            )));
        }

        let profile = match config.allocation {
            AllocationPolicy::Full => CapacityProfile::full(plan.clients),
            _ => CapacityProfile::generate(
                plan.clients,
                &plan.tiers,
                config.tier_assignment,
                &seeds.child("capacity"),
            )?,
        };

        let geometry = MaskGeometry::new(arch, config.stride_fraction);
        let allocator = build_allocator(
            config.framework,
            config.allocation,
            geometry.clone(),
            seeds.child("allocation"),
        )?;

        let model = GlobalModel::init(arch.clone(), config.init, &seeds.child("init"))?;
        let locals = match config.framework {
            Framework::Local => vec![model.clone(); plan.clients],
            _ => Vec::new(),
        };

        info!(
            "{} clients over {} tiers, {} per round, model of {} parameters",
            plan.clients,
            plan.tiers.len(),
            plan.per_round,
            arch.size()
        );

        Ok(Self {
            plan,
            seeds,
            profile,
            geometry,
            allocator,
            history: AllocationHistory::new(),
            model,
            locals,
            data,
            trainer,
            state: None,
        })
    }

    pub fn plan(&self) -> &RunPlan {
        &self.plan
    }

    pub fn profile(&self) -> &CapacityProfile {
        &self.profile
    }

    pub fn history(&self) -> &AllocationHistory {
        &self.history
    }

    pub fn model(&self) -> &GlobalModel {
        &self.model
    }

    /// The state of the last round run, if any.
    pub fn state(&self) -> Option<&RoundState> {
        self.state.as_ref()
    }

    /// The next round to run.
    pub fn round(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.round + 1)
    }

    fn is_local(&self) -> bool {
        self.plan.config.framework == Framework::Local
    }

    /// The model `client` trains a slice of.
    fn source(&self, client: usize) -> &GlobalModel {
        match self.locals.get(client) {
            Some(local) if self.is_local() => local,
            _ => &self.model,
        }
    }

    /// Picks the participants of `round`, without replacement, in ascending order.
    pub fn select_clients(&self, round: usize) -> Vec<usize> {
        let mut rng = self.seeds.child("selection").index(round as u64).rng();
        let mut chosen = index::sample(&mut rng, self.plan.clients, self.plan.per_round).into_vec();
        chosen.sort_unstable();
        chosen
    }

    /// Runs the next round.
    ///
    /// # Returns
    /// The round's metrics, or `FatalNumeric` if the global model stopped being finite.
    pub fn step(&mut self) -> Result<RoundMetrics> {
        let round = self.round();
        let participants = self.select_clients(round);
        let state = RoundState {
            round,
            participants: participants.clone(),
            seeds: self.seeds.child("training").index(round as u64),
        };

        let jobs = self.allocate(round, &participants)?;
        let outcomes = self.train_all(&state, jobs)?;
        self.state = Some(state);

        let mut updates = Vec::with_capacity(outcomes.len());
        let mut diverged = Vec::new();
        let mut skipped = Vec::new();

        for outcome in outcomes {
            match outcome {
                ClientOutcome::Trained(update) => updates.push(update),
                ClientOutcome::Diverged(d) => {
                    warn!(
                        client = d.client,
                        round = d.round;
                        "client diverged with loss {}, dropping its update",
                        d.loss
                    );
                    diverged.push(d.client);
                }
                ClientOutcome::Skipped { client } => {
                    warn!(client = client, round = round; "client has no local data, skipping it");
                    skipped.push(client);
                }
            }
        }

        let total_weight: f64 = updates.iter().map(|u| u.weight).sum();
        let train_loss = (total_weight > 0.0).then(|| {
            let loss: f64 = updates.iter().map(|u| u.weight * u.loss as f64).sum();
            (loss / total_weight) as f32
        });

        let (uncovered_coordinates, uncovered_units) = if self.is_local() {
            for update in &updates {
                self.locals[update.client].absorb(&update.submodel);
            }

            let coverage =
                CoverageCount::from_masks(self.geometry.widths(), updates.iter().map(|u| &u.mask));
            (0, coverage.uncovered())
        } else {
            let report = aggregate(&mut self.model, &updates);

            if let Some(layer) = self.model.first_non_finite() {
                return Err(FlError::FatalNumeric { round, layer });
            }

            if report.uncovered_params > 0 {
                warn!(
                    round = round;
                    "{} parameters ({} units) got no update",
                    report.uncovered_params,
                    report.coverage.uncovered()
                );
            }

            (report.uncovered_params, report.coverage.uncovered())
        };

        let test = self.evaluate()?;

        info!(
            round = round,
            participants = participants.len(),
            diverged = diverged.len();
            "test loss {:.4}, test accuracy {:.4}",
            test.loss,
            test.accuracy
        );

        Ok(RoundMetrics {
            round,
            participants,
            diverged,
            skipped,
            train_loss,
            test,
            uncovered_coordinates,
            uncovered_units,
        })
    }

    /// Runs every configured round.
    ///
    /// # Returns
    /// The run's record, or the first unrecoverable error.
    pub fn run(mut self) -> Result<RunRecord> {
        let config = &self.plan.config;
        info!(
            "running {} rounds of {} with {} allocation on {}",
            config.rounds, config.framework, config.allocation, config.dataset
        );

        let mut record = RunRecord::new(config, self.plan.clients);

        for _ in 0..self.plan.config.rounds {
            record.rounds.push(self.step()?);
        }

        record.evaluation = self.evaluate()?;
        record.analytics = self.analytics()?;

        info!(
            "final accuracy {:.4}, client submodels {:.4} ± {:.4}",
            record.evaluation.accuracy, record.analytics.mean, record.analytics.std
        );

        Ok(record)
    }

    fn allocate(&mut self, round: usize, participants: &[usize]) -> Result<Vec<Job>> {
        self.history.begin_round();
        let mut jobs = Vec::with_capacity(participants.len());

        for &client in participants {
            let capacity = *self.profile.get(client).ok_or_else(|| {
                FlError::InvalidConfig(format!("client {client} has no capacity"))
            })?;

            let mask = self.allocator.compute_mask(&capacity, round, &self.history);
            self.history.record(&capacity, mask.clone());

            debug!(
                client = client,
                round = round,
                tier = capacity.tier;
                "allocated {} units",
                mask.units()
            );

            let source = self.source(client);
            let submodel = source.extract(&mask, self.hidden_scale(&capacity))?;
            let ctx = ClientContext {
                client,
                round,
                tier: capacity.tier,
            };

            jobs.push((ctx, mask, submodel));
        }

        Ok(jobs)
    }

    fn train_all(&self, state: &RoundState, jobs: Vec<Job>) -> Result<Vec<ClientOutcome>> {
        let trainer = &self.trainer;
        let data = &self.data;

        let run = |(ctx, mask, submodel): Job| -> Result<ClientOutcome> {
            let shard = data.shard(ctx.client).ok_or_else(|| {
                FlError::InvalidConfig(format!("client {} has no shard", ctx.client))
            })?;

            let mut rng = state.seeds.index(ctx.client as u64).rng();
            train_client(trainer, ctx, mask, submodel, shard, &mut rng)
        };

        if self.plan.config.sequential {
            jobs.into_iter().map(run).collect()
        } else {
            jobs.into_par_iter().map(run).collect()
        }
    }

    /// HeteroFL scales the hidden activations of narrow submodels while training.
    fn hidden_scale(&self, capacity: &ClientCapacity) -> f32 {
        match self.plan.config.framework {
            Framework::Heterofl => 1.0 / capacity.width.sqrt(),
            _ => 1.0,
        }
    }

    /// Evaluates the global model, or the mean of the clients' models for the local
    /// framework.
    pub fn evaluate(&self) -> Result<EvalSummary> {
        let test = self.data.test();

        if !self.is_local() {
            return Ok(self.model.evaluate(test)?.into());
        }

        let evals = self
            .locals
            .iter()
            .map(|m| m.evaluate(test))
            .collect::<Result<Vec<_>>>()?;

        let n = evals.len().max(1) as f32;
        Ok(EvalSummary {
            loss: evals.iter().map(|e| e.loss).sum::<f32>() / n,
            accuracy: evals.iter().map(|e| e.accuracy).sum::<f32>() / n,
        })
    }

    /// The test accuracy of every client's canonical submodel of the current model.
    pub fn analytics(&self) -> Result<Spread> {
        let test = self.data.test();
        let mut accuracies = Vec::with_capacity(self.profile.len());

        for capacity in self.profile.iter() {
            let source = self.source(capacity.client);
            let mask = self.geometry.prefix(capacity);
            accuracies.push(source.extract(&mask, 1.0)?.evaluate(test)?.accuracy);
        }

        Ok(Spread::of(&accuracies))
    }
}
