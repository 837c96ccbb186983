use log::debug;
use machine_learning::{
    arch::loss::CrossEntropy,
    dataset::Dataset,
    optimization::GradientDescent,
    training::{ModelTrainer, Trainer},
};
use rand::rngs::StdRng;

use crate::{allocation::AllocationMask, configs::TrainingPlan, error::Result, submodel::Submodel};

/// Who is training and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientContext {
    pub client: usize,
    pub round: usize,
    pub tier: usize,
}

/// Trains a client's submodel on its local shard.
///
/// Implementations never see the global model, only the submodel copy they are handed.
pub trait LocalTrainer: Sync {
    /// Trains `submodel` in place.
    ///
    /// # Arguments
    /// * `ctx` - The client and round being trained.
    /// * `submodel` - The client's copy of its slice of the global model.
    /// * `data` - The client's shard.
    /// * `rng` - The client's `training/<round>/<client>` stream.
    ///
    /// # Returns
    /// The loss of the last local epoch, not finite if the client diverged.
    fn train(
        &self,
        ctx: &ClientContext,
        submodel: &mut Submodel,
        data: &Dataset,
        rng: &mut StdRng,
    ) -> Result<f32>;
}

/// Mini-batch gradient descent over softmax cross-entropy, on the `machine_learning` backend.
#[derive(Debug, Clone, Copy)]
pub struct SgdTrainer {
    plan: TrainingPlan,
}

impl SgdTrainer {
    pub fn new(plan: TrainingPlan) -> Self {
        Self { plan }
    }
}

impl LocalTrainer for SgdTrainer {
    fn train(
        &self,
        ctx: &ClientContext,
        submodel: &mut Submodel,
        data: &Dataset,
        rng: &mut StdRng,
    ) -> Result<f32> {
        let mut trainer = ModelTrainer::new(
            submodel.training_network(),
            GradientDescent::new(self.plan.learning_rate),
            CrossEntropy::new(),
            self.plan.epochs,
            self.plan.batch_size,
            self.plan.steps_per_epoch,
        );

        let mut params = submodel.to_params();
        let mut shard = data.clone();
        let losses = trainer.train(&mut params, &mut shard, rng)?;
        let loss = losses.last().copied().unwrap_or(f32::NAN);

        debug!(
            client = ctx.client,
            round = ctx.round,
            epochs = losses.len();
            "local training finished with loss {loss}"
        );

        submodel.load_params(&params)?;

        if !submodel.is_finite() {
            return Ok(f32::NAN);
        }

        Ok(loss)
    }
}

/// A client whose local loss stopped being finite. Its update is dropped for the round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Divergence {
    pub client: usize,
    pub round: usize,
    pub loss: f32,
}

/// The trained submodel of a client, tagged with the mask it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientUpdate {
    pub client: usize,
    pub round: usize,
    pub mask: AllocationMask,
    pub submodel: Submodel,
    /// The amount of local samples.
    pub weight: f64,
    pub loss: f32,
}

/// What came out of a client's local training.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientOutcome {
    Trained(ClientUpdate),
    Diverged(Divergence),
    /// The client had no local data.
    Skipped { client: usize },
}

impl ClientOutcome {
    pub fn client(&self) -> usize {
        match self {
            Self::Trained(update) => update.client,
            Self::Diverged(divergence) => divergence.client,
            Self::Skipped { client } => *client,
        }
    }
}

/// Trains one client and sorts the result into an outcome.
///
/// # Arguments
/// * `trainer` - The local trainer.
/// * `ctx` - The client and round being trained.
/// * `mask` - The client's allocation.
/// * `submodel` - The copy of the global model selected by `mask`.
/// * `data` - The client's shard.
/// * `rng` - The client's training stream.
pub fn train_client<T: LocalTrainer + ?Sized>(
    trainer: &T,
    ctx: ClientContext,
    mask: AllocationMask,
    mut submodel: Submodel,
    data: &Dataset,
    rng: &mut StdRng,
) -> Result<ClientOutcome> {
    if data.is_empty() {
        return Ok(ClientOutcome::Skipped { client: ctx.client });
    }

    let loss = trainer.train(&ctx, &mut submodel, data, rng)?;

    if !loss.is_finite() {
        return Ok(ClientOutcome::Diverged(Divergence {
            client: ctx.client,
            round: ctx.round,
            loss,
        }));
    }

    Ok(ClientOutcome::Trained(ClientUpdate {
        client: ctx.client,
        round: ctx.round,
        mask,
        submodel,
        weight: data.len() as f64,
        loss,
    }))
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use rand::SeedableRng;

    use super::*;
    use crate::{
        allocation::LayerMask,
        configs::WeightInit,
        data::SyntheticSource,
        model::{Architecture, GlobalModel},
        seed::SeedTree,
    };

    fn plan(learning_rate: f32) -> TrainingPlan {
        TrainingPlan {
            epochs: NonZeroUsize::new(20).unwrap(),
            batch_size: NonZeroUsize::new(16).unwrap(),
            steps_per_epoch: None,
            learning_rate,
        }
    }

    fn setup() -> (GlobalModel, Dataset) {
        let arch = Architecture::new(8, vec![16], 3);
        let model = GlobalModel::init(arch, WeightInit::Kaiming, &SeedTree::new(0)).unwrap();
        let (train, _) = SyntheticSource::new(8, 3)
            .generate(96, 3, &mut StdRng::seed_from_u64(0))
            .unwrap();
        (model, train)
    }

    fn ctx() -> ClientContext {
        ClientContext {
            client: 0,
            round: 0,
            tier: 0,
        }
    }

    #[test]
    fn sgd_trains_a_window_of_the_model() {
        let (model, data) = setup();
        let mask = AllocationMask::new(vec![LayerMask::window(16, 4, 8), LayerMask::full(3)]);
        let submodel = model.extract(&mask, 1.0).unwrap();
        let before = submodel.evaluate(&data).unwrap();

        let outcome = train_client(
            &SgdTrainer::new(plan(0.1)),
            ctx(),
            mask,
            submodel,
            &data,
            &mut StdRng::seed_from_u64(1),
        )
        .unwrap();

        let ClientOutcome::Trained(update) = outcome else {
            panic!("expected a trained update, got {outcome:?}");
        };

        assert_eq!(update.weight, 96.);
        assert!(update.loss < before.loss);
        assert_eq!(update.submodel.dims(), [(8, 8), (8, 3)]);
    }

    #[test]
    fn exploding_learning_rate_diverges() {
        let (model, data) = setup();
        let mask = AllocationMask::full(&[16, 3]);
        let submodel = model.extract(&mask, 1.0).unwrap();

        let outcome = train_client(
            &SgdTrainer::new(plan(1e30)),
            ctx(),
            mask,
            submodel,
            &data,
            &mut StdRng::seed_from_u64(1),
        )
        .unwrap();

        assert!(matches!(outcome, ClientOutcome::Diverged(Divergence { client: 0, .. })));
    }

    #[test]
    fn empty_shards_are_skipped() {
        let (model, data) = setup();
        let mask = AllocationMask::full(&[16, 3]);
        let submodel = model.extract(&mask, 1.0).unwrap();
        let empty = data.select(&[]).unwrap();

        let outcome = train_client(
            &SgdTrainer::new(plan(0.1)),
            ctx(),
            mask,
            submodel,
            &empty,
            &mut StdRng::seed_from_u64(1),
        )
        .unwrap();

        assert_eq!(outcome, ClientOutcome::Skipped { client: 0 });
    }
}
