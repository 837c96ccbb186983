use federation::{
    FlError,
    configs::{Adapter, AllocationPolicy, DatasetName, ExperimentConfig, Framework, TierAssignment},
    data::FederatedData,
    orchestrator::RoundOrchestrator,
    seed::SeedTree,
    submodel::Submodel,
    training::{ClientContext, LocalTrainer, SgdTrainer},
};
use machine_learning::dataset::Dataset;
use rand::rngs::StdRng;

const FEATURES: usize = 115;
const CLASSES: usize = 11;

/// Sets every received parameter to the size of the client's shard.
struct FillWithShardSize;

impl LocalTrainer for FillWithShardSize {
    fn train(
        &self,
        _: &ClientContext,
        submodel: &mut Submodel,
        data: &Dataset,
        _: &mut StdRng,
    ) -> federation::Result<f32> {
        submodel.load_params(&vec![data.len() as f32; submodel.size()])?;
        Ok(0.5)
    }
}

/// Reports a non finite loss for shards of exactly `len` samples.
struct DivergeOn {
    len: usize,
}

impl LocalTrainer for DivergeOn {
    fn train(
        &self,
        ctx: &ClientContext,
        submodel: &mut Submodel,
        data: &Dataset,
        rng: &mut StdRng,
    ) -> federation::Result<f32> {
        let loss = FillWithShardSize.train(ctx, submodel, data, rng)?;
        Ok(if data.len() == self.len { f32::NAN } else { loss })
    }
}

/// Claims a finite loss while poisoning its parameters.
struct Poison;

impl LocalTrainer for Poison {
    fn train(
        &self,
        _: &ClientContext,
        submodel: &mut Submodel,
        _: &Dataset,
        _: &mut StdRng,
    ) -> federation::Result<f32> {
        submodel.load_params(&vec![f32::NAN; submodel.size()])?;
        Ok(0.1)
    }
}

fn config(framework: Framework, allocation: AllocationPolicy) -> ExperimentConfig {
    ExperimentConfig {
        framework,
        allocation,
        dataset: DatasetName::Nbaiot,
        clients: Some(3),
        hidden: vec![12, 12],
        rounds: 3,
        train_samples: 60,
        test_samples: 22,
        sequential: true,
        ..Default::default()
    }
}

fn shard(len: usize) -> Dataset {
    Dataset::from_labels(&vec![0.5; len * FEATURES], &vec![1; len], FEATURES, CLASSES).unwrap()
}

fn fixed_data(lens: &[usize]) -> FederatedData {
    FederatedData::new(lens.iter().map(|&l| shard(l)).collect(), shard(4)).unwrap()
}

fn orchestrator<T: LocalTrainer>(config: &ExperimentConfig, data: FederatedData, trainer: T) -> RoundOrchestrator<T> {
    let plan = Adapter::new().adapt(config).unwrap();
    RoundOrchestrator::new(plan, SeedTree::new(config.seed), data, trainer).unwrap()
}

#[test]
fn fedavg_is_the_size_weighted_mean() {
    let cfg = config(Framework::Fedavg, AllocationPolicy::Full);
    let mut orch = orchestrator(&cfg, fixed_data(&[1, 2, 3]), FillWithShardSize);

    let metrics = orch.step().unwrap();
    let expected = (1.0 * 1.0 + 2.0 * 2.0 + 3.0 * 3.0) / 6.0;

    assert_eq!(metrics.participants, [0, 1, 2]);
    assert_eq!(metrics.uncovered_coordinates, 0);
    assert_eq!(metrics.train_loss, Some(0.5));

    for layer in orch.model().layers() {
        assert!(layer.weights.iter().chain(layer.bias.iter()).all(|&v| (v - expected).abs() < 1e-5));
    }

    for allocation in orch.history().current() {
        assert!(allocation.mask.layers().iter().all(|m| m.is_full()));
    }
}

#[test]
fn diverged_clients_are_dropped() {
    let cfg = config(Framework::Fedavg, AllocationPolicy::Full);
    let mut orch = orchestrator(&cfg, fixed_data(&[1, 2, 4]), DivergeOn { len: 4 });

    let metrics = orch.step().unwrap();
    let expected = (1.0 * 1.0 + 2.0 * 2.0) / 3.0;

    assert_eq!(metrics.diverged, [2]);
    assert!(orch.model().layers()[0].bias.iter().all(|&v| (v - expected).abs() < 1e-5));
}

#[test]
fn everyone_diverging_leaves_the_model_unchanged() {
    let cfg = config(Framework::Fedavg, AllocationPolicy::Full);
    let mut orch = orchestrator(&cfg, fixed_data(&[4, 4, 4]), DivergeOn { len: 4 });
    let before = orch.model().clone();

    let metrics = orch.step().unwrap();

    assert_eq!(metrics.diverged, [0, 1, 2]);
    assert_eq!(metrics.train_loss, None);
    assert_eq!(orch.model(), &before);
}

#[test]
fn empty_shards_are_skipped() {
    let cfg = config(Framework::Fedavg, AllocationPolicy::Full);
    let mut orch = orchestrator(&cfg, fixed_data(&[0, 2, 2]), FillWithShardSize);

    let metrics = orch.step().unwrap();

    assert_eq!(metrics.skipped, [0]);
    assert!(orch.model().layers()[1].bias.iter().all(|&v| v == 2.0));
}

#[test]
fn non_finite_global_model_is_fatal() {
    let cfg = config(Framework::Pdhfl, AllocationPolicy::Cyclic);
    let mut orch = orchestrator(&cfg, fixed_data(&[2, 2, 2]), Poison);

    let err = orch.step().unwrap_err();
    assert!(matches!(err, FlError::FatalNumeric { round: 0, layer: 0 }));
}

#[test]
fn runs_are_deterministic() {
    let mut cfg = config(Framework::Pdhfl, AllocationPolicy::Sim);
    cfg.clients = Some(8);
    cfg.proportion_clients = 0.5;
    cfg.tier_assignment = TierAssignment::Sampled;
    cfg.rounds = 5;

    let schedule = |cfg: &ExperimentConfig| {
        let mut orch = orchestrator(cfg, fixed_data(&[3; 8]), FillWithShardSize);
        (0..cfg.rounds)
            .map(|_| {
                let metrics = orch.step().unwrap();
                (metrics.participants, orch.history().current().to_vec())
            })
            .collect::<Vec<_>>()
    };

    let a = schedule(&cfg);
    assert_eq!(a, schedule(&cfg));
    assert!(a.iter().all(|(participants, _)| participants.len() == 4));

    cfg.sequential = false;
    assert_eq!(a, schedule(&cfg));

    cfg.seed += 1;
    assert_ne!(a, schedule(&cfg));
}

#[test]
fn local_framework_keeps_per_client_models() {
    let cfg = config(Framework::Local, AllocationPolicy::Full);
    let mut orch = orchestrator(&cfg, fixed_data(&[1, 2, 3]), FillWithShardSize);
    let before = orch.model().clone();

    let metrics = orch.step().unwrap();

    assert_eq!(orch.model(), &before);
    assert_eq!(metrics.uncovered_coordinates, 0);
    assert_eq!(metrics.participants.len(), 3);
}

#[test]
fn sgd_run_produces_a_record() {
    let mut cfg = config(Framework::Heterofl, AllocationPolicy::Cyclic);
    cfg.sequential = false;

    let plan = Adapter::new().adapt(&cfg).unwrap();
    let seeds = SeedTree::new(cfg.seed);
    let data = FederatedData::synthetic(&plan, &seeds).unwrap();
    let trainer = SgdTrainer::new(plan.training);

    let record = RoundOrchestrator::new(plan, seeds, data, trainer)
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(record.rounds.len(), 3);
    assert_eq!(record.framework, Framework::Heterofl);
    assert!(record.evaluation.loss.is_finite());
    assert!((0.0..=1.0).contains(&record.analytics.mean));
}

#[test]
fn configuration_errors_fail_before_any_round() {
    let cfg = config(Framework::Fjord, AllocationPolicy::Full);
    let err = federation::run(&cfg).unwrap_err();

    assert!(err.is_config());
}
