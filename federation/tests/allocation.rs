use federation::{
    aggregation::CoverageCount,
    allocation::{
        AllocationHistory, AllocationMask, Allocator, CyclicAllocator, Grouping, Jittered,
        MaskGeometry, SimilarityAllocator, build_allocator,
    },
    capacity::{CapacityProfile, ClientCapacity},
    configs::{
        Adapter, AllocationPolicy, DatasetName, ExperimentConfig, Framework, Tier,
        TierAssignment, TierTable,
    },
    model::Architecture,
    seed::SeedTree,
};

fn wide_layer() -> Architecture {
    Architecture::new(4, vec![100], 2)
}

fn scenario_profile() -> CapacityProfile {
    let tiers = TierTable {
        widths: vec![0.3, 0.6, 1.0],
        depths: Vec::new(),
        weights: Vec::new(),
    }
    .for_framework(Framework::Pdhfl);

    CapacityProfile::generate(10, &tiers, TierAssignment::RoundRobin, &SeedTree::new(0)).unwrap()
}

fn allocate_round(
    allocator: &dyn Allocator,
    profile: &CapacityProfile,
    round: usize,
    history: &mut AllocationHistory,
) -> Vec<AllocationMask> {
    history.begin_round();
    profile
        .iter()
        .map(|client| {
            let mask = allocator.compute_mask(client, round, history);
            history.record(client, mask.clone());
            mask
        })
        .collect()
}

#[test]
fn mask_sizes_follow_capacity() {
    let arch = Architecture::new(4, vec![90, 90], 3);
    let geometry = MaskGeometry::new(&arch, 0.1);
    let tiers = TierTable {
        widths: vec![0.25, 0.55, 1.0],
        depths: Vec::new(),
        weights: Vec::new(),
    }
    .for_framework(Framework::Pdhfl);
    let profile =
        CapacityProfile::generate(6, &tiers, TierAssignment::RoundRobin, &SeedTree::new(0))
            .unwrap();

    for policy in [AllocationPolicy::Cyclic, AllocationPolicy::Sim] {
        let allocator =
            build_allocator(Framework::Pdhfl, policy, geometry.clone(), SeedTree::new(1)).unwrap();
        let mut history = AllocationHistory::new();

        for round in 0..15 {
            let masks = allocate_round(allocator.as_ref(), &profile, round, &mut history);

            for (client, mask) in profile.iter().zip(&masks) {
                // 22.5 and 49.5 units floor to 22 and 49
                let expected = (client.width * 90.0).floor() as usize;
                assert_eq!(mask.layers()[0].len(), expected, "{policy} round {round}");
                assert_eq!(mask.layers()[1].len(), expected, "{policy} round {round}");
                assert!(mask.layers()[2].is_full());
            }
        }
    }

    let full = build_allocator(
        Framework::Fedavg,
        AllocationPolicy::Full,
        geometry,
        SeedTree::new(1),
    )
    .unwrap();

    let weakest = ClientCapacity {
        client: 0,
        tier: 0,
        width: 0.25,
        depth: 0.3,
    };
    let mask = full.compute_mask(&weakest, 3, &AllocationHistory::new());
    assert_eq!(mask.units(), 183);
}

#[test]
fn cyclic_covers_every_unit_within_one_cycle() {
    let geometry = MaskGeometry::new(&wide_layer(), 0.1);
    let allocator = CyclicAllocator::new(geometry.clone());
    let cycle = 100usize.div_ceil(geometry.stride(0));

    for width in [0.1, 0.3, 0.6] {
        let client = ClientCapacity {
            client: 0,
            tier: 0,
            width,
            depth: 1.0,
        };

        let masks: Vec<AllocationMask> = (0..cycle)
            .map(|r| allocator.compute_mask(&client, r, &AllocationHistory::new()))
            .collect();
        let coverage = CoverageCount::from_masks(&[100, 2], &masks);
        let times = (width * 10.0).round() as u32;

        // every unit is covered, and exactly once when the window is one stride wide
        assert!(coverage.layer(0).iter().all(|&c| c == times), "width {width}");
    }
}

#[test]
fn every_tier_covers_every_unit_with_a_coarse_stride() {
    let config = ExperimentConfig {
        framework: Framework::Pdhfl,
        allocation: AllocationPolicy::Cyclic,
        dataset: DatasetName::Nbaiot,
        hidden: vec![100, 100],
        stride_fraction: 0.25,
        ..Default::default()
    };
    let plan = Adapter::new().adapt(&config).unwrap();
    let geometry = MaskGeometry::new(&plan.architecture, config.stride_fraction);
    let allocator = CyclicAllocator::new(geometry.clone());
    let cycle = 100usize.div_ceil(geometry.stride(0));
    assert_eq!(cycle, 4);

    for tier in 0..plan.tiers.len() {
        let Tier { width, depth } = plan.tiers.tier(tier).unwrap();
        let client = ClientCapacity {
            client: tier,
            tier,
            width,
            depth,
        };

        let masks: Vec<AllocationMask> = (0..cycle)
            .map(|r| allocator.compute_mask(&client, r, &AllocationHistory::new()))
            .collect();
        let coverage = CoverageCount::from_masks(geometry.widths(), &masks);

        assert!(coverage.layer(0).iter().all(|&c| c > 0), "tier {tier}");
    }

    // a stride wider than the 0.3 tier's window would leave a gap
    let coarse = ExperimentConfig {
        stride_fraction: 0.5,
        ..config
    };
    assert!(Adapter::new().adapt(&coarse).unwrap_err().is_config());
}

#[test]
fn end_to_end_cyclic_schedule() {
    let geometry = MaskGeometry::new(&wide_layer(), 0.1);
    assert_eq!(geometry.stride(0), 10);

    let allocator = CyclicAllocator::new(geometry);
    let profile = scenario_profile();
    let mut history = AllocationHistory::new();
    let mut coverage = Vec::new();

    for round in 0..=10 {
        let masks = allocate_round(&allocator, &profile, round, &mut history);

        let smallest = &masks[0].layers()[0];
        assert_eq!(profile.get(0).unwrap().width, 0.3);
        assert_eq!(smallest.offset(), round * 10 % 100);
        assert_eq!(smallest.len(), 30);

        coverage.push(CoverageCount::from_masks(&[100, 2], &masks));
    }

    assert_eq!(
        history.current()[0].mask.layers()[0].indices().take(3).collect::<Vec<_>>(),
        [0, 1, 2]
    );
    assert!(coverage[0].layer(0)[5] > 0);
    assert!(coverage[10].layer(0)[5] > 0);
    assert_eq!(coverage[0], coverage[10]);
}

#[test]
fn allocation_schedules_are_deterministic() {
    let arch = Architecture::new(4, vec![50, 50], 3);
    let tiers = TierTable::default_for(Framework::Feddrop);

    let schedule = |seed: u64| {
        let seeds = SeedTree::new(seed);
        let profile =
            CapacityProfile::generate(8, &tiers, TierAssignment::Sampled, &seeds.child("capacity"))
                .unwrap();
        let allocator = Jittered::new(
            SimilarityAllocator::new(
                MaskGeometry::new(&arch, 0.1),
                Grouping::PerTier,
                seeds.child("sim"),
            ),
            MaskGeometry::new(&arch, 0.1),
            seeds.child("jitter"),
        );

        let mut history = AllocationHistory::new();
        (0..6)
            .flat_map(|r| allocate_round(&allocator, &profile, r, &mut history))
            .collect::<Vec<_>>()
    };

    assert_eq!(schedule(42), schedule(42));
    assert_ne!(schedule(42), schedule(43));
}

#[test]
fn fjord_submodels_are_nested() {
    let arch = Architecture::new(4, vec![40, 40], 3);
    let geometry = MaskGeometry::new(&arch, 0.1);
    let profile = CapacityProfile::generate(
        6,
        &TierTable::default_for(Framework::Fjord),
        TierAssignment::RoundRobin,
        &SeedTree::new(0),
    )
    .unwrap();

    for policy in [AllocationPolicy::Cyclic, AllocationPolicy::Sim] {
        let allocator =
            build_allocator(Framework::Fjord, policy, geometry.clone(), SeedTree::new(2)).unwrap();
        let mut history = AllocationHistory::new();

        for round in 0..8 {
            let masks = allocate_round(allocator.as_ref(), &profile, round, &mut history);

            for (small, big) in masks.iter().zip(masks.iter().skip(1)) {
                for (s, b) in small.layers().iter().zip(big.layers()) {
                    if s.len() <= b.len() {
                        assert!(s.indices().all(|u| b.contains(u)), "{policy} round {round}");
                    }
                }
            }
        }
    }
}
