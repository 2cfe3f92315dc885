use std::collections::BTreeMap;

use itertools::Itertools;
use proptest::prelude::*;
use rstest::*;
use testsched::generator::InstanceGenerator;
use testsched::{
    Batch, BranchAndPrice, Column, Config, Day, DirectIp, Error, FacilityCapacity, Horizon,
    Instance, PricerKind, TestId, TestRequest, Termination,
};

const EPS: f64 = 1e-6;

fn single_vehicle(tests: Vec<TestRequest>) -> Instance {
    Instance::builder(Horizon::new(0, 30))
        .tests(tests)
        .all_compatible()
        .vehicles(0, 1)
        .vehicle_cost(4.)
        .build()
        .unwrap()
}

/// Vehicle cost plus tardiness of the best order of all tests on one vehicle.
fn best_order(instance: &Instance) -> f64 {
    let ids = instance.tests().iter().map(|t| t.id).collect::<Vec<_>>();
    let tardiness = ids
        .iter()
        .copied()
        .permutations(ids.len())
        .map(|order| Column::new(instance, order, 0).unwrap().cost())
        .min()
        .unwrap();
    instance.vehicle_cost() + tardiness as f64
}

#[rstest]
#[case(vec![
    TestRequest::new(1, 0, 6, 0, 3, 0),
    TestRequest::new(2, 0, 2, 0, 2, 0),
    TestRequest::new(3, 1, 4, 1, 1, 1),
])]
#[case(vec![
    TestRequest::new(1, 0, 1, 0, 2, 0),
    TestRequest::new(2, 0, 1, 0, 2, 0),
    TestRequest::new(3, 0, 1, 0, 2, 0),
])]
#[case(vec![
    TestRequest::new(1, 5, 9, 2, 1, 0),
    TestRequest::new(2, 0, 3, 0, 1, 2),
    TestRequest::new(3, 2, 6, 0, 2, 0).with_processing(3),
])]
fn single_vehicle_matches_best_order(#[case] tests: Vec<TestRequest>) {
    let instance = single_vehicle(tests);
    let expected = best_order(&instance);

    for pricer in [PricerKind::SequenceThenTime, PricerKind::Enumeration] {
        let config = Config::default().with_pricer(pricer);
        let (solution, stats) = BranchAndPrice::new(&instance, config).solve().unwrap();

        assert!(solution.is_feasible(&instance));
        assert_eq!(solution.num_vehicles(), 1);
        assert!(
            (solution.value - expected).abs() < EPS,
            "{:?}: {} vs {}",
            pricer,
            solution.value,
            expected
        );
        assert!((stats.value - expected).abs() < EPS);
        assert!(stats.proved_optimal);
        assert_eq!(stats.termination, Termination::Exhausted);
        assert!(stats.root_bound <= stats.value + EPS);
    }
}

fn incompatible() -> Instance {
    Instance::builder(Horizon::new(0, 20))
        .test(TestRequest::new(1, 0, 4, 0, 2, 0))
        .test(TestRequest::new(2, 0, 4, 0, 2, 0))
        .test(TestRequest::new(3, 0, 8, 0, 2, 0))
        .compatible(1, 3)
        .compatible(3, 1)
        .compatible(2, 3)
        .compatible(3, 2)
        .vehicles(0, 3)
        .vehicle_cost(20.)
        .build()
        .unwrap()
}

#[rstest]
#[case(Config::default())]
#[case(Config::default().with_vehicle_versions(true))]
#[case(Config::default().with_seed_sequence_len(1).with_parallel(true))]
fn incompatible_tests_never_share_a_column(#[case] config: Config) {
    let instance = incompatible();
    let (solution, stats) = BranchAndPrice::new(&instance, config).solve().unwrap();

    assert!(solution.is_feasible(&instance));
    for column in solution.columns.iter() {
        assert!(!(column.contains(1) && column.contains(2)), "{}", column);
    }
    // 1 and 2 need separate vehicles, 3 joins one of them
    assert_eq!(solution.num_vehicles(), 2);
    assert!(stats.proved_optimal);
}

#[test]
fn root_infeasible() {
    let instance = Instance::builder(Horizon::new(0, 10))
        .test(TestRequest::new(1, 0, 4, 0, 1, 0))
        .test(TestRequest::new(2, 0, 4, 0, 1, 0))
        .vehicles(0, 1)
        .build()
        .unwrap();
    let result = BranchAndPrice::new(&instance, Config::default()).solve();
    assert!(matches!(result, Err(Error::RootInfeasible)));
}

#[test]
fn node_limit_falls_back_to_pool() {
    let instance = Instance::builder(Horizon::new(0, 10))
        .test(TestRequest::new(1, 0, 4, 0, 1, 0))
        .test(TestRequest::new(2, 0, 4, 0, 1, 0))
        .all_compatible()
        .vehicles(0, 2)
        .build()
        .unwrap();
    let config = Config::default().with_max_nodes(0);
    let (solution, stats) = BranchAndPrice::new(&instance, config).solve().unwrap();

    // the seed pool already holds the pair
    assert!(solution.is_feasible(&instance));
    assert_eq!(stats.termination, Termination::NodeLimit);
    assert!(!stats.proved_optimal);
    assert_eq!(stats.expanded, 0);
    assert!(stats.optimality_range().is_none());
    assert_eq!(stats.integer_solves, 1);
}

#[rstest]
#[case(3)]
#[case(11)]
fn generated_instances(#[case] seed: u64) {
    let generator = InstanceGenerator {
        num_tests: 6,
        vehicles_per_release: 3,
        facility: Some(3),
        ..InstanceGenerator::default()
    };
    let instance = generator.generate_seeded(seed).unwrap();
    let config = Config::default()
        .with_max_nodes(30)
        .with_integer_interval(5)
        .with_time_limit(std::time::Duration::from_secs(30));

    let (solution, stats) = BranchAndPrice::new(&instance, config).solve().unwrap();

    assert!(solution.is_feasible(&instance));
    assert!((solution.value - stats.value).abs() < EPS);
    assert!(stats.lower_bound <= stats.value + EPS);
    assert!(stats.gap() >= 0.);
    if stats.proved_optimal {
        assert_eq!(stats.gap(), 0.);
    }
}

/// Cheapest feasible batching found by trying every partition, order and timing.
fn brute_force(instance: &Instance) -> Option<f64> {
    let ids = instance.tests().iter().map(|t| t.id).collect::<Vec<_>>();
    let releases = instance.releases().collect::<Vec<_>>();
    let mut best = None;
    partitions(instance, &ids, &releases, &mut Vec::new(), &mut best);
    best
}

/// Insert the `rest` of the tests into `columns` in every possible way.
fn partitions(
    instance: &Instance,
    rest: &[TestId],
    releases: &[(Day, u32)],
    columns: &mut Vec<(Vec<TestId>, Day)>,
    best: &mut Option<f64>,
) {
    let (id, rest) = match rest.split_first() {
        Some(split) => split,
        None => return time_columns(instance, columns, best),
    };

    for c in 0..columns.len() {
        for at in 0..=columns[c].0.len() {
            columns[c].0.insert(at, *id);
            partitions(instance, rest, releases, columns, best);
            columns[c].0.remove(at);
        }
    }

    for (release, count) in releases {
        let used = columns.iter().filter(|(_, r)| r == release).count();
        if used < *count as usize {
            columns.push((vec![*id], *release));
            partitions(instance, rest, releases, columns, best);
            columns.pop();
        }
    }
}

fn time_columns(instance: &Instance, columns: &[(Vec<TestId>, Day)], best: &mut Option<f64>) {
    let compatible = columns.iter().all(|(sequence, _)| {
        sequence
            .iter()
            .tuple_combinations()
            .all(|(a, b)| instance.may_precede(*a, *b))
    });
    if !compatible {
        return;
    }

    // (test, vehicle release, first on its vehicle)
    let slots = columns
        .iter()
        .flat_map(|(sequence, release)| {
            sequence
                .iter()
                .enumerate()
                .map(move |(i, id)| (*id, *release, i == 0))
        })
        .collect::<Vec<_>>();
    let cost = instance.vehicle_cost() * columns.len() as f64;
    time_slots(instance, &slots, 0, cost, &mut BTreeMap::new(), best);
}

fn time_slots(
    instance: &Instance,
    slots: &[(TestId, Day, bool)],
    ready: Day,
    cost: f64,
    usage: &mut BTreeMap<Day, u32>,
    best: &mut Option<f64>,
) {
    if best.map_or(false, |b| cost >= b) {
        return;
    }
    let ((id, release, first), rest) = match slots.split_first() {
        Some(split) => split,
        None => {
            *best = Some(cost);
            return;
        }
    };

    let test = instance.test(*id).unwrap();
    let horizon = instance.horizon();
    let capacity = |day: Day| instance.facility().capacity(day).unwrap_or(u32::MAX);
    let from = if *first { *release } else { ready };

    for start in from.max(test.earliest_start())..horizon.end {
        if test.completion(start) > horizon.end {
            break;
        }
        let window = test.turnaround_window(start);
        if window
            .clone()
            .any(|d| usage.get(&d).copied().unwrap_or(0) >= capacity(d))
        {
            continue;
        }
        for d in window.clone() {
            *usage.entry(d).or_insert(0) += 1;
        }
        let tardiness = test.tardiness(start) as f64;
        time_slots(instance, rest, test.completion(start), cost + tardiness, usage, best);
        for d in window {
            *usage.entry(d).or_insert(1) -= 1;
        }
    }
}

/// Test given as `(release, prep, turnaround, analysis, slack)` where the slack shifts the
/// deadline from the earliest possible completion.
type Stages = (i64, i64, i64, i64, i64);

/// Instance with one facility slot per day, two vehicles released on day 0 and one on day 2.
fn binding(tests: &[Stages], compatible: &[(TestId, TestId)], vehicle_cost: f64) -> Instance {
    let tests = tests
        .iter()
        .zip(1..)
        .map(|(&(release, prep, turnaround, analysis, slack), id)| {
            let deadline = release + turnaround + analysis + slack;
            TestRequest::new(id, release, deadline, prep, turnaround, analysis)
        });
    compatible
        .iter()
        .fold(Instance::builder(Horizon::new(0, 12)).tests(tests), |b, (a, c)| {
            b.compatible(*a, *c)
        })
        .vehicles(0, 2)
        .vehicles(2, 1)
        .facility(FacilityCapacity::uniform(1))
        .vehicle_cost(vehicle_cost)
        .build()
        .unwrap()
}

fn binding_instance() -> impl Strategy<Value = Instance> {
    let stages = (0i64..=3, 0i64..=1, 1i64..=2, 0i64..=1, -1i64..=3);
    (2usize..=4)
        .prop_flat_map(move |n| {
            (
                prop::collection::vec(stages.clone(), n),
                prop::collection::vec(any::<bool>(), n * (n - 1)),
                1u32..=6,
            )
        })
        .prop_map(|(tests, allowed, cost)| {
            let n = tests.len() as TestId;
            let pairs = (1..=n)
                .cartesian_product(1..=n)
                .filter(|(a, b)| a != b)
                .zip(allowed)
                .filter_map(|(pair, allowed)| allowed.then(|| pair))
                .collect::<Vec<_>>();
            binding(&tests, &pairs, cost as f64)
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    #[test]
    fn matches_exhaustive_search(instance in binding_instance()) {
        let expected = brute_force(&instance);
        let config = Config::default().with_pricer(PricerKind::SequenceThenTime);

        match (BranchAndPrice::new(&instance, config).solve(), expected) {
            (Ok((solution, stats)), Some(expected)) => {
                prop_assert!(solution.is_feasible(&instance));
                prop_assert!(
                    solution.value >= expected - 1e-3,
                    "{} below the optimum {}",
                    solution.value,
                    expected
                );
                prop_assert!(stats.lower_bound <= expected + 1e-3);
                if stats.proved_optimal {
                    prop_assert!(
                        (solution.value - expected).abs() < 1e-3,
                        "claimed optimal {} vs {}",
                        solution.value,
                        expected
                    );
                }
            }
            (Err(Error::RootInfeasible), None) | (Err(Error::NoFeasibleSolution), None) => {}
            (result, expected) => prop_assert!(
                false,
                "{:?} vs {:?}",
                result.map(|(solution, _)| solution.value),
                expected
            ),
        }
    }
}

#[rstest]
// both tests want the facility on days 0 and 1
#[case(vec![(0, 0, 2, 0, 0), (0, 0, 2, 0, 0)], vec![], 1.)]
// sharing a vehicle serializes the tests anyway
#[case(vec![(0, 0, 2, 0, 0), (0, 0, 2, 0, 2), (1, 1, 1, 0, 1)], vec![(1, 2), (2, 3), (1, 3)], 3.)]
// only 3 may follow 1
#[case(vec![(0, 1, 1, 1, 0), (2, 0, 2, 0, 0), (1, 0, 1, 1, 1)], vec![(1, 3)], 2.)]
fn direct_model_agrees(
    #[case] tests: Vec<Stages>,
    #[case] compatible: Vec<(TestId, TestId)>,
    #[case] vehicle_cost: f64,
) {
    let instance = binding(&tests, &compatible, vehicle_cost);
    let expected = brute_force(&instance).unwrap();

    let direct = DirectIp::new(&instance).solve().unwrap().unwrap();
    assert!(direct.is_feasible(&instance));
    assert!((direct.value - expected).abs() < 1e-3, "{} vs {}", direct.value, expected);

    for pricer in [PricerKind::SequenceThenTime, PricerKind::Hybrid] {
        let config = Config::default().with_pricer(pricer);
        let (solution, stats) = BranchAndPrice::new(&instance, config).solve().unwrap();
        assert!(solution.is_feasible(&instance));
        assert!(stats.proved_optimal, "{:?}", pricer);
        assert!(
            (solution.value - expected).abs() < 1e-3,
            "{:?}: {} vs {}",
            pricer,
            solution.value,
            expected
        );
    }
}
