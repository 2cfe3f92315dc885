use std::collections::{BTreeMap, HashMap};

use ordered_float::OrderedFloat;
use proptest::prelude::*;
use rstest::*;
use testsched::oracle::GoodLpFactory;
use testsched::pricer::{
    compatible_sequences, Enumeration, Exact, Pricer, SequenceThenTime, TimingTable,
    REDUCED_COST_TOLERANCE,
};
use testsched::{Column, Day, Duals, FacilityCapacity, Horizon, Instance, TestRequest, TimedColumn};

const HORIZON: Horizon = Horizon { start: 0, end: 12 };

fn tests() -> impl Strategy<Value = Vec<TestRequest>> {
    prop::collection::vec((0i64..6, 0i64..4, 0i64..2, 1i64..3, 0i64..2), 1..=3).prop_map(|ts| {
        ts.into_iter()
            .enumerate()
            .map(|(i, (release, slack, prep, tat, analysis))| {
                TestRequest::new(i as u32 + 1, release, release + slack, prep, tat, analysis)
            })
            .collect()
    })
}

fn day_duals() -> impl Strategy<Value = BTreeMap<Day, f64>> {
    prop::collection::btree_map(0i64..12, (0u32..8).prop_map(|x| -(x as f64) / 2.), 0..6)
}

fn instance(tests: &[TestRequest], horizon: Horizon) -> Instance {
    Instance::builder(horizon)
        .tests(tests.iter().cloned())
        .all_compatible()
        .vehicles(0, 1)
        .vehicles(2, 1)
        .facility(FacilityCapacity::uniform(1))
        .vehicle_cost(3.)
        .build()
        .unwrap()
}

/// Minimum of `tardiness - day duals` over all valid schedules fitting into the horizon.
fn brute_force(instance: &Instance, sequence: &[u32], release: Day, duals: &Duals) -> f64 {
    fn extend(
        instance: &Instance,
        sequence: &[u32],
        release: Day,
        duals: &Duals,
        starts: &mut Vec<Day>,
        best: &mut f64,
    ) {
        if starts.len() == sequence.len() {
            let column =
                TimedColumn::new(instance, sequence.to_vec(), release, starts.clone()).unwrap();
            if column.is_valid(instance) && column.fits_horizon(instance) {
                let value = column.cost() as f64
                    - duals.day_credit(column.resource_days().iter().copied());
                *best = best.min(value);
            }
            return;
        }
        // overlapping starts are invalid anyway
        let ready = match starts.len().checked_sub(1) {
            Some(i) => instance.test(sequence[i]).unwrap().completion(starts[i]),
            None => release,
        };
        let horizon = instance.horizon();
        for day in horizon.start.max(ready)..horizon.end {
            starts.push(day);
            extend(instance, sequence, release, duals, starts, best);
            starts.pop();
        }
    }

    let mut best = f64::INFINITY;
    extend(instance, sequence, release, duals, &mut Vec::new(), &mut best);
    best
}

fn cover_duals(values: &[f64]) -> HashMap<u32, f64> {
    values
        .iter()
        .enumerate()
        .map(|(i, d)| (i as u32 + 1, *d))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn dp_matches_brute_force(tests in tests(), days in day_duals(), release in 0i64..3) {
        let instance = instance(&tests, HORIZON);
        let duals = Duals::new(HashMap::new(), BTreeMap::new(), days);
        for sequence in compatible_sequences(&instance, tests.len()) {
            let table = TimingTable::build(&instance, &sequence, &duals).unwrap();
            let expected = brute_force(&instance, &sequence, release, &duals);
            let value = table.value(release);
            if expected.is_finite() {
                prop_assert!((value - expected).abs() < 1e-9, "{:?}: {} vs {}", sequence, value, expected);
                let starts = table.schedule(release).unwrap();
                let column = TimedColumn::new(&instance, sequence.clone(), release, starts).unwrap();
                prop_assert!(column.is_valid(&instance));
                let timed = column.cost() as f64 - duals.day_credit(column.resource_days().iter().copied());
                prop_assert!((timed - value).abs() < 1e-9);
            } else {
                prop_assert!(value.is_infinite());
                prop_assert!(table.schedule(release).is_none());
            }
        }
    }

    #[test]
    fn dp_is_greedy_without_day_duals(tests in tests(), release in prop::sample::select(vec![0i64, 2])) {
        let instance = instance(&tests, Horizon::new(0, 40));
        for sequence in compatible_sequences(&instance, tests.len()) {
            let table = TimingTable::build(&instance, &sequence, &Duals::default()).unwrap();
            let greedy = Column::new(&instance, sequence.clone(), release).unwrap();
            prop_assert_eq!(table.value(release), greedy.cost() as f64);
        }
    }

    #[test]
    fn dp_and_enumeration_agree_without_day_duals(
        tests in tests(),
        covers in prop::collection::vec(0u32..8, 3),
        vehicle in 0u32..3,
    ) {
        let instance = instance(&tests, Horizon::new(0, 40));
        let covers = covers.iter().map(|c| *c as f64).collect::<Vec<_>>();
        let vehicles = [(0, -(vehicle as f64))].into_iter().collect();
        let duals = Duals::new(cover_duals(&covers), vehicles, BTreeMap::new());

        let best = |priced: &[testsched::pricer::Priced]| {
            priced.iter().map(|p| OrderedFloat(p.reduced_cost)).min()
        };

        let enumerated = Enumeration::new(&instance, 3).improving(&duals, &[]).unwrap();
        let mut dp = SequenceThenTime::new(&instance, 3);
        let priced = dp.price(&duals, &[]).unwrap();

        prop_assert_eq!(best(&enumerated), best(&priced));
        for p in priced.iter().chain(enumerated.iter()) {
            prop_assert!(p.reduced_cost < -REDUCED_COST_TOLERANCE);
            prop_assert!((duals.reduced_cost(&instance, &p.column) - p.reduced_cost).abs() < 1e-9);
        }
    }
}

#[fixture]
fn small() -> Instance {
    Instance::builder(Horizon::new(0, 8))
        .test(TestRequest::new(1, 0, 3, 0, 2, 0))
        .test(TestRequest::new(2, 2, 5, 1, 1, 0))
        .test(TestRequest::new(3, 1, 4, 0, 1, 1))
        .all_compatible()
        .vehicles(0, 1)
        .vehicles(2, 1)
        .facility(FacilityCapacity::uniform(1))
        .vehicle_cost(2.)
        .build()
        .unwrap()
}

#[rstest]
#[case(vec![], vec![])]
#[case(vec![(2, -1.5)], vec![])]
#[case(vec![(1, -2.), (3, -0.5)], vec![(2, -1.)])]
fn exact_matches_dp(
    small: Instance,
    #[case] days: Vec<(Day, f64)>,
    #[case] vehicles: Vec<(Day, f64)>,
) {
    let duals = Duals::new(
        cover_duals(&[2.5, 2., 3.]),
        vehicles.into_iter().collect(),
        days.into_iter().collect(),
    );

    let factory = GoodLpFactory;
    let exact = Exact::new(&small, 3, &factory).price(&duals, &[]).unwrap();
    let dp = SequenceThenTime::new(&small, 3).price(&duals, &[]).unwrap();

    assert_eq!(exact.len(), 1);
    let exact = &exact[0];
    assert!(exact.column.is_valid(&small));
    assert!(exact.reduced_cost < -REDUCED_COST_TOLERANCE);
    assert!((duals.reduced_cost(&small, &exact.column) - exact.reduced_cost).abs() < 1e-6);

    // first selected column has the smallest reduced cost
    assert!(!dp.is_empty());
    assert!((dp[0].reduced_cost - exact.reduced_cost).abs() < 1e-6);
}
