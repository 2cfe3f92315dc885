//! Detection of the branching decision of a fractional node solution.
//!
//! Three families of aggregated column values are inspected:
//!  1. columns carrying both tests of a pair (whatever their order and vehicle)
//!  2. columns carrying a test on a vehicle release
//!  3. columns carrying one test before another on a vehicle release
//!
//! The aggregate closest to `0.5` is branched on. Aggregates within `0.01` of `0` or `1` (or above
//! `1`) count as integral. If all of them do, the columns still may split between different
//! timings of the same sequence, so a fourth family follows:
//!  4. columns starting a test on a given day
//!
//! Only when this one is integral as well the solution is treated as integral.
use std::collections::BTreeMap;

use ordered_float::OrderedFloat;

use crate::branch::BranchConstraint;
use crate::column::TimedColumn;
use crate::instance::{Day, TestId};

/// An aggregate `m` is fractional iff `|m - 0.5| < FRACTIONALITY`.
pub const FRACTIONALITY: f64 = 0.49;

#[derive(Debug, Default)]
struct Masses {
    /// ordered pair `(a, b)`, `a` before `b`
    ordered: BTreeMap<(TestId, TestId), f64>,
    on_vehicle: BTreeMap<(TestId, Day), f64>,
    ordered_on_vehicle: BTreeMap<(TestId, TestId, Day), f64>,
    starts: BTreeMap<(TestId, Day), f64>,
}

impl Masses {
    fn collect(columns: &[TimedColumn], solution: &[(usize, f64)]) -> Self {
        let mut masses = Self::default();
        for (index, value) in solution {
            let column = &columns[*index];
            let sequence = column.sequence();
            let release = column.release();
            for (test, day) in column.starts() {
                *masses.starts.entry((test, day)).or_insert(0.) += value;
            }
            for (i, a) in sequence.iter().enumerate() {
                *masses.on_vehicle.entry((*a, release)).or_insert(0.) += value;
                for b in sequence[i + 1..].iter() {
                    *masses.ordered.entry((*a, *b)).or_insert(0.) += value;
                    *masses
                        .ordered_on_vehicle
                        .entry((*a, *b, release))
                        .or_insert(0.) += value;
                }
            }
        }
        masses
    }

    /// Mass of columns carrying both tests, i.e. the ordered index summed over both orders.
    fn together(&self) -> BTreeMap<(TestId, TestId), f64> {
        let mut together = BTreeMap::new();
        for ((a, b), mass) in self.ordered.iter() {
            let key = if a < b { (*a, *b) } else { (*b, *a) };
            *together.entry(key).or_insert(0.) += mass;
        }
        together
    }
}

/// Enforcing constraint of the branching pair for a node solution, `None` if it is integral.
///
/// # Example
/// ```
/// # extern crate testsched;
/// use testsched::{BranchConstraint, Column, Horizon, Instance, TestRequest};
/// use testsched::alg::branching_decision;
/// let instance = Instance::builder(Horizon::new(0, 10))
///     .test(TestRequest::new(1, 0, 9, 0, 1, 0))
///     .test(TestRequest::new(2, 0, 9, 0, 1, 0))
///     .all_compatible()
///     .vehicles(0, 2)
///     .build()
///     .unwrap();
/// let timed = |seq: Vec<u32>| Column::new(&instance, seq, 0).unwrap().to_timed(&instance).unwrap();
/// let columns = vec![timed(vec![1]), timed(vec![2]), timed(vec![1, 2])];
///
/// let fractional = vec![(0, 0.5), (1, 0.5), (2, 0.5)];
/// assert_eq!(
///     branching_decision(&columns, &fractional),
///     Some(BranchConstraint::EnforceTogether(1, 2)),
/// );
/// assert_eq!(branching_decision(&columns, &[(2, 1.)]), None);
/// ```
pub fn branching_decision(
    columns: &[TimedColumn],
    solution: &[(usize, f64)],
) -> Option<BranchConstraint> {
    let masses = Masses::collect(columns, solution);

    let together = masses
        .together()
        .into_iter()
        .map(|((a, b), m)| (BranchConstraint::EnforceTogether(a, b), m));
    let on_vehicle = masses
        .on_vehicle
        .iter()
        .map(|((t, r), m)| (BranchConstraint::EnforceOnVehicle(*t, *r), *m));
    let ordered = masses
        .ordered_on_vehicle
        .iter()
        .map(|((a, b, r), m)| (BranchConstraint::EnforceTogetherOnVehicle(*a, *b, *r), *m));

    closest_to_half(together.chain(on_vehicle).chain(ordered)).or_else(|| {
        let starts = masses
            .starts
            .iter()
            .map(|((t, d), m)| (BranchConstraint::EnforceStart(*t, *d), *m));
        closest_to_half(starts)
    })
}

/// The first fractional constraint with mass closest to `0.5`.
fn closest_to_half<I>(masses: I) -> Option<BranchConstraint>
where
    I: Iterator<Item = (BranchConstraint, f64)>,
{
    let mut best: Option<(BranchConstraint, f64)> = None;
    for (constraint, mass) in masses {
        let distance = (mass - 0.5).abs();
        if distance >= FRACTIONALITY {
            continue;
        }
        match best {
            Some((_, d)) if OrderedFloat(d) <= OrderedFloat(distance) => {}
            _ => best = Some((constraint, distance)),
        }
    }
    best.map(|(constraint, _)| constraint)
}
