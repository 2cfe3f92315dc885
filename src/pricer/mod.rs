//! Pricing subproblem: search for columns with negative reduced cost.
//!
//! All strategies implement [Pricer]. A pricer receives an immutable [Duals] snapshot together
//! with the branch constraints of the current node and returns *improving* columns, i.e. columns
//! whose reduced cost is below `-REDUCED_COST_TOLERANCE` and which no constraint fixes to zero.
//! Strategies differ in how much of the column space they search, see [Completeness].
//!
//! ## Strategies
//!  1. [SequenceThenTime] - fixed pool of compatible sequences, each timed by a dynamic program
//!  2. [Enumeration] - all sequence and release pairs with their greedy schedules
//!  3. [Exact] - time-indexed 0-1 program solved by the MIP oracle
//!  4. [Hybrid] - the dynamic program first, the exact program to certify that nothing is left
use std::collections::BTreeMap;

use fixedbitset::FixedBitSet;
use ordered_float::OrderedFloat;

use crate::branch::BranchConstraint;
use crate::column::{Batch, TimedColumn};
use crate::config::{Config, PricerKind};
use crate::duals::Duals;
use crate::error::Result;
use crate::instance::{Day, Instance, TestId};
use crate::oracle::OracleFactory;

mod dp;
mod enumeration;
mod exact;
mod sequence;

pub use dp::{vehicle_versions, SequenceThenTime, TimingTable};
pub use enumeration::Enumeration;
pub use exact::Exact;
pub use sequence::{compatible_sequences, seed_columns};

/// A column counts as improving iff its reduced cost is below `-REDUCED_COST_TOLERANCE`.
pub const REDUCED_COST_TOLERANCE: f64 = 1e-3;

/// How much of the column space a strategy searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completeness {
    /// finds an improving column whenever one exists
    Exact,
    /// may miss improving columns, e.g. timings outside its sequence pool
    Heuristic,
    /// exhaustive over greedy schedules, exact only without facility duals and start constraints
    GreedyExhaustive,
}

/// Improving column together with the reduced cost claimed by the pricer.
#[derive(Debug, Clone)]
pub struct Priced {
    pub column: TimedColumn,
    pub reduced_cost: f64,
}

pub trait Pricer {
    fn name(&self) -> &'static str;

    fn completeness(&self) -> Completeness;

    /// Find improving columns under `duals` that respect all `constraints`.
    fn price(&mut self, duals: &Duals, constraints: &[BranchConstraint]) -> Result<Vec<Priced>>;
}

/// Sequence and release pair not yet timed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Draft<'s> {
    pub sequence: &'s [TestId],
    pub release: Day,
}

impl Batch for Draft<'_> {
    fn sequence(&self) -> &[TestId] {
        self.sequence
    }

    fn release(&self) -> Day {
        self.release
    }
}

#[inline]
pub(crate) fn is_improving(reduced_cost: f64) -> bool {
    reduced_cost < -REDUCED_COST_TOLERANCE
}

/// Sort candidates by reduced cost and greedily keep a subset that could be used together.
///
/// A candidate is skipped if one of its tests is already covered by a kept column, if all
/// vehicles of its release are taken or if one of its days is already at facility capacity.
pub(crate) fn select_disjoint(instance: &Instance, mut candidates: Vec<Priced>) -> Vec<Priced> {
    candidates.sort_by_key(|p| OrderedFloat(p.reduced_cost));

    let mut covered = FixedBitSet::with_capacity(instance.num_tests());
    let mut vehicles: BTreeMap<Day, u32> = BTreeMap::new();
    let mut days: BTreeMap<Day, u32> = BTreeMap::new();

    let mut selected = Vec::new();
    for priced in candidates {
        let column = &priced.column;

        let tests = column
            .sequence()
            .iter()
            .filter_map(|t| instance.index_of(*t))
            .collect::<Vec<_>>();
        if tests.iter().any(|i| covered.contains(*i)) {
            continue;
        }

        let used = vehicles.get(&column.release()).copied().unwrap_or(0);
        if used >= instance.vehicles(column.release()) {
            continue;
        }

        let full = column.resource_days().iter().any(|d| {
            instance
                .facility()
                .capacity(*d)
                .map_or(false, |cap| days.get(d).copied().unwrap_or(0) >= cap)
        });
        if full {
            continue;
        }

        for i in tests {
            covered.insert(i);
        }
        *vehicles.entry(column.release()).or_insert(0) += 1;
        for d in column.resource_days() {
            *days.entry(*d).or_insert(0) += 1;
        }
        selected.push(priced);
    }

    selected
}

/// Dynamic program first, exact pricer only when it finds nothing.
pub struct Hybrid<'a> {
    heuristic: SequenceThenTime<'a>,
    exact: Exact<'a>,
}

impl<'a> Hybrid<'a> {
    pub fn new(heuristic: SequenceThenTime<'a>, exact: Exact<'a>) -> Self {
        Self { heuristic, exact }
    }
}

impl Pricer for Hybrid<'_> {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    fn completeness(&self) -> Completeness {
        self.exact.completeness()
    }

    fn price(&mut self, duals: &Duals, constraints: &[BranchConstraint]) -> Result<Vec<Priced>> {
        let columns = self.heuristic.price(duals, constraints)?;
        if !columns.is_empty() {
            return Ok(columns);
        }
        log::debug!("no column from the dynamic program, running the exact pricer");
        self.exact.price(duals, constraints)
    }
}

/// Create the pricer selected by `config`.
pub fn build<'a>(
    instance: &'a Instance,
    config: &Config,
    factory: &'a dyn OracleFactory,
) -> Box<dyn Pricer + 'a> {
    let len = config.max_sequence_len;
    match config.pricer {
        PricerKind::SequenceThenTime => {
            Box::new(SequenceThenTime::new(instance, len).with_parallel(config.parallel))
        }
        PricerKind::Enumeration => Box::new(Enumeration::new(instance, len)),
        PricerKind::Exact => Box::new(Exact::new(instance, len, factory)),
        PricerKind::Hybrid => Box::new(Hybrid::new(
            SequenceThenTime::new(instance, len).with_parallel(config.parallel),
            Exact::new(instance, len, factory),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{FacilityCapacity, Horizon, TestRequest};

    fn instance() -> Instance {
        Instance::builder(Horizon::new(0, 10))
            .tests((1..=3).map(|id| TestRequest::new(id, 0, 9, 0, 1, 0)))
            .all_compatible()
            .vehicles(0, 1)
            .vehicles(1, 1)
            .facility(FacilityCapacity::uniform(1))
            .build()
            .unwrap()
    }

    fn priced(
        instance: &Instance,
        sequence: Vec<TestId>,
        release: Day,
        starts: Vec<Day>,
        rc: f64,
    ) -> Priced {
        Priced {
            column: TimedColumn::new(instance, sequence, release, starts).unwrap(),
            reduced_cost: rc,
        }
    }

    #[test]
    fn disjoint_selection() {
        let instance = instance();
        let candidates = vec![
            // shares test 1 with the best candidate
            priced(&instance, vec![1, 3], 1, vec![1, 2], -2.),
            priced(&instance, vec![1], 0, vec![0], -3.),
            // release 0 is taken
            priced(&instance, vec![2], 0, vec![5], -1.5),
            // day 0 is taken
            priced(&instance, vec![2], 1, vec![0], -1.2),
            priced(&instance, vec![2], 1, vec![4], -1.),
        ];

        let selected = select_disjoint(&instance, candidates);
        let kept = selected
            .iter()
            .map(|p| (p.column.sequence().to_vec(), p.column.release()))
            .collect::<Vec<_>>();
        assert_eq!(kept, vec![(vec![1], 0), (vec![2], 1)]);
        assert_eq!(selected[1].column.start(2), Some(4));
    }

    #[test]
    fn improving_threshold() {
        assert!(is_improving(-0.01));
        assert!(!is_improving(-0.001));
        assert!(!is_improving(0.));
    }
}
