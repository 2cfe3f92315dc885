//! Sequence-then-time pricing.
//!
//! The pool of compatible sequences does not depend on duals and is enumerated once. Each pricing
//! round times every sequence optimally under the current facility duals by a backward dynamic
//! program over `(position, start day)`:
//!
//! ```text
//! value[m][k] = 0
//! value[i][k] = min(tardiness_i(k) - dayDuals_i(k) + value[i+1][k + dur_i], value[i][k+1])
//! ```
//!
//! where `dayDuals_i(k)` sums the facility duals over the turnaround window of test `i` started on
//! day `k`. Starting on `k` is infeasible if the remaining tests cannot complete within the horizon,
//! if test `i` would be performed before its release or if a start constraint of the node forbids
//! it. The best release `r` of a sequence then
//! minimizes `value[0][r] - vehicleDual[r]` and the schedule is recovered by backtracking.
use log::trace;
use ordered_float::OrderedFloat;

use crate::branch::{admits, admits_start, BranchConstraint};
use crate::column::TimedColumn;
use crate::duals::Duals;
use crate::error::Result;
use crate::instance::{Day, Instance, TestId, TestRequest};
use crate::pricer::sequence::compatible_sequences;
use crate::pricer::{is_improving, select_disjoint, Completeness, Draft, Priced, Pricer};

/// Optimal timing of one sequence under fixed facility duals.
#[derive(Debug, Clone)]
pub struct TimingTable<'a> {
    start: Day,
    tests: Vec<&'a TestRequest>,
    /// `value[i][k]`: best `tardiness - day duals` of tests `i..` with test `i` starting on
    /// `start + k` or later
    value: Vec<Vec<f64>>,
    /// `here[i][k]`: the optimum of `value[i][k]` starts test `i` right on `start + k`
    here: Vec<Vec<bool>>,
}

impl<'a> TimingTable<'a> {
    pub fn build(instance: &'a Instance, sequence: &[TestId], duals: &Duals) -> Result<Self> {
        Self::constrained(instance, sequence, duals, &[])
    }

    /// Like [TimingTable::build] but only with start days that `constraints` admit.
    pub fn constrained(
        instance: &'a Instance,
        sequence: &[TestId],
        duals: &Duals,
        constraints: &[BranchConstraint],
    ) -> Result<Self> {
        let horizon = instance.horizon();
        let len = horizon.len();
        let tests = sequence
            .iter()
            .map(|id| instance.require(*id))
            .collect::<Result<Vec<_>>>()?;
        let m = tests.len();

        // prefix[k] = sum of day duals on days start..start + k
        let mut prefix = vec![0.; len + 1];
        for (k, day) in horizon.days().enumerate() {
            prefix[k + 1] = prefix[k] + duals.day(day);
        }

        // remaining[i] = total duration of tests i..
        let mut remaining = vec![0i64; m + 1];
        for i in (0..m).rev() {
            remaining[i] = remaining[i + 1] + tests[i].duration();
        }

        let mut value = vec![vec![f64::INFINITY; len + 1]; m + 1];
        let mut here = vec![vec![false; len + 1]; m + 1];
        value[m].iter_mut().for_each(|v| *v = 0.);

        for i in (0..m).rev() {
            let test = tests[i];
            let dur = test.duration() as usize;
            for k in (0..len).rev() {
                let day = horizon.start + k as Day;
                let wait = value[i][k + 1];

                let fits = k as i64 + remaining[i] <= len as i64;
                let released = day + test.prep >= test.release;
                let start = if fits && released && admits_start(constraints, test.id, day) {
                    let window = test.turnaround_window(day);
                    let from = (window.start - horizon.start) as usize;
                    let to = (window.end - horizon.start) as usize;
                    test.tardiness(day) as f64 - (prefix[to] - prefix[from]) + value[i + 1][k + dur]
                } else {
                    f64::INFINITY
                };

                if start <= wait && start.is_finite() {
                    value[i][k] = start;
                    here[i][k] = true;
                } else {
                    value[i][k] = wait;
                }
            }
        }

        Ok(Self {
            start: horizon.start,
            tests,
            value,
            here,
        })
    }

    #[inline]
    fn offset(&self, release: Day) -> Option<usize> {
        let k = (release - self.start).max(0) as usize;
        (k < self.value[0].len()).then(|| k)
    }

    /// Minimum of `tardiness - day duals` over schedules starting no earlier than `release`.
    ///
    /// Infinite if no schedule fits into the horizon.
    pub fn value(&self, release: Day) -> f64 {
        self.offset(release)
            .map_or(f64::INFINITY, |k| self.value[0][k])
    }

    /// Start days of an optimal schedule for a vehicle released on `release`.
    pub fn schedule(&self, release: Day) -> Option<Vec<Day>> {
        let mut k = self.offset(release)?;
        if !self.value[0][k].is_finite() {
            return None;
        }

        let mut starts = Vec::with_capacity(self.tests.len());
        let mut i = 0;
        while i < self.tests.len() {
            if k >= self.here[i].len() {
                return None;
            }
            if self.here[i][k] {
                starts.push(self.start + k as Day);
                k += self.tests[i].duration() as usize;
                i += 1;
            } else {
                k += 1;
            }
        }
        Some(starts)
    }
}

/// DP timed versions of `sequence` for every vehicle release that admits a schedule.
pub fn vehicle_versions(
    instance: &Instance,
    sequence: &[TestId],
    duals: &Duals,
) -> Result<Vec<TimedColumn>> {
    let table = TimingTable::build(instance, sequence, duals)?;
    instance
        .releases()
        .filter_map(|(r, _)| table.schedule(r).map(|starts| (r, starts)))
        .map(|(r, starts)| TimedColumn::new(instance, sequence.to_vec(), r, starts))
        .collect()
}

/// Sequence-then-time pricer, see module docs.
#[derive(Debug, Clone)]
pub struct SequenceThenTime<'a> {
    instance: &'a Instance,
    sequences: Vec<Vec<TestId>>,
    parallel: bool,
}

impl<'a> SequenceThenTime<'a> {
    pub fn new(instance: &'a Instance, max_len: usize) -> Self {
        Self {
            instance,
            sequences: compatible_sequences(instance, max_len),
            parallel: false,
        }
    }

    /// Time sequences in parallel, only effective with feature `parallel`.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    #[inline]
    pub fn sequences(&self) -> &[Vec<TestId>] {
        &self.sequences
    }

    /// Best improving timed column of one sequence, if any.
    fn best(
        &self,
        sequence: &[TestId],
        duals: &Duals,
        constraints: &[BranchConstraint],
    ) -> Result<Option<Priced>> {
        let instance = self.instance;

        let releases = instance
            .releases()
            .map(|(r, _)| r)
            .filter(|r| admits(constraints, &Draft { sequence, release: *r }))
            .collect::<Vec<_>>();
        if releases.is_empty() {
            return Ok(None);
        }

        let table = TimingTable::constrained(instance, sequence, duals, constraints)?;
        let covers: f64 = sequence.iter().map(|t| duals.test(*t)).sum();
        let fixed = instance.vehicle_cost() - covers;

        let best = releases
            .into_iter()
            .map(|r| (r, fixed - duals.vehicle(r) + table.value(r)))
            .filter(|(_, rc)| rc.is_finite())
            .min_by_key(|(_, rc)| OrderedFloat(*rc));

        match best {
            Some((release, reduced_cost)) if is_improving(reduced_cost) => {
                match table.schedule(release) {
                    Some(starts) => Ok(Some(Priced {
                        column: TimedColumn::new(instance, sequence.to_vec(), release, starts)?,
                        reduced_cost,
                    })),
                    None => Ok(None),
                }
            }
            _ => Ok(None),
        }
    }

    fn scan(&self, duals: &Duals, constraints: &[BranchConstraint]) -> Vec<Result<Option<Priced>>> {
        #[cfg(feature = "parallel")]
        {
            if self.parallel {
                use rayon::prelude::*;
                return self
                    .sequences
                    .par_iter()
                    .map(|s| self.best(s, duals, constraints))
                    .collect();
            }
        }

        self.sequences
            .iter()
            .map(|s| self.best(s, duals, constraints))
            .collect()
    }
}

impl Pricer for SequenceThenTime<'_> {
    fn name(&self) -> &'static str {
        "sequence-then-time"
    }

    fn completeness(&self) -> Completeness {
        Completeness::Heuristic
    }

    fn price(&mut self, duals: &Duals, constraints: &[BranchConstraint]) -> Result<Vec<Priced>> {
        let mut candidates = Vec::new();
        for result in self.scan(duals, constraints) {
            if let Some(priced) = result? {
                candidates.push(priced);
            }
        }
        trace!(
            "{} of {} sequences improve",
            candidates.len(),
            self.sequences.len()
        );
        Ok(select_disjoint(self.instance, candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{Horizon, TestRequest};
    use std::collections::{BTreeMap, HashMap};

    fn instance() -> Instance {
        Instance::builder(Horizon::new(0, 12))
            .test(TestRequest::new(1, 0, 3, 0, 2, 0))
            .test(TestRequest::new(2, 4, 8, 1, 1, 1))
            .all_compatible()
            .vehicles(0, 1)
            .vehicles(3, 1)
            .vehicle_cost(1.)
            .build()
            .unwrap()
    }

    #[test]
    fn greedy_when_no_day_duals() {
        let instance = instance();
        let table = TimingTable::build(&instance, &[1, 2], &Duals::default()).unwrap();
        assert_eq!(table.value(0), 0.);
        // 1 runs on [3, 5) and is 2 days late
        assert_eq!(table.value(3), 2.);
        assert_eq!(table.schedule(0), Some(vec![0, 3]));
        assert_eq!(table.value(12), f64::INFINITY);
    }

    #[test]
    fn avoids_expensive_days() {
        let instance = instance();
        // occupying day 4 costs 5, test 2 is postponed by one day at no tardiness
        let days: BTreeMap<Day, f64> = [(4, -5.)].into_iter().collect();
        let duals = Duals::new(HashMap::new(), BTreeMap::new(), days);
        let table = TimingTable::build(&instance, &[2], &duals).unwrap();
        assert_eq!(table.schedule(0), Some(vec![4]));
        assert_eq!(table.value(0), 0.);

        let table = TimingTable::build(&instance, &[1], &duals).unwrap();
        assert_eq!(table.schedule(3), Some(vec![5]));
    }

    #[test]
    fn no_schedule_past_horizon() {
        let instance = Instance::builder(Horizon::new(0, 3))
            .test(TestRequest::new(1, 0, 9, 0, 2, 0))
            .test(TestRequest::new(2, 0, 9, 0, 2, 0))
            .all_compatible()
            .vehicles(0, 1)
            .build()
            .unwrap();
        let table = TimingTable::build(&instance, &[1, 2], &Duals::default()).unwrap();
        assert_eq!(table.value(0), f64::INFINITY);
        assert_eq!(table.schedule(0), None);
        assert!(vehicle_versions(&instance, &[1, 2], &Duals::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn honors_start_constraints() {
        let instance = instance();
        let free = TimingTable::build(&instance, &[1, 2], &Duals::default()).unwrap();
        assert_eq!(free.schedule(0), Some(vec![0, 3]));

        // 2 waits one more day, still on time
        let constraints = [BranchConstraint::ForbidStart(2, 3)];
        let table =
            TimingTable::constrained(&instance, &[1, 2], &Duals::default(), &constraints).unwrap();
        assert_eq!(table.schedule(0), Some(vec![0, 4]));
        assert_eq!(table.value(0), 0.);

        let constraints = [BranchConstraint::EnforceStart(1, 1)];
        let table =
            TimingTable::constrained(&instance, &[1, 2], &Duals::default(), &constraints).unwrap();
        assert_eq!(table.schedule(0), Some(vec![1, 3]));
        assert_eq!(table.value(3), f64::INFINITY);
    }

    #[test]
    fn prices_covered_tests() {
        let instance = instance();
        let duals = Duals::new(
            [(1, 3.), (2, 3.)].into_iter().collect(),
            BTreeMap::new(),
            BTreeMap::new(),
        );
        let mut pricer = SequenceThenTime::new(&instance, 2);
        let columns = pricer.price(&duals, &[]).unwrap();

        // [1, 2] on release 0: 1 - 6 = -5 is the best, nothing disjoint is left
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].column.sequence(), &[1, 2]);
        assert_eq!(columns[0].column.release(), 0);
        assert_eq!(columns[0].reduced_cost, -5.);
        assert_eq!(duals.reduced_cost(&instance, &columns[0].column), -5.);
    }

    #[test]
    fn respects_branch_constraints() {
        let instance = instance();
        let duals = Duals::new(
            [(1, 3.), (2, 3.)].into_iter().collect(),
            BTreeMap::new(),
            BTreeMap::new(),
        );
        let mut pricer = SequenceThenTime::new(&instance, 2);
        let constraints = [
            BranchConstraint::ForbidTogether(1, 2),
            BranchConstraint::EnforceOnVehicle(1, 3),
        ];
        let columns = pricer.price(&duals, &constraints).unwrap();

        assert!(!columns.is_empty());
        for priced in columns.iter() {
            assert!(admits(&constraints, &priced.column));
        }
    }
}
