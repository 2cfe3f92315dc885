use std::collections::{BTreeMap, HashSet};
use std::ops::RangeInclusive;
use std::time::Duration;

use crate::column::TimedColumn;
use crate::instance::{Day, Instance, TestId};

/// Data structure holding the resulting columns and their objective `value`.
///
/// Each column is one vehicle of the release it names carrying its tests on the listed start days.
#[derive(Debug, Clone)]
pub struct Solution {
    pub columns: Vec<TimedColumn>,
    /// vehicle cost of all columns plus total tardiness
    pub value: f64,
    /// total tardiness over all columns
    pub tardiness: i64,
}

impl Solution {
    pub fn new(instance: &Instance, columns: Vec<TimedColumn>) -> Self {
        let tardiness = columns.iter().map(|c| c.cost()).sum();
        let value = columns.iter().map(|c| c.objective(instance)).sum();
        Self {
            columns,
            value,
            tardiness,
        }
    }

    #[inline]
    pub fn num_vehicles(&self) -> usize {
        self.columns.len()
    }

    /// Group columns by vehicle release, i.e. as mapping `release -> [columns]`.
    pub fn vehicle_schedule(&self) -> BTreeMap<Day, Vec<&TimedColumn>> {
        let mut schedule: BTreeMap<Day, Vec<&TimedColumn>> = BTreeMap::new();
        for column in self.columns.iter() {
            schedule.entry(column.release()).or_default().push(column);
        }
        schedule
    }

    /// Number of vehicles used per release, i.e. `loads[release] = #columns`.
    pub fn vehicle_loads(&self) -> BTreeMap<Day, u32> {
        let mut loads = BTreeMap::new();
        for column in self.columns.iter() {
            *loads.entry(column.release()).or_insert(0) += 1;
        }
        loads
    }

    /// Day-by-day facility utilization, i.e. `utilization[day] = #columns occupying day`.
    ///
    /// # Example
    /// ```
    /// # extern crate testsched;
    /// use testsched::{Horizon, Instance, Solution, TestRequest, TimedColumn};
    /// let instance = Instance::builder(Horizon::new(0, 10))
    ///     .test(TestRequest::new(1, 0, 9, 0, 2, 0))
    ///     .test(TestRequest::new(2, 0, 9, 0, 2, 0))
    ///     .vehicles(0, 2)
    ///     .build()
    ///     .unwrap();
    /// let solution = Solution::new(&instance, vec![
    ///     TimedColumn::new(&instance, vec![1], 0, vec![0]).unwrap(),
    ///     TimedColumn::new(&instance, vec![2], 0, vec![1]).unwrap(),
    /// ]);
    /// let utilization = solution.facility_utilization();
    /// assert_eq!(utilization.into_iter().collect::<Vec<_>>(), vec![(0, 1), (1, 2), (2, 1)]);
    /// assert_eq!(solution.peak_utilization(), Some((1, 2)));
    /// ```
    pub fn facility_utilization(&self) -> BTreeMap<Day, u32> {
        let mut utilization = BTreeMap::new();
        for column in self.columns.iter() {
            for day in column.resource_days() {
                *utilization.entry(*day).or_insert(0) += 1;
            }
        }
        utilization
    }

    /// The earliest of the most utilized days and its utilization.
    pub fn peak_utilization(&self) -> Option<(Day, u32)> {
        self.facility_utilization()
            .into_iter()
            .fold(None, |peak, (day, n)| match peak {
                Some((_, m)) if m >= n => peak,
                _ => Some((day, n)),
            })
    }

    /// Returns `true` iff every test is covered, every column is a valid schedule and neither
    /// vehicle nor facility capacities are exceeded.
    pub fn is_feasible(&self, instance: &Instance) -> bool {
        let covered: HashSet<TestId> = self
            .columns
            .iter()
            .flat_map(|c| c.sequence().iter().copied())
            .collect();
        if instance.tests().iter().any(|t| !covered.contains(&t.id)) {
            return false;
        }

        if self.columns.iter().any(|c| !c.is_valid(instance)) {
            return false;
        }

        let vehicles_ok = self
            .vehicle_loads()
            .into_iter()
            .all(|(r, n)| n <= instance.vehicles(r));

        let facility_ok = self
            .facility_utilization()
            .into_iter()
            .all(|(d, n)| instance.facility().capacity(d).map_or(true, |cap| n <= cap));

        vehicles_ok && facility_ok
    }
}

/// Why the search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// no open node is left
    Exhausted,
    NodeLimit,
    TimeLimit,
}

/// Data structure that contains various statistics collected during the search.
#[derive(Debug, Clone)]
pub struct Stats {
    /// objective value of the incumbent
    pub value: f64,
    /// best bound over the open nodes and over integral nodes the incumbent does not reach
    /// (equals `value` when `proved_optimal`)
    pub lower_bound: f64,
    /// LP bound of the root node
    pub root_bound: f64,
    /// number of tests
    pub num_tests: usize,
    /// elapsed time in since the search started
    pub elapsed: Duration,
    /// no. processed nodes
    pub expanded: u64,
    /// no. nodes pruned based on their bound
    pub pruned_value: u64,
    /// no. nodes with an infeasible relaxation
    pub pruned_infeasible: u64,
    /// no. column generation iterations over all nodes
    pub cg_iterations: u64,
    /// no. columns added by pricing
    pub columns_generated: u64,
    /// no. integer programs solved over column pools
    pub integer_solves: u64,
    pub termination: Termination,
    /// true iff the incumbent is proved to be optimal
    pub proved_optimal: bool,
}

impl Stats {
    pub(crate) fn new(num_tests: usize) -> Self {
        Self {
            value: f64::INFINITY,
            lower_bound: f64::NEG_INFINITY,
            root_bound: f64::NEG_INFINITY,
            num_tests,
            elapsed: Duration::ZERO,
            expanded: 0,
            pruned_value: 0,
            pruned_infeasible: 0,
            cg_iterations: 0,
            columns_generated: 0,
            integer_solves: 0,
            termination: Termination::Exhausted,
            proved_optimal: false,
        }
    }

    /// Relative optimality gap `(value - lower_bound) / |value|`.
    ///
    /// # Example
    /// ```
    /// # extern crate testsched;
    /// let mut stats = testsched::Stats::approx(12., 9.);
    /// assert_eq!(stats.gap(), 0.25);
    /// stats.lower_bound = 12.;
    /// assert_eq!(stats.gap(), 0.);
    /// ```
    pub fn gap(&self) -> f64 {
        if !self.value.is_finite() || self.lower_bound.is_nan() {
            return f64::INFINITY;
        }
        let diff = (self.value - self.lower_bound).max(0.);
        if diff <= f64::EPSILON {
            0.
        } else if self.value.abs() <= f64::EPSILON {
            f64::INFINITY
        } else {
            diff / self.value.abs()
        }
    }

    /// Range of objective values containing the optimum, `None` if unknown.
    pub fn optimality_range(&self) -> Option<RangeInclusive<f64>> {
        if self.value.is_finite() && self.lower_bound.is_finite() && self.lower_bound <= self.value
        {
            Some(self.lower_bound..=self.value)
        } else if self.value.is_finite() && self.lower_bound > self.value {
            Some(self.value..=self.value)
        } else {
            None
        }
    }

    /// Stats of a stopped search with incumbent `value` and best open bound `lower_bound`.
    pub fn approx(value: f64, lower_bound: f64) -> Self {
        Self {
            value,
            lower_bound,
            ..Self::new(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{FacilityCapacity, Horizon, TestRequest};
    use rstest::*;

    #[fixture]
    fn instance() -> Instance {
        Instance::builder(Horizon::new(0, 10))
            .test(TestRequest::new(1, 0, 3, 0, 2, 0))
            .test(TestRequest::new(2, 0, 3, 0, 2, 0))
            .all_compatible()
            .vehicles(0, 1)
            .vehicle_cost(4.)
            .facility(FacilityCapacity::uniform(1))
            .build()
            .unwrap()
    }

    fn column(instance: &Instance, sequence: Vec<TestId>, starts: Vec<Day>) -> TimedColumn {
        TimedColumn::new(instance, sequence, 0, starts).unwrap()
    }

    #[rstest]
    fn objective_adds_vehicles_and_tardiness(instance: Instance) {
        // 2 finishes on day 4, one day late
        let solution = Solution::new(&instance, vec![column(&instance, vec![1, 2], vec![0, 2])]);
        assert_eq!(solution.tardiness, 1);
        assert_eq!(solution.value, 5.);
        assert!(solution.is_feasible(&instance));
        assert_eq!(solution.vehicle_schedule()[&0].len(), 1);
    }

    #[rstest]
    fn uncovered_test_is_infeasible(instance: Instance) {
        let solution = Solution::new(&instance, vec![column(&instance, vec![1], vec![0])]);
        assert!(!solution.is_feasible(&instance));
    }

    #[rstest]
    fn capacities_are_checked(instance: Instance) {
        // two vehicles of a single-vehicle release, both on the facility on day 0
        let solution = Solution::new(
            &instance,
            vec![
                column(&instance, vec![1], vec![0]),
                column(&instance, vec![2], vec![0]),
            ],
        );
        assert_eq!(solution.vehicle_loads()[&0], 2);
        assert_eq!(solution.peak_utilization(), Some((0, 2)));
        assert!(!solution.is_feasible(&instance));
    }
}
