use std::collections::{BTreeMap, HashMap};

use crate::column::TimedColumn;
use crate::instance::{Day, Instance, TestId};

/// Immutable snapshot of the master problem duals after one reoptimization.
///
/// Cover duals are non-negative, vehicle and facility duals non-positive (minimization with `>=`
/// cover and `<=` capacity constraints). Missing entries read as `0`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Duals {
    tests: HashMap<TestId, f64>,
    vehicles: BTreeMap<Day, f64>,
    days: BTreeMap<Day, f64>,
}

impl Duals {
    pub fn new(
        tests: HashMap<TestId, f64>,
        vehicles: BTreeMap<Day, f64>,
        days: BTreeMap<Day, f64>,
    ) -> Self {
        Self {
            tests,
            vehicles,
            days,
        }
    }

    #[inline]
    pub fn test(&self, id: TestId) -> f64 {
        self.tests.get(&id).copied().unwrap_or(0.)
    }

    #[inline]
    pub fn vehicle(&self, release: Day) -> f64 {
        self.vehicles.get(&release).copied().unwrap_or(0.)
    }

    #[inline]
    pub fn day(&self, day: Day) -> f64 {
        self.days.get(&day).copied().unwrap_or(0.)
    }

    /// Returns `true` iff no facility dual is (numerically) non-zero.
    pub fn days_vanish(&self) -> bool {
        self.days.values().all(|d| d.abs() < 1e-9)
    }

    /// Sum of facility duals over `days`.
    #[inline]
    pub fn day_credit<I: IntoIterator<Item = Day>>(&self, days: I) -> f64 {
        days.into_iter().map(|d| self.day(d)).sum()
    }

    /// Reduced cost of a column given its sequence, release, total tardiness and resource days.
    pub fn reduced_cost_of(
        &self,
        instance: &Instance,
        sequence: &[TestId],
        release: Day,
        cost: i64,
        days: &[Day],
    ) -> f64 {
        let covers: f64 = sequence.iter().map(|t| self.test(*t)).sum();
        instance.vehicle_cost() + cost as f64
            - covers
            - self.vehicle(release)
            - self.day_credit(days.iter().copied())
    }

    /// `vehicle cost + cost - sum test duals - vehicle dual - sum day duals`
    #[inline]
    pub fn reduced_cost(&self, instance: &Instance, column: &TimedColumn) -> f64 {
        self.reduced_cost_of(
            instance,
            column.sequence(),
            column.release(),
            column.cost(),
            column.resource_days(),
        )
    }
}
