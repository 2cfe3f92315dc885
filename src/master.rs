//! Restricted master problem of the column generation.
//!
//! ```text
//! min   sum_c (vehicle_cost + cost_c) x_c + M sum_t a_t
//! s.t.  sum_{c : t in c} x_c + a_t >= 1          for every test t
//!       sum_{c : release_c = r} x_c <= vehicles_r  for every release r
//!       sum_{c : c occupies d} x_c <= capacity_d  for every constrained day d
//!       x, a >= 0
//! ```
//!
//! The artificial variables `a_t` keep the restricted problem feasible even when the pool cannot
//! cover all tests yet. Columns fixed to zero by the node's branch constraints are never added.
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use log::{debug, warn};

use crate::branch::{admits, BranchConstraint};
use crate::column::TimedColumn;
use crate::duals::Duals;
use crate::error::{Error, Result};
use crate::instance::{Day, Instance, TestId};
use crate::oracle::{ConstrId, LinearOracle, OracleStatus, Relation, VarId, VarKind};

/// Primal values below this threshold are treated as zero.
pub const PRIMAL_TOLERANCE: f64 = 1e-6;

/// Objective coefficient of the artificial cover variables.
///
/// Any single column costs at most the vehicle cost plus the tardiness of all tests completed
/// after the last release of any vehicle chained with every test, the coefficient dominates the
/// cost of every integer solution.
pub fn artificial_cost(instance: &Instance) -> f64 {
    let horizon = instance.horizon();
    let last_release = instance
        .releases()
        .map(|(r, _)| r)
        .max()
        .map_or(horizon.end, |r| r.max(horizon.end));
    let latest = last_release
        + instance
            .tests()
            .iter()
            .map(|t| t.duration() + t.prep)
            .sum::<i64>();
    let column: f64 = instance.vehicle_cost()
        + instance
            .tests()
            .iter()
            .map(|t| (latest - t.deadline).max(0) as f64)
            .sum::<f64>();
    10. * (instance.num_tests() as f64 * column + 1.)
}

pub struct MasterProblem<'a> {
    instance: &'a Instance,
    constraints: &'a [BranchConstraint],
    oracle: Box<dyn LinearOracle>,
    cover: Vec<(TestId, ConstrId)>,
    cover_rows: HashMap<TestId, ConstrId>,
    vehicle_rows: BTreeMap<Day, ConstrId>,
    day_rows: BTreeMap<Day, ConstrId>,
    artificials: Vec<VarId>,
    columns: Vec<TimedColumn>,
    vars: Vec<VarId>,
    known: HashSet<TimedColumn>,
}

impl<'a> MasterProblem<'a> {
    /// Build the master problem over an initial `pool` of columns.
    pub fn build<I>(
        instance: &'a Instance,
        constraints: &'a [BranchConstraint],
        mut oracle: Box<dyn LinearOracle>,
        pool: I,
        artificial_cost: f64,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = TimedColumn>,
    {
        let mut cover = Vec::with_capacity(instance.num_tests());
        let mut artificials = Vec::with_capacity(instance.num_tests());
        for test in instance.tests() {
            let row = oracle.add_constraint(&[], Relation::Geq, 1.)?;
            let var = oracle.add_variable(
                artificial_cost,
                (0., f64::INFINITY),
                VarKind::Continuous,
                &[(row, 1.)],
            )?;
            cover.push((test.id, row));
            artificials.push(var);
        }

        let mut vehicle_rows = BTreeMap::new();
        for (release, count) in instance.releases() {
            let row = oracle.add_constraint(&[], Relation::Leq, count as f64)?;
            vehicle_rows.insert(release, row);
        }

        let mut master = Self {
            instance,
            constraints,
            oracle,
            cover_rows: cover.iter().copied().collect(),
            cover,
            vehicle_rows,
            day_rows: BTreeMap::new(),
            artificials,
            columns: Vec::new(),
            vars: Vec::new(),
            known: HashSet::new(),
        };

        for day in instance.horizon().days() {
            master.ensure_day(day)?;
        }

        for column in pool {
            master.add_column(column)?;
        }

        Ok(master)
    }

    /// Add a facility row for `day` unless it exists or the day is unconstrained.
    fn ensure_day(&mut self, day: Day) -> Result<Option<ConstrId>> {
        if let Some(row) = self.day_rows.get(&day) {
            return Ok(Some(*row));
        }
        match self.instance.facility().capacity(day) {
            Some(capacity) => {
                // new rows start empty, existing columns occupying the day must be added
                let terms = self
                    .columns
                    .iter()
                    .zip(&self.vars)
                    .filter(|(c, _)| c.occupies(day))
                    .map(|(_, v)| (*v, 1.))
                    .collect::<Vec<_>>();
                let row = self
                    .oracle
                    .add_constraint(&terms, Relation::Leq, capacity as f64)?;
                self.day_rows.insert(day, row);
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    /// Add `column` as a new variable.
    ///
    /// Returns `false` if the column is already present or fixed to zero by a branch constraint.
    pub fn add_column(&mut self, column: TimedColumn) -> Result<bool> {
        if !admits(self.constraints, &column) || self.known.contains(&column) {
            return Ok(false);
        }

        let vehicle_row = *self
            .vehicle_rows
            .get(&column.release())
            .ok_or(Error::UnknownRelease(column.release()))?;

        let mut coefficients = Vec::with_capacity(column.sequence().len() + 1);
        for test in column.sequence() {
            let row = self
                .cover_rows
                .get(test)
                .ok_or(Error::UnknownTest(*test))?;
            coefficients.push((*row, 1.));
        }
        coefficients.push((vehicle_row, 1.));

        for day in column.resource_days() {
            if !self.day_rows.contains_key(day) {
                debug!("extending facility constraints to day {}", day);
            }
            if let Some(row) = self.ensure_day(*day)? {
                coefficients.push((row, 1.));
            }
        }

        let var = self.oracle.add_variable(
            column.objective(self.instance),
            (0., f64::INFINITY),
            VarKind::Continuous,
            &coefficients,
        )?;

        self.known.insert(column.clone());
        self.columns.push(column);
        self.vars.push(var);
        Ok(true)
    }

    pub fn optimize(&mut self) -> Result<OracleStatus> {
        Ok(self.oracle.optimize()?)
    }

    pub fn objective(&self) -> Result<f64> {
        Ok(self.oracle.objective()?)
    }

    fn read_dual(&mut self, row: ConstrId, relation: Relation, what: &str) -> f64 {
        match self.oracle.dual(row) {
            Ok(value) if value.is_finite() => match relation {
                Relation::Geq => value.abs(),
                Relation::Leq => -value.abs(),
                Relation::Eq => value,
            },
            Ok(value) => {
                warn!("dual of {} is {}, using 0", what, value);
                0.
            }
            Err(e) => {
                warn!("failed to read dual of {} ({}), using 0", what, e);
                0.
            }
        }
    }

    /// Snapshot of the duals of the last optimal solution.
    pub fn duals(&mut self) -> Duals {
        let cover = self.cover.clone();
        let tests = cover
            .into_iter()
            .map(|(t, row)| (t, self.read_dual(row, Relation::Geq, &format!("test {}", t))))
            .collect();

        let vehicle_rows = self.vehicle_rows.clone();
        let vehicles = vehicle_rows
            .into_iter()
            .map(|(r, row)| (r, self.read_dual(row, Relation::Leq, &format!("release {}", r))))
            .collect();

        let day_rows = self.day_rows.clone();
        let days = day_rows
            .into_iter()
            .map(|(d, row)| (d, self.read_dual(row, Relation::Leq, &format!("day {}", d))))
            .collect();

        Duals::new(tests, vehicles, days)
    }

    /// Non-zero column values of the last solution as `(index into columns(), value)`.
    pub fn solution(&self) -> Result<Vec<(usize, f64)>> {
        let mut values = Vec::new();
        for (i, var) in self.vars.iter().enumerate() {
            let value = self.oracle.primal(*var)?;
            if value > PRIMAL_TOLERANCE {
                values.push((i, value));
            }
        }
        Ok(values)
    }

    /// Total value of the artificial variables in the last solution.
    pub fn artificial_mass(&self) -> Result<f64> {
        let mut mass = 0.;
        for var in self.artificials.iter() {
            mass += self.oracle.primal(*var)?;
        }
        Ok(mass)
    }

    /// Current column pool, indexed consistently with [MasterProblem::solution].
    #[inline]
    pub fn columns(&self) -> &[TimedColumn] {
        &self.columns
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Solve the integer program over the current pool.
    ///
    /// Artificial variables are removed and column variables become binary. Returns the selected
    /// columns of an optimal integer solution with objective at most `cutoff`, or `None` if there
    /// is none.
    pub fn solve_integer(
        mut self,
        cutoff: Option<f64>,
        time_limit: Option<Duration>,
    ) -> Result<Option<Vec<TimedColumn>>> {
        for var in self.artificials.iter() {
            self.oracle.set_bounds(*var, (0., 0.))?;
        }
        for var in self.vars.iter() {
            self.oracle.set_kind(*var, VarKind::Binary)?;
        }
        self.oracle.set_cutoff(cutoff);
        self.oracle.set_time_limit(time_limit);

        match self.oracle.optimize()? {
            OracleStatus::Optimal => {
                let mut selected = Vec::new();
                for (column, var) in self.columns.into_iter().zip(self.vars) {
                    if self.oracle.primal(var)? > 0.5 {
                        selected.push(column);
                    }
                }
                Ok(Some(selected))
            }
            OracleStatus::Infeasible | OracleStatus::Unbounded => Ok(None),
        }
    }
}
