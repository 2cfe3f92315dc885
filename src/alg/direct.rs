//! Compact time-indexed integer program over the whole instance.
//!
//! Binary `u[v]` uses vehicle `v` (one per vehicle of every release), `a[t][v]` assigns test `t`
//! to it and `z[t][d]` starts the test on day `d`. Binary `p[s][t]` puts `s` before `t` on a
//! shared vehicle and exists only if `s` may precede `t`. With start `S[t] = sum_d d z[t][d]`:
//!
//! ```text
//! min  sum_v vehicle_cost u[v] + sum_t sum_d tardiness_t(d) z[t][d]
//! s.t. sum_v a[t][v] = 1,  sum_d z[t][d] = 1,  a[t][v] <= u[v]
//!      S[t] >= sum_v release_v a[t][v]
//!      a[s][v] + a[t][v] - p[s][t] - p[t][s] <= 1,  p[s][t] + p[t][s] <= 1
//!      S[t] >= S[s] + duration_s - M (1 - p[s][t])
//!      sum_{(t, d) : day in window_t(d)} z[t][d] <= capacity(day)
//!      u[v + 1] <= u[v]                                for vehicles of the same release
//! ```
//!
//! Start variables exist only for days on which the test is released and completes within the
//! horizon. The model grows with the horizon times the number of vehicles and is meant as a
//! reference for small instances.
use std::collections::BTreeMap;
use std::time::Duration;

use itertools::Itertools;
use log::{debug, info};

use crate::alg::core::Solution;
use crate::column::TimedColumn;
use crate::error::{Error, Result};
use crate::instance::{Day, Instance};
use crate::oracle::{
    GoodLpFactory, LinearOracle, OracleFactory, OracleStatus, Relation, VarId, VarKind,
};

/// Direct integer program solver, see module docs.
///
/// # Example
/// ```
/// # extern crate testsched;
/// use testsched::{DirectIp, Horizon, Instance, TestRequest};
/// let instance = Instance::builder(Horizon::new(0, 8))
///     .test(TestRequest::new(1, 0, 2, 0, 1, 0))
///     .test(TestRequest::new(2, 0, 3, 0, 1, 0))
///     .all_compatible()
///     .vehicles(0, 2)
///     .vehicle_cost(5.)
///     .build()
///     .unwrap();
///
/// let solution = DirectIp::new(&instance).solve().unwrap().unwrap();
/// assert_eq!(solution.num_vehicles(), 1);
/// assert!((solution.value - 5.).abs() < 1e-6);
/// ```
pub struct DirectIp<'a> {
    instance: &'a Instance,
    factory: Box<dyn OracleFactory + 'a>,
    time_limit: Option<Duration>,
}

/// Variables of the model, indexed by test index and vehicle.
struct Vars {
    /// `(release, u[v])`
    vehicles: Vec<(Day, VarId)>,
    assign: Vec<Vec<VarId>>,
    /// `(d, z[t][d])` over the admissible start days of each test
    starts: Vec<Vec<(Day, VarId)>>,
    /// `(s, t) -> p[s][t]`
    order: BTreeMap<(usize, usize), VarId>,
}

impl Vars {
    /// Terms of `coef * S[t]`.
    fn start(&self, t: usize, coef: f64) -> impl Iterator<Item = (VarId, f64)> + '_ {
        self.starts[t]
            .iter()
            .map(move |(day, z)| (*z, coef * *day as f64))
    }
}

impl<'a> DirectIp<'a> {
    pub fn new(instance: &'a Instance) -> Self {
        Self {
            instance,
            factory: Box::new(GoodLpFactory),
            time_limit: None,
        }
    }

    pub fn with_oracle<F>(mut self, factory: F) -> Self
    where
        F: OracleFactory + 'a,
    {
        self.factory = Box::new(factory);
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Optimal solution of the model or `None` if the instance has no feasible batching.
    pub fn solve(&self) -> Result<Option<Solution>> {
        let instance = self.instance;
        if instance.num_tests() == 0 {
            return Ok(Some(Solution::new(instance, Vec::new())));
        }

        let mut oracle = self.factory.create();
        let vars = match self.variables(&mut *oracle)? {
            Some(vars) => vars,
            None => return Ok(None),
        };
        self.constraints(&mut *oracle, &vars)?;

        debug!(
            "direct model with {} variables and {} constraints",
            oracle.num_variables(),
            oracle.num_constraints()
        );
        oracle.set_time_limit(self.time_limit);
        if oracle.optimize()? != OracleStatus::Optimal {
            return Ok(None);
        }

        let solution = self.extract(&*oracle, &vars)?;
        info!(
            "direct model solved with value {:.4} on {} vehicles",
            solution.value,
            solution.num_vehicles()
        );
        Ok(Some(solution))
    }

    /// Add all variables, `None` if some test cannot start on any day.
    fn variables(&self, oracle: &mut dyn LinearOracle) -> Result<Option<Vars>> {
        let instance = self.instance;
        let horizon = instance.horizon();
        let tests = instance.tests();

        let mut vehicles = Vec::new();
        for (release, count) in instance.releases() {
            for _ in 0..count {
                let cost = instance.vehicle_cost();
                let u = oracle.add_variable(cost, (0., 1.), VarKind::Binary, &[])?;
                vehicles.push((release, u));
            }
        }

        let mut assign = Vec::with_capacity(tests.len());
        for _ in tests {
            let vars = vehicles
                .iter()
                .map(|_| oracle.add_variable(0., (0., 1.), VarKind::Binary, &[]))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            assign.push(vars);
        }

        let mut starts = Vec::with_capacity(tests.len());
        for test in tests {
            let days = horizon
                .days()
                .filter(|d| d + test.prep >= test.release && test.completion(*d) <= horizon.end)
                .collect::<Vec<_>>();
            if days.is_empty() {
                debug!("test {} cannot start within the horizon", test.id);
                return Ok(None);
            }
            let vars = days
                .into_iter()
                .map(|d| {
                    oracle
                        .add_variable(test.tardiness(d) as f64, (0., 1.), VarKind::Binary, &[])
                        .map(|z| (d, z))
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            starts.push(vars);
        }

        let mut order = BTreeMap::new();
        for (s, t) in (0..tests.len()).tuple_combinations() {
            for (a, b) in [(s, t), (t, s)] {
                if instance.may_precede_idx(a, b) {
                    let p = oracle.add_variable(0., (0., 1.), VarKind::Binary, &[])?;
                    order.insert((a, b), p);
                }
            }
        }

        Ok(Some(Vars {
            vehicles,
            assign,
            starts,
            order,
        }))
    }

    fn constraints(&self, oracle: &mut dyn LinearOracle, vars: &Vars) -> Result<()> {
        let instance = self.instance;
        let horizon = instance.horizon();
        let tests = instance.tests();
        let n = tests.len();

        for t in 0..n {
            let terms = vars.assign[t].iter().map(|a| (*a, 1.)).collect_vec();
            oracle.add_constraint(&terms, Relation::Eq, 1.)?;

            let terms = vars.starts[t].iter().map(|(_, z)| (*z, 1.)).collect_vec();
            oracle.add_constraint(&terms, Relation::Eq, 1.)?;

            for (a, (_, u)) in vars.assign[t].iter().zip(&vars.vehicles) {
                oracle.add_constraint(&[(*a, 1.), (*u, -1.)], Relation::Leq, 0.)?;
            }

            // not before the release of the carrying vehicle
            let terms = vars
                .start(t, 1.)
                .chain(
                    vars.assign[t]
                        .iter()
                        .zip(&vars.vehicles)
                        .map(|(a, (release, _))| (*a, -(*release as f64))),
                )
                .collect_vec();
            oracle.add_constraint(&terms, Relation::Geq, 0.)?;
        }

        for (s, t) in (0..n).tuple_combinations() {
            let orders = [vars.order.get(&(s, t)), vars.order.get(&(t, s))];
            for v in 0..vars.vehicles.len() {
                let terms = [(vars.assign[s][v], 1.), (vars.assign[t][v], 1.)]
                    .into_iter()
                    .chain(orders.iter().flatten().map(|p| (**p, -1.)))
                    .collect_vec();
                oracle.add_constraint(&terms, Relation::Leq, 1.)?;
            }
            if let [Some(st), Some(ts)] = orders {
                oracle.add_constraint(&[(*st, 1.), (*ts, 1.)], Relation::Leq, 1.)?;
            }
        }

        let longest = tests.iter().map(|t| t.duration()).max().unwrap_or(0);
        let big_m = (horizon.len() as i64 + longest) as f64;
        for (&(s, t), p) in vars.order.iter() {
            let terms = vars
                .start(t, 1.)
                .chain(vars.start(s, -1.))
                .chain([(*p, -big_m)])
                .collect_vec();
            oracle.add_constraint(&terms, Relation::Geq, tests[s].duration() as f64 - big_m)?;
        }

        for day in horizon.days() {
            let capacity = match instance.facility().capacity(day) {
                Some(capacity) => capacity,
                None => continue,
            };
            let terms = (0..n)
                .flat_map(move |t| {
                    vars.starts[t]
                        .iter()
                        .filter(move |(d, _)| tests[t].turnaround_window(*d).contains(&day))
                        .map(|(_, z)| (*z, 1.))
                })
                .collect_vec();
            if terms.len() > capacity as usize {
                oracle.add_constraint(&terms, Relation::Leq, capacity as f64)?;
            }
        }

        for ((r, u), (q, w)) in vars.vehicles.iter().tuple_windows() {
            if r == q {
                oracle.add_constraint(&[(*w, 1.), (*u, -1.)], Relation::Leq, 0.)?;
            }
        }

        Ok(())
    }

    /// One column per used vehicle with its tests ordered by start day.
    fn extract(&self, oracle: &dyn LinearOracle, vars: &Vars) -> Result<Solution> {
        let instance = self.instance;
        let tests = instance.tests();

        let mut start = Vec::with_capacity(tests.len());
        for (t, test) in tests.iter().enumerate() {
            let mut day = None;
            for (d, z) in vars.starts[t].iter() {
                if oracle.primal(*z)? > 0.5 {
                    day = Some(*d);
                    break;
                }
            }
            start.push(day.ok_or_else(|| {
                Error::Invariant(format!("test {} has no start day", test.id))
            })?);
        }

        let mut columns = Vec::new();
        for (v, (release, _)) in vars.vehicles.iter().enumerate() {
            let mut carried = Vec::new();
            for (t, test) in tests.iter().enumerate() {
                if oracle.primal(vars.assign[t][v])? > 0.5 {
                    carried.push((start[t], test.id));
                }
            }
            if carried.is_empty() {
                continue;
            }
            carried.sort_unstable();
            let (starts, sequence): (Vec<_>, Vec<_>) = carried.into_iter().unzip();
            columns.push(TimedColumn::new(instance, sequence, *release, starts)?);
        }

        Ok(Solution::new(instance, columns))
    }
}
