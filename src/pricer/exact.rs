//! Exact pricing by a time-indexed 0-1 program.
//!
//! Binary `x[t][p][d]` places test `t` at position `p` of the column starting on day `d`, binary
//! `y[r]` selects the vehicle release. With `X[t][p] = sum_d x[t][p][d]`, `A[t] = sum_p X[t][p]`,
//! start `S[p] = sum d x[.][p][d]`, duration `D[p]` and use `U[p] = sum_t X[t][p]`:
//!
//! ```text
//! min  sum (tardiness - day duals - test dual) x - sum vehicleDual[r] y[r]
//! s.t. sum_r y[r] = 1,  U[0] = 1,  U[p] <= U[p-1],  A[t] <= 1
//!      S[0] >= sum_r r y[r]
//!      S[p] >= S[p-1] + D[p-1] - M (1 - U[p])
//!      X[a][p] + X[b][q] <= 1           for p < q unless a may precede b
//! ```
//!
//! plus a linear encoding of every branch constraint. The column is improving iff
//! `vehicle cost + objective < -REDUCED_COST_TOLERANCE`.
use std::collections::BTreeMap;

use log::trace;

use crate::branch::BranchConstraint;
use crate::column::TimedColumn;
use crate::duals::Duals;
use crate::error::Result;
use crate::instance::{Day, Instance, TestId};
use crate::oracle::{LinearOracle, OracleFactory, OracleStatus, Relation, VarId, VarKind};
use crate::pricer::{is_improving, Completeness, Priced, Pricer};

#[derive(Debug, Clone, Copy)]
struct Placement {
    test: usize,
    position: usize,
    day: Day,
    var: VarId,
}

/// Exact pricer over the MIP oracle, see module docs.
pub struct Exact<'a> {
    instance: &'a Instance,
    max_len: usize,
    factory: &'a dyn OracleFactory,
}

struct Model {
    oracle: Box<dyn LinearOracle>,
    placements: Vec<Placement>,
    releases: BTreeMap<Day, VarId>,
}

impl Model {
    /// `X[t][p]` for the given positions (all if `None`).
    fn terms(&self, test: usize, positions: Option<&[usize]>, coef: f64) -> Vec<(VarId, f64)> {
        self.placements
            .iter()
            .filter(|x| x.test == test && positions.map_or(true, |ps| ps.contains(&x.position)))
            .map(|x| (x.var, coef))
            .collect()
    }

    fn position(&self, test: usize, position: usize) -> Vec<(VarId, f64)> {
        self.terms(test, Some(&[position]), 1.)
    }

    /// Placements of `test` on the days accepted by `on`.
    fn days<F>(&self, test: usize, on: F) -> Vec<(VarId, f64)>
    where
        F: Fn(Day) -> bool,
    {
        self.placements
            .iter()
            .filter(|x| x.test == test && on(x.day))
            .map(|x| (x.var, 1.))
            .collect()
    }

    fn release(&self, release: Day, coef: f64) -> Vec<(VarId, f64)> {
        self.releases
            .get(&release)
            .map(|y| vec![(*y, coef)])
            .unwrap_or_default()
    }

    fn add(&mut self, terms: Vec<(VarId, f64)>, relation: Relation, rhs: f64) -> Result<()> {
        self.oracle.add_constraint(&terms, relation, rhs)?;
        Ok(())
    }
}

impl<'a> Exact<'a> {
    pub fn new(instance: &'a Instance, max_len: usize, factory: &'a dyn OracleFactory) -> Self {
        Self {
            instance,
            max_len: max_len.min(instance.num_tests()),
            factory,
        }
    }

    fn build(&self, duals: &Duals, constraints: &[BranchConstraint]) -> Result<Option<Model>> {
        let instance = self.instance;
        let horizon = instance.horizon();
        let tests = instance.tests();
        let len = self.max_len;

        let mut oracle = self.factory.create();

        let mut releases = BTreeMap::new();
        for (r, _) in instance.releases() {
            let y = oracle.add_variable(-duals.vehicle(r), (0., 1.), VarKind::Binary, &[])?;
            releases.insert(r, y);
        }

        let mut placements = Vec::new();
        for (t, test) in tests.iter().enumerate() {
            let cover = duals.test(test.id);
            for day in horizon.days() {
                if day + test.prep < test.release || test.completion(day) > horizon.end {
                    continue;
                }
                let objective =
                    test.tardiness(day) as f64 - duals.day_credit(test.turnaround_window(day)) - cover;
                for position in 0..len {
                    let var = oracle.add_variable(objective, (0., 1.), VarKind::Binary, &[])?;
                    placements.push(Placement {
                        test: t,
                        position,
                        day,
                        var,
                    });
                }
            }
        }

        if releases.is_empty() || placements.is_empty() {
            return Ok(None);
        }

        let mut model = Model {
            oracle,
            placements,
            releases,
        };

        let y_all = model.releases.values().map(|y| (*y, 1.)).collect::<Vec<_>>();
        model.add(y_all, Relation::Eq, 1.)?;

        let used = |model: &Model, p: usize, coef: f64| {
            model
                .placements
                .iter()
                .filter(|x| x.position == p)
                .map(|x| (x.var, coef))
                .collect::<Vec<_>>()
        };

        // contiguous positions starting with the first
        model.add(used(&model, 0, 1.), Relation::Eq, 1.)?;
        for p in 1..len {
            let mut terms = used(&model, p, 1.);
            terms.extend(used(&model, p - 1, -1.));
            model.add(terms, Relation::Leq, 0.)?;
        }

        for t in 0..tests.len() {
            model.add(model.terms(t, None, 1.), Relation::Leq, 1.)?;
        }

        // first test starts after the vehicle release
        let mut terms = model
            .placements
            .iter()
            .filter(|x| x.position == 0)
            .map(|x| (x.var, x.day as f64))
            .collect::<Vec<_>>();
        terms.extend(model.releases.iter().map(|(r, y)| (*y, -(*r as f64))));
        model.add(terms, Relation::Geq, 0.)?;

        // no overlap: S[p] - M U[p] - S[p-1] - D[p-1] >= -M
        let big_m = (horizon.start.abs() + horizon.end.abs() + 1) as f64;
        for p in 1..len {
            let mut terms = Vec::new();
            for x in model.placements.iter() {
                if x.position == p {
                    terms.push((x.var, x.day as f64 - big_m));
                } else if x.position == p - 1 {
                    terms.push((x.var, -(tests[x.test].completion(x.day) as f64)));
                }
            }
            model.add(terms, Relation::Geq, -big_m)?;
        }

        for a in 0..tests.len() {
            for b in 0..tests.len() {
                if a == b || instance.may_precede_idx(a, b) {
                    continue;
                }
                for q in 1..len {
                    let mut terms = model.terms(a, Some(&(0..q).collect::<Vec<_>>()), 1.);
                    terms.extend(model.position(b, q));
                    model.add(terms, Relation::Leq, 1.)?;
                }
            }
        }

        for constraint in constraints {
            self.encode(&mut model, constraint)?;
        }

        Ok(Some(model))
    }

    fn encode(&self, model: &mut Model, constraint: &BranchConstraint) -> Result<()> {
        let index = |id: TestId| self.instance.index_of(id);
        let len = self.max_len;

        match *constraint {
            BranchConstraint::EnforceTogether(a, b) => {
                if let (Some(a), Some(b)) = (index(a), index(b)) {
                    let mut terms = model.terms(a, None, 1.);
                    terms.extend(model.terms(b, None, -1.));
                    model.add(terms, Relation::Eq, 0.)?;
                }
            }
            BranchConstraint::ForbidTogether(a, b) => {
                if let (Some(a), Some(b)) = (index(a), index(b)) {
                    let mut terms = model.terms(a, None, 1.);
                    terms.extend(model.terms(b, None, 1.));
                    model.add(terms, Relation::Leq, 1.)?;
                }
            }
            BranchConstraint::EnforceOnVehicle(t, r) => {
                if let Some(t) = index(t) {
                    let mut terms = model.terms(t, None, 1.);
                    terms.extend(model.release(r, -1.));
                    model.add(terms, Relation::Leq, 0.)?;
                }
            }
            BranchConstraint::ForbidOnVehicle(t, r) => {
                if let Some(t) = index(t) {
                    let mut terms = model.terms(t, None, 1.);
                    terms.extend(model.release(r, 1.));
                    model.add(terms, Relation::Leq, 1.)?;
                }
            }
            BranchConstraint::EnforceTogetherOnVehicle(a, b, r) => {
                let (a, b) = match (index(a), index(b)) {
                    (Some(a), Some(b)) => (a, b),
                    _ => return Ok(()),
                };
                // both or none
                let mut terms = model.terms(a, None, 1.);
                terms.extend(model.terms(b, None, -1.));
                model.add(terms, Relation::Eq, 0.)?;
                // on release r
                let mut terms = model.terms(a, None, 1.);
                terms.extend(model.release(r, -1.));
                model.add(terms, Relation::Leq, 0.)?;
                // a before b
                for p in 1..len {
                    let mut terms = model.position(a, p);
                    terms.extend(model.terms(b, Some(&(0..p).collect::<Vec<_>>()), 1.));
                    model.add(terms, Relation::Leq, 1.)?;
                }
            }
            BranchConstraint::ForbidTogetherOnVehicle(a, b, r) => {
                let (a, b) = match (index(a), index(b)) {
                    (Some(a), Some(b)) => (a, b),
                    _ => return Ok(()),
                };
                if !model.releases.contains_key(&r) {
                    return Ok(());
                }
                for q in 1..len {
                    let mut terms = model.terms(a, Some(&(0..q).collect::<Vec<_>>()), 1.);
                    terms.extend(model.position(b, q));
                    terms.extend(model.release(r, 1.));
                    model.add(terms, Relation::Leq, 2.)?;
                }
            }
            BranchConstraint::EnforceStart(t, d) => {
                if let Some(t) = index(t) {
                    let terms = model.days(t, |day| day != d);
                    model.add(terms, Relation::Leq, 0.)?;
                }
            }
            BranchConstraint::ForbidStart(t, d) => {
                if let Some(t) = index(t) {
                    let terms = model.days(t, |day| day == d);
                    model.add(terms, Relation::Leq, 0.)?;
                }
            }
        }
        Ok(())
    }
}

impl Pricer for Exact<'_> {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn completeness(&self) -> Completeness {
        Completeness::Exact
    }

    fn price(&mut self, duals: &Duals, constraints: &[BranchConstraint]) -> Result<Vec<Priced>> {
        let mut model = match self.build(duals, constraints)? {
            Some(model) => model,
            None => return Ok(Vec::new()),
        };

        trace!(
            "exact pricing over {} variables and {} constraints",
            model.oracle.num_variables(),
            model.oracle.num_constraints()
        );

        if model.oracle.optimize()? != OracleStatus::Optimal {
            return Ok(Vec::new());
        }

        let reduced_cost = self.instance.vehicle_cost() + model.oracle.objective()?;
        if !is_improving(reduced_cost) {
            return Ok(Vec::new());
        }

        let mut release = None;
        for (r, y) in model.releases.iter() {
            if model.oracle.primal(*y)? > 0.5 {
                release = Some(*r);
            }
        }
        let release = match release {
            Some(r) => r,
            None => return Ok(Vec::new()),
        };

        let mut chosen = Vec::new();
        for x in model.placements.iter() {
            if model.oracle.primal(x.var)? > 0.5 {
                chosen.push(*x);
            }
        }
        chosen.sort_by_key(|x| x.position);

        let tests = self.instance.tests();
        let sequence = chosen.iter().map(|x| tests[x.test].id).collect();
        let starts = chosen.iter().map(|x| x.day).collect();
        let column = TimedColumn::new(self.instance, sequence, release, starts)?;

        Ok(vec![Priced {
            column,
            reduced_cost,
        }])
    }
}
