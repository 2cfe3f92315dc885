//! Column generation at one node of the search tree.
//!
//! The master problem is reoptimized, its duals are handed to the pricer and all improving columns
//! it returns are added, until the pricer finds nothing (convergence), the iteration cap is hit or
//! the run deadline passes. Every priced column is checked before it enters the master problem.
use std::time::Instant;

use log::{debug, warn};

use crate::branch::{admits, BranchConstraint};
use crate::duals::Duals;
use crate::error::{Error, Result};
use crate::instance::Instance;
use crate::master::{MasterProblem, PRIMAL_TOLERANCE};
use crate::oracle::OracleStatus;
use crate::pricer::{is_improving, Priced, Pricer};

/// Final state of a node relaxation.
#[derive(Debug, Clone)]
pub struct Relaxation {
    /// objective of the last restricted master problem
    pub objective: f64,
    /// `true` iff the pricer found no improving column, i.e. `objective` is the node LP bound
    pub converged: bool,
    /// non-zero column values as `(column index, value)`
    pub solution: Vec<(usize, f64)>,
    /// duals of the last restricted master problem
    pub duals: Duals,
    pub iterations: usize,
    /// number of columns added by pricing
    pub added: usize,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Relaxed(Relaxation),
    /// no solution without artificial cover
    Infeasible,
}

/// Check everything a pricer claims about `priced`.
pub(crate) fn verify(
    instance: &Instance,
    duals: &Duals,
    constraints: &[BranchConstraint],
    priced: &Priced,
) -> Result<()> {
    let column = &priced.column;
    column.validate(instance)?;

    let greedy = column.untimed(instance)?;
    if greedy.cost() > column.cost() {
        return Err(Error::Invariant(format!(
            "greedy cost {} of {} exceeds its explicit cost {}",
            greedy.cost(),
            column,
            column.cost()
        )));
    }

    let reduced_cost = duals.reduced_cost(instance, column);
    let tolerance = 1e-6 * reduced_cost.abs().max(1.);
    if (reduced_cost - priced.reduced_cost).abs() > tolerance {
        return Err(Error::Invariant(format!(
            "reduced cost of {} is {} but was priced at {}",
            column, reduced_cost, priced.reduced_cost
        )));
    }
    if !is_improving(reduced_cost) {
        return Err(Error::Invariant(format!(
            "{} does not improve, reduced cost {}",
            column, reduced_cost
        )));
    }
    if !admits(constraints, column) {
        return Err(Error::Invariant(format!(
            "{} is fixed to zero at this node",
            column
        )));
    }
    Ok(())
}

/// Run column generation on `master` until convergence or a budget is exhausted.
pub fn solve(
    instance: &Instance,
    master: &mut MasterProblem,
    pricer: &mut dyn Pricer,
    constraints: &[BranchConstraint],
    max_iterations: usize,
    deadline: Option<Instant>,
) -> Result<Outcome> {
    let mut iterations = 0;
    let mut added = 0;

    let (objective, duals, converged) = loop {
        match master.optimize()? {
            OracleStatus::Optimal => {}
            OracleStatus::Infeasible | OracleStatus::Unbounded => return Ok(Outcome::Infeasible),
        }

        let objective = master.objective()?;
        let duals = master.duals();
        iterations += 1;

        if iterations > max_iterations {
            warn!("column generation stopped after {} iterations", max_iterations);
            break (objective, duals, false);
        }
        if deadline.map_or(false, |d| Instant::now() >= d) {
            debug!("column generation interrupted by the time limit");
            break (objective, duals, false);
        }

        let priced = pricer.price(&duals, constraints)?;
        if priced.is_empty() {
            break (objective, duals, true);
        }

        let mut new = 0;
        for p in priced {
            verify(instance, &duals, constraints, &p)?;
            if master.add_column(p.column)? {
                new += 1;
            }
        }

        debug!(
            "iteration {}: objective {:.4}, {} new columns ({} in pool)",
            iterations,
            objective,
            new,
            master.num_columns()
        );

        if new == 0 {
            warn!("{} priced only known columns, stopping", pricer.name());
            break (objective, duals, false);
        }
        added += new;
    };

    if converged && master.artificial_mass()? > PRIMAL_TOLERANCE {
        debug!("relaxation needs artificial cover, node is infeasible");
        return Ok(Outcome::Infeasible);
    }

    Ok(Outcome::Relaxed(Relaxation {
        objective,
        converged,
        solution: master.solution()?,
        duals,
        iterations,
        added,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{Column, TimedColumn};
    use crate::instance::{Horizon, TestRequest};
    use crate::oracle::GoodLp;
    use crate::pricer::{seed_columns, SequenceThenTime};
    use std::collections::BTreeMap;

    fn instance() -> Instance {
        Instance::builder(Horizon::new(0, 10))
            .test(TestRequest::new(1, 0, 2, 0, 1, 0))
            .test(TestRequest::new(2, 0, 3, 0, 1, 0))
            .test(TestRequest::new(3, 0, 4, 0, 1, 0))
            .all_compatible()
            .vehicles(0, 1)
            .vehicle_cost(3.)
            .build()
            .unwrap()
    }

    #[test]
    fn converges_to_full_batch() {
        let instance = instance();
        let seeds = seed_columns(&instance, 1).unwrap();
        let mut master =
            MasterProblem::build(&instance, &[], Box::new(GoodLp::new()), seeds, 1000.).unwrap();
        let mut pricer = SequenceThenTime::new(&instance, 3);

        let outcome = solve(&instance, &mut master, &mut pricer, &[], 100, None).unwrap();
        let relaxation = match outcome {
            Outcome::Relaxed(r) => r,
            Outcome::Infeasible => panic!("relaxation should be feasible"),
        };

        // one vehicle has to carry all tests, [1, 2, 3] is on time
        assert!(relaxation.converged);
        assert!(relaxation.added > 0);
        assert!((relaxation.objective - 3.).abs() < 1e-6);
        assert!(master.artificial_mass().unwrap() < 1e-6);
    }

    #[test]
    fn infeasible_with_empty_pricing() {
        let instance = instance();
        let seeds = seed_columns(&instance, 1).unwrap();
        let mut master =
            MasterProblem::build(&instance, &[], Box::new(GoodLp::new()), seeds, 1000.).unwrap();
        // sequences of a single test cannot cover three tests with one vehicle
        let mut pricer = SequenceThenTime::new(&instance, 1);

        let outcome = solve(&instance, &mut master, &mut pricer, &[], 100, None).unwrap();
        assert!(matches!(outcome, Outcome::Infeasible));
    }

    #[test]
    fn rejects_wrong_claims() {
        let instance = instance();
        let column: TimedColumn = Column::new(&instance, vec![1], 0)
            .unwrap()
            .to_timed(&instance)
            .unwrap();
        let duals = Duals::new(
            [(1, 5.)].into_iter().collect(),
            BTreeMap::new(),
            BTreeMap::new(),
        );

        let honest = Priced {
            column: column.clone(),
            reduced_cost: -2.,
        };
        assert!(verify(&instance, &duals, &[], &honest).is_ok());

        let wrong = Priced {
            column: column.clone(),
            reduced_cost: -3.,
        };
        assert!(matches!(
            verify(&instance, &duals, &[], &wrong),
            Err(Error::Invariant(_))
        ));

        let fixed = [BranchConstraint::ForbidOnVehicle(1, 0)];
        assert!(verify(&instance, &duals, &fixed, &honest).is_err());

        let late = Priced {
            column: TimedColumn::new(&instance, vec![1], 0, vec![-1]).unwrap(),
            reduced_cost: -2.,
        };
        assert!(verify(&instance, &duals, &[], &late).is_err());
    }
}
