//! Interface of the external LP/MIP solver.
//!
//! The branch-and-price engine never solves linear or integer programs itself. Instead it builds
//! models incrementally through [LinearOracle] (rows first, then columns carrying their
//! coefficients in existing rows) and reads back objective, primal and dual values. Fresh oracles
//! are obtained from an [OracleFactory], one per master problem or exact pricing call.
//!
//! [GoodLp] is the bundled implementation on top of `good_lp`.
use std::fmt;
use std::time::Duration;

use thiserror::Error;

mod goodlp;

pub use goodlp::{GoodLp, GoodLpFactory};

/// Handle of a variable within one oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) usize);

/// Handle of a constraint within one oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstrId(pub(crate) usize);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

impl fmt::Display for ConstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// `lhs >= rhs`
    Geq,
    /// `lhs <= rhs`
    Leq,
    /// `lhs == rhs`
    Eq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Continuous,
    Integer,
    Binary,
}

/// Outcome of [LinearOracle::optimize].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleStatus {
    Optimal,
    Infeasible,
    Unbounded,
}

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("unknown variable {0}")]
    UnknownVariable(VarId),

    #[error("unknown constraint {0}")]
    UnknownConstraint(ConstrId),

    #[error("invalid bounds [{0}, {1}]")]
    InvalidBounds(f64, f64),

    #[error("no solution available, the model has not been solved to optimality")]
    NoSolution,

    #[error("dual values unavailable: {0}")]
    DualsUnavailable(String),

    #[error("solver failure: {0}")]
    Solver(String),
}

/// Incrementally built linear (or mixed integer) minimization model.
pub trait LinearOracle {
    /// Add constraint `sum(coef * var) relation rhs` over existing variables.
    fn add_constraint(
        &mut self,
        terms: &[(VarId, f64)],
        relation: Relation,
        rhs: f64,
    ) -> Result<ConstrId, OracleError>;

    /// Add a variable with its objective coefficient, bounds, kind and coefficients in existing
    /// constraints.
    fn add_variable(
        &mut self,
        objective: f64,
        bounds: (f64, f64),
        kind: VarKind,
        column: &[(ConstrId, f64)],
    ) -> Result<VarId, OracleError>;

    fn set_kind(&mut self, var: VarId, kind: VarKind) -> Result<(), OracleError>;

    fn set_bounds(&mut self, var: VarId, bounds: (f64, f64)) -> Result<(), OracleError>;

    fn set_time_limit(&mut self, limit: Option<Duration>);

    fn set_gap_limit(&mut self, gap: Option<f64>);

    /// Only accept solutions with objective value at most `cutoff`.
    fn set_cutoff(&mut self, cutoff: Option<f64>);

    fn optimize(&mut self) -> Result<OracleStatus, OracleError>;

    fn objective(&self) -> Result<f64, OracleError>;

    fn primal(&self, var: VarId) -> Result<f64, OracleError>;

    /// Dual value of a constraint in the last optimal solution of a continuous model.
    fn dual(&mut self, constraint: ConstrId) -> Result<f64, OracleError>;

    fn num_variables(&self) -> usize;

    fn num_constraints(&self) -> usize;
}

/// Source of fresh, empty oracles.
pub trait OracleFactory {
    fn create(&self) -> Box<dyn LinearOracle>;
}

impl<F> OracleFactory for F
where
    F: Fn() -> Box<dyn LinearOracle>,
{
    fn create(&self) -> Box<dyn LinearOracle> {
        self()
    }
}
