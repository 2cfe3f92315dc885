use thiserror::Error;

use crate::instance::{Day, TestId};
use crate::oracle::OracleError;

/// Errors raised while building an instance or running branch-and-price.
#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown test {0}")]
    UnknownTest(TestId),

    #[error("test {0} appears more than once in a sequence")]
    DuplicateTest(TestId),

    #[error("missing start day for test {0}")]
    MissingStart(TestId),

    #[error("no vehicles are released on day {0}")]
    UnknownRelease(Day),

    #[error("invalid instance: {0}")]
    InvalidInstance(String),

    #[error("the root relaxation is infeasible")]
    RootInfeasible,

    #[error("no feasible solution was found")]
    NoFeasibleSolution,

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error(transparent)]
    Oracle(#[from] OracleError),
}

pub type Result<T> = std::result::Result<T, Error>;
