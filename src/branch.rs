//! Branching decisions of the branch-and-price tree.
//!
//! Every decision comes as a complementary pair of an *enforcing* and a *forbidding* constraint.
//! A constraint does not add rows to the master problem, instead it fixes to zero (i.e. removes)
//! the columns that contradict it. Within a pair the two predicates are complementary on the
//! columns the decision is about and both leave every other column untouched, so each column
//! survives in at least one child.
//!
//! Start constraints are only decided on timed columns. An untimed batch (e.g. a sequence before
//! the pricer times it) is never fixed by them, the pricers enforce them through
//! [admits_start] while timing.
use std::fmt;

use crate::column::Batch;
use crate::instance::{Day, TestId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchConstraint {
    /// both tests must be in the same column
    EnforceTogether(TestId, TestId),
    /// no column may carry both tests
    ForbidTogether(TestId, TestId),
    /// the test must be carried by a vehicle of given release
    EnforceOnVehicle(TestId, Day),
    /// the test must not be carried by a vehicle of given release
    ForbidOnVehicle(TestId, Day),
    /// first test must directly or indirectly precede second in a column of given release
    EnforceTogetherOnVehicle(TestId, TestId, Day),
    /// no column of given release may carry first test before second
    ForbidTogetherOnVehicle(TestId, TestId, Day),
    /// the test must start on given day
    EnforceStart(TestId, Day),
    /// the test must not start on given day
    ForbidStart(TestId, Day),
}

impl BranchConstraint {
    /// Returns `true` iff this constraint removes `column` from the master problem.
    ///
    /// # Example
    /// ```
    /// # extern crate testsched;
    /// use testsched::{BranchConstraint, Column, Horizon, Instance, TestRequest};
    /// let instance = Instance::builder(Horizon::new(0, 10))
    ///     .test(TestRequest::new(1, 0, 5, 0, 1, 0))
    ///     .test(TestRequest::new(2, 0, 5, 0, 1, 0))
    ///     .all_compatible()
    ///     .vehicles(0, 2)
    ///     .build()
    ///     .unwrap();
    /// let single = Column::new(&instance, vec![1], 0).unwrap();
    /// assert!(BranchConstraint::EnforceTogether(1, 2).fixes_to_zero(&single));
    /// assert!(!BranchConstraint::ForbidTogether(1, 2).fixes_to_zero(&single));
    /// ```
    pub fn fixes_to_zero<C: Batch + ?Sized>(&self, column: &C) -> bool {
        match *self {
            Self::EnforceTogether(a, b) => column.contains(a) != column.contains(b),
            Self::ForbidTogether(a, b) => column.contains(a) && column.contains(b),
            Self::EnforceOnVehicle(t, r) => column.contains(t) && column.release() != r,
            Self::ForbidOnVehicle(t, r) => column.contains(t) && column.release() == r,
            Self::EnforceTogetherOnVehicle(a, b, r) => {
                (column.contains(a) || column.contains(b)) && !together_on(column, a, b, r)
            }
            Self::ForbidTogetherOnVehicle(a, b, r) => together_on(column, a, b, r),
            Self::EnforceStart(t, d) => column.start_day(t).map_or(false, |s| s != d),
            Self::ForbidStart(t, d) => column.start_day(t) == Some(d),
        }
    }

    /// Returns `false` iff this constraint forbids `test` to start on `day`.
    #[inline]
    pub fn allows_start(&self, test: TestId, day: Day) -> bool {
        match *self {
            Self::EnforceStart(t, d) => t != test || d == day,
            Self::ForbidStart(t, d) => t != test || d != day,
            _ => true,
        }
    }

    /// The other constraint of the branching pair.
    pub fn complement(&self) -> Self {
        match *self {
            Self::EnforceTogether(a, b) => Self::ForbidTogether(a, b),
            Self::ForbidTogether(a, b) => Self::EnforceTogether(a, b),
            Self::EnforceOnVehicle(t, r) => Self::ForbidOnVehicle(t, r),
            Self::ForbidOnVehicle(t, r) => Self::EnforceOnVehicle(t, r),
            Self::EnforceTogetherOnVehicle(a, b, r) => Self::ForbidTogetherOnVehicle(a, b, r),
            Self::ForbidTogetherOnVehicle(a, b, r) => Self::EnforceTogetherOnVehicle(a, b, r),
            Self::EnforceStart(t, d) => Self::ForbidStart(t, d),
            Self::ForbidStart(t, d) => Self::EnforceStart(t, d),
        }
    }

    #[inline]
    pub fn is_enforcing(&self) -> bool {
        matches!(
            self,
            Self::EnforceTogether(..)
                | Self::EnforceOnVehicle(..)
                | Self::EnforceTogetherOnVehicle(..)
                | Self::EnforceStart(..)
        )
    }
}

#[inline]
fn together_on<C: Batch + ?Sized>(column: &C, a: TestId, b: TestId, release: Day) -> bool {
    column.release() == release && column.precedes(a, b)
}

/// Returns `true` iff no constraint fixes `column` to zero.
#[inline]
pub fn admits<C: Batch + ?Sized>(constraints: &[BranchConstraint], column: &C) -> bool {
    !constraints.iter().any(|c| c.fixes_to_zero(column))
}

/// Returns `true` iff no constraint forbids `test` to start on `day`.
#[inline]
pub fn admits_start(constraints: &[BranchConstraint], test: TestId, day: Day) -> bool {
    constraints.iter().all(|c| c.allows_start(test, day))
}

impl fmt::Display for BranchConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnforceTogether(a, b) => write!(f, "{} with {}", a, b),
            Self::ForbidTogether(a, b) => write!(f, "{} apart from {}", a, b),
            Self::EnforceOnVehicle(t, r) => write!(f, "{} on {}", t, r),
            Self::ForbidOnVehicle(t, r) => write!(f, "{} not on {}", t, r),
            Self::EnforceTogetherOnVehicle(a, b, r) => write!(f, "{} before {} on {}", a, b, r),
            Self::ForbidTogetherOnVehicle(a, b, r) => {
                write!(f, "not {} before {} on {}", a, b, r)
            }
            Self::EnforceStart(t, d) => write!(f, "{} starts on {}", t, d),
            Self::ForbidStart(t, d) => write!(f, "{} not starting on {}", t, d),
        }
    }
}
