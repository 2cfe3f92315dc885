//! Candidate batches of the master problem.
//!
//! A [Column] is an ordered sequence of tests carried by one vehicle release and costed by the
//! greedy *as soon as possible* schedule. A [TimedColumn] additionally fixes an explicit start day
//! for every test, which is what the pricers produce and the master problem stores.
//!
//! ## Cost model
//! The cost of a column is its total tardiness `sum_i max(0, start_i + duration_i - deadline_i)`.
//! The greedy schedule starts each test as early as its vehicle, its predecessor and its own
//! release allow, hence no valid explicit schedule of the same sequence can be cheaper:
//! `Column::cost() <= TimedColumn::cost()` for the same sequence and release.
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use itertools::Itertools;

use crate::error::{Error, Result};
use crate::instance::{Day, Instance, TestId};

fn check_sequence(instance: &Instance, sequence: &[TestId]) -> Result<()> {
    for (i, id) in sequence.iter().enumerate() {
        instance.require(*id)?;
        if sequence[..i].contains(id) {
            return Err(Error::DuplicateTest(*id));
        }
    }
    Ok(())
}

/// Start days of the greedy schedule of `sequence` on a vehicle released on `release`.
///
/// The chain starts at the vehicle release. A test that cannot start right after its predecessor
/// because it would be ready before its own release starts `prep` days before the release instead,
/// and the chain continues once it completes (i.e. after its turnaround and analysis).
pub(crate) fn greedy_starts(
    instance: &Instance,
    sequence: &[TestId],
    release: Day,
) -> Result<Vec<Day>> {
    let mut cursor = release;
    let mut starts = Vec::with_capacity(sequence.len());
    for id in sequence {
        let test = instance.require(*id)?;
        if cursor + test.prep < test.release {
            let start = test.earliest_start();
            starts.push(start);
            cursor = test.completion(start);
        } else {
            starts.push(cursor);
            cursor += test.duration();
        }
    }
    Ok(starts)
}

fn tardiness(instance: &Instance, sequence: &[TestId], starts: &[Day]) -> Result<i64> {
    sequence
        .iter()
        .zip(starts)
        .map(|(id, start)| instance.require(*id).map(|t| t.tardiness(*start)))
        .sum()
}

#[inline]
fn precedes(sequence: &[TestId], a: TestId, b: TestId) -> bool {
    match (
        sequence.iter().position(|t| *t == a),
        sequence.iter().position(|t| *t == b),
    ) {
        (Some(i), Some(j)) => i < j,
        _ => false,
    }
}

/// Common view of [Column] and [TimedColumn]: a sequence of tests on a vehicle release.
pub trait Batch {
    fn sequence(&self) -> &[TestId];

    fn release(&self) -> Day;

    #[inline]
    fn contains(&self, test: TestId) -> bool {
        self.sequence().contains(&test)
    }

    /// Returns `true` iff both tests are in this batch and `a` comes before `b`.
    #[inline]
    fn precedes(&self, a: TestId, b: TestId) -> bool {
        precedes(self.sequence(), a, b)
    }

    /// Explicit start day of `test`, `None` if the test is not carried or the batch is not timed.
    #[inline]
    fn start_day(&self, _test: TestId) -> Option<Day> {
        None
    }
}

impl Batch for Column {
    fn sequence(&self) -> &[TestId] {
        &self.sequence
    }

    fn release(&self) -> Day {
        self.release
    }
}

impl Batch for TimedColumn {
    fn sequence(&self) -> &[TestId] {
        &self.sequence
    }

    fn release(&self) -> Day {
        self.release
    }

    fn start_day(&self, test: TestId) -> Option<Day> {
        self.start(test)
    }
}

/// Ordered sequence of tests on one vehicle release, costed by its greedy schedule.
///
/// Equality and hashing consider the sequence and the release only.
#[derive(Debug, Clone)]
pub struct Column {
    sequence: Vec<TestId>,
    release: Day,
    cost: i64,
}

impl Column {
    /// Create a new column, fails on unknown or repeated tests.
    ///
    /// # Example
    /// ```
    /// # extern crate testsched;
    /// use testsched::{Column, Horizon, Instance, TestRequest};
    /// let instance = Instance::builder(Horizon::new(0, 20))
    ///     .test(TestRequest::new(1, 0, 3, 0, 2, 0))
    ///     .test(TestRequest::new(2, 8, 9, 1, 1, 0))
    ///     .all_compatible()
    ///     .vehicles(0, 1)
    ///     .build()
    ///     .unwrap();
    /// // test 1 runs on days [0, 2), test 2 waits for its release and completes on day 9
    /// let column = Column::new(&instance, vec![1, 2], 0).unwrap();
    /// assert_eq!(column.cost(), 0);
    /// ```
    pub fn new(instance: &Instance, sequence: Vec<TestId>, release: Day) -> Result<Self> {
        check_sequence(instance, &sequence)?;
        let starts = greedy_starts(instance, &sequence, release)?;
        let cost = tardiness(instance, &sequence, &starts)?;
        Ok(Self {
            sequence,
            release,
            cost,
        })
    }

    #[inline]
    pub fn sequence(&self) -> &[TestId] {
        &self.sequence
    }

    #[inline]
    pub fn release(&self) -> Day {
        self.release
    }

    /// Total tardiness of the greedy schedule.
    #[inline]
    pub fn cost(&self) -> i64 {
        self.cost
    }

    /// This column with its greedy schedule made explicit.
    pub fn to_timed(&self, instance: &Instance) -> Result<TimedColumn> {
        let starts = greedy_starts(instance, &self.sequence, self.release)?;
        TimedColumn::new(instance, self.sequence.clone(), self.release, starts)
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.release == other.release && self.sequence == other.sequence
    }
}

impl Eq for Column {}

impl Hash for Column {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sequence.hash(state);
        self.release.hash(state);
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]@{}", self.sequence.iter().join(" "), self.release)
    }
}

/// Column with an explicit start day per test.
///
/// The cost is computed from the explicit starts and the resource days (days on which some test's
/// turnaround window lies) are derived on construction. Equality and hashing consider the
/// sequence, the release and the start days.
#[derive(Debug, Clone)]
pub struct TimedColumn {
    sequence: Vec<TestId>,
    release: Day,
    /// `starts[i]` is the start day of `sequence[i]`
    starts: Vec<Day>,
    cost: i64,
    /// sorted and deduplicated
    days: Vec<Day>,
}

impl TimedColumn {
    /// Create a timed column from start days given in sequence order.
    ///
    /// Construction does not check the schedule itself, use [TimedColumn::is_valid] for that.
    pub fn new(
        instance: &Instance,
        sequence: Vec<TestId>,
        release: Day,
        starts: Vec<Day>,
    ) -> Result<Self> {
        check_sequence(instance, &sequence)?;
        if let Some(id) = sequence.get(starts.len()) {
            return Err(Error::MissingStart(*id));
        }
        if starts.len() > sequence.len() {
            return Err(Error::Invariant(format!(
                "{} start days given for {} tests",
                starts.len(),
                sequence.len()
            )));
        }

        let cost = tardiness(instance, &sequence, &starts)?;

        let mut days = Vec::new();
        for (id, start) in sequence.iter().zip(&starts) {
            days.extend(instance.require(*id)?.turnaround_window(*start));
        }
        days.sort_unstable();
        days.dedup();

        Ok(Self {
            sequence,
            release,
            starts,
            cost,
            days,
        })
    }

    /// Create a timed column from a `test -> start day` map.
    pub fn with_start_map(
        instance: &Instance,
        sequence: Vec<TestId>,
        release: Day,
        starts: &BTreeMap<TestId, Day>,
    ) -> Result<Self> {
        let starts = sequence
            .iter()
            .map(|id| starts.get(id).copied().ok_or(Error::MissingStart(*id)))
            .collect::<Result<Vec<_>>>()?;
        Self::new(instance, sequence, release, starts)
    }

    #[inline]
    pub fn sequence(&self) -> &[TestId] {
        &self.sequence
    }

    #[inline]
    pub fn release(&self) -> Day {
        self.release
    }

    /// Total tardiness of the explicit schedule.
    #[inline]
    pub fn cost(&self) -> i64 {
        self.cost
    }

    /// Objective coefficient of this column in the master problem.
    #[inline]
    pub fn objective(&self, instance: &Instance) -> f64 {
        instance.vehicle_cost() + self.cost as f64
    }

    /// Days on which this column occupies the facility.
    #[inline]
    pub fn resource_days(&self) -> &[Day] {
        &self.days
    }

    #[inline]
    pub fn occupies(&self, day: Day) -> bool {
        self.days.binary_search(&day).is_ok()
    }

    #[inline]
    pub fn start(&self, test: TestId) -> Option<Day> {
        self.sequence
            .iter()
            .position(|t| *t == test)
            .map(|i| self.starts[i])
    }

    /// `(test, start day)` pairs in sequence order.
    pub fn starts(&self) -> impl Iterator<Item = (TestId, Day)> + '_ {
        self.sequence.iter().copied().zip(self.starts.iter().copied())
    }

    pub fn start_map(&self) -> BTreeMap<TestId, Day> {
        self.starts().collect()
    }

    /// The same sequence and release costed by its greedy schedule.
    pub fn untimed(&self, instance: &Instance) -> Result<Column> {
        Column::new(instance, self.sequence.clone(), self.release)
    }

    /// Check that the explicit schedule is executable, see [TimedColumn::validate].
    pub fn is_valid(&self, instance: &Instance) -> bool {
        self.validate(instance).is_ok()
    }

    /// Check that every test starts no earlier than the vehicle release, that every test is
    /// performed (after its prep) no earlier than its own release and that consecutive tests do
    /// not overlap.
    pub fn validate(&self, instance: &Instance) -> Result<()> {
        let mut ready = self.release;
        for (id, start) in self.starts() {
            let test = instance.require(id)?;
            if start < self.release {
                return Err(Error::Invariant(format!(
                    "test {} of {} starts on {} before the vehicle release",
                    id, self, start
                )));
            }
            if start + test.prep < test.release {
                return Err(Error::Invariant(format!(
                    "test {} of {} starts on {} before its release {}",
                    id, self, start, test.release
                )));
            }
            if start < ready {
                return Err(Error::Invariant(format!(
                    "test {} of {} starts on {} while its predecessor runs until {}",
                    id, self, start, ready
                )));
            }
            ready = test.completion(start);
        }
        Ok(())
    }

    /// Check that the explicit schedule fits into the horizon, i.e. everything completes by its end.
    pub fn fits_horizon(&self, instance: &Instance) -> bool {
        let horizon = instance.horizon();
        self.starts().all(|(id, start)| {
            instance
                .test(id)
                .map_or(false, |t| start >= horizon.start && t.completion(start) <= horizon.end)
        })
    }
}

impl PartialEq for TimedColumn {
    fn eq(&self, other: &Self) -> bool {
        self.release == other.release
            && self.sequence == other.sequence
            && self.starts == other.starts
    }
}

impl Eq for TimedColumn {}

impl Hash for TimedColumn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sequence.hash(state);
        self.release.hash(state);
        self.starts.hash(state);
    }
}

impl fmt::Display for TimedColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}]@{}",
            self.starts()
                .map(|(id, start)| format!("{}:{}", id, start))
                .join(" "),
            self.release
        )
    }
}
