//! Problem data shared read-only by every component of the solver.
//!
//! An [Instance] bundles the tests to batch, the vehicle releases (day → number of vehicles), the
//! directed compatibility relation between tests, the daily facility capacity and the scheduling
//! horizon. Instances are assembled through [InstanceBuilder] (or from plain [InstanceData]) which
//! validates all references eagerly, so the rest of the crate can assume consistent data.
use std::collections::{BTreeMap, HashMap};
use std::convert::TryFrom;
use std::ops::Range;

use daggy::petgraph::unionfind::UnionFind;
use fixedbitset::FixedBitSet;
use itertools::Itertools;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifier of a test request.
pub type TestId = u32;

/// Days are plain signed integers, horizons may start anywhere.
pub type Day = i64;

/// A single test request with its time window and processing stages.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TestRequest {
    pub id: TestId,
    /// first day the test itself may be performed (i.e. after its prep)
    pub release: Day,
    pub deadline: Day,
    pub prep: i64,
    pub turnaround: i64,
    pub analysis: i64,
    /// explicit total processing time, if longer than the sum of stages
    #[cfg_attr(feature = "serde", serde(default))]
    pub processing: Option<i64>,
}

impl TestRequest {
    pub fn new(
        id: TestId,
        release: Day,
        deadline: Day,
        prep: i64,
        turnaround: i64,
        analysis: i64,
    ) -> Self {
        Self {
            id,
            release,
            deadline,
            prep,
            turnaround,
            analysis,
            processing: None,
        }
    }

    pub fn with_processing(mut self, processing: i64) -> Self {
        self.processing = Some(processing);
        self
    }

    /// Number of days the test blocks its vehicle.
    ///
    /// # Example
    /// ```
    /// # extern crate testsched;
    /// use testsched::TestRequest;
    /// let test = TestRequest::new(0, 5, 10, 1, 2, 1);
    /// assert_eq!(test.duration(), 4);
    /// assert_eq!(test.with_processing(6).duration(), 6);
    /// ```
    #[inline]
    pub fn duration(&self) -> i64 {
        let stages = self.prep + self.turnaround + self.analysis;
        self.processing.map_or(stages, |p| p.max(stages))
    }

    /// Earliest start day, the prep may happen before release.
    #[inline]
    pub fn earliest_start(&self) -> Day {
        self.release - self.prep
    }

    #[inline]
    pub fn completion(&self, start: Day) -> Day {
        start + self.duration()
    }

    /// Tardiness of the test when started on `start`.
    #[inline]
    pub fn tardiness(&self, start: Day) -> i64 {
        (self.completion(start) - self.deadline).max(0)
    }

    /// Days on which the test occupies the facility when started on `start`.
    #[inline]
    pub fn turnaround_window(&self, start: Day) -> Range<Day> {
        let begin = start + self.prep;
        begin..begin + self.turnaround
    }
}

/// Half-open scheduling horizon `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Horizon {
    pub start: Day,
    pub end: Day,
}

impl Horizon {
    pub fn new(start: Day, end: Day) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn len(&self) -> usize {
        (self.end - self.start).max(0) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    #[inline]
    pub fn contains(&self, day: Day) -> bool {
        (self.start..self.end).contains(&day)
    }

    pub fn days(&self) -> Range<Day> {
        self.start..self.end
    }
}

/// Daily capacity of the shared facility.
///
/// `None` as the default capacity means days without an override are unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FacilityCapacity {
    pub default: Option<u32>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub per_day: BTreeMap<Day, u32>,
}

impl FacilityCapacity {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn uniform(capacity: u32) -> Self {
        Self {
            default: Some(capacity),
            per_day: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn capacity(&self, day: Day) -> Option<u32> {
        self.per_day.get(&day).copied().or(self.default)
    }
}

/// Dense directed relation over test indices: `allows(i, j)` iff test `i` may precede test `j`
/// in a column.
#[derive(Debug, Clone)]
pub struct Compatibility {
    size: usize,
    matrix: FixedBitSet,
}

impl Compatibility {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            matrix: FixedBitSet::with_capacity(size * size),
        }
    }

    #[inline]
    fn allow(&mut self, i: usize, j: usize) {
        self.matrix.insert(i * self.size + j);
    }

    #[inline]
    pub fn allows(&self, i: usize, j: usize) -> bool {
        i != j && self.matrix.contains(i * self.size + j)
    }
}

/// Plain description of an instance, e.g. as loaded from a file.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InstanceData {
    pub tests: Vec<TestRequest>,
    /// release day -> number of vehicles
    pub vehicle_releases: BTreeMap<Day, u32>,
    /// ordered pairs `(a, b)` such that `a` may precede `b`
    pub compatible: Vec<(TestId, TestId)>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub facility: FacilityCapacity,
    pub horizon: Horizon,
    pub vehicle_cost: f64,
}

/// Validated, read-only problem instance.
#[derive(Debug, Clone)]
pub struct Instance {
    tests: Vec<TestRequest>,
    index: HashMap<TestId, usize>,
    releases: BTreeMap<Day, u32>,
    compatibility: Compatibility,
    facility: FacilityCapacity,
    horizon: Horizon,
    vehicle_cost: f64,
}

impl Instance {
    pub fn builder(horizon: Horizon) -> InstanceBuilder {
        InstanceBuilder::new(horizon)
    }

    #[inline]
    pub fn tests(&self) -> &[TestRequest] {
        &self.tests
    }

    #[inline]
    pub fn num_tests(&self) -> usize {
        self.tests.len()
    }

    #[inline]
    pub fn index_of(&self, id: TestId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    #[inline]
    pub fn test(&self, id: TestId) -> Option<&TestRequest> {
        self.index_of(id).map(|i| &self.tests[i])
    }

    pub(crate) fn require(&self, id: TestId) -> Result<&TestRequest> {
        self.test(id).ok_or(Error::UnknownTest(id))
    }

    /// Non-empty vehicle releases in increasing order of release day.
    pub fn releases(&self) -> impl Iterator<Item = (Day, u32)> + '_ {
        self.releases.iter().map(|(d, n)| (*d, *n))
    }

    #[inline]
    pub fn vehicles(&self, release: Day) -> u32 {
        self.releases.get(&release).copied().unwrap_or(0)
    }

    /// Copy of this instance with a different facility capacity.
    pub fn with_facility(&self, facility: FacilityCapacity) -> Self {
        Self {
            facility,
            ..self.clone()
        }
    }

    #[inline]
    pub fn facility(&self) -> &FacilityCapacity {
        &self.facility
    }

    #[inline]
    pub fn horizon(&self) -> Horizon {
        self.horizon
    }

    #[inline]
    pub fn vehicle_cost(&self) -> f64 {
        self.vehicle_cost
    }

    /// Returns `true` iff test `a` may precede test `b` in one column.
    pub fn may_precede(&self, a: TestId, b: TestId) -> bool {
        match (self.index_of(a), self.index_of(b)) {
            (Some(i), Some(j)) => self.compatibility.allows(i, j),
            _ => false,
        }
    }

    #[inline]
    pub(crate) fn may_precede_idx(&self, i: usize, j: usize) -> bool {
        self.compatibility.allows(i, j)
    }

    /// Partition tests into groups that can never share a column with a test of another group.
    ///
    /// Groups are the connected components of the compatibility relation taken as undirected,
    /// sorted by their smallest member.
    ///
    /// # Example
    /// ```
    /// # extern crate testsched;
    /// use testsched::{Horizon, Instance, TestRequest};
    /// let instance = Instance::builder(Horizon::new(0, 10))
    ///     .test(TestRequest::new(1, 0, 5, 0, 1, 0))
    ///     .test(TestRequest::new(2, 0, 5, 0, 1, 0))
    ///     .test(TestRequest::new(3, 0, 5, 0, 1, 0))
    ///     .compatible(3, 1)
    ///     .vehicles(0, 2)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(instance.compatibility_components(), vec![vec![1, 3], vec![2]]);
    /// ```
    pub fn compatibility_components(&self) -> Vec<Vec<TestId>> {
        let n = self.num_tests();
        let mut components = UnionFind::<usize>::new(n);
        for (i, j) in (0..n).tuple_combinations() {
            if self.compatibility.allows(i, j) || self.compatibility.allows(j, i) {
                components.union(i, j);
            }
        }

        let mut groups: BTreeMap<usize, Vec<TestId>> = BTreeMap::new();
        for i in 0..n {
            groups
                .entry(components.find(i))
                .or_default()
                .push(self.tests[i].id);
        }

        groups
            .into_values()
            .map(|mut group| {
                group.sort_unstable();
                group
            })
            .sorted_by_key(|group| group[0])
            .collect()
    }
}

impl TryFrom<InstanceData> for Instance {
    type Error = Error;

    fn try_from(data: InstanceData) -> Result<Self> {
        let mut builder = InstanceBuilder::new(data.horizon)
            .vehicle_cost(data.vehicle_cost)
            .facility(data.facility);
        for test in data.tests {
            builder = builder.test(test);
        }
        for (release, count) in data.vehicle_releases {
            builder = builder.vehicles(release, count);
        }
        for (a, b) in data.compatible {
            builder = builder.compatible(a, b);
        }
        builder.build()
    }
}

/// Incremental construction of an [Instance].
#[derive(Debug, Clone)]
pub struct InstanceBuilder {
    tests: Vec<TestRequest>,
    releases: BTreeMap<Day, u32>,
    pairs: Vec<(TestId, TestId)>,
    all_compatible: bool,
    facility: FacilityCapacity,
    horizon: Horizon,
    vehicle_cost: f64,
}

impl InstanceBuilder {
    pub fn new(horizon: Horizon) -> Self {
        Self {
            tests: Vec::new(),
            releases: BTreeMap::new(),
            pairs: Vec::new(),
            all_compatible: false,
            facility: FacilityCapacity::unlimited(),
            horizon,
            vehicle_cost: 1.,
        }
    }

    pub fn test(mut self, test: TestRequest) -> Self {
        self.tests.push(test);
        self
    }

    pub fn tests<I: IntoIterator<Item = TestRequest>>(mut self, tests: I) -> Self {
        self.tests.extend(tests);
        self
    }

    /// Add `count` vehicles released on day `release` (repeated calls accumulate).
    pub fn vehicles(mut self, release: Day, count: u32) -> Self {
        *self.releases.entry(release).or_insert(0) += count;
        self
    }

    /// Allow test `a` to precede test `b` in a column.
    pub fn compatible(mut self, a: TestId, b: TestId) -> Self {
        self.pairs.push((a, b));
        self
    }

    /// Allow every ordered pair of distinct tests.
    pub fn all_compatible(mut self) -> Self {
        self.all_compatible = true;
        self
    }

    pub fn facility(mut self, facility: FacilityCapacity) -> Self {
        self.facility = facility;
        self
    }

    pub fn day_capacity(mut self, day: Day, capacity: u32) -> Self {
        self.facility.per_day.insert(day, capacity);
        self
    }

    pub fn vehicle_cost(mut self, cost: f64) -> Self {
        self.vehicle_cost = cost;
        self
    }

    pub fn build(self) -> Result<Instance> {
        if self.horizon.is_empty() {
            return Err(Error::InvalidInstance(format!(
                "empty horizon [{}, {})",
                self.horizon.start, self.horizon.end
            )));
        }

        if !self.vehicle_cost.is_finite() || self.vehicle_cost < 0. {
            return Err(Error::InvalidInstance(format!(
                "vehicle cost must be finite and non-negative, got {}",
                self.vehicle_cost
            )));
        }

        let mut index = HashMap::with_capacity(self.tests.len());
        for (i, test) in self.tests.iter().enumerate() {
            if test.prep < 0 || test.turnaround < 0 || test.analysis < 0 {
                return Err(Error::InvalidInstance(format!(
                    "test {} has a negative stage duration",
                    test.id
                )));
            }
            if test.duration() <= 0 {
                return Err(Error::InvalidInstance(format!(
                    "test {} has no processing time",
                    test.id
                )));
            }
            if index.insert(test.id, i).is_some() {
                return Err(Error::InvalidInstance(format!("duplicate test {}", test.id)));
            }
        }

        let n = self.tests.len();
        let mut compatibility = Compatibility::new(n);
        if self.all_compatible {
            for (i, j) in (0..n).cartesian_product(0..n).filter(|(i, j)| i != j) {
                compatibility.allow(i, j);
            }
        }
        for (a, b) in self.pairs {
            let i = *index.get(&a).ok_or(Error::UnknownTest(a))?;
            let j = *index.get(&b).ok_or(Error::UnknownTest(b))?;
            if i == j {
                return Err(Error::InvalidInstance(format!(
                    "test {} cannot precede itself",
                    a
                )));
            }
            compatibility.allow(i, j);
        }

        let releases = self.releases.into_iter().filter(|(_, n)| *n > 0).collect();

        Ok(Instance {
            tests: self.tests,
            index,
            releases,
            compatibility,
            facility: self.facility,
            horizon: self.horizon,
            vehicle_cost: self.vehicle_cost,
        })
    }
}
