//! Random instances for experiments and benchmarks.
use std::ops::RangeInclusive;

use rand::distributions::{Bernoulli, Uniform};
use rand::prelude::*;

use crate::error::{Error, Result};
use crate::instance::{FacilityCapacity, Horizon, Instance, TestRequest};

/// Parameters of random instances.
///
/// Test releases are drawn uniformly over the horizon, stage durations and deadline slack from
/// their ranges. Vehicle releases are spread evenly over the horizon and every ordered pair of
/// tests is compatible with probability `compatibility`.
///
/// # Example
/// ```
/// # extern crate testsched;
/// use testsched::generator::InstanceGenerator;
/// let generator = InstanceGenerator {
///     num_tests: 6,
///     ..InstanceGenerator::default()
/// };
/// let a = generator.generate_seeded(42).unwrap();
/// let b = generator.generate_seeded(42).unwrap();
/// assert_eq!(a.tests(), b.tests());
/// assert_eq!(a.num_tests(), 6);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceGenerator {
    pub num_tests: usize,
    pub horizon: Horizon,
    pub prep: RangeInclusive<i64>,
    pub turnaround: RangeInclusive<i64>,
    pub analysis: RangeInclusive<i64>,
    /// days between the earliest completion and the deadline
    pub slack: RangeInclusive<i64>,
    pub num_releases: usize,
    pub vehicles_per_release: u32,
    /// probability that one test may precede another on a vehicle
    pub compatibility: f64,
    /// uniform facility capacity, unlimited if `None`
    pub facility: Option<u32>,
    pub vehicle_cost: f64,
}

impl Default for InstanceGenerator {
    fn default() -> Self {
        Self {
            num_tests: 10,
            horizon: Horizon::new(0, 30),
            prep: 0..=2,
            turnaround: 1..=5,
            analysis: 0..=2,
            slack: 0..=10,
            num_releases: 3,
            vehicles_per_release: 2,
            compatibility: 0.7,
            facility: None,
            vehicle_cost: 10.,
        }
    }
}

impl InstanceGenerator {
    pub fn generate_seeded(&self, seed: u64) -> Result<Instance> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.generate(&mut rng)
    }

    pub fn generate<R>(&self, rng: &mut R) -> Result<Instance>
    where
        R: Rng + ?Sized,
    {
        let invalid = |what: &str| Error::InvalidInstance(format!("generator: {}", what));

        if self.horizon.is_empty() {
            return Err(invalid("empty horizon"));
        }
        for (name, range) in [
            ("prep", &self.prep),
            ("turnaround", &self.turnaround),
            ("analysis", &self.analysis),
            ("slack", &self.slack),
        ] {
            if range.is_empty() || *range.start() < 0 {
                return Err(invalid(&format!("{} range {:?}", name, range)));
            }
        }
        let compatible = Bernoulli::new(self.compatibility)
            .map_err(|_| invalid(&format!("compatibility {}", self.compatibility)))?;

        let releases = Uniform::new(self.horizon.start, self.horizon.end);
        let prep = Uniform::from(self.prep.clone());
        let turnaround = Uniform::from(self.turnaround.clone());
        let analysis = Uniform::from(self.analysis.clone());
        let slack = Uniform::from(self.slack.clone());

        let tests = (1..=self.num_tests as u32)
            .map(|id| {
                let release = releases.sample(rng);
                let prep = prep.sample(rng);
                // at least one day of turnaround without prep
                let turnaround = turnaround.sample(rng).max(i64::from(prep == 0));
                let analysis = analysis.sample(rng);
                let deadline = release + turnaround + analysis + slack.sample(rng);
                TestRequest::new(id, release, deadline, prep, turnaround, analysis)
            })
            .collect::<Vec<_>>();

        let mut builder = Instance::builder(self.horizon)
            .vehicle_cost(self.vehicle_cost)
            .facility(
                self.facility
                    .map_or_else(FacilityCapacity::unlimited, FacilityCapacity::uniform),
            );

        let step = (self.horizon.len() / self.num_releases.max(1)).max(1) as i64;
        for k in 0..self.num_releases as i64 {
            let release = self.horizon.start + k * step;
            if self.horizon.contains(release) {
                builder = builder.vehicles(release, self.vehicles_per_release);
            }
        }

        for a in tests.iter() {
            for b in tests.iter().filter(|b| b.id != a.id) {
                if compatible.sample(rng) {
                    builder = builder.compatible(a.id, b.id);
                }
            }
        }

        builder.tests(tests).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case(0)]
    #[case(7)]
    #[case(1234)]
    fn respects_parameters(#[case] seed: u64) {
        let generator = InstanceGenerator {
            num_tests: 8,
            facility: Some(3),
            ..InstanceGenerator::default()
        };
        let instance = generator.generate_seeded(seed).unwrap();

        assert_eq!(instance.num_tests(), 8);
        assert_eq!(instance.releases().count(), 3);
        assert!(instance.releases().all(|(_, n)| n == 2));
        assert_eq!(instance.facility().capacity(5), Some(3));
        for test in instance.tests() {
            assert!(instance.horizon().contains(test.release));
            assert!(test.deadline >= test.release + test.turnaround + test.analysis);
            assert!(test.duration() > 0);
        }
    }

    #[test]
    fn full_compatibility() {
        let generator = InstanceGenerator {
            num_tests: 4,
            compatibility: 1.,
            ..InstanceGenerator::default()
        };
        let instance = generator.generate_seeded(3).unwrap();
        for a in 1..=4 {
            for b in (1..=4).filter(|b| *b != a) {
                assert!(instance.may_precede(a, b));
            }
        }
    }

    #[rstest]
    #[case(InstanceGenerator { compatibility: 1.5, ..InstanceGenerator::default() })]
    #[case(InstanceGenerator { slack: 5..=1, ..InstanceGenerator::default() })]
    #[case(InstanceGenerator { prep: -1..=2, ..InstanceGenerator::default() })]
    #[case(InstanceGenerator { horizon: Horizon::new(4, 4), ..InstanceGenerator::default() })]
    fn invalid_parameters(#[case] generator: InstanceGenerator) {
        assert!(matches!(
            generator.generate_seeded(0),
            Err(Error::InvalidInstance(_))
        ));
    }
}
