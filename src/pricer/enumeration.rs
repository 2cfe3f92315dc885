use crate::branch::{admits, BranchConstraint};
use crate::column::Column;
use crate::duals::Duals;
use crate::error::Result;
use crate::instance::{Day, Instance, TestId};
use crate::pricer::sequence::compatible_sequences;
use crate::pricer::{is_improving, select_disjoint, Completeness, Draft, Priced, Pricer};

/// Prices every compatible sequence on every release with its greedy schedule.
///
/// Greedy schedules minimize tardiness, so without active facility duals and start constraints
/// this finds the most negative reduced cost over all columns of bounded length. Otherwise cheaper
/// or admissible timings may be missed.
#[derive(Debug, Clone)]
pub struct Enumeration<'a> {
    instance: &'a Instance,
    sequences: Vec<Vec<TestId>>,
    releases: Vec<Day>,
}

impl<'a> Enumeration<'a> {
    pub fn new(instance: &'a Instance, max_len: usize) -> Self {
        Self {
            instance,
            sequences: compatible_sequences(instance, max_len),
            releases: instance.releases().map(|(r, _)| r).collect(),
        }
    }

    /// Every admissible improving column, unsorted and not filtered for disjointness.
    pub fn improving(
        &self,
        duals: &Duals,
        constraints: &[BranchConstraint],
    ) -> Result<Vec<Priced>> {
        let mut priced = Vec::new();
        for sequence in self.sequences.iter() {
            for release in self.releases.iter().copied() {
                let draft = Draft { sequence, release };
                if !admits(constraints, &draft) {
                    continue;
                }
                let column = Column::new(self.instance, sequence.clone(), release)?
                    .to_timed(self.instance)?;
                if !admits(constraints, &column) {
                    continue;
                }
                let reduced_cost = duals.reduced_cost(self.instance, &column);
                if is_improving(reduced_cost) {
                    priced.push(Priced {
                        column,
                        reduced_cost,
                    });
                }
            }
        }
        Ok(priced)
    }
}

impl Pricer for Enumeration<'_> {
    fn name(&self) -> &'static str {
        "enumeration"
    }

    fn completeness(&self) -> Completeness {
        Completeness::GreedyExhaustive
    }

    fn price(&mut self, duals: &Duals, constraints: &[BranchConstraint]) -> Result<Vec<Priced>> {
        let candidates = self.improving(duals, constraints)?;
        Ok(select_disjoint(self.instance, candidates))
    }
}
