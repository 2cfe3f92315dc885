//! Initial solution ahead of the search.
//!
//! Every compatible sequence is timed greedily for every vehicle release and the cheapest cover of
//! all tests by these columns is found by the integer program ignoring the facility. The chosen
//! sequences are then re-timed one at a time by the dynamic program, with a prohibitive dual on
//! every day the columns timed so far have filled up.
use std::collections::BTreeMap;
use std::time::Duration;

use log::{debug, info};

use crate::alg::core::Solution;
use crate::column::{Column, TimedColumn};
use crate::duals::Duals;
use crate::error::Result;
use crate::instance::{Day, FacilityCapacity, Instance};
use crate::master::{self, MasterProblem};
use crate::oracle::OracleFactory;
use crate::pricer::{compatible_sequences, TimingTable};

/// Feasible solution built from greedy columns or `None` if the cover cannot be re-timed.
pub fn initial_solution(
    instance: &Instance,
    factory: &dyn OracleFactory,
    max_sequence_len: usize,
    time_limit: Option<Duration>,
) -> Result<Option<Solution>> {
    let relaxed = instance.with_facility(FacilityCapacity::unlimited());

    let mut pool = Vec::new();
    for sequence in compatible_sequences(instance, max_sequence_len) {
        for (release, _) in instance.releases() {
            let column = Column::new(&relaxed, sequence.clone(), release)?.to_timed(&relaxed)?;
            if column.fits_horizon(&relaxed) {
                pool.push(column);
            }
        }
    }
    debug!("covering tests by {} greedy columns", pool.len());

    let master = MasterProblem::build(
        &relaxed,
        &[],
        factory.create(),
        pool,
        master::artificial_cost(&relaxed),
    )?;
    let cover = match master.solve_integer(None, time_limit)? {
        Some(cover) => cover,
        None => return Ok(None),
    };

    match retime(instance, cover)? {
        Some(solution) => {
            info!(
                "initial solution {:.4} with {} vehicles",
                solution.value,
                solution.num_vehicles()
            );
            Ok(Some(solution))
        }
        None => {
            debug!("greedy cover does not fit the facility");
            Ok(None)
        }
    }
}

/// Re-time `cover` column by column so that the facility capacity holds.
fn retime(instance: &Instance, mut cover: Vec<TimedColumn>) -> Result<Option<Solution>> {
    // large enough that no schedule pays it in favour of tardiness
    let penalty = master::artificial_cost(instance);
    cover.sort_by_key(|c| (c.release(), c.sequence().to_vec()));

    let mut usage: BTreeMap<Day, u32> = BTreeMap::new();
    let mut columns = Vec::with_capacity(cover.len());

    for column in cover {
        let full = instance
            .horizon()
            .days()
            .filter(|day| {
                let used = usage.get(day).copied().unwrap_or(0);
                instance.facility().capacity(*day).map_or(false, |cap| used >= cap)
            })
            .map(|day| (day, -penalty))
            .collect();
        let duals = Duals::new(Default::default(), Default::default(), full);

        let table = TimingTable::build(instance, column.sequence(), &duals)?;
        let starts = match table.schedule(column.release()) {
            Some(starts) => starts,
            None => return Ok(None),
        };
        let timed =
            TimedColumn::new(instance, column.sequence().to_vec(), column.release(), starts)?;

        for day in timed.resource_days() {
            let used = usage.entry(*day).or_insert(0);
            if instance.facility().capacity(*day).map_or(false, |cap| *used >= cap) {
                return Ok(None);
            }
            *used += 1;
        }
        columns.push(timed);
    }

    let solution = Solution::new(instance, columns);
    Ok(solution.is_feasible(instance).then(|| solution))
}
