use crate::column::{Column, TimedColumn};
use crate::error::Result;
use crate::instance::{Instance, TestId};

/// All sequences of at most `max_len` tests in which every test may follow each of its
/// predecessors, in breadth-first order (i.e. by non-decreasing length).
///
/// # Example
/// ```
/// # extern crate testsched;
/// use testsched::{Horizon, Instance, TestRequest};
/// use testsched::pricer::compatible_sequences;
/// let instance = Instance::builder(Horizon::new(0, 10))
///     .test(TestRequest::new(1, 0, 5, 0, 1, 0))
///     .test(TestRequest::new(2, 0, 5, 0, 1, 0))
///     .test(TestRequest::new(3, 0, 5, 0, 1, 0))
///     .compatible(1, 2)
///     .compatible(2, 3)
///     .vehicles(0, 1)
///     .build()
///     .unwrap();
/// // [1, 2, 3] is missing since 1 may not precede 3
/// let sequences = compatible_sequences(&instance, 3);
/// assert_eq!(sequences, vec![vec![1], vec![2], vec![3], vec![1, 2], vec![2, 3]]);
/// ```
pub fn compatible_sequences(instance: &Instance, max_len: usize) -> Vec<Vec<TestId>> {
    let n = instance.num_tests();
    if max_len == 0 {
        return Vec::new();
    }

    // work on test indices, translate at the end
    let mut pool: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
    let mut frontier = 0..pool.len();

    for _ in 1..max_len {
        let mut extended = Vec::new();
        for sequence in pool[frontier.clone()].iter() {
            for next in 0..n {
                if sequence
                    .iter()
                    .all(|prev| instance.may_precede_idx(*prev, next))
                {
                    let mut longer = sequence.clone();
                    longer.push(next);
                    extended.push(longer);
                }
            }
        }
        if extended.is_empty() {
            break;
        }
        let start = pool.len();
        pool.extend(extended);
        frontier = start..pool.len();
    }

    let tests = instance.tests();
    pool.into_iter()
        .map(|sequence| sequence.into_iter().map(|i| tests[i].id).collect())
        .collect()
}

/// Initial column pool: every compatible sequence of at most `max_len` tests on every vehicle
/// release, timed by its greedy schedule.
pub fn seed_columns(instance: &Instance, max_len: usize) -> Result<Vec<TimedColumn>> {
    let releases = instance.releases().map(|(r, _)| r).collect::<Vec<_>>();
    let mut columns = Vec::new();
    for sequence in compatible_sequences(instance, max_len) {
        for release in releases.iter() {
            columns.push(Column::new(instance, sequence.clone(), *release)?.to_timed(instance)?);
        }
    }
    Ok(columns)
}
