use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Pricing strategy used by the column generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PricerKind {
    /// sequence pool + timing dynamic program (heuristic)
    #[default]
    SequenceThenTime,
    /// all sequence and release pairs with greedy schedules (small instances only)
    Enumeration,
    /// time-indexed 0-1 program through the MIP oracle
    Exact,
    /// dynamic program, falling back to the exact pricer when it finds nothing
    Hybrid,
}

/// Parameters of a branch-and-price run.
///
/// # Example
/// ```
/// # extern crate testsched;
/// use std::time::Duration;
/// use testsched::{Config, PricerKind};
/// let config = Config::default()
///     .with_pricer(PricerKind::Hybrid)
///     .with_time_limit(Duration::from_secs(60));
/// assert_eq!(config.max_nodes, 999);
/// assert_eq!(config.time_limit, Some(Duration::from_secs(60)));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    pub pricer: PricerKind,
    /// maximum number of tests in one column
    pub max_sequence_len: usize,
    /// maximum number of tests in one column of the initial pool
    pub seed_sequence_len: usize,
    /// column generation iterations per node
    pub max_cg_iterations: usize,
    /// processed nodes of the search tree
    pub max_nodes: usize,
    /// wall-clock budget of the whole run
    pub time_limit: Option<Duration>,
    /// solve the column pool as an integer program every `integer_interval` processed nodes
    /// (`0` disables it)
    pub integer_interval: usize,
    /// time limit of each integer solve
    ///
    /// Advisory for oracles without limit support, the bundled `microlp` backend solves to
    /// optimality regardless (and logs a warning once).
    pub integer_time_limit: Option<Duration>,
    /// re-time every pooled sequence for every vehicle release before integer solves
    pub vehicle_versions: bool,
    /// start from the solution of a cover of greedy columns, re-timed for the facility
    pub warm_start: bool,
    /// objective coefficient of artificial cover variables, derived from the instance if `None`
    pub artificial_cost: Option<f64>,
    /// run the per-sequence dynamic programs on the `rayon` pool (requires feature `parallel`)
    pub parallel: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pricer: PricerKind::default(),
            max_sequence_len: 4,
            seed_sequence_len: 2,
            max_cg_iterations: 9999,
            max_nodes: 999,
            time_limit: None,
            integer_interval: 1,
            integer_time_limit: Some(Duration::from_secs(300)),
            vehicle_versions: false,
            warm_start: false,
            artificial_cost: None,
            parallel: cfg!(feature = "parallel"),
        }
    }
}

impl Config {
    pub fn with_pricer(mut self, pricer: PricerKind) -> Self {
        self.pricer = pricer;
        self
    }

    pub fn with_max_sequence_len(mut self, len: usize) -> Self {
        self.max_sequence_len = len;
        self
    }

    pub fn with_seed_sequence_len(mut self, len: usize) -> Self {
        self.seed_sequence_len = len;
        self
    }

    pub fn with_max_cg_iterations(mut self, iterations: usize) -> Self {
        self.max_cg_iterations = iterations;
        self
    }

    pub fn with_max_nodes(mut self, nodes: usize) -> Self {
        self.max_nodes = nodes;
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn with_integer_interval(mut self, interval: usize) -> Self {
        self.integer_interval = interval;
        self
    }

    pub fn with_vehicle_versions(mut self, enabled: bool) -> Self {
        self.vehicle_versions = enabled;
        self
    }

    pub fn with_warm_start(mut self, enabled: bool) -> Self {
        self.warm_start = enabled;
        self
    }

    pub fn with_artificial_cost(mut self, cost: f64) -> Self {
        self.artificial_cost = Some(cost);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}
