use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap, HashSet};
use std::rc::Rc;
use std::time::Instant;

use log::{debug, info};
use ordered_float::OrderedFloat;

use crate::alg::colgen::{self, Outcome, Relaxation};
use crate::alg::core::{Solution, Stats, Termination};
use crate::alg::integrality::branching_decision;
use crate::alg::warmup;
use crate::branch::BranchConstraint;
use crate::column::TimedColumn;
use crate::config::Config;
use crate::duals::Duals;
use crate::error::{Error, Result};
use crate::instance::{Instance, TestId};
use crate::master::{self, MasterProblem};
use crate::oracle::{GoodLpFactory, OracleFactory};
use crate::pricer::{self, vehicle_versions, Pricer};

/// Objective differences below this threshold do not count as improvements.
const VALUE_TOLERANCE: f64 = 1e-6;

#[inline]
fn tolerance(value: f64) -> f64 {
    VALUE_TOLERANCE * value.abs().max(1.)
}

/// Search for a minimum cost batching of an instance using Branch-and-Price.
///
/// Each node of the search tree is solved by column generation over the node's column pool. The
/// resulting LP bound prunes the node against the incumbent, and fractional solutions are split on
/// a pair of complementary [BranchConstraint]s. Nodes are selected alternately depth-first (to
/// find incumbents) and best-bound first (to raise the global bound).
///
/// # Example
/// ```
/// # extern crate testsched;
/// use testsched::{BranchAndPrice, Config, Horizon, Instance, TestRequest};
/// let instance = Instance::builder(Horizon::new(0, 10))
///     .test(TestRequest::new(1, 0, 3, 0, 1, 0))
///     .test(TestRequest::new(2, 0, 3, 0, 1, 0))
///     .all_compatible()
///     .vehicles(0, 2)
///     .vehicle_cost(5.)
///     .build()
///     .unwrap();
///
/// let (solution, stats) = BranchAndPrice::new(&instance, Config::default()).solve().unwrap();
/// // a single vehicle carries both tests on time
/// assert_eq!(solution.num_vehicles(), 1);
/// assert!((solution.value - 5.).abs() < 1e-6);
/// assert!(stats.proved_optimal);
/// ```
pub struct BranchAndPrice<'a> {
    instance: &'a Instance,
    config: Config,
    factory: Box<dyn OracleFactory + 'a>,
}

impl<'a> BranchAndPrice<'a> {
    /// Solver over the bundled `good_lp` oracle.
    pub fn new(instance: &'a Instance, config: Config) -> Self {
        Self {
            instance,
            config,
            factory: Box::new(GoodLpFactory),
        }
    }

    /// Replace the LP/MIP oracle used by master problems and the exact pricer.
    pub fn with_oracle<F>(mut self, factory: F) -> Self
    where
        F: OracleFactory + 'a,
    {
        self.factory = Box::new(factory);
        self
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the search until the tree is exhausted or a budget runs out.
    ///
    /// Returns the incumbent with search statistics. Fails with [Error::RootInfeasible] if even
    /// the root relaxation cannot cover all tests and with [Error::NoFeasibleSolution] if no
    /// integer solution was found within the budget.
    pub fn solve(&self) -> Result<(Solution, Stats)> {
        let start = Instant::now();
        let instance = self.instance;

        if instance.num_tests() == 0 {
            let mut stats = Stats::new(0);
            stats.value = 0.;
            stats.lower_bound = 0.;
            stats.root_bound = 0.;
            stats.proved_optimal = true;
            return Ok((Solution::new(instance, Vec::new()), stats));
        }

        let mut seeds = pricer::seed_columns(
            instance,
            self.config
                .seed_sequence_len
                .min(self.config.max_sequence_len),
        )?;
        info!(
            "branch-and-price over {} tests with {} seed columns",
            instance.num_tests(),
            seeds.len()
        );

        let mut search = Search::new(instance, &self.config, self.factory.as_ref());
        search.start = start;
        search.deadline = self.config.time_limit.map(|limit| start + limit);

        if self.config.warm_start {
            let initial = warmup::initial_solution(
                instance,
                self.factory.as_ref(),
                self.config.max_sequence_len,
                self.config.integer_time_limit,
            )?;
            match initial {
                Some(solution) => {
                    seeds.extend(solution.columns.iter().cloned());
                    search.offer(solution);
                }
                None => debug!("no initial solution, starting without incumbent"),
            }
        }

        for column in seeds.iter().cloned() {
            search.remember(column);
        }
        search.push(Node::root(seeds));

        search.run()?;
        search.finish()
    }
}

/// Lifecycle of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Pending,
    /// pruned by its bound or infeasible
    Fathomed,
    /// relaxation had an integral solution
    Integral,
    Branched,
}

#[derive(Debug, Clone)]
struct Node {
    id: usize,
    depth: usize,
    constraints: Vec<BranchConstraint>,
    /// columns the node's master problem starts from
    pool: Rc<Vec<TimedColumn>>,
    /// bound inherited from the parent
    lower_bound: f64,
    state: NodeState,
}

impl Node {
    fn root(pool: Vec<TimedColumn>) -> Self {
        Self {
            id: 0,
            depth: 0,
            constraints: Vec::new(),
            pool: Rc::new(pool),
            lower_bound: f64::NEG_INFINITY,
            state: NodeState::Pending,
        }
    }

    /// Enforcing and forbidding child of this node.
    ///
    /// The children share `pool` and inherit `lp_bound` unless the node's own bound is larger.
    fn branch(
        &self,
        decision: BranchConstraint,
        pool: Rc<Vec<TimedColumn>>,
        lp_bound: Option<f64>,
        first_id: usize,
    ) -> [Node; 2] {
        let lower_bound = lp_bound.map_or(self.lower_bound, |b| b.max(self.lower_bound));
        let child = |id: usize, constraint: BranchConstraint| {
            let mut constraints = self.constraints.clone();
            constraints.push(constraint);
            Node {
                id,
                depth: self.depth + 1,
                constraints,
                pool: Rc::clone(&pool),
                lower_bound,
                state: NodeState::Pending,
            }
        };
        [
            child(first_id, decision),
            child(first_id + 1, decision.complement()),
        ]
    }
}

/// Entry of the best-bound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Open {
    bound: OrderedFloat<f64>,
    id: usize,
}

impl PartialOrd for Open {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Open {
    fn cmp(&self, other: &Self) -> Ordering {
        // reverse because BinaryHeap is a max-heap and we look for the smallest bound (older first)
        self.bound
            .cmp(&other.bound)
            .then_with(|| self.id.cmp(&other.id))
            .reverse()
    }
}

/// State of one branch-and-price run.
struct Search<'s> {
    instance: &'s Instance,
    config: &'s Config,
    factory: &'s dyn OracleFactory,
    pricer: Box<dyn Pricer + 's>,
    artificial_cost: f64,
    start: Instant,
    deadline: Option<Instant>,
    /// node arena, indexed by node id
    nodes: Vec<Node>,
    stack: Vec<usize>,
    open: BinaryHeap<Open>,
    /// every column seen so far, used by the integer solves
    pool: Vec<TimedColumn>,
    known: HashSet<TimedColumn>,
    incumbent: Option<Solution>,
    /// smallest bound of integral nodes closed without an incumbent reaching it
    unresolved: f64,
    stats: Stats,
}

impl<'s> Search<'s> {
    fn new(instance: &'s Instance, config: &'s Config, factory: &'s dyn OracleFactory) -> Self {
        let start = Instant::now();
        Self {
            instance,
            config,
            factory,
            pricer: pricer::build(instance, config, factory),
            artificial_cost: config
                .artificial_cost
                .unwrap_or_else(|| master::artificial_cost(instance)),
            start,
            deadline: None,
            nodes: Vec::new(),
            stack: Vec::new(),
            open: BinaryHeap::new(),
            pool: Vec::new(),
            known: HashSet::new(),
            incumbent: None,
            unresolved: f64::INFINITY,
            stats: Stats::new(instance.num_tests()),
        }
    }

    fn push(&mut self, node: Node) {
        self.stack.push(node.id);
        self.open.push(Open {
            bound: OrderedFloat(node.lower_bound),
            id: node.id,
        });
        debug_assert_eq!(node.id, self.nodes.len());
        self.nodes.push(node);
    }

    fn remember(&mut self, column: TimedColumn) {
        if self.known.insert(column.clone()) {
            self.pool.push(column);
        }
    }

    #[inline]
    fn incumbent_value(&self) -> f64 {
        self.incumbent.as_ref().map_or(f64::INFINITY, |s| s.value)
    }

    /// Next pending node, alternating between depth-first and best-bound selection.
    fn select(&mut self) -> Option<usize> {
        loop {
            let id = if self.stats.expanded % 2 == 0 {
                self.stack
                    .pop()
                    .or_else(|| self.open.pop().map(|o| o.id))
            } else {
                self.open
                    .pop()
                    .map(|o| o.id)
                    .or_else(|| self.stack.pop())
            }?;
            // both queues hold every node, skip the ones already taken by the other
            if self.nodes[id].state == NodeState::Pending {
                return Some(id);
            }
        }
    }

    fn run(&mut self) -> Result<()> {
        loop {
            if self.stats.expanded >= self.config.max_nodes as u64 {
                info!("node limit {} reached", self.config.max_nodes);
                self.stats.termination = Termination::NodeLimit;
                return Ok(());
            }
            if self.deadline.map_or(false, |d| Instant::now() >= d) {
                info!("time limit reached after {} nodes", self.stats.expanded);
                self.stats.termination = Termination::TimeLimit;
                return Ok(());
            }

            let id = match self.select() {
                Some(id) => id,
                None => {
                    self.stats.termination = Termination::Exhausted;
                    return Ok(());
                }
            };

            self.stats.expanded += 1;
            self.process(id)?;
        }
    }

    fn fathom(&mut self, id: usize) {
        self.nodes[id].state = NodeState::Fathomed;
    }

    fn process(&mut self, id: usize) -> Result<()> {
        let (constraints, pool, inherited, depth) = {
            let node = &self.nodes[id];
            (
                node.constraints.clone(),
                Rc::clone(&node.pool),
                node.lower_bound,
                node.depth,
            )
        };

        if inherited >= self.incumbent_value() - VALUE_TOLERANCE {
            debug!("node {} pruned by its inherited bound {:.4}", id, inherited);
            self.stats.pruned_value += 1;
            self.fathom(id);
            return Ok(());
        }

        let mut master = MasterProblem::build(
            self.instance,
            &constraints,
            self.factory.create(),
            pool.iter().cloned(),
            self.artificial_cost,
        )?;
        let outcome = colgen::solve(
            self.instance,
            &mut master,
            self.pricer.as_mut(),
            &constraints,
            self.config.max_cg_iterations,
            self.deadline,
        )?;

        let relaxation = match outcome {
            Outcome::Relaxed(relaxation) => relaxation,
            Outcome::Infeasible if id == 0 => return Err(Error::RootInfeasible),
            Outcome::Infeasible => {
                debug!("node {} is infeasible", id);
                self.stats.pruned_infeasible += 1;
                self.fathom(id);
                return Ok(());
            }
        };

        self.stats.cg_iterations += relaxation.iterations as u64;
        self.stats.columns_generated += relaxation.added as u64;

        // only a converged relaxation bounds the node
        let lp_bound = if relaxation.converged {
            Some(relaxation.objective)
        } else {
            None
        };
        let bound = lp_bound.map_or(inherited, |b| b.max(inherited));
        if id == 0 {
            self.stats.root_bound = bound;
        }

        info!(
            "node {} (depth {}): objective {:.4}, bound {:.4}, {} columns, incumbent {:.4}",
            id,
            depth,
            relaxation.objective,
            bound,
            master.num_columns(),
            self.incumbent_value()
        );

        let columns = master.columns().to_vec();
        drop(master);
        for column in columns.iter().cloned() {
            self.remember(column);
        }

        let decision = match branching_decision(&columns, &relaxation.solution) {
            Some(decision) => decision,
            None => return self.conclude_integral(id, &columns, &relaxation, bound),
        };

        if bound >= self.incumbent_value() - VALUE_TOLERANCE {
            debug!("node {} pruned by its bound {:.4}", id, bound);
            self.stats.pruned_value += 1;
            self.fathom(id);
            return Ok(());
        }

        let interval = self.config.integer_interval as u64;
        if interval > 0 && (self.stats.expanded - 1) % interval == 0 {
            self.solve_pool(Some(&relaxation.duals))?;
        }

        debug!("node {} branches on {}", id, decision);
        let first_id = self.nodes.len();
        let [enforce, forbid] =
            self.nodes[id].branch(decision, Rc::new(columns), lp_bound, first_id);
        self.nodes[id].state = NodeState::Branched;
        self.push(enforce);
        self.push(forbid);
        // dive into the enforcing child first
        let n = self.stack.len();
        self.stack.swap(n - 1, n - 2);
        Ok(())
    }

    /// Close a node whose relaxation is integral.
    ///
    /// Columns with value above `0.5` form the node's solution, if it is not feasible the pool is
    /// solved instead. Unless the relaxation converged and the incumbent reaches the node's
    /// `bound`, the bound stays open and limits the reported lower bound.
    fn conclude_integral(
        &mut self,
        id: usize,
        columns: &[TimedColumn],
        relaxation: &Relaxation,
        bound: f64,
    ) -> Result<()> {
        let selected = relaxation
            .solution
            .iter()
            .filter(|(_, value)| *value > 0.5)
            .map(|(i, _)| columns[*i].clone())
            .collect();
        let solution = Solution::new(self.instance, selected);
        if solution.is_feasible(self.instance) {
            self.offer(solution);
        } else {
            debug!("integral solution of node {} is not feasible", id);
            self.solve_pool(Some(&relaxation.duals))?;
        }

        if !relaxation.converged || self.incumbent_value() > bound + tolerance(bound) {
            debug!(
                "node {} closed above its bound {:.4} (incumbent {:.4})",
                id,
                bound,
                self.incumbent_value()
            );
            self.unresolved = self.unresolved.min(bound);
        }
        self.nodes[id].state = NodeState::Integral;
        Ok(())
    }

    /// Replace the incumbent if `solution` improves it.
    fn offer(&mut self, solution: Solution) -> bool {
        if solution.value < self.incumbent_value() - VALUE_TOLERANCE {
            info!(
                "new incumbent {:.4} with {} vehicles after {} nodes",
                solution.value,
                solution.num_vehicles(),
                self.stats.expanded
            );
            self.stats.value = solution.value;
            self.incumbent = Some(solution);
            true
        } else {
            false
        }
    }

    /// Solve the integer program over every column seen so far.
    fn solve_pool(&mut self, duals: Option<&Duals>) -> Result<bool> {
        if let (true, Some(duals)) = (self.config.vehicle_versions, duals) {
            let sequences: BTreeSet<Vec<TestId>> =
                self.pool.iter().map(|c| c.sequence().to_vec()).collect();
            for sequence in sequences.iter() {
                for column in vehicle_versions(self.instance, sequence, duals)? {
                    self.remember(column);
                }
            }
        }

        self.stats.integer_solves += 1;
        let cutoff = self.incumbent.as_ref().map(|s| s.value);
        let master = MasterProblem::build(
            self.instance,
            &[],
            self.factory.create(),
            self.pool.iter().cloned(),
            self.artificial_cost,
        )?;
        debug!("integer solve over {} columns", master.num_columns());

        match master.solve_integer(cutoff, self.config.integer_time_limit)? {
            Some(columns) => {
                let solution = Solution::new(self.instance, columns);
                Ok(solution.is_feasible(self.instance) && self.offer(solution))
            }
            None => Ok(false),
        }
    }

    fn finish(mut self) -> Result<(Solution, Stats)> {
        if self.incumbent.is_none() {
            debug!("no incumbent after the search, solving the final pool");
            self.solve_pool(None)?;
        }
        let incumbent = self.incumbent.take().ok_or(Error::NoFeasibleSolution)?;

        let pending = self
            .nodes
            .iter()
            .filter(|n| n.state == NodeState::Pending)
            .map(|n| OrderedFloat(n.lower_bound))
            .min()
            .map_or(f64::INFINITY, OrderedFloat::into_inner);

        let mut stats = self.stats;
        stats.value = incumbent.value;
        stats.lower_bound = pending.min(self.unresolved).min(incumbent.value);
        stats.proved_optimal = stats.termination == Termination::Exhausted
            && stats.lower_bound >= incumbent.value - tolerance(incumbent.value);
        stats.elapsed = self.start.elapsed();

        info!(
            "finished after {} nodes: value {:.4}, bound {:.4}, gap {:.4}",
            stats.expanded,
            stats.value,
            stats.lower_bound,
            stats.gap()
        );
        Ok((incumbent, stats))
    }
}
