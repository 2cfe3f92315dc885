//! [LinearOracle] on top of `good_lp` with the pure Rust `microlp` backend.
//!
//! The model is kept as plain rows and columns and handed over to `good_lp` on every
//! [LinearOracle::optimize] call. Dual values of a continuous model are obtained by solving its
//! dual program on demand:
//!
//! ```text
//! min c'x  s.t. Ax (>=, <=, =) b,  l <= x <= u
//! max b'y + u'v  s.t. A'y + v <= c,  y (>= 0, <= 0, free),  v <= 0
//! ```
//!
//! after shifting every variable by its (finite) lower bound. The backend has no time or gap
//! limits, such limits are recorded but integer models are always solved to optimality (with a
//! warning logged once per process).
use std::sync::Once;
use std::time::Duration;

use good_lp::solvers::microlp::microlp;
use good_lp::{
    constraint, variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel,
    Variable,
};
use log::{trace, warn};

use super::{
    ConstrId, LinearOracle, OracleError, OracleFactory, OracleStatus, Relation, VarId, VarKind,
};

static IGNORED_LIMITS: Once = Once::new();

#[derive(Debug, Clone)]
struct Column {
    objective: f64,
    lower: f64,
    upper: f64,
    kind: VarKind,
}

#[derive(Debug, Clone)]
struct Row {
    terms: Vec<(usize, f64)>,
    relation: Relation,
    rhs: f64,
}

#[derive(Debug, Clone)]
struct Solved {
    objective: f64,
    values: Vec<f64>,
    /// lazily computed, `None` until first requested
    duals: Option<Vec<f64>>,
}

/// `good_lp` backed oracle.
#[derive(Debug, Clone, Default)]
pub struct GoodLp {
    columns: Vec<Column>,
    rows: Vec<Row>,
    time_limit: Option<Duration>,
    gap_limit: Option<f64>,
    cutoff: Option<f64>,
    solved: Option<Solved>,
}

/// Creates empty [GoodLp] oracles.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoodLpFactory;

impl OracleFactory for GoodLpFactory {
    fn create(&self) -> Box<dyn LinearOracle> {
        Box::new(GoodLp::new())
    }
}

fn linear(terms: impl Iterator<Item = (Variable, f64)>) -> Expression {
    terms.fold(Expression::from(0.0), |acc, (x, coef)| acc + coef * x)
}

fn check_bounds((lower, upper): (f64, f64)) -> Result<(), OracleError> {
    if lower.is_nan() || upper.is_nan() || lower > upper || lower == f64::INFINITY {
        Err(OracleError::InvalidBounds(lower, upper))
    } else {
        Ok(())
    }
}

impl GoodLp {
    pub fn new() -> Self {
        Self::default()
    }

    fn column(&mut self, var: VarId) -> Result<&mut Column, OracleError> {
        self.columns
            .get_mut(var.0)
            .ok_or(OracleError::UnknownVariable(var))
    }

    #[inline]
    fn is_continuous(&self) -> bool {
        self.columns.iter().all(|c| c.kind == VarKind::Continuous)
    }

    /// Optimal solution or the status explaining why there is none.
    fn solve_primal(&self) -> Result<Result<Solved, OracleStatus>, OracleError> {
        let mut vars = ProblemVariables::new();
        let xs = self
            .columns
            .iter()
            .map(|c| {
                let mut def = variable();
                if c.lower.is_finite() {
                    def = def.min(c.lower);
                }
                if c.upper.is_finite() {
                    def = def.max(c.upper);
                }
                match c.kind {
                    VarKind::Continuous => {}
                    VarKind::Integer => def = def.integer(),
                    VarKind::Binary => def = def.binary(),
                }
                vars.add(def)
            })
            .collect::<Vec<_>>();

        let objective = linear(xs.iter().zip(&self.columns).map(|(x, c)| (*x, c.objective)));
        let mut model = vars.minimise(objective.clone()).using(microlp);

        for row in self.rows.iter() {
            let lhs = linear(row.terms.iter().map(|(j, coef)| (xs[*j], *coef)));
            model.add_constraint(match row.relation {
                Relation::Geq => constraint::geq(lhs, row.rhs),
                Relation::Leq => constraint::leq(lhs, row.rhs),
                Relation::Eq => constraint::eq(lhs, row.rhs),
            });
        }

        if let Some(cutoff) = self.cutoff {
            model.add_constraint(constraint::leq(objective, cutoff));
        }

        match model.solve() {
            Ok(solution) => {
                let values = xs.iter().map(|x| solution.value(*x)).collect::<Vec<_>>();
                let objective = values
                    .iter()
                    .zip(&self.columns)
                    .map(|(v, c)| v * c.objective)
                    .sum();
                Ok(Ok(Solved {
                    objective,
                    values,
                    duals: None,
                }))
            }
            Err(ResolutionError::Infeasible) => Ok(Err(OracleStatus::Infeasible)),
            Err(ResolutionError::Unbounded) => Ok(Err(OracleStatus::Unbounded)),
            Err(e) => Err(OracleError::Solver(e.to_string())),
        }
    }

    /// Solve the dual program of the (continuous) model, see module docs.
    fn solve_dual(&self) -> Result<Vec<f64>, OracleError> {
        if let Some(c) = self.columns.iter().find(|c| !c.lower.is_finite()) {
            return Err(OracleError::DualsUnavailable(format!(
                "free variable with bounds [{}, {}]",
                c.lower, c.upper
            )));
        }

        let mut vars = ProblemVariables::new();
        let ys = self
            .rows
            .iter()
            .map(|row| {
                vars.add(match row.relation {
                    Relation::Geq => variable().min(0.),
                    Relation::Leq => variable().max(0.),
                    Relation::Eq => variable(),
                })
            })
            .collect::<Vec<_>>();

        // shifted upper bounds u - l, one non-positive dual per finite bound
        let vs = self
            .columns
            .iter()
            .map(|c| {
                c.upper
                    .is_finite()
                    .then(|| (vars.add(variable().max(0.)), c.upper - c.lower))
            })
            .collect::<Vec<_>>();

        let mut objective = Expression::from(0.0);
        for (row, y) in self.rows.iter().zip(&ys) {
            let shift: f64 = row
                .terms
                .iter()
                .map(|(j, coef)| coef * self.columns[*j].lower)
                .sum();
            objective += (row.rhs - shift) * *y;
        }
        for (v, range) in vs.iter().flatten() {
            objective += *range * *v;
        }

        // A'y + v <= c
        let mut lhs = vec![Expression::from(0.0); self.columns.len()];
        for (row, y) in self.rows.iter().zip(&ys) {
            for (j, coef) in row.terms.iter() {
                lhs[*j] += *coef * *y;
            }
        }

        let mut model = vars.maximise(objective).using(microlp);
        for (j, (mut lhs, column)) in lhs.into_iter().zip(&self.columns).enumerate() {
            if let Some((v, _)) = vs[j] {
                lhs += v;
            }
            model.add_constraint(constraint::leq(lhs, column.objective));
        }

        let solution = model
            .solve()
            .map_err(|e| OracleError::DualsUnavailable(e.to_string()))?;

        Ok(ys.iter().map(|y| solution.value(*y)).collect())
    }
}

impl LinearOracle for GoodLp {
    fn add_constraint(
        &mut self,
        terms: &[(VarId, f64)],
        relation: Relation,
        rhs: f64,
    ) -> Result<ConstrId, OracleError> {
        if let Some((var, _)) = terms.iter().find(|(v, _)| v.0 >= self.columns.len()) {
            return Err(OracleError::UnknownVariable(*var));
        }
        self.rows.push(Row {
            terms: terms.iter().map(|(v, coef)| (v.0, *coef)).collect(),
            relation,
            rhs,
        });
        self.solved = None;
        Ok(ConstrId(self.rows.len() - 1))
    }

    fn add_variable(
        &mut self,
        objective: f64,
        bounds: (f64, f64),
        kind: VarKind,
        column: &[(ConstrId, f64)],
    ) -> Result<VarId, OracleError> {
        check_bounds(bounds)?;
        if let Some((row, _)) = column.iter().find(|(c, _)| c.0 >= self.rows.len()) {
            return Err(OracleError::UnknownConstraint(*row));
        }

        let var = self.columns.len();
        self.columns.push(Column {
            objective,
            lower: bounds.0,
            upper: bounds.1,
            kind,
        });
        for (row, coef) in column {
            self.rows[row.0].terms.push((var, *coef));
        }
        self.solved = None;
        Ok(VarId(var))
    }

    fn set_kind(&mut self, var: VarId, kind: VarKind) -> Result<(), OracleError> {
        self.column(var)?.kind = kind;
        self.solved = None;
        Ok(())
    }

    fn set_bounds(&mut self, var: VarId, bounds: (f64, f64)) -> Result<(), OracleError> {
        check_bounds(bounds)?;
        let column = self.column(var)?;
        column.lower = bounds.0;
        column.upper = bounds.1;
        self.solved = None;
        Ok(())
    }

    fn set_time_limit(&mut self, limit: Option<Duration>) {
        self.time_limit = limit;
    }

    fn set_gap_limit(&mut self, gap: Option<f64>) {
        self.gap_limit = gap;
    }

    fn set_cutoff(&mut self, cutoff: Option<f64>) {
        self.cutoff = cutoff;
        self.solved = None;
    }

    fn optimize(&mut self) -> Result<OracleStatus, OracleError> {
        if !self.is_continuous() && (self.time_limit.is_some() || self.gap_limit.is_some()) {
            IGNORED_LIMITS.call_once(|| {
                warn!(
                    "microlp ignores limits and solves to optimality (time: {:?}, gap: {:?})",
                    self.time_limit, self.gap_limit
                )
            });
        }

        trace!(
            "optimizing {} variables and {} constraints",
            self.columns.len(),
            self.rows.len()
        );

        match self.solve_primal()? {
            Ok(solved) => {
                self.solved = Some(solved);
                Ok(OracleStatus::Optimal)
            }
            Err(status) => {
                self.solved = None;
                Ok(status)
            }
        }
    }

    fn objective(&self) -> Result<f64, OracleError> {
        self.solved
            .as_ref()
            .map(|s| s.objective)
            .ok_or(OracleError::NoSolution)
    }

    fn primal(&self, var: VarId) -> Result<f64, OracleError> {
        let solved = self.solved.as_ref().ok_or(OracleError::NoSolution)?;
        solved
            .values
            .get(var.0)
            .copied()
            .ok_or(OracleError::UnknownVariable(var))
    }

    fn dual(&mut self, constraint: ConstrId) -> Result<f64, OracleError> {
        if constraint.0 >= self.rows.len() {
            return Err(OracleError::UnknownConstraint(constraint));
        }
        if !self.is_continuous() {
            return Err(OracleError::DualsUnavailable(
                "the model has integer variables".into(),
            ));
        }
        if self.solved.is_none() {
            return Err(OracleError::NoSolution);
        }

        let duals = match self.solved.as_ref().and_then(|s| s.duals.clone()) {
            Some(duals) => duals,
            None => {
                let duals = self.solve_dual()?;
                if let Some(solved) = self.solved.as_mut() {
                    solved.duals = Some(duals.clone());
                }
                duals
            }
        };

        Ok(duals[constraint.0])
    }

    fn num_variables(&self) -> usize {
        self.columns.len()
    }

    fn num_constraints(&self) -> usize {
        self.rows.len()
    }
}
