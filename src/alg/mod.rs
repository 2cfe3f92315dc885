pub mod core;

pub mod bnp;
pub mod colgen;
pub mod direct;
pub mod integrality;
pub mod warmup;

pub use self::core::{Solution, Stats, Termination};
pub use bnp::BranchAndPrice;
pub use colgen::{Outcome, Relaxation};
pub use direct::DirectIp;
pub use integrality::branching_decision;
pub use warmup::initial_solution;
