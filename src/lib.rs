//! Branch-and-price for batching time-windowed tests onto vehicle releases.
//!
//! Every test has a release day, a deadline and a sequence of processing stages. Tests are packed
//! into columns, i.e. ordered sequences of tests carried by one vehicle of some release, and each
//! column is timed day by day. The objective is the cost of used vehicles plus the total
//! tardiness, subject to the number of vehicles per release and to the daily capacity of the
//! testing facility.
//!
//! # Example
//! ```
//! # extern crate testsched;
//! use testsched::{BranchAndPrice, Config, Horizon, Instance, TestRequest};
//!
//! let instance = Instance::builder(Horizon::new(0, 20))
//!     .test(TestRequest::new(1, 0, 4, 0, 2, 0))
//!     .test(TestRequest::new(2, 0, 4, 0, 2, 0))
//!     .test(TestRequest::new(3, 5, 12, 1, 2, 1))
//!     .all_compatible()
//!     .vehicles(0, 2)
//!     .vehicles(5, 1)
//!     .vehicle_cost(10.)
//!     .build()
//!     .unwrap();
//!
//! let (solution, stats) = BranchAndPrice::new(&instance, Config::default())
//!     .solve()
//!     .unwrap();
//!
//! assert!(solution.is_feasible(&instance));
//! assert!(stats.value <= 30.);
//! ```
pub mod alg;
pub mod branch;
pub mod column;
pub mod config;
pub mod duals;
pub mod error;
pub mod generator;
pub mod instance;
pub mod master;
pub mod oracle;
pub mod pricer;
pub mod registry;

pub use alg::{BranchAndPrice, DirectIp, Solution, Stats, Termination};
pub use branch::BranchConstraint;
pub use column::{Batch, Column, TimedColumn};
pub use config::{Config, PricerKind};
pub use duals::Duals;
pub use error::{Error, Result};
pub use instance::{
    Day, FacilityCapacity, Horizon, Instance, InstanceBuilder, InstanceData, TestId, TestRequest,
};
