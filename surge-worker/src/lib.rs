pub mod config;
pub mod controller;
pub mod pool;
pub mod scenario;
pub mod stats;

pub use config::WorkerConfig;
pub use controller::Job;
pub use pool::ConnectionPool;
pub use scenario::{Scenario, ScenarioKind, ScenarioRegistry};
