//! procbridge pool: a self-healing parallel task executor
//!
//! Work runs in worker processes, not threads, so a task that crashes takes
//! down only its own process:
//! - `TaskRegistry`: named task entry points shared by parent and workers
//! - `TaskExecutor`: fans an argument list out over a pool of workers,
//!   replacing any worker that dies
//! - `run_worker_if_requested`: the worker side, called first in `main`
//!
//! Workers are started from the current executable by default, so one binary
//! plays both roles.
//!
//! # Example
//!
//! ```rust,no_run
//! use procbridge_core::Value;
//! use procbridge_pool::{run_worker_if_requested, ExecutorConfig, TaskExecutor, TaskRegistry};
//!
//! fn main() {
//!     let mut registry = TaskRegistry::new();
//!     registry.register_typed("square", |x: i64| Ok(x * x));
//!     if let Some(code) = run_worker_if_requested(&registry) {
//!         std::process::exit(code);
//!     }
//!
//!     let args: Vec<Value> = (1..=5i64).map(Value::from).collect();
//!     let executor = TaskExecutor::new(ExecutorConfig::default().with_num_workers(3));
//!     executor
//!         .execute_typed("square", &args, |index, square: i64| {
//!             println!("{}^2 = {}", index + 1, square);
//!         })
//!         .unwrap();
//! }
//! ```

mod executor;
mod registry;
mod worker;

pub use executor::{execute, ExecutorConfig, TaskExecutor};
pub use registry::{TaskFn, TaskRegistry};
pub use worker::{
    run_worker, run_worker_if_requested, serve, WorkerInvocation, STOP_INDEX, WORKER_FLAG,
};
