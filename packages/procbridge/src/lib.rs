//! procbridge: typed calls into subprocesses over line-framed pipes.
//!
//! Two ways to use a child process:
//! - a [`Session`] keeps one interpreter alive and runs requests against it
//!   one at a time, with state carried from request to request
//! - a [`TaskExecutor`] fans a registered task out over a pool of worker
//!   processes and replaces any worker that dies
//!
//! Values cross the boundary as [`Value`]s in a tagged JSON line format and
//! convert to and from native types through [`FromValue`] and [`IntoArgs`].
//!
//! # Example
//!
//! ```rust,no_run
//! use procbridge::Session;
//!
//! let mut session = Session::start()?;
//! let total: i64 = session.call("sum", (vec![1i64, 2, 3, 4, 5],))?;
//! assert_eq!(total, 15);
//! # Ok::<(), procbridge::Error>(())
//! ```

pub use procbridge_core::{
    element_count, from_value, wire, DType, Element, Error, FromValue, IntoArgs, NdArray, Result,
    Value,
};
pub use procbridge_pipe::{Entrypoint, ProcessState, Subprocess, SubprocessConfig};
pub use procbridge_pool::{
    run_worker_if_requested, ExecutorConfig, TaskExecutor, TaskRegistry, WORKER_FLAG,
};
pub use procbridge_session::{global, Session, SessionConfig, DEFAULT_INTERPRETER};

/// The layers, for access beyond the re-exports.
pub mod layers {
    pub use procbridge_core as core;
    pub use procbridge_pipe as pipe;
    pub use procbridge_pool as pool;
    pub use procbridge_session as session;
}
