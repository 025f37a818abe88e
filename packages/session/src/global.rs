//! A process-wide session.
//!
//! The free functions here share one [`Session`] behind a lock. It starts
//! lazily with [`SessionConfig::default`] on first use, or explicitly with
//! [`init`]. Statics are never dropped, so call [`shutdown`] before exiting
//! to stop the peer cleanly.
//!
//! On Linux the peer is tied to the thread that started it (it receives
//! SIGHUP when that thread exits). Initialize from a long-lived thread such
//! as `main`.
//!
//! # Example
//!
//! ```rust,no_run
//! use procbridge_session::global;
//!
//! let total: i64 = global::call("sum", (vec![1i64, 2, 3],)).unwrap();
//! global::shutdown().unwrap();
//! ```

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

use lazy_static::lazy_static;
use procbridge_core::{FromValue, IntoArgs, Result};
use tracing::debug;

use crate::config::SessionConfig;
use crate::session::Session;

lazy_static! {
    static ref GLOBAL_SESSION: Mutex<Option<Session>> = Mutex::new(None);
}

fn slot() -> MutexGuard<'static, Option<Session>> {
    GLOBAL_SESSION
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Start the shared session, replacing (and stopping) any existing one.
pub fn init(config: SessionConfig) -> Result<()> {
    let mut slot = slot();
    if let Some(previous) = slot.take() {
        debug!(pid = previous.pid(), "replacing global session");
        previous.shutdown()?;
    }
    *slot = Some(Session::with_config(config)?);
    Ok(())
}

/// Stop the shared session if one is running.
pub fn shutdown() -> Result<()> {
    match slot().take() {
        Some(session) => session.shutdown(),
        None => Ok(()),
    }
}

pub fn is_initialized() -> bool {
    slot().is_some()
}

/// Run `f` with exclusive access to the shared session, starting it first
/// if needed.
///
/// A session that lost its peer stays in place and keeps failing with
/// `ProcessDied`; call [`init`] to replace it.
pub fn with_session<T>(f: impl FnOnce(&mut Session) -> Result<T>) -> Result<T> {
    let mut slot = slot();
    let session = match slot.take() {
        Some(session) => session,
        None => {
            let session = Session::start()?;
            match non_main_thread() {
                Some(name) => debug!(
                    pid = session.pid(),
                    thread = %name,
                    "global session started off the main thread; the peer exits with this thread"
                ),
                None => debug!(pid = session.pid(), "global session started"),
            }
            session
        }
    };
    f(slot.insert(session))
}

/// Name of the current thread unless it is `main`.
fn non_main_thread() -> Option<String> {
    let current = thread::current();
    match current.name() {
        Some("main") => None,
        Some(name) => Some(name.to_string()),
        None => Some(format!("{:?}", current.id())),
    }
}

/// [`Session::call`] on the shared session.
pub fn call<R: FromValue>(function: &str, args: impl IntoArgs) -> Result<R> {
    with_session(|session| session.call(function, args))
}

/// [`Session::set_vars`] on the shared session.
pub fn set_vars(names: &[&str], values: impl IntoArgs) -> Result<()> {
    with_session(|session| session.set_vars(names, values))
}

/// [`Session::exec`] on the shared session.
pub fn exec<R: FromValue>(code: &str, result_expr: &str) -> Result<R> {
    with_session(|session| session.exec(code, result_expr))
}

/// [`Session::eval`] on the shared session.
pub fn eval<R: FromValue>(expr: &str) -> Result<R> {
    with_session(|session| session.eval(expr))
}

/// [`Session::run`] on the shared session.
pub fn run(code: &str) -> Result<()> {
    with_session(|session| session.run(code))
}

/// [`Session::exec_file`] on the shared session.
pub fn exec_file(path: impl AsRef<Path>) -> Result<()> {
    with_session(|session| session.exec_file(path))
}
