//! procbridge session: a persistent interpreter peer
//!
//! A `Session` keeps one interpreter process alive and sends it requests
//! over a pair of pipes, one line per request and one line per reply:
//! - `call`: apply a function to arguments
//! - `set_vars`: bind globals
//! - `exec` / `eval` / `run`: execute statements, evaluate expressions
//! - `exec_file`: execute a source file
//!
//! The peer is any program that speaks the line protocol; the default is
//! `/usr/bin/python3` running the bundled bootstrap loop. The `global`
//! module offers the same operations on a shared, lazily started session.
//!
//! # Example
//!
//! ```rust,no_run
//! use procbridge_session::Session;
//!
//! let mut session = Session::start().unwrap();
//! let kib: String = session.exec("x = 2 ** 10", "str(x)").unwrap();
//! assert_eq!(kib, "1024");
//! session.shutdown().unwrap();
//! ```

mod command;
mod config;
pub mod global;
mod session;

pub use command::{Command, EXIT_SENTINEL};
pub use config::{SessionConfig, DEFAULT_BOOTSTRAP, DEFAULT_INTERPRETER};
pub use session::Session;
