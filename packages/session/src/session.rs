//! The persistent session.

use std::path::Path;

use procbridge_core::{wire, Error, FromValue, IntoArgs, Result, Value};
use procbridge_pipe::Subprocess;
use tracing::{debug, trace, warn};

use crate::command::{Command, EXIT_SENTINEL};
use crate::config::SessionConfig;

/// A long-lived peer interpreter, one synchronous round trip per request.
///
/// Definitions made by one request stay visible to the next. Losing the
/// peer is fatal: the failing request returns `ProcessDied` and every later
/// request fails the same way without touching the pipes.
///
/// # Example
///
/// ```rust,no_run
/// use procbridge_session::Session;
///
/// let mut session = Session::start().unwrap();
/// let total: i64 = session.call("sum", (vec![1i64, 2, 3, 4, 5],)).unwrap();
/// assert_eq!(total, 15);
///
/// session.set_vars(&["a", "b"], (12i64, 34i64)).unwrap();
/// let power: String = session.eval("str(a ** b)").unwrap();
/// assert!(power.starts_with("4922235"));
/// ```
#[derive(Debug)]
pub struct Session {
    process: Subprocess,
    poisoned: bool,
    closed: bool,
}

impl Session {
    /// Start a peer with the default configuration.
    pub fn start() -> Result<Self> {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Result<Self> {
        let process = Subprocess::spawn(&config.entrypoint(), config.subprocess.clone())?;
        debug!(
            pid = process.pid(),
            interpreter = %config.interpreter.display(),
            "session started"
        );
        Ok(Self {
            process,
            poisoned: false,
            closed: false,
        })
    }

    /// Apply the peer expression `function` to `args`.
    ///
    /// Arguments are a tuple; a single argument is written `(arg,)`.
    pub fn call<R: FromValue>(&mut self, function: &str, args: impl IntoArgs) -> Result<R> {
        let reply = self.round_trip(Command::call(function, args.into_args()))?;
        R::from_value(reply)
    }

    /// Bind peer globals, one name per value.
    ///
    /// The counts are checked before anything is sent.
    pub fn set_vars(&mut self, names: &[&str], values: impl IntoArgs) -> Result<()> {
        let names = names.iter().map(|name| name.to_string()).collect();
        let command = Command::set_vars(names, values.into_args())?;
        let reply = self.round_trip(command)?;
        expect_ack("set_vars", reply)
    }

    /// Execute `code`, then evaluate `result_expr` and return it.
    pub fn exec<R: FromValue>(&mut self, code: &str, result_expr: &str) -> Result<R> {
        let reply = self.round_trip(Command::exec(code, result_expr))?;
        R::from_value(reply)
    }

    /// Evaluate a single expression.
    pub fn eval<R: FromValue>(&mut self, expr: &str) -> Result<R> {
        self.exec("None", expr)
    }

    /// Execute statements, discarding any result.
    pub fn run(&mut self, code: &str) -> Result<()> {
        self.exec(code, "None")
    }

    /// Execute a source file in the peer's namespace.
    pub fn exec_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let path = path
            .to_str()
            .ok_or_else(|| Error::protocol(format!("path is not valid UTF-8: {}", path.display())))?;
        let reply = self.round_trip(Command::exec_file(path))?;
        expect_ack("exec_file", reply)
    }

    /// A previous request lost the peer.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn pid(&self) -> u32 {
        self.process.pid()
    }

    pub fn is_alive(&mut self) -> Result<bool> {
        self.process.is_alive()
    }

    /// Tell the peer to exit and wait for it, up to the configured grace
    /// period, after which it is killed.
    pub fn shutdown(mut self) -> Result<()> {
        self.close()?;
        let grace = self.process.config().shutdown_grace;
        if !self.process.join_timeout(grace)? {
            warn!(pid = self.process.pid(), "peer ignored exit request, killing");
            self.process.kill()?;
        }
        Ok(())
    }

    fn round_trip(&mut self, command: Command) -> Result<Value> {
        let name = command.name();
        if self.poisoned || self.closed {
            return Err(Error::process_died(format!(
                "{} not sent: session has no live peer",
                name
            )));
        }

        let line = command.to_line()?;
        trace!(command = name, bytes = line.len(), "sending request");

        let reply = match self.process.exchange(&line) {
            Ok(Some(reply)) => reply,
            Ok(None) => {
                self.poisoned = true;
                let status = self.process.exit_status();
                warn!(pid = self.process.pid(), ?status, command = name, "peer died");
                return Err(Error::process_died(match status {
                    Some(status) => format!("peer exited ({}) during {}", status, name),
                    None => format!("peer closed its pipes during {}", name),
                }));
            }
            Err(e) => {
                self.poisoned = true;
                return Err(e);
            }
        };

        wire::decode_line(&reply)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.poisoned {
            return Ok(());
        }
        if self.process.write_request(EXIT_SENTINEL)? {
            debug!(pid = self.process.pid(), "sent exit sentinel");
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to stop peer cleanly");
        }
    }
}

fn expect_ack(command: &str, reply: Value) -> Result<()> {
    if reply.is_void() {
        Ok(())
    } else {
        Err(Error::protocol(format!(
            "{} expects an empty acknowledgment, got {}",
            command,
            reply.class()
        )))
    }
}
