//! The subprocess handle: one child, two pipes, one exchange at a time.
//!
//! A [`Subprocess`] owns the parent ends of a request pipe and a response
//! pipe. The child receives the other two ends as descriptor numbers
//! appended to its command line, after any fixed arguments.
//!
//! # Example
//!
//! ```rust,no_run
//! use procbridge_pipe::{Entrypoint, Subprocess, SubprocessConfig};
//!
//! let script = r#"read -r line <&"$0"; printf '%s\n' "$line" >&"$1""#;
//! let entry = Entrypoint::new("/bin/sh").arg("-c").arg(script);
//! let mut child = Subprocess::spawn(&entry, SubprocessConfig::default()).unwrap();
//! assert_eq!(child.exchange("ping").unwrap().as_deref(), Some("ping"));
//! ```
//!
//! # Design Notes
//!
//! - Every wait goes through `poll(2)` with a bounded slice so a child that
//!   dies mid-exchange is noticed within one poll interval.
//! - Liveness lives in `ChildWatch` so it can be probed while a write
//!   buffer borrows the request pipe.
//! - Dropping the handle joins the child for at most `shutdown_grace`, then
//!   kills it.
//! - On Linux the child gets SIGHUP when the spawning *thread* exits, so a
//!   handle should be spawned by a thread that outlives its use.

use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use procbridge_core::Result;

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::fd::{create_pipe, set_cloexec, set_nonblocking, wait_ready, Readiness};

/// Program and fixed arguments for a child process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entrypoint {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Entrypoint {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// The executable of the running process.
    pub fn current_exe() -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Timing knobs for a subprocess handle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubprocessConfig {
    /// Upper bound on a single readiness wait before liveness is re-checked.
    pub poll_interval: Duration,
    /// How long teardown waits for the child before killing it.
    pub shutdown_grace: Duration,
}

impl Default for SubprocessConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl SubprocessConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

/// Lifecycle of a spawned child.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    Alive,
    Dead,
}

/// Tracks whether the child has exited.
#[derive(Debug)]
struct ChildWatch {
    child: Child,
    state: ProcessState,
    exit_status: Option<ExitStatus>,
}

impl ChildWatch {
    fn new(child: Child) -> Self {
        Self {
            child,
            state: ProcessState::Alive,
            exit_status: None,
        }
    }

    /// Non-blocking wait. Once an exit is observed the state stays `Dead`.
    fn probe(&mut self) -> io::Result<bool> {
        if self.state == ProcessState::Dead {
            return Ok(false);
        }
        match self.child.try_wait()? {
            Some(status) => {
                debug!(pid = self.child.id(), %status, "subprocess exited");
                self.state = ProcessState::Dead;
                self.exit_status = Some(status);
                Ok(false)
            }
            None => Ok(true),
        }
    }

    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn state(&self) -> ProcessState {
        self.state
    }

    fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    fn kill(&mut self) -> io::Result<()> {
        if self.state == ProcessState::Dead {
            return Ok(());
        }
        self.child.kill()?;
        let status = self.child.wait()?;
        debug!(pid = self.child.id(), %status, "subprocess killed");
        self.state = ProcessState::Dead;
        self.exit_status = Some(status);
        Ok(())
    }

    fn signal(&self, signal: libc::c_int) -> io::Result<()> {
        if self.state == ProcessState::Dead {
            return Ok(());
        }
        let rc = unsafe { libc::kill(self.child.id() as libc::pid_t, signal) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

/// A child process connected by a request pipe and a response pipe.
#[derive(Debug)]
pub struct Subprocess {
    watch: ChildWatch,
    request: File,
    response: File,
    config: SubprocessConfig,
}

impl Subprocess {
    /// Spawn `entry` with the two child-side descriptor numbers appended to
    /// its arguments: the request read end, then the response write end.
    pub fn spawn(entry: &Entrypoint, config: SubprocessConfig) -> Result<Self> {
        let (child_request, parent_request) = create_pipe()?;
        let (parent_response, child_response) = create_pipe()?;
        set_nonblocking(parent_request.as_raw_fd())?;
        set_nonblocking(parent_response.as_raw_fd())?;

        let child_fds = [child_request.as_raw_fd(), child_response.as_raw_fd()];

        let mut command = Command::new(&entry.program);
        command
            .args(&entry.args)
            .arg(child_fds[0].to_string())
            .arg(child_fds[1].to_string());

        // SAFETY: the hook only calls fcntl and prctl, both async-signal-safe.
        unsafe {
            command.pre_exec(move || {
                for fd in child_fds {
                    set_cloexec(fd, false)?;
                }
                #[cfg(target_os = "linux")]
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGHUP as libc::c_ulong) < 0 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let child = command.spawn()?;
        close_child_ends(child_request, child_response);

        debug!(
            pid = child.id(),
            program = %entry.program.display(),
            "spawned subprocess"
        );

        Ok(Self {
            watch: ChildWatch::new(child),
            request: File::from(parent_request),
            response: File::from(parent_response),
            config,
        })
    }

    pub fn pid(&self) -> u32 {
        self.watch.pid()
    }

    pub fn state(&self) -> ProcessState {
        self.watch.state()
    }

    /// Exit status, once the child has been observed dead.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.watch.exit_status()
    }

    pub fn config(&self) -> &SubprocessConfig {
        &self.config
    }

    pub fn is_alive(&mut self) -> Result<bool> {
        Ok(self.watch.probe()?)
    }

    /// Wait until the child exits.
    pub fn join(&mut self) -> Result<()> {
        while self.is_alive()? {
            thread::sleep(self.config.poll_interval);
        }
        Ok(())
    }

    /// Wait at most `timeout` for the child to exit.
    ///
    /// Returns whether it exited.
    pub fn join_timeout(&mut self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_alive()? {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            thread::sleep(self.config.poll_interval.min(deadline - now));
        }
    }

    /// Forcefully terminate the child and reap it.
    pub fn kill(&mut self) -> Result<()> {
        Ok(self.watch.kill()?)
    }

    /// Ask the child to stop with SIGTERM, killing it if it is still alive
    /// after `grace`.
    pub fn terminate(&mut self, grace: Duration) -> Result<()> {
        self.watch.signal(libc::SIGTERM)?;
        if !self.join_timeout(grace)? {
            warn!(pid = self.pid(), "subprocess ignored SIGTERM, killing");
            self.kill()?;
        }
        Ok(())
    }

    /// Write one message to the child.
    ///
    /// Returns whether the child is still alive afterward. A closed request
    /// pipe counts as a dead peer.
    pub fn write_request(&mut self, message: &str) -> Result<bool> {
        if !self.watch.probe()? {
            return Ok(false);
        }
        let interval = self.config.poll_interval;
        let mut buffer = WriteBuffer::new(&self.request, message)?;
        loop {
            match buffer.flush_to_fd() {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    debug!(pid = self.watch.pid(), "request pipe closed by subprocess");
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            }
            if buffer.remaining() == 0 || !self.watch.probe()? {
                break;
            }
            wait_ready(&self.request, Readiness::Write, interval)?;
        }
        trace!(pid = self.watch.pid(), bytes = message.len() + 1, "wrote request");
        Ok(self.watch.probe()?)
    }

    /// Read one response line from the child.
    ///
    /// Returns `None` if the child dies before a complete line arrives.
    pub fn read_response(&mut self) -> Result<Option<String>> {
        if !self.watch.probe()? {
            return Ok(None);
        }
        let interval = self.config.poll_interval;
        let mut buffer = ReadBuffer::new();
        while self.watch.probe()? {
            if wait_ready(&self.response, Readiness::Read, interval)? {
                buffer.fill_from(&self.response)?;
                if let Some(line) = buffer.take_line()? {
                    return Ok(Some(line));
                }
                if buffer.is_eof() {
                    // Hangup stays readable; sleep instead of spinning until
                    // the exit is observable.
                    thread::sleep(interval);
                }
            }
        }

        // A line written just before exiting is still in the pipe.
        buffer.fill_from(&self.response)?;
        if let Some(line) = buffer.take_line()? {
            return Ok(Some(line));
        }
        debug!(
            pid = self.watch.pid(),
            partial = buffer.pending(),
            "subprocess died before responding"
        );
        Ok(None)
    }

    /// Write `request` and read the reply.
    pub fn exchange(&mut self, request: &str) -> Result<Option<String>> {
        if !self.write_request(request)? {
            return Ok(None);
        }
        self.read_response()
    }
}

fn close_child_ends(request: OwnedFd, response: OwnedFd) {
    drop(request);
    drop(response);
}

impl Drop for Subprocess {
    fn drop(&mut self) {
        let grace = self.config.shutdown_grace;
        match self.join_timeout(grace) {
            Ok(true) => {}
            Ok(false) => {
                warn!(pid = self.pid(), ?grace, "subprocess still running after grace period, killing");
                if let Err(e) = self.kill() {
                    warn!(pid = self.pid(), error = %e, "failed to kill subprocess");
                }
            }
            Err(e) => {
                warn!(pid = self.pid(), error = %e, "failed to join subprocess, killing");
                let _ = self.kill();
            }
        }
    }
}
