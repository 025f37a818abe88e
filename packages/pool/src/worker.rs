//! The worker side of the executor.
//!
//! A worker process is started as
//!
//! ```text
//! <program> [fixed args...] --procbridge-worker <task> <request-fd> <response-fd>
//! ```
//!
//! and speaks a small line protocol with its parent:
//!
//! 1. the first line is the encoded argument list
//! 2. every following line is a decimal index into that list, answered with
//!    the encoded result of the task on that argument
//! 3. `-1` means stop; the worker exits 0
//!
//! A malformed index or a failing task ends the worker with a non-zero exit
//! status, which the parent sees as a dead worker.

use std::time::Duration;

use procbridge_core::{wire, Error, Result, Value};
use procbridge_pipe::ChildEndpoint;
use tracing::{debug, error, trace};

use crate::registry::TaskRegistry;

/// Marks a worker invocation on the command line.
pub const WORKER_FLAG: &str = "--procbridge-worker";

/// Request line that stops a worker.
pub const STOP_INDEX: &str = "-1";

const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Arguments of a worker invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerInvocation {
    pub task: String,
    pub request_fd: String,
    pub response_fd: String,
}

impl WorkerInvocation {
    /// Find a worker invocation in a command line (without the program name).
    ///
    /// Returns `Ok(None)` when the flag is absent.
    pub fn parse(args: &[String]) -> Result<Option<Self>> {
        let Some(position) = args.iter().position(|arg| arg == WORKER_FLAG) else {
            return Ok(None);
        };
        match &args[position + 1..] {
            [task, request_fd, response_fd] => Ok(Some(Self {
                task: task.clone(),
                request_fd: request_fd.clone(),
                response_fd: response_fd.clone(),
            })),
            rest => Err(Error::protocol(format!(
                "{} expects <task> <request-fd> <response-fd>, got {} arguments",
                WORKER_FLAG,
                rest.len()
            ))),
        }
    }
}

/// Serve as a worker if this process was started as one.
///
/// Call this first thing in `main` and exit with the returned code when it
/// is `Some`:
///
/// ```rust,no_run
/// use procbridge_pool::{run_worker_if_requested, TaskRegistry};
///
/// let mut registry = TaskRegistry::new();
/// registry.register_typed("square", |x: i64| Ok(x * x));
/// if let Some(code) = run_worker_if_requested(&registry) {
///     std::process::exit(code);
/// }
/// ```
pub fn run_worker_if_requested(registry: &TaskRegistry) -> Option<i32> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = match WorkerInvocation::parse(&args) {
        Ok(Some(invocation)) => invocation,
        Ok(None) => return None,
        Err(e) => {
            error!(error = %e, "invalid worker invocation");
            return Some(2);
        }
    };

    match run_worker(registry, &invocation) {
        Ok(()) => Some(0),
        Err(e) => {
            error!(task = %invocation.task, error = %e, "worker failed");
            Some(1)
        }
    }
}

/// Adopt the pipes named by `invocation` and serve until told to stop.
pub fn run_worker(registry: &TaskRegistry, invocation: &WorkerInvocation) -> Result<()> {
    let mut endpoint = ChildEndpoint::from_args(
        &invocation.request_fd,
        &invocation.response_fd,
        WORKER_POLL_INTERVAL,
    )?;
    serve(registry, &invocation.task, &mut endpoint)
}

/// The worker loop over an already open endpoint.
pub fn serve(registry: &TaskRegistry, task_name: &str, endpoint: &mut ChildEndpoint) -> Result<()> {
    let task = registry
        .get(task_name)
        .ok_or_else(|| Error::execution(format!("no task registered as {:?}", task_name)))?;

    let args = match wire::decode_line(&endpoint.read_line()?)? {
        Value::List(items) => items,
        other => {
            return Err(Error::protocol(format!(
                "worker arguments must be a list, got {}",
                other.class()
            )))
        }
    };
    debug!(task = task_name, count = args.len(), "worker ready");

    loop {
        let line = endpoint.read_line()?;
        if line.trim() == STOP_INDEX {
            debug!(task = task_name, "worker stopping");
            return Ok(());
        }
        let index: usize = line
            .trim()
            .parse()
            .map_err(|_| Error::protocol(format!("invalid task index {:?}", line)))?;
        let arg = args.get(index).ok_or_else(|| {
            Error::protocol(format!(
                "task index {} out of range for {} arguments",
                index,
                args.len()
            ))
        })?;

        trace!(task = task_name, index, "running task");
        let result = task(arg.clone())?;
        endpoint.write_line(&wire::encode_line(&result)?)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procbridge_pipe::fd::{create_pipe, set_nonblocking};
    use procbridge_pipe::ReadBuffer;
    use std::fs::File;
    use std::io::Write;
    use std::os::fd::AsRawFd;
    use std::thread;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_finds_flag_after_fixed_args() {
        let args = strings(&["--verbose", WORKER_FLAG, "square", "5", "8"]);
        let invocation = WorkerInvocation::parse(&args).unwrap().unwrap();
        assert_eq!(invocation.task, "square");
        assert_eq!(invocation.request_fd, "5");
        assert_eq!(invocation.response_fd, "8");
    }

    #[test]
    fn parse_without_flag_is_none() {
        assert_eq!(WorkerInvocation::parse(&strings(&["--python", "x"])).unwrap(), None);
        assert_eq!(WorkerInvocation::parse(&[]).unwrap(), None);
    }

    #[test]
    fn parse_with_wrong_arity_is_error() {
        let args = strings(&[WORKER_FLAG, "square", "5"]);
        assert!(matches!(
            WorkerInvocation::parse(&args),
            Err(Error::Protocol { .. })
        ));
    }

    fn registry() -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        registry.register_typed("square", |x: i64| Ok(x * x));
        registry
    }

    /// Runs `serve` on a thread and returns the parent's ends of the pipes.
    fn spawn_worker(task: &'static str) -> (File, File, thread::JoinHandle<Result<()>>) {
        let (request_read, request_write) = create_pipe().unwrap();
        let (response_read, response_write) = create_pipe().unwrap();
        set_nonblocking(response_read.as_raw_fd()).unwrap();
        let handle = thread::spawn(move || {
            let mut endpoint =
                ChildEndpoint::new(request_read, response_write, Duration::from_millis(10))?;
            serve(&registry(), task, &mut endpoint)
        });
        (File::from(request_write), File::from(response_read), handle)
    }

    fn read_reply(responses: &File) -> String {
        ReadBuffer::new()
            .block_read_line(responses, Duration::from_millis(10))
            .unwrap()
    }

    #[test]
    fn serves_indices_until_stop() {
        let (mut requests, responses, handle) = spawn_worker("square");
        let args = wire::encode_line(&Value::from(vec![3i64, 4, 5])).unwrap();
        writeln!(requests, "{}", args).unwrap();

        writeln!(requests, "2").unwrap();
        assert_eq!(
            wire::decode_line(&read_reply(&responses)).unwrap(),
            Value::Int(25)
        );
        writeln!(requests, "0").unwrap();
        assert_eq!(
            wire::decode_line(&read_reply(&responses)).unwrap(),
            Value::Int(9)
        );

        writeln!(requests, "-1").unwrap();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn bad_index_is_protocol_error() {
        let (mut requests, _responses, handle) = spawn_worker("square");
        writeln!(requests, "{}", wire::encode_line(&Value::from(vec![1i64])).unwrap()).unwrap();
        writeln!(requests, "seven").unwrap();
        assert!(matches!(handle.join().unwrap(), Err(Error::Protocol { .. })));
    }

    #[test]
    fn out_of_range_index_is_protocol_error() {
        let (mut requests, _responses, handle) = spawn_worker("square");
        writeln!(requests, "{}", wire::encode_line(&Value::from(vec![1i64])).unwrap()).unwrap();
        writeln!(requests, "1").unwrap();
        assert!(matches!(handle.join().unwrap(), Err(Error::Protocol { .. })));
    }

    #[test]
    fn task_failure_ends_worker() {
        let (mut requests, _responses, handle) = spawn_worker("square");
        writeln!(requests, "{}", wire::encode_line(&Value::from(vec!["x"])).unwrap()).unwrap();
        writeln!(requests, "0").unwrap();
        assert!(matches!(
            handle.join().unwrap(),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn unknown_task_is_execution_error() {
        let (_requests, _responses, handle) = spawn_worker("cube");
        assert!(matches!(
            handle.join().unwrap(),
            Err(Error::Execution { .. })
        ));
    }
}
