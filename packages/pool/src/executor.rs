//! The parallel task executor.
//!
//! `TaskExecutor::execute` runs a registered task over every element of an
//! argument list. Each pool thread owns one worker process and feeds it
//! indices from a shared queue; results reach the callback as they
//! complete.
//!
//! # Design Notes
//!
//! - The queue and the callback sit behind one lock, so the callback is
//!   never re-entered and needs no synchronization of its own.
//! - A worker process that dies mid-task is replaced and the task is sent
//!   once more to the fresh process. A second death on the same task is
//!   fatal: the remaining workers stop taking tasks and the first error is
//!   returned.
//! - Every index is delivered to the callback at most once, and exactly
//!   once when `execute` returns `Ok`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

use procbridge_core::{wire, Error, FromValue, Result, Value};
use procbridge_pipe::{Entrypoint, Subprocess, SubprocessConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::worker::{STOP_INDEX, WORKER_FLAG};

/// Executor settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Worker threads, each with its own worker process.
    pub num_workers: usize,
    /// Program to run as a worker. `None` means the current executable.
    pub worker: Option<Entrypoint>,
    pub subprocess: SubprocessConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            num_workers: thread::available_parallelism().map_or(1, |n| n.get()),
            worker: None,
            subprocess: SubprocessConfig::default(),
        }
    }
}

impl ExecutorConfig {
    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    pub fn with_worker(mut self, worker: Entrypoint) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn with_subprocess(mut self, subprocess: SubprocessConfig) -> Self {
        self.subprocess = subprocess;
        self
    }
}

/// Runs registered tasks across a pool of worker processes.
#[derive(Clone, Debug, Default)]
pub struct TaskExecutor {
    config: ExecutorConfig,
}

impl TaskExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run `task` on every element of `args`, calling `callback(index, result)`
    /// in completion order.
    pub fn execute<F>(&self, task: &str, args: &[Value], mut callback: F) -> Result<()>
    where
        F: FnMut(usize, Value) + Send,
    {
        self.run(task, args, |index, result| {
            callback(index, result);
            Ok(())
        })
    }

    /// Like [`execute`](Self::execute), decoding each result into `R` first.
    ///
    /// A result that does not decode aborts the run with the decode error.
    pub fn execute_typed<R, F>(&self, task: &str, args: &[Value], mut callback: F) -> Result<()>
    where
        R: FromValue,
        F: FnMut(usize, R) + Send,
    {
        self.run(task, args, |index, result| {
            callback(index, R::from_value(result)?);
            Ok(())
        })
    }

    fn run<F>(&self, task: &str, args: &[Value], callback: F) -> Result<()>
    where
        F: FnMut(usize, Value) -> Result<()> + Send,
    {
        if self.config.num_workers == 0 {
            return Err(Error::execution("executor needs at least one worker"));
        }
        if args.is_empty() {
            return Ok(());
        }

        let entry = match &self.config.worker {
            Some(worker) => worker.clone(),
            None => Entrypoint::current_exe()?,
        }
        .arg(WORKER_FLAG)
        .arg(task);
        let bootstrap = wire::encode_line(&Value::List(args.to_vec()))?;

        let shared = Mutex::new(Shared {
            queue: (0..args.len()).collect(),
            callback,
        });
        let abort = AtomicBool::new(false);
        let failure: Mutex<Option<Error>> = Mutex::new(None);
        let num_workers = self.config.num_workers.min(args.len());
        debug!(task, tasks = args.len(), workers = num_workers, "starting executor");

        thread::scope(|scope| {
            for id in 0..num_workers {
                let mut worker = Worker {
                    id,
                    task,
                    entry: &entry,
                    bootstrap: &bootstrap,
                    config: &self.config.subprocess,
                    shared: &shared,
                    abort: &abort,
                    process: None,
                };
                let abort = &abort;
                let failure = &failure;
                scope.spawn(move || {
                    if let Err(e) = worker.run() {
                        warn!(worker = id, error = %e, "worker failed, aborting run");
                        abort.store(true, Ordering::SeqCst);
                        let mut failure = lock(failure);
                        if failure.is_none() {
                            *failure = Some(e);
                        }
                    }
                });
            }
        });

        match failure.into_inner().unwrap_or_else(PoisonError::into_inner) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Run `task` over `args` with the default configuration.
pub fn execute<F>(task: &str, args: &[Value], callback: F) -> Result<()>
where
    F: FnMut(usize, Value) + Send,
{
    TaskExecutor::default().execute(task, args, callback)
}

struct Shared<F> {
    queue: VecDeque<usize>,
    callback: F,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Worker<'a, F> {
    id: usize,
    task: &'a str,
    entry: &'a Entrypoint,
    bootstrap: &'a str,
    config: &'a SubprocessConfig,
    shared: &'a Mutex<Shared<F>>,
    abort: &'a AtomicBool,
    process: Option<Subprocess>,
}

impl<F> Worker<'_, F>
where
    F: FnMut(usize, Value) -> Result<()>,
{
    fn run(&mut self) -> Result<()> {
        let result = self.drain_queue();
        if result.is_err() {
            self.discard_process();
        }
        result
    }

    fn drain_queue(&mut self) -> Result<()> {
        loop {
            if self.abort.load(Ordering::SeqCst) {
                return self.stop();
            }
            let next = lock(self.shared).queue.pop_front();
            let Some(index) = next else {
                return self.stop();
            };

            let result = self.run_task(index)?;

            let mut shared = lock(self.shared);
            (shared.callback)(index, result)?;
        }
    }

    fn run_task(&mut self, index: usize) -> Result<Value> {
        let request = index.to_string();
        if let Some(reply) = self.exchange(&request)? {
            return wire::decode_line(&reply);
        }

        let status = self.discard_process();
        warn!(
            worker = self.id,
            task = self.task,
            index,
            ?status,
            "worker process died, retrying on a fresh process"
        );

        match self.exchange(&request)? {
            Some(reply) => wire::decode_line(&reply),
            None => {
                let status = self.discard_process();
                Err(Error::execution(format!(
                    "task {:?} on index {} lost two worker processes (last exit: {})",
                    self.task,
                    index,
                    status.map_or_else(|| "unknown".to_string(), |s| s.to_string())
                )))
            }
        }
    }

    fn exchange(&mut self, request: &str) -> Result<Option<String>> {
        self.ensure_process()?.exchange(request)
    }

    fn ensure_process(&mut self) -> Result<&mut Subprocess> {
        let process = match self.process.take() {
            Some(mut process) => {
                if process.is_alive()? {
                    process
                } else {
                    debug!(worker = self.id, pid = process.pid(), "replacing dead worker process");
                    self.spawn()?
                }
            }
            None => self.spawn()?,
        };
        Ok(self.process.insert(process))
    }

    fn spawn(&self) -> Result<Subprocess> {
        let mut process = Subprocess::spawn(self.entry, self.config.clone())?;
        debug!(worker = self.id, pid = process.pid(), task = self.task, "spawned worker process");
        // A worker that dies here is noticed by the exchange that follows.
        process.write_request(self.bootstrap)?;
        Ok(process)
    }

    /// Kill and forget the current process, returning its exit status.
    fn discard_process(&mut self) -> Option<std::process::ExitStatus> {
        let mut process = self.process.take()?;
        if let Err(e) = process.kill() {
            warn!(worker = self.id, error = %e, "failed to kill worker process");
        }
        process.exit_status()
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(mut process) = self.process.take() {
            if process.write_request(STOP_INDEX)? {
                process.join()?;
            }
            debug!(worker = self.id, pid = process.pid(), "worker process stopped");
        }
        Ok(())
    }
}
