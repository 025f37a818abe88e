//! Worker executable with a fixed set of tasks, used by the executor's
//! integration tests.

use std::fs::OpenOptions;
use std::process;
use std::thread;
use std::time::Duration;

use procbridge_core::{Error, Result, Value};
use procbridge_pool::{run_worker_if_requested, TaskRegistry, WORKER_FLAG};

fn registry() -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    registry
        .register("echo", Ok)
        .register_typed("square", |x: i64| Ok(x * x))
        .register_typed("sum", |xs: Vec<i64>| Ok(xs.iter().sum::<i64>()))
        .register_typed("sleep_square", |(x, millis): (i64, u64)| {
            thread::sleep(Duration::from_millis(millis));
            Ok(x * x)
        })
        // Exits abnormally the first time it sees a given marker path.
        .register_typed("die_once", |(x, marker): (i64, String)| {
            if OpenOptions::new().write(true).create_new(true).open(&marker).is_ok() {
                process::exit(3);
            }
            Ok(x * x)
        })
        // Replies, then the process exits before the next request arrives.
        .register_typed("exit_after_reply", |x: i64| {
            thread::spawn(|| {
                thread::sleep(Duration::from_millis(20));
                process::exit(0);
            });
            Ok(x * x)
        })
        .register_typed("always_die", |_: Value| -> Result<Value> { process::exit(4) })
        .register_typed("fail", |_: Value| -> Result<Value> {
            Err(Error::execution("task failed on request"))
        });
    registry
}

fn main() {
    if let Some(code) = run_worker_if_requested(&registry()) {
        process::exit(code);
    }
    eprintln!(
        "usage: procbridge-worker {} <task> <request-fd> <response-fd>",
        WORKER_FLAG
    );
    process::exit(2);
}
