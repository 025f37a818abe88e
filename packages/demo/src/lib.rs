//! The walkthrough behind the `procbridge-demo` binary.
//!
//! The binary is also its own worker executable: `main` hands control to
//! [`registry`] through `run_worker_if_requested` before parsing flags.

use std::io::Write;
use std::time::Instant;

use procbridge::{
    ExecutorConfig, NdArray, Result, Session, SessionConfig, TaskExecutor, TaskRegistry, Value,
};
use tracing::info;

/// Tasks the demo runs in its worker processes.
pub fn registry() -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    registry
        .register_typed("square", |x: i64| Ok(x * x))
        .register_typed("collatz_steps", |start: i64| Ok(collatz_steps(start)));
    registry
}

/// Steps for `start` to reach 1 under the Collatz map.
pub fn collatz_steps(start: i64) -> i64 {
    let mut n = start;
    let mut steps = 0;
    while n > 1 {
        n = if n % 2 == 0 { n / 2 } else { 3 * n + 1 };
        steps += 1;
    }
    steps
}

/// Drive a peer interpreter through calls, variables, code and files.
pub fn run_session(config: SessionConfig, round_trips: u32) -> Result<()> {
    let mut session = Session::with_config(config)?;
    info!(pid = session.pid(), "session ready");

    let total: i64 = session.call("sum", (vec![1i64, 2, 3, 4, 5],))?;
    println!("sum(1, 2, 3, 4, 5) = {}", total);

    session.set_vars(&["a", "b"], (12i64, 34i64))?;
    let power: String = session.eval("str(a ** b)")?;
    println!("12 ** 34 = {}", power);

    session.set_vars(&["msg"], ("123321",))?;
    let message: String = session.exec(
        "import base64\nmsg_b64 = base64.b64encode(msg.encode()).decode()\n",
        "f'Message: {msg}, Base64Encoded: {msg_b64}'",
    )?;
    println!("{}", message);

    if round_trips > 0 {
        let start = Instant::now();
        for _ in 0..round_trips {
            let _: i64 = session.eval("int(time.time() * 1000)")?;
        }
        let elapsed = start.elapsed();
        println!(
            "{} round trips in {:?} ({:?} each)",
            round_trips,
            elapsed,
            elapsed / round_trips
        );
    }

    if session.eval::<i64>("int(np is not None)")? == 1 {
        let data = NdArray::from_vec(vec![123u8; 1_000_000]);
        let start = Instant::now();
        let sum: i64 = session.call("lambda x: int(np.sum(x))", (data,))?;
        println!("host -> peer: 1 MB in {:?} (sum {})", start.elapsed(), sum);

        let start = Instant::now();
        let ones: NdArray = session.eval("np.ones(1000000, 'uint8')")?;
        println!(
            "peer -> host: {} bytes in {:?}",
            ones.as_bytes().len(),
            start.elapsed()
        );
    } else {
        info!("numpy not installed, skipping array transfer");
    }

    let mut funcs = tempfile::Builder::new().suffix(".py").tempfile()?;
    writeln!(funcs, "def lets_233(s):")?;
    writeln!(funcs, "    return s + '233'")?;
    funcs.flush()?;
    session.exec_file(funcs.path())?;
    for word in ["abcde", "qwertyasdf"] {
        let out: String = session.call("lets_233", (word,))?;
        println!("lets_233({:?}) = {:?}", word, out);
    }

    session.shutdown()
}

/// Fan `collatz_steps` over `1..=count` in worker processes spawned from
/// this executable.
pub fn run_pool(workers: usize, count: i64) -> Result<()> {
    let args: Vec<Value> = (1..=count).map(Value::from).collect();
    let executor = TaskExecutor::new(ExecutorConfig::default().with_num_workers(workers));

    let mut longest = (0, 0);
    executor.execute_typed("collatz_steps", &args, |index, steps: i64| {
        let start = index as i64 + 1;
        println!("collatz({}) reaches 1 in {} steps", start, steps);
        if steps > longest.1 {
            longest = (start, steps);
        }
    })?;
    println!(
        "longest below {}: {} with {} steps",
        count + 1,
        longest.0,
        longest.1
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collatz_known_values() {
        assert_eq!(collatz_steps(1), 0);
        assert_eq!(collatz_steps(6), 8);
        assert_eq!(collatz_steps(27), 111);
    }

    #[test]
    fn registry_runs_tasks_in_process() {
        let registry = registry();
        let square = registry.get("square").unwrap();
        assert_eq!(square(Value::Int(9)).unwrap(), Value::Int(81));
        let steps = registry.get("collatz_steps").unwrap();
        assert_eq!(steps(Value::Int(6)).unwrap(), Value::Int(8));
    }
}
