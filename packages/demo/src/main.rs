use std::path::PathBuf;

use clap::Parser;
use procbridge::{run_worker_if_requested, SessionConfig, DEFAULT_INTERPRETER};
use tracing_subscriber::EnvFilter;

/// procbridge-demo - walk through a peer session and a worker pool
#[derive(Parser, Debug)]
#[command(name = "procbridge-demo")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Interpreter that runs the session peer
    #[arg(long, default_value = DEFAULT_INTERPRETER)]
    python: PathBuf,

    /// Worker processes for the pool demo
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Arguments to fan out over the pool
    #[arg(long, default_value_t = 12)]
    tasks: i64,

    /// Round trips for the latency measurement
    #[arg(long, default_value_t = 1000)]
    round_trips: u32,

    /// Skip the session walkthrough
    #[arg(long)]
    no_session: bool,

    /// Skip the pool walkthrough
    #[arg(long)]
    no_pool: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Worker invocations carry flags clap does not know about.
    if let Some(code) = run_worker_if_requested(&procbridge_demo::registry()) {
        std::process::exit(code);
    }

    let args = Args::parse();

    if !args.no_session {
        let config = SessionConfig::default().with_interpreter(args.python);
        if let Err(e) = procbridge_demo::run_session(config, args.round_trips) {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    if !args.no_pool {
        if let Err(e) = procbridge_demo::run_pool(args.workers, args.tasks) {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
