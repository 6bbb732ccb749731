//! `bl02simd` binary entry point: argument parsing, logging, signal
//! handling, and process exit codes. Signal handling lives here and only
//! here (spec §9) — `bl02sim::server::Server` itself never installs a
//! handler, so embedding it in another process never fights that
//! process's own signal policy.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;

use bl02sim::clock::MonotonicClock;
use bl02sim::config::Config;
use bl02sim::devices;
use bl02sim::server::Server;

#[derive(Parser, Debug)]
#[command(name = "bl02simd", about = "Simulated EPICS-style beamline PV server")]
struct Args {
    /// Path to a YAML config file; defaults are used if absent.
    #[arg(long, default_value = "bl02sim.yaml")]
    config: String,

    /// Overrides the `listen` address from the config file.
    #[arg(long)]
    listen: Option<String>,

    /// Enables debug-level logging.
    #[arg(short, long)]
    verbose: bool,
}

fn register_signals(flag: &Arc<AtomicBool>) -> Result<(), std::io::Error> {
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(flag))?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(flag))?;
    Ok(())
}

fn seed_from_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::new()
        .target(env_logger::Target::Stderr)
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let mut config = match Config::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            log::error!("failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    if let Err(e) = register_signals(&shutdown) {
        log::error!("failed to register signal handlers: {e}");
        return ExitCode::FAILURE;
    }

    let devices = devices::init(StdRng::seed_from_u64(seed_from_time()));
    let mut server = match Server::bind(config, devices, Box::new(MonotonicClock::new())) {
        Ok(s) => s,
        Err(e) => {
            log::error!("failed to bind listener: {e}");
            return ExitCode::FAILURE;
        }
    };

    log::info!("bl02simd starting");
    if let Err(e) = server.run(&shutdown) {
        log::error!("event loop exited with error: {e}");
        return ExitCode::FAILURE;
    }
    log::info!("bl02simd stopped");
    ExitCode::SUCCESS
}
