//! Brinewire deterministic simulator CLI.
//!
//! - Fuzz: run many simulations with randomized configurations in parallel.
//! - Replay: re-run one configuration from its seed.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use brinewire_sim::{SimConfig, SimError, Simulator};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Brinewire Deterministic Simulator", long_about = None)]
struct CliArgs {
    /// Run mode: fuzz or replay.
    #[arg(value_enum)]
    mode: RunMode,

    /// Seed for the run. Required for 'replay'; master seed for 'fuzz' if provided.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Number of iterations (distinct configurations) for 'fuzz' mode.
    #[arg(short = 'i', long, default_value_t = 1000)]
    iterations: usize,

    /// Poll cycles per simulation run.
    #[arg(short = 'c', long, default_value_t = 5)]
    cycles: usize,

    /// Maximum per-byte bit flip probability (0.0 to 1.0) for fuzz mode.
    #[arg(long, default_value_t = 0.002)]
    max_flip: f64,

    /// Output file for logging failures.
    #[arg(short = 'o', long, default_value = "brinewire_sim_failures.log")]
    output_file: PathBuf,

    /// Number of parallel workers for fuzzing. Defaults to number of logical CPUs.
    #[arg(short = 'w', long, default_value_t = num_cpus::get())]
    workers: usize,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum RunMode {
    /// Fuzz with many random configurations.
    Fuzz,
    /// Replay a single configuration from its seed.
    Replay,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let args = CliArgs::parse();
    let code = match args.mode {
        RunMode::Fuzz => run_fuzz_mode(&args),
        RunMode::Replay => run_replay_mode(&args),
    };
    std::process::exit(code);
}

/// Generates a randomized `SimConfig` for one fuzzing iteration.
///
/// # Parameters
/// - `iteration_seed`: Seed the whole configuration derives from
/// - `cycles`: Poll cycles per run
/// - `max_flip`: Upper bound for the per-byte bit flip probability
///
/// # Configuration Randomization
/// - **Lock**: 70% of devices require authentication
/// - **Chunking**: Largest notification between 1 and 20 bytes
/// - **Corruption**: 70% clean links, otherwise up to `max_flip`
/// - **Commands** and **reconnects**: Enabled on roughly a third of runs each
fn generate_fuzz_config(iteration_seed: u64, cycles: usize, max_flip: f64) -> SimConfig {
    let mut rng = StdRng::seed_from_u64(iteration_seed);

    SimConfig {
        seed: rng.random(),
        num_cycles: cycles,
        locked: rng.random_bool(0.7),
        password: rng.random_range(0..=9999),
        device_password: None,
        max_chunk: rng.random_range(1..=20),
        bit_flip_probability: if rng.random_bool(0.7) {
            0.0
        } else {
            rng.random_range(0.0..=max_flip.clamp(0.0, 1.0))
        },
        history_tail_probability: rng.random_range(0.0..=0.5),
        command_probability: if rng.random_bool(0.3) { 0.5 } else { 0.0 },
        reconnect_every: rng.random_bool(0.3).then(|| rng.random_range(1..=3)),
        poll_interval_ms: rng.random_range(500..=5_000),
        keepalive_interval_ms: rng.random_range(200..=4_000),
        tick_ms: rng.random_range(1..=20),
    }
}

/// Whether `error` is a real defect rather than an expected effect of corruption.
fn is_critical(error: &SimError, config: &SimConfig) -> bool {
    let lossy = config.bit_flip_probability > 0.0;
    match error {
        SimError::AuthRejected { .. } | SimError::Stalled { .. } => !lossy,
        _ => true,
    }
}

/// Runs fuzzing across a rayon pool.
///
/// Iteration seeds are drawn up front from the master seed, so a failure logged
/// with its seed replays identically regardless of worker scheduling.
///
/// # Returns
/// Process exit code: 0 if no critical failures were found, 1 otherwise.
fn run_fuzz_mode(args: &CliArgs) -> i32 {
    info!(
        iterations = args.iterations,
        cycles = args.cycles,
        workers = args.workers,
        "starting fuzz mode"
    );
    let started = Instant::now();

    let completed = AtomicUsize::new(0);
    let critical_failures = AtomicUsize::new(0);
    let tolerated_errors = AtomicUsize::new(0);

    let output = match File::create(&args.output_file) {
        Ok(file) => Mutex::new(file),
        Err(e) => {
            error!(path = %args.output_file.display(), error = %e, "cannot create output file");
            return 2;
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    let running_ctrlc = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!("\nCtrl+C detected. Signalling workers to stop...");
        running_ctrlc.store(false, Ordering::SeqCst);
    }) {
        warn!(error = %e, "could not install Ctrl-C handler");
    }

    let master_seed = args.seed.unwrap_or_else(rand::random);
    println!("Master seed: {}", master_seed);
    let mut seed_rng = StdRng::seed_from_u64(master_seed);
    let seeds: Vec<u64> = (0..args.iterations).map(|_| seed_rng.random()).collect();

    let pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(args.workers.max(1))
        .build()
    {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "cannot build worker pool");
            return 2;
        }
    };

    pool.install(|| {
        seeds.par_iter().for_each(|&seed| {
            if !running.load(Ordering::Relaxed) {
                return;
            }
            let config = generate_fuzz_config(seed, args.cycles, args.max_flip);
            let result = Simulator::new(config.clone()).and_then(|mut sim| sim.run());

            if let Err(sim_error) = result {
                let critical = is_critical(&sim_error, &config);
                let log_message = format!(
                    "[{}] {} - Seed {}: {}\nConfig: {:#?}\n\n",
                    chrono::Local::now().to_rfc3339(),
                    if critical {
                        "CRITICAL FAILURE"
                    } else {
                        "Tolerated Error"
                    },
                    seed,
                    sim_error,
                    config
                );
                eprint!("{}", log_message);
                if let Ok(mut file) = output.lock() {
                    let _ = file.write_all(log_message.as_bytes());
                    let _ = file.flush();
                }
                if critical {
                    critical_failures.fetch_add(1, Ordering::Relaxed);
                } else {
                    tolerated_errors.fetch_add(1, Ordering::Relaxed);
                }
            }

            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if done % 100 == 0 || done == args.iterations {
                println!(
                    "Progress: {}/{} iterations ({} critical, {} tolerated)",
                    done,
                    args.iterations,
                    critical_failures.load(Ordering::Relaxed),
                    tolerated_errors.load(Ordering::Relaxed)
                );
            }
        });
    });

    let critical = critical_failures.load(Ordering::SeqCst);
    println!("\n--- Fuzzing Run Summary ---");
    println!(
        "Iterations completed: {} / {}",
        completed.load(Ordering::SeqCst),
        args.iterations
    );
    println!("Duration: {:.2?}", started.elapsed());
    println!("Critical Failures: {}", critical);
    println!("Tolerated Errors: {}", tolerated_errors.load(Ordering::SeqCst));
    if !running.load(Ordering::SeqCst) {
        println!("Fuzzing was interrupted.");
    }
    if critical > 0 {
        println!(
            "FAIL: Critical failures found. Check '{}'.",
            args.output_file.display()
        );
        1
    } else {
        println!("PASS: No critical failures detected.");
        0
    }
}

/// Replays one fuzz configuration, usually a seed taken from the failure log.
///
/// # Returns
/// Process exit code: 0 on success, 1 if the run failed or no seed was given.
fn run_replay_mode(args: &CliArgs) -> i32 {
    let Some(seed) = args.seed else {
        eprintln!("Seed (--seed <VALUE>) is required for replay mode.");
        return 1;
    };
    let config = generate_fuzz_config(seed, args.cycles, args.max_flip);
    println!("Replaying seed {} with Config: {:#?}", seed, config);

    match Simulator::new(config).and_then(|mut sim| sim.run()) {
        Ok(report) => {
            println!("SUCCESS: Replay of seed {} completed: {:#?}", seed, report);
            0
        }
        Err(e) => {
            eprintln!("FAILURE: Replay of seed {} resulted in error: {}", seed, e);
            1
        }
    }
}
