// src/bin/smartcab_sweep.rs
//
// Multi-seed evaluation harness.
//
// Runs the full train-then-test loop headless for `--runs` seeds (run i uses
// seed + i) and reports p05/p50/p95 of the testing metrics across runs.
//
// Run examples:
//   cargo run --bin smartcab_sweep -- --runs 20 --n-test 10 --profile improved-learning
//   SMARTCAB_TOLERANCE=0.01 cargo run --bin smartcab_sweep -- --runs 50 --quiet --csv runs.csv

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;

use smartcab::config::resolve_effective_profile;
use smartcab::metrics::p05_p50_p95;
use smartcab::{build_environment, AgentProfile, Config, Simulator};

#[derive(Parser, Debug)]
#[command(name = "smartcab_sweep", about = "Evaluate an agent profile across seeds")]
struct Args {
    /// Agent profile: no-learning | default-learning | improved-learning.
    #[arg(long, value_parser = parse_profile)]
    profile: Option<AgentProfile>,

    /// Number of independent runs.
    #[arg(long, default_value_t = 20)]
    runs: u64,

    /// Base seed; run i uses seed + i.
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Testing trials per run.
    #[arg(long, default_value_t = 10)]
    n_test: u32,

    /// Cap on training trials per run.
    #[arg(long)]
    max_training_trials: Option<u32>,

    /// Write one CSV row per run to PATH.
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Only print the final summary.
    #[arg(long)]
    quiet: bool,

    /// Default log filter when RUST_LOG is unset.
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn parse_profile(s: &str) -> std::result::Result<AgentProfile, String> {
    AgentProfile::parse(s).ok_or_else(|| format!("unknown profile '{s}'"))
}

#[derive(Debug, Clone, Serialize)]
struct RunRow {
    run: u64,
    seed: u64,
    training_trials: u32,
    testing_trials: u32,
    success_rate: f64,
    mean_avg_reward: f64,
    violations: u32,
    accidents: u32,
    interrupted: bool,
}

fn run_one(base: &Config, run: u64, seed: u64) -> Result<RunRow> {
    let mut cfg = base.clone();
    cfg.env.seed = seed;
    cfg.agent.seed = seed.wrapping_add(1);
    cfg.validate().context("invalid configuration")?;

    let env = build_environment(&cfg);
    let mut sim = Simulator::new(env, cfg.sim.clone()).with_output(Box::new(io::sink()));
    let outcome = sim.run().with_context(|| format!("run {run} (seed {seed})"))?;
    let s = outcome.summary;

    Ok(RunRow {
        run,
        seed,
        training_trials: s.training.trials,
        testing_trials: s.testing.trials,
        success_rate: s.testing.success_rate(),
        mean_avg_reward: s.testing.avg_reward.mean(),
        violations: s.testing.violations,
        accidents: s.testing.accidents,
        interrupted: outcome.interrupted,
    })
}

fn main() -> Result<()> {
    let args = Args::parse();
    if let Err(err) = smartcab::logging::init_tracing(&args.log_level) {
        eprintln!("tracing already initialised: {err}");
    }

    let effective = resolve_effective_profile(args.profile);
    effective.log_startup();

    let mut base = Config::from_env_or_profile(effective.profile);
    base.sim.display = false;
    base.sim.update_delay = 0.0;
    base.sim.color = false;
    base.sim.log_metrics = false;
    base.sim.n_test = args.n_test;
    if args.max_training_trials.is_some() {
        base.sim.max_training_trials = args.max_training_trials;
    }

    println!(
        "smartcab_sweep: profile={} runs={} seed={} n_test={}",
        effective.profile.as_str(),
        args.runs,
        args.seed,
        args.n_test
    );

    let mut csv_out = match &args.csv {
        Some(path) => Some(
            csv::Writer::from_path(path)
                .with_context(|| format!("creating {}", path.display()))?,
        ),
        None => None,
    };

    let mut rows = Vec::new();
    for i in 0..args.runs {
        let seed = args.seed.wrapping_add(i);
        let row = run_one(&base, i, seed)?;
        if !args.quiet {
            println!(
                "run {:>4} seed {:>6}  train {:>4}  success {:>6.1}%  reward {:>7.3}  violations {:>4}  accidents {:>4}",
                row.run,
                row.seed,
                row.training_trials,
                row.success_rate * 100.0,
                row.mean_avg_reward,
                row.violations,
                row.accidents
            );
        }
        if let Some(w) = csv_out.as_mut() {
            w.serialize(&row)?;
        }
        rows.push(row);
    }

    if let Some(mut w) = csv_out {
        w.flush()?;
        if let Some(path) = &args.csv {
            info!(path = %path.display(), "sweep CSV written");
        }
    }

    let (s05, s50, s95) = p05_p50_p95(rows.iter().map(|r| r.success_rate * 100.0).collect());
    let (r05, r50, r95) = p05_p50_p95(rows.iter().map(|r| r.mean_avg_reward).collect());
    let (t05, t50, t95) = p05_p50_p95(rows.iter().map(|r| f64::from(r.training_trials)).collect());
    let (a05, a50, a95) = p05_p50_p95(rows.iter().map(|r| f64::from(r.accidents)).collect());

    println!();
    println!("{:<18} {:>10} {:>10} {:>10}", "metric", "p05", "p50", "p95");
    println!("{}", "-".repeat(51));
    println!("{:<18} {:>10.1} {:>10.1} {:>10.1}", "success %", s05, s50, s95);
    println!("{:<18} {:>10.3} {:>10.3} {:>10.3}", "avg reward", r05, r50, r95);
    println!("{:<18} {:>10.0} {:>10.0} {:>10.0}", "training trials", t05, t50, t95);
    println!("{:<18} {:>10.0} {:>10.0} {:>10.0}", "accidents", a05, a50, a95);
    Ok(())
}
