// src/main.rs
//
// Thin harness around the smartcab library: parse flags, resolve the agent
// profile, build the environment and run the simulator.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use smartcab::config::resolve_effective_profile;
use smartcab::{
    build_environment, AgentProfile, Config, CsvTrialSink, Display, JsonlStepSink, QuitFlag,
    Simulator, TerminalDisplay,
};

/// Command-line arguments for the smartcab binary.
///
/// Flags override SMARTCAB_* environment variables, which override the
/// profile preset.
#[derive(Parser, Debug)]
#[command(name = "smartcab", about = "Train and test a Q-learning smartcab")]
struct Cli {
    /// Agent profile: no-learning | default-learning | improved-learning.
    #[arg(long, value_parser = parse_profile)]
    profile: Option<AgentProfile>,

    /// Number of testing trials after training.
    #[arg(long)]
    n_test: Option<u32>,

    /// Epsilon below which training is considered converged.
    #[arg(long)]
    tolerance: Option<f64>,

    /// Seconds between environment steps.
    #[arg(long)]
    update_delay: Option<f64>,

    /// Training trials required before testing may start.
    #[arg(long)]
    min_training_trials: Option<u32>,

    /// Switch to testing after this many training trials even if epsilon
    /// has not converged.
    #[arg(long)]
    max_training_trials: Option<u32>,

    /// Learning rate override.
    #[arg(long)]
    alpha: Option<f64>,

    /// Seed for the environment (the agent uses seed + 1).
    #[arg(long)]
    seed: Option<u64>,

    /// Run without the terminal display.
    #[arg(long)]
    no_display: bool,

    /// Write the CSV trial log and Q-table under --log-dir.
    #[arg(long)]
    log_metrics: bool,

    /// Directory for log files.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Optional JSONL path for the per-step log.
    #[arg(long)]
    step_log: Option<PathBuf>,

    /// Print one line per environment step.
    #[arg(long)]
    trace: bool,

    /// Disable coloured output.
    #[arg(long)]
    no_color: bool,

    /// Do not enforce the deadline (trials end only at the hard time limit).
    #[arg(long)]
    no_deadline: bool,

    /// Default log filter when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_profile(s: &str) -> std::result::Result<AgentProfile, String> {
    AgentProfile::parse(s).ok_or_else(|| {
        format!("unknown profile '{s}' (expected no-learning, default-learning or improved-learning)")
    })
}

/// Apply CLI overrides on top of the env-derived config.
fn apply_cli(cli: &Cli, cfg: &mut Config) {
    if let Some(v) = cli.n_test {
        cfg.sim.n_test = v;
    }
    if let Some(v) = cli.tolerance {
        cfg.sim.tolerance = v;
    }
    if let Some(v) = cli.update_delay {
        cfg.sim.update_delay = v;
    }
    if let Some(v) = cli.min_training_trials {
        cfg.sim.min_training_trials = v;
    }
    if cli.max_training_trials.is_some() {
        cfg.sim.max_training_trials = cli.max_training_trials;
    }
    if let Some(v) = cli.alpha {
        cfg.agent.alpha = v;
    }
    if let Some(seed) = cli.seed {
        cfg.env.seed = seed;
        cfg.agent.seed = seed.wrapping_add(1);
    }
    if let Some(dir) = &cli.log_dir {
        cfg.sim.log_dir = dir.clone();
    }
    cfg.sim.display &= !cli.no_display;
    cfg.sim.log_metrics |= cli.log_metrics;
    cfg.sim.trace_steps |= cli.trace;
    cfg.sim.color &= !cli.no_color;
    cfg.env.enforce_deadline &= !cli.no_deadline;
}

fn main() -> Result<()> {
    // 0) Parse CLI args and install logging.
    let cli = Cli::parse();
    if let Err(err) = smartcab::logging::init_tracing(&cli.log_level) {
        eprintln!("tracing already initialised: {err}");
    }

    // 1) Resolve profile and build config (profile < env < CLI).
    let effective = resolve_effective_profile(cli.profile);
    effective.log_startup();
    let mut cfg = Config::from_env_or_profile(effective.profile);
    apply_cli(&cli, &mut cfg);
    cfg.validate().context("invalid configuration")?;
    info!(
        n_test = cfg.sim.n_test,
        tolerance = cfg.sim.tolerance,
        update_delay = cfg.sim.update_delay,
        seed = cfg.env.seed,
        "simulation configured"
    );

    // 2) Ctrl-C stops the run after the current tick.
    let quit = QuitFlag::new();
    {
        let quit = quit.clone();
        ctrlc::set_handler(move || quit.trigger()).context("installing Ctrl-C handler")?;
    }

    // 3) Environment, display and sinks.
    let env = build_environment(&cfg);
    let mut sim = Simulator::new(env, cfg.sim.clone()).with_quit_flag(quit);

    if cfg.sim.display {
        let display = TerminalDisplay::open(cfg.sim.color).map(|d| Box::new(d) as Box<dyn Display>);
        sim = sim.with_display_or_headless(display);
    }

    if cfg.sim.log_metrics {
        let sink = CsvTrialSink::create(&cfg.log_path(), cfg.table_path().as_deref())
            .with_context(|| format!("opening trial log {}", cfg.log_path().display()))?;
        sim = sim.with_trial_sink(Box::new(sink));
    }

    if let Some(path) = &cli.step_log {
        match JsonlStepSink::create(path) {
            Ok(sink) => sim = sim.with_step_sink(Box::new(sink)),
            Err(err) => warn!(
                path = %path.display(),
                error = %err,
                "failed to create step log; continuing without it"
            ),
        }
    }

    // 4) Run.
    let outcome = sim.run()?;
    let s = &outcome.summary;
    info!(
        training_trials = s.training.trials,
        testing_trials = s.testing.trials,
        testing_success_rate = s.testing.success_rate(),
        testing_accident_rate = s.testing.accident_rate(),
        interrupted = outcome.interrupted,
        "run finished"
    );
    Ok(())
}
