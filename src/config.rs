// src/config.rs
//
// Central configuration for the smartcab harness.
//
// Three groups of knobs live here:
// - SimConfig:   trial control + display/log switches for the Simulator,
// - EnvConfig:   grid world shape, traffic and deadline settings,
// - AgentConfig: learning flag, initial alpha/epsilon and decay schedule.
//
// AgentProfile is the coarse preset chosen on the CLI (or via
// SMARTCAB_PROFILE); it also decides which log file names are used.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agent::DecaySchedule;
use crate::error::{Result, SimError};

/// Environment variable holding the default agent profile.
pub const PROFILE_ENV_VAR: &str = "SMARTCAB_PROFILE";

/// Coarse agent preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentProfile {
    /// Random driver, no Q-table.
    NoLearning,
    /// Q-learning with linear epsilon decay.
    DefaultLearning,
    /// Q-learning with exponential epsilon decay and tuned alpha.
    ImprovedLearning,
}

impl AgentProfile {
    /// Stable name used in log file names and startup lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentProfile::NoLearning => "no-learning",
            AgentProfile::DefaultLearning => "default-learning",
            AgentProfile::ImprovedLearning => "improved-learning",
        }
    }

    /// Parse a profile name (case-insensitive). Returns None if unrecognized.
    pub fn parse(s: &str) -> Option<AgentProfile> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "no-learning" | "none" | "random" => Some(AgentProfile::NoLearning),
            "default-learning" | "default" | "learning" => Some(AgentProfile::DefaultLearning),
            "improved-learning" | "improved" | "optimized" => Some(AgentProfile::ImprovedLearning),
            _ => None,
        }
    }

    pub fn is_learning(&self) -> bool {
        !matches!(self, AgentProfile::NoLearning)
    }
}

/// Where the effective profile came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSource {
    Cli,
    Env,
    Default,
}

impl ProfileSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileSource::Cli => "cli",
            ProfileSource::Env => "env",
            ProfileSource::Default => "default",
        }
    }
}

/// Resolved profile plus its source, for the startup log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveProfile {
    pub profile: AgentProfile,
    pub source: ProfileSource,
}

impl EffectiveProfile {
    pub fn log_startup(&self) {
        info!(
            profile = self.profile.as_str(),
            source = self.source.as_str(),
            "effective agent profile"
        );
    }
}

/// Resolve the agent profile with precedence CLI > SMARTCAB_PROFILE > default.
///
/// The default is `DefaultLearning`. A non-empty but unparseable env value is
/// ignored with a warning.
pub fn resolve_effective_profile(cli_profile: Option<AgentProfile>) -> EffectiveProfile {
    resolve_effective_profile_with(cli_profile, |k| env::var(k).ok())
}

/// Same as [`resolve_effective_profile`] with an injectable env lookup.
pub fn resolve_effective_profile_with<F>(
    cli_profile: Option<AgentProfile>,
    lookup: F,
) -> EffectiveProfile
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(profile) = cli_profile {
        return EffectiveProfile {
            profile,
            source: ProfileSource::Cli,
        };
    }

    if let Some(raw) = lookup(PROFILE_ENV_VAR) {
        if !raw.is_empty() {
            if let Some(profile) = AgentProfile::parse(&raw) {
                return EffectiveProfile {
                    profile,
                    source: ProfileSource::Env,
                };
            }
            warn!(value = %raw, "invalid {PROFILE_ENV_VAR}; ignoring");
        }
    }

    EffectiveProfile {
        profile: AgentProfile::DefaultLearning,
        source: ProfileSource::Default,
    }
}

/// Grid world parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvConfig {
    /// Number of intersections along x and y.
    pub grid_size: (i32, i32),
    /// Number of non-learning traffic cars.
    pub num_dummies: usize,
    /// End a trial (as failure) when the deadline reaches zero.
    pub enforce_deadline: bool,
    /// Deadline per unit of start/destination distance.
    pub deadline_per_block: i32,
    /// Minimum Manhattan distance between start and destination.
    pub min_trip_distance: i32,
    /// Trials are always aborted once the deadline sinks to this value.
    pub hard_time_limit: i32,
    /// RNG seed for the environment (lights, traffic, rewards).
    pub seed: u64,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            grid_size: (8, 6),
            num_dummies: 100,
            enforce_deadline: true,
            deadline_per_block: 5,
            min_trip_distance: 4,
            hard_time_limit: -100,
            seed: 0,
        }
    }
}

/// Primary agent parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub learning: bool,
    /// Initial exploration probability.
    pub epsilon: f64,
    /// Learning rate.
    pub alpha: f64,
    pub decay: DecaySchedule,
    /// RNG seed for the agent's own exploration draws.
    pub seed: u64,
}

impl AgentConfig {
    pub fn for_profile(profile: AgentProfile) -> Self {
        match profile {
            AgentProfile::NoLearning => Self {
                learning: false,
                epsilon: 1.0,
                alpha: 0.5,
                decay: DecaySchedule::Linear { step: 0.05 },
                seed: 0,
            },
            AgentProfile::DefaultLearning => Self {
                learning: true,
                epsilon: 1.0,
                alpha: 0.5,
                decay: DecaySchedule::Linear { step: 0.05 },
                seed: 0,
            },
            AgentProfile::ImprovedLearning => Self {
                learning: true,
                epsilon: 1.0,
                alpha: 0.6,
                decay: DecaySchedule::Exponential { rate: 0.98 },
                seed: 0,
            },
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::for_profile(AgentProfile::DefaultLearning)
    }
}

/// Simulator (trial loop) parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Seconds between environment steps.
    pub update_delay: f64,
    /// Try to open the terminal display.
    pub display: bool,
    /// Write the CSV trial log (and Q-table dump for learning agents).
    pub log_metrics: bool,
    /// Directory for log files.
    pub log_dir: PathBuf,
    /// Epsilon below which a learning agent is considered converged.
    pub tolerance: f64,
    /// Number of testing trials to run after training.
    pub n_test: u32,
    /// Training trials that must complete before testing can start.
    pub min_training_trials: u32,
    /// Force the switch to testing after this many training trials.
    pub max_training_trials: Option<u32>,
    /// Print a text line per environment step.
    pub trace_steps: bool,
    /// Colour summary cells.
    pub color: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            update_delay: 2.0,
            display: true,
            log_metrics: false,
            log_dir: PathBuf::from("logs"),
            tolerance: 0.05,
            n_test: 0,
            min_training_trials: 2,
            max_training_trials: None,
            trace_steps: false,
            color: true,
        }
    }
}

impl SimConfig {
    /// `update_delay` as a Duration; errors when it is negative, not finite
    /// or too large to represent.
    pub fn step_delay(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.update_delay).map_err(|_| {
            SimError::InvalidConfig(format!(
                "update_delay must be a non-negative number of seconds, got {}",
                self.update_delay
            ))
        })
    }
}

/// Everything needed to build and run one simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub profile: AgentProfile,
    pub sim: SimConfig,
    pub env: EnvConfig,
    pub agent: AgentConfig,
}

impl Config {
    pub fn for_profile(profile: AgentProfile) -> Self {
        Self {
            profile,
            sim: SimConfig::default(),
            env: EnvConfig::default(),
            agent: AgentConfig::for_profile(profile),
        }
    }

    /// Headless, zero-delay configuration for tests and batch sweeps.
    pub fn headless(profile: AgentProfile, seed: u64) -> Self {
        let mut cfg = Self::for_profile(profile);
        cfg.sim.display = false;
        cfg.sim.update_delay = 0.0;
        cfg.sim.color = false;
        cfg.env.seed = seed;
        cfg.agent.seed = seed.wrapping_add(1);
        cfg
    }

    /// Profile preset + SMARTCAB_* environment overrides.
    ///
    ///   - SMARTCAB_UPDATE_DELAY          (f64, seconds)
    ///   - SMARTCAB_TOLERANCE             (f64)
    ///   - SMARTCAB_N_TEST                (u32)
    ///   - SMARTCAB_MIN_TRAINING_TRIALS   (u32)
    ///   - SMARTCAB_ALPHA                 (f64)
    ///   - SMARTCAB_SEED                  (u64)
    ///
    /// Any variable that fails to parse is ignored with a warning.
    pub fn from_env_or_profile(profile: AgentProfile) -> Self {
        let mut cfg = Self::for_profile(profile);
        cfg.apply_env_overrides(|k| env::var(k).ok());
        cfg
    }

    /// Apply SMARTCAB_* overrides using `lookup` as the environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_override::<f64, _>(&lookup, "SMARTCAB_UPDATE_DELAY") {
            self.sim.update_delay = v.max(0.0);
        }
        if let Some(v) = parse_override::<f64, _>(&lookup, "SMARTCAB_TOLERANCE") {
            self.sim.tolerance = v;
        }
        if let Some(v) = parse_override::<u32, _>(&lookup, "SMARTCAB_N_TEST") {
            self.sim.n_test = v;
        }
        if let Some(v) = parse_override::<u32, _>(&lookup, "SMARTCAB_MIN_TRAINING_TRIALS") {
            self.sim.min_training_trials = v;
        }
        if let Some(v) = parse_override::<f64, _>(&lookup, "SMARTCAB_ALPHA") {
            self.agent.alpha = v;
        }
        if let Some(v) = parse_override::<u64, _>(&lookup, "SMARTCAB_SEED") {
            self.env.seed = v;
            self.agent.seed = v.wrapping_add(1);
        }
    }

    /// Reject configurations the simulator cannot run.
    pub fn validate(&self) -> Result<()> {
        let (w, h) = self.env.grid_size;
        if w < 2 || h < 2 {
            return Err(SimError::InvalidConfig(format!(
                "grid_size must be at least 2x2, got {w}x{h}"
            )));
        }
        if self.env.min_trip_distance > (w - 1) + (h - 1) {
            return Err(SimError::InvalidConfig(format!(
                "min_trip_distance {} is unreachable on a {w}x{h} grid",
                self.env.min_trip_distance
            )));
        }
        if !(0.0..=1.0).contains(&self.agent.alpha) {
            return Err(SimError::InvalidConfig(format!(
                "alpha must be in [0, 1], got {}",
                self.agent.alpha
            )));
        }
        if !(0.0..=1.0).contains(&self.agent.epsilon) {
            return Err(SimError::InvalidConfig(format!(
                "epsilon must be in [0, 1], got {}",
                self.agent.epsilon
            )));
        }
        self.sim.step_delay()?;
        Ok(())
    }

    /// CSV trial log path for the current profile.
    pub fn log_path(&self) -> PathBuf {
        self.sim
            .log_dir
            .join(format!("sim_{}.csv", self.profile.as_str()))
    }

    /// Q-table dump path; only learning profiles have one.
    pub fn table_path(&self) -> Option<PathBuf> {
        if self.agent.learning {
            Some(
                self.sim
                    .log_dir
                    .join(format!("sim_{}.txt", self.profile.as_str())),
            )
        } else {
            None
        }
    }
}

fn parse_override<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr + std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => {
            info!(key, value = %v, "config override");
            Some(v)
        }
        Err(_) => {
            warn!(key, value = ?raw, "could not parse override; using default");
            None
        }
    }
}
