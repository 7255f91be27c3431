//! Smartcab simulation harness.
//!
//! A primary agent learns to drive a cab across a wrap-around grid of
//! signalled intersections shared with dummy traffic. The library exposes
//! the environment, the Q-learning agent and the trial loop that runs
//! training until exploration converges and then a fixed number of testing
//! trials. The binaries (`src/main.rs`, `src/bin/smartcab_sweep.rs`) are thin
//! harnesses around these components.

pub mod agent;
pub mod config;
pub mod display;
pub mod environment;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod planner;
pub mod report;
pub mod sim;
pub mod traffic;
pub mod types;

// --- Re-exports for ergonomic external use ---------------------------------

pub use agent::{AgentState, DecaySchedule, LearningAgent, PrimaryAgent, QRow};

pub use config::{AgentConfig, AgentProfile, Config, EnvConfig, SimConfig};

pub use display::{Display, DisplayEvent, Frame, TerminalDisplay};

pub use environment::{Environment, GridEnvironment, StepStatus, TrialData};

pub use error::{Result, SimError};

pub use logging::{CsvTrialSink, JsonlStepSink, NoopSink, StepSink, TrialSink};

pub use metrics::{PhaseSummary, RunSummary};

pub use sim::{Phase, QuitFlag, RunOutcome, Simulator, TrialController, TrialRecord, TrialTicket};

pub use types::{Action, Heading, Inputs, Light, Location, Violation};

/// Environment + agent for `cfg`, ready to hand to a `Simulator`.
pub fn build_environment(cfg: &Config) -> GridEnvironment<LearningAgent> {
    GridEnvironment::new(cfg.env.clone(), LearningAgent::new(&cfg.agent))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_config_builds_a_runnable_environment() {
        let cfg = Config::headless(AgentProfile::DefaultLearning, 5);
        cfg.validate().expect("valid config");
        let env = build_environment(&cfg);
        assert!(env.primary_agent().is_learning());
        assert_eq!(env.bounds().width(), 8);
    }
}
