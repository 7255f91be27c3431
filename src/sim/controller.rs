// src/sim/controller.rs
//
// Trial phase state machine.
//
// Training runs until at least `min_training_trials` have completed and the
// agent is either non-learning or its epsilon has fallen below `tolerance`.
// Testing then runs exactly `n_test` trials. A quit moves straight to Done.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::SimConfig;

/// Phase of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Training,
    Testing,
    Done,
}

impl Phase {
    /// Fixed-width label used in the summary table.
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Training => "Training",
            Phase::Testing => "Testing ",
            Phase::Done => "Done    ",
        }
    }
}

/// The trial the simulator should run next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialTicket {
    pub phase: Phase,
    /// 1-based trial number within the phase.
    pub trial: u32,
}

impl TrialTicket {
    pub fn testing(&self) -> bool {
        self.phase == Phase::Testing
    }
}

#[derive(Debug, Clone)]
pub struct TrialController {
    phase: Phase,
    trial: u32,
    completed_trials: u32,
    min_training_trials: u32,
    max_training_trials: Option<u32>,
    tolerance: f64,
    n_test: u32,
}

impl TrialController {
    pub fn new(cfg: &SimConfig) -> Self {
        Self {
            phase: Phase::Training,
            trial: 1,
            completed_trials: 0,
            min_training_trials: cfg.min_training_trials,
            max_training_trials: cfg.max_training_trials,
            tolerance: cfg.tolerance,
            n_test: cfg.n_test,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Trials completed across both phases.
    pub fn completed_trials(&self) -> u32 {
        self.completed_trials
    }

    /// Decide the next trial given the agent's current learning state.
    ///
    /// Returns `None` once the run is over.
    pub fn begin_trial(&mut self, learning: bool, epsilon: f64) -> Option<TrialTicket> {
        match self.phase {
            Phase::Training => {
                if self.completed_trials >= self.min_training_trials {
                    let converged = !learning || epsilon < self.tolerance;
                    let capped = self
                        .max_training_trials
                        .is_some_and(|cap| self.completed_trials >= cap.max(self.min_training_trials));
                    if converged || capped {
                        if !converged {
                            warn!(
                                trials = self.completed_trials,
                                epsilon,
                                tolerance = self.tolerance,
                                "training cap reached before epsilon converged; switching to testing"
                            );
                        } else {
                            info!(trials = self.completed_trials, epsilon, "switching to testing");
                        }
                        self.phase = Phase::Testing;
                        self.trial = 1;
                    }
                }
            }
            Phase::Testing | Phase::Done => {}
        }

        if self.phase == Phase::Testing && self.trial > self.n_test {
            self.phase = Phase::Done;
        }
        if self.phase == Phase::Done {
            return None;
        }

        Some(TrialTicket {
            phase: self.phase,
            trial: self.trial,
        })
    }

    /// Mark the current trial as finished.
    pub fn complete_trial(&mut self) {
        self.completed_trials += 1;
        self.trial += 1;
    }

    /// Stop immediately (manual interrupt).
    pub fn stop(&mut self) {
        self.phase = Phase::Done;
    }
}
