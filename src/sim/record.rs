// src/sim/record.rs
//
// Immutable per-trial record produced when a trial completes.

use serde::Serialize;

use crate::agent::PrimaryAgent;
use crate::environment::{ActionCounts, TrialData};

use super::controller::{Phase, TrialTicket};

/// Outcome of one completed trial.
///
/// Fields are private: a record is built once from the environment's trial
/// data and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialRecord {
    phase: Phase,
    trial: u32,
    epsilon: f64,
    alpha: f64,
    initial_deadline: i32,
    final_deadline: i32,
    net_reward: f64,
    actions: ActionCounts,
    success: bool,
    coverage: f64,
}

impl TrialRecord {
    pub fn from_trial(ticket: TrialTicket, data: &TrialData, agent: &dyn PrimaryAgent) -> Self {
        Self {
            phase: ticket.phase,
            trial: ticket.trial,
            epsilon: data.parameters.e,
            alpha: data.parameters.a,
            initial_deadline: data.initial_deadline,
            final_deadline: data.final_deadline,
            net_reward: data.net_reward,
            actions: data.actions,
            success: data.success,
            coverage: agent.coverage(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn testing(&self) -> bool {
        self.phase == Phase::Testing
    }

    pub fn trial(&self) -> u32 {
        self.trial
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn initial_deadline(&self) -> i32 {
        self.initial_deadline
    }

    pub fn final_deadline(&self) -> i32 {
        self.final_deadline
    }

    pub fn net_reward(&self) -> f64 {
        self.net_reward
    }

    pub fn actions(&self) -> &ActionCounts {
        &self.actions
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn coverage(&self) -> f64 {
        self.coverage
    }

    /// Steps taken: initial minus final deadline.
    pub fn steps(&self) -> i32 {
        self.initial_deadline - self.final_deadline
    }

    /// Net reward per step; 0.0 for a trial without steps.
    pub fn avg_reward(&self) -> f64 {
        let steps = self.steps();
        if steps == 0 {
            0.0
        } else {
            self.net_reward / f64::from(steps)
        }
    }
}
