// src/agent.rs
//
// Primary (learning) agent for the smartcab harness.
//
// Design:
// - PrimaryAgent trait: what the environment and simulator need from the
//   car under training (action choice, learning, reporting accessors)
// - LearningAgent: tabular Q-learning with an epsilon decay schedule; in
//   non-learning mode it drives at random and keeps no table
// - AgentState: the discretised state the Q-table is keyed by

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::AgentConfig;
use crate::types::{Action, Inputs, Light, Location};

/// Names of the state features, in table order.
pub const STATE_NAMES: [&str; 4] = ["waypoint", "light", "oncoming", "left"];

/// Number of distinct states an agent can visit while driving.
///
/// waypoint (forward/left/right) x light x oncoming (4) x left (4).
pub const STATE_SPACE_SIZE: usize = 3 * 2 * 4 * 4;

/// How epsilon shrinks with the number of training trials seen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecaySchedule {
    /// epsilon = initial - step * t, floored at zero.
    Linear { step: f64 },
    /// epsilon = initial * rate^t.
    Exponential { rate: f64 },
}

impl DecaySchedule {
    /// Epsilon to use for training trial number `t` (1-based).
    pub fn epsilon_at(&self, initial: f64, t: u32) -> f64 {
        let eps = match *self {
            DecaySchedule::Linear { step } => initial - step * f64::from(t),
            DecaySchedule::Exponential { rate } => initial * rate.powi(t as i32),
        };
        eps.max(0.0)
    }
}

/// Discretised agent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentState {
    pub waypoint: Action,
    pub light: Light,
    pub oncoming: Option<Action>,
    pub left: Option<Action>,
}

impl AgentState {
    pub fn new(waypoint: Action, inputs: &Inputs) -> Self {
        Self {
            waypoint,
            light: inputs.light,
            oncoming: inputs.oncoming,
            left: inputs.left,
        }
    }

    /// Feature values as printed in the Q-table, in `STATE_NAMES` order.
    pub fn values(&self) -> [String; 4] {
        [
            self.waypoint.to_string(),
            self.light.to_string(),
            option_name(self.oncoming).to_string(),
            option_name(self.left).to_string(),
        ]
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [w, l, o, lt] = self.values();
        write!(f, "({w}, {l}, {o}, {lt})")
    }
}

fn option_name(a: Option<Action>) -> &'static str {
    a.map(|a| a.as_str()).unwrap_or("None")
}

/// One row of the Q-table, ready for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct QRow {
    /// State feature values in `state_names()` order.
    pub state: Vec<String>,
    /// Action values in `valid_actions()` order.
    pub values: Vec<f64>,
}

/// Interface the environment and simulator use to drive the primary car.
pub trait PrimaryAgent {
    /// Prepare for a new trial.
    ///
    /// Training trials advance the exploration schedule; testing trials set
    /// epsilon and alpha to zero.
    fn reset(&mut self, destination: Location, testing: bool);

    /// Pick an action for the current tick.
    fn choose_action(&mut self, inputs: &Inputs, waypoint: Action, deadline: i32) -> Action;

    /// Learn from the reward of the action returned by the last `choose_action`.
    fn learn(&mut self, reward: f64);

    fn is_learning(&self) -> bool;

    fn epsilon(&self) -> f64;

    fn alpha(&self) -> f64;

    /// State observed on the most recent `choose_action`, if any.
    fn current_state(&self) -> Option<AgentState>;

    fn state_names(&self) -> &[&'static str] {
        &STATE_NAMES
    }

    fn valid_actions(&self) -> &[Action] {
        &Action::ALL
    }

    /// Snapshot of the Q-table (empty for non-learning agents).
    fn q_rows(&self) -> Vec<QRow>;

    /// Fraction of the state space present in the Q-table, in [0, 1].
    fn coverage(&self) -> f64;
}

/// Tabular Q-learning driver.
#[derive(Debug, Clone)]
pub struct LearningAgent {
    learning: bool,
    initial_epsilon: f64,
    epsilon: f64,
    base_alpha: f64,
    alpha: f64,
    decay: DecaySchedule,
    training_trials: u32,
    q: BTreeMap<AgentState, BTreeMap<Action, f64>>,
    rng: ChaCha8Rng,
    destination: Option<Location>,
    state: Option<AgentState>,
    last_action: Option<Action>,
}

impl LearningAgent {
    pub fn new(cfg: &AgentConfig) -> Self {
        Self {
            learning: cfg.learning,
            initial_epsilon: cfg.epsilon,
            epsilon: cfg.epsilon,
            base_alpha: cfg.alpha,
            alpha: cfg.alpha,
            decay: cfg.decay,
            training_trials: 0,
            q: BTreeMap::new(),
            rng: ChaCha8Rng::seed_from_u64(cfg.seed),
            destination: None,
            state: None,
            last_action: None,
        }
    }

    pub fn destination(&self) -> Option<Location> {
        self.destination
    }

    pub fn training_trials(&self) -> u32 {
        self.training_trials
    }

    /// Q value for a state/action pair (0.0 when unseen).
    pub fn q_value(&self, state: &AgentState, action: Action) -> f64 {
        self.q
            .get(state)
            .and_then(|row| row.get(&action))
            .copied()
            .unwrap_or(0.0)
    }

    fn best_action(&mut self, state: &AgentState) -> Action {
        let Some(row) = self.q.get(state) else {
            return *Action::ALL.choose(&mut self.rng).unwrap_or(&Action::Idle);
        };
        let max_q = row.values().copied().fold(f64::NEG_INFINITY, f64::max);
        let best: Vec<Action> = row
            .iter()
            .filter(|&(_, &v)| (v - max_q).abs() < 1e-12)
            .map(|(&a, _)| a)
            .collect();
        *best.choose(&mut self.rng).unwrap_or(&Action::Idle)
    }
}

impl PrimaryAgent for LearningAgent {
    fn reset(&mut self, destination: Location, testing: bool) {
        self.destination = Some(destination);
        self.state = None;
        self.last_action = None;

        if testing {
            self.epsilon = 0.0;
            self.alpha = 0.0;
        } else if self.learning {
            self.training_trials += 1;
            self.epsilon = self
                .decay
                .epsilon_at(self.initial_epsilon, self.training_trials);
            self.alpha = self.base_alpha;
        }
    }

    fn choose_action(&mut self, inputs: &Inputs, waypoint: Action, _deadline: i32) -> Action {
        let state = AgentState::new(waypoint, inputs);
        self.state = Some(state);

        let action = if !self.learning {
            *Action::ALL.choose(&mut self.rng).unwrap_or(&Action::Idle)
        } else {
            self.q
                .entry(state)
                .or_insert_with(|| Action::ALL.iter().map(|&a| (a, 0.0)).collect());
            if self.rng.gen::<f64>() < self.epsilon {
                *Action::ALL.choose(&mut self.rng).unwrap_or(&Action::Idle)
            } else {
                self.best_action(&state)
            }
        };

        self.last_action = Some(action);
        action
    }

    fn learn(&mut self, reward: f64) {
        if !self.learning {
            return;
        }
        let (Some(state), Some(action)) = (self.state, self.last_action) else {
            return;
        };
        let alpha = self.alpha;
        if let Some(q) = self.q.get_mut(&state).and_then(|row| row.get_mut(&action)) {
            *q = (1.0 - alpha) * *q + alpha * reward;
        }
    }

    fn is_learning(&self) -> bool {
        self.learning
    }

    fn epsilon(&self) -> f64 {
        self.epsilon
    }

    fn alpha(&self) -> f64 {
        self.alpha
    }

    fn current_state(&self) -> Option<AgentState> {
        self.state
    }

    fn q_rows(&self) -> Vec<QRow> {
        self.q
            .iter()
            .map(|(state, row)| QRow {
                state: state.values().to_vec(),
                values: self
                    .valid_actions()
                    .iter()
                    .map(|a| row.get(a).copied().unwrap_or(0.0))
                    .collect(),
            })
            .collect()
    }

    fn coverage(&self) -> f64 {
        (self.q.len() as f64 / STATE_SPACE_SIZE as f64).min(1.0)
    }
}
