// src/environment.rs
//
// Grid world the smartcab drives in.
//
// - Environment: what the Simulator consumes (reset/step/done + trial and
//   step data + read-only scene for rendering)
// - GridEnvironment: wrap-around grid of intersections with traffic lights,
//   dummy traffic and one primary agent under training
// - TrialData / StepStatus: per-trial accumulator and per-tick snapshot
//
// All randomness comes from one ChaCha8Rng seeded from EnvConfig::seed, so a
// given seed and agent reproduce the same trials regardless of how (or
// whether) the run is displayed.

use std::collections::BTreeMap;
use std::fmt;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::{AgentState, PrimaryAgent};
use crate::config::EnvConfig;
use crate::planner::{manhattan, Bounds, RoutePlanner};
use crate::traffic::TrafficLight;
use crate::types::{Action, Heading, Inputs, Light, Location, Violation};

/// Exploration/learning parameters in effect for a trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    /// Epsilon.
    pub e: f64,
    /// Alpha.
    pub a: f64,
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{'e': {:?}, 'a': {:?}}}", self.e, self.a)
    }
}

/// Number of actions taken per violation code (0..=4).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCounts(pub [u32; 5]);

impl ActionCounts {
    pub fn record(&mut self, violation: Violation) {
        self.0[violation.code()] += 1;
    }

    /// Total actions taken, i.e. steps.
    pub fn total(&self) -> u32 {
        self.0.iter().sum()
    }

    /// Minor + major traffic violations.
    pub fn violations(&self) -> u32 {
        self.0[1] + self.0[2]
    }

    /// Minor + major accidents.
    pub fn accidents(&self) -> u32 {
        self.0[3] + self.0[4]
    }
}

impl fmt::Display for ActionCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.0;
        write!(
            f,
            "{{0: {}, 1: {}, 2: {}, 3: {}, 4: {}}}",
            c[0], c[1], c[2], c[3], c[4]
        )
    }
}

/// Running totals for the current trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialData {
    pub testing: bool,
    pub parameters: Parameters,
    pub initial_deadline: i32,
    pub final_deadline: i32,
    pub net_reward: f64,
    pub actions: ActionCounts,
    pub success: bool,
}

impl TrialData {
    pub fn new(testing: bool, parameters: Parameters, deadline: i32) -> Self {
        Self {
            testing,
            parameters,
            initial_deadline: deadline,
            final_deadline: deadline,
            net_reward: 0.0,
            actions: ActionCounts::default(),
            success: false,
        }
    }

    /// Steps taken so far.
    pub fn steps(&self) -> i32 {
        self.initial_deadline - self.final_deadline
    }
}

/// Snapshot of the primary agent's most recent tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepStatus {
    pub t: u64,
    pub state: Option<AgentState>,
    pub action: Action,
    pub reward: f64,
    pub violation: Violation,
    /// Deadline before this tick's decrement.
    pub deadline: i32,
    pub waypoint: Action,
    pub inputs: Inputs,
    pub light: Light,
}

impl StepStatus {
    /// Percentage of the trial's time budget still left.
    pub fn time_remaining_pct(&self) -> f64 {
        let span = self.t as f64 + f64::from(self.deadline);
        if span <= 0.0 {
            return 0.0;
        }
        f64::from(self.deadline - 1) * 100.0 / span
    }
}

/// A car as seen by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarView {
    pub location: Location,
    pub heading: Heading,
    pub primary: bool,
}

/// Read-only picture of the world for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub bounds: Bounds,
    /// Intersection and whether north-south traffic has green.
    pub lights: Vec<(Location, bool)>,
    pub cars: Vec<CarView>,
    pub destination: Option<Location>,
}

/// Interface the Simulator drives.
pub trait Environment {
    /// Start a new trial.
    fn reset(&mut self, testing: bool);

    /// Advance one tick. No-op once the trial is done.
    fn step(&mut self);

    fn is_done(&self) -> bool;

    fn trial_data(&self) -> &TrialData;

    /// Most recent tick of the current trial; `None` before the first step.
    fn step_status(&self) -> Option<&StepStatus>;

    fn primary_agent(&self) -> &dyn PrimaryAgent;

    fn enforce_deadline(&self) -> bool;

    /// Outcome of the previous trial, if one finished.
    fn last_success(&self) -> Option<bool>;

    fn scene(&self) -> Scene;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CarId {
    Primary,
    Dummy(usize),
}

#[derive(Debug, Clone, Copy)]
struct Car {
    location: Location,
    heading: Heading,
    /// Action the car intends to take next; visible to neighbours.
    intent: Action,
    deadline: i32,
}

/// The smartcab grid world.
pub struct GridEnvironment<A: PrimaryAgent> {
    cfg: EnvConfig,
    bounds: Bounds,
    planner: RoutePlanner,
    intersections: BTreeMap<Location, TrafficLight>,
    primary: Car,
    destination: Location,
    dummies: Vec<Car>,
    agent: A,
    rng: ChaCha8Rng,
    t: u64,
    done: bool,
    last_success: Option<bool>,
    trial_data: TrialData,
    step_status: Option<StepStatus>,
}

impl<A: PrimaryAgent> GridEnvironment<A> {
    pub fn new(cfg: EnvConfig, agent: A) -> Self {
        let bounds = Bounds::for_grid(cfg.grid_size.0, cfg.grid_size.1);
        let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);

        let mut intersections = BTreeMap::new();
        for x in bounds.x_min..=bounds.x_max {
            for y in bounds.y_min..=bounds.y_max {
                intersections.insert((x, y), TrafficLight::random(&mut rng));
            }
        }

        let start = (bounds.x_min, bounds.y_min);
        let primary = Car {
            location: start,
            heading: Heading::EAST,
            intent: Action::Idle,
            deadline: 0,
        };
        let parameters = Parameters {
            e: agent.epsilon(),
            a: agent.alpha(),
        };

        Self {
            bounds,
            planner: RoutePlanner::new(bounds),
            intersections,
            primary,
            destination: start,
            dummies: Vec::with_capacity(cfg.num_dummies),
            agent,
            rng,
            t: 0,
            done: false,
            last_success: None,
            trial_data: TrialData::new(false, parameters, 0),
            step_status: None,
            cfg,
        }
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn primary_location(&self) -> Location {
        self.primary.location
    }

    pub fn destination(&self) -> Location {
        self.destination
    }

    fn random_location(&mut self) -> Location {
        (
            self.rng.gen_range(self.bounds.x_min..=self.bounds.x_max),
            self.rng.gen_range(self.bounds.y_min..=self.bounds.y_max),
        )
    }

    fn random_heading(&mut self) -> Heading {
        *Heading::ALL.choose(&mut self.rng).unwrap_or(&Heading::EAST)
    }

    fn random_move(&mut self) -> Action {
        *[Action::Forward, Action::Left, Action::Right]
            .choose(&mut self.rng)
            .unwrap_or(&Action::Forward)
    }

    /// Start/destination pair at least `min_trip_distance` apart.
    fn pick_trip(&mut self) -> (Location, Location) {
        let locations: Vec<Location> = self.intersections.keys().copied().collect();
        loop {
            let start = self.random_location();
            let candidates: Vec<Location> = locations
                .iter()
                .copied()
                .filter(|&d| manhattan(start, d) >= self.cfg.min_trip_distance)
                .collect();
            if let Some(&dest) = candidates.choose(&mut self.rng) {
                return (start, dest);
            }
        }
    }

    fn car(&self, id: CarId) -> &Car {
        match id {
            CarId::Primary => &self.primary,
            CarId::Dummy(i) => &self.dummies[i],
        }
    }

    fn car_mut(&mut self, id: CarId) -> &mut Car {
        match id {
            CarId::Primary => &mut self.primary,
            CarId::Dummy(i) => &mut self.dummies[i],
        }
    }

    fn light_at(&self, location: Location, heading: Heading) -> Light {
        self.intersections
            .get(&location)
            .map(|l| l.light_for(heading))
            .unwrap_or(Light::Red)
    }

    /// Light plus intentions of cars entering the same intersection.
    fn sense(&self, id: CarId) -> Inputs {
        let me = self.car(id);
        let heading = me.heading;
        let mut inputs = Inputs::clear(self.light_at(me.location, heading));

        let others = std::iter::once((CarId::Primary, &self.primary)).chain(
            self.dummies
                .iter()
                .enumerate()
                .map(|(i, c)| (CarId::Dummy(i), c)),
        );
        for (other_id, other) in others {
            if other_id == id || other.location != me.location || other.heading == heading {
                continue;
            }
            let intent = other.intent;
            if other.heading == heading.reverse() {
                if inputs.oncoming != Some(Action::Left) {
                    inputs.oncoming = Some(intent);
                }
            } else if other.heading == heading.left() {
                // Approaching from our right.
                if !matches!(inputs.right, Some(Action::Forward) | Some(Action::Left)) {
                    inputs.right = Some(intent);
                }
            } else if inputs.left != Some(Action::Forward) {
                inputs.left = Some(intent);
            }
        }
        inputs
    }

    /// Traffic rule check for `action` given what the car senses.
    pub fn judge(action: Action, inputs: &Inputs) -> Violation {
        let green = inputs.light == Light::Green;
        let cross_traffic =
            inputs.left == Some(Action::Forward) || inputs.right == Some(Action::Forward);
        match action {
            Action::Forward => {
                if green {
                    Violation::None
                } else if cross_traffic {
                    Violation::MajorAccident
                } else {
                    Violation::Major
                }
            }
            Action::Left => {
                if !green {
                    if cross_traffic || inputs.oncoming == Some(Action::Right) {
                        Violation::MajorAccident
                    } else {
                        Violation::Major
                    }
                } else if matches!(inputs.oncoming, Some(Action::Right) | Some(Action::Forward)) {
                    Violation::MinorAccident
                } else {
                    Violation::None
                }
            }
            Action::Right => {
                if !green && inputs.left == Some(Action::Forward) {
                    Violation::MinorAccident
                } else {
                    Violation::None
                }
            }
            Action::Idle => {
                if green && inputs.oncoming != Some(Action::Left) {
                    Violation::Minor
                } else {
                    Violation::None
                }
            }
        }
    }

    /// Apply a legal move to a car.
    fn drive(&mut self, id: CarId, action: Action) {
        if action.is_idle() {
            return;
        }
        let bounds = self.bounds;
        let car = self.car_mut(id);
        car.heading = car.heading.after(action);
        car.location = bounds.advance(car.location, car.heading);
    }

    fn update_primary(&mut self) {
        let inputs = self.sense(CarId::Primary);
        let waypoint =
            self.planner
                .next_waypoint(self.primary.location, self.primary.heading, self.destination);
        self.primary.intent = waypoint;

        let deadline = self.primary.deadline;
        let action = self.agent.choose_action(&inputs, waypoint, deadline);
        let reward = self.act_primary(action, &inputs, waypoint);
        self.agent.learn(reward);
    }

    fn act_primary(&mut self, action: Action, inputs: &Inputs, waypoint: Action) -> f64 {
        let violation = Self::judge(action, inputs);
        let deadline = self.primary.deadline;

        let mut reward = 2.0 * self.rng.gen::<f64>() - 1.0;
        if violation == Violation::None {
            let penalty = if self.cfg.enforce_deadline {
                let span = self.t as f64 + f64::from(deadline);
                let fnc = if span > 0.0 { self.t as f64 / span } else { 1.0 };
                (10f64.powf(fnc) - 1.0) / 9.0
            } else {
                0.0
            };
            let followed = action == waypoint || (action.is_idle() && inputs.light != Light::Green);
            reward += if followed { 2.0 - penalty } else { 1.0 - penalty };
            self.drive(CarId::Primary, action);
        } else {
            reward += violation.penalty();
        }

        if self.primary.location == self.destination {
            self.trial_data.success = deadline >= 0;
            self.done = true;
            self.last_success = Some(self.trial_data.success);
            debug!(t = self.t, deadline, "primary agent reached destination");
        }

        self.step_status = Some(StepStatus {
            t: self.t,
            state: self.agent.current_state(),
            action,
            reward,
            violation,
            deadline,
            waypoint,
            inputs: *inputs,
            light: inputs.light,
        });
        self.trial_data.final_deadline = deadline - 1;
        self.trial_data.net_reward += reward;
        self.trial_data.actions.record(violation);

        reward
    }

    fn update_dummy(&mut self, i: usize) {
        let id = CarId::Dummy(i);
        let inputs = self.sense(id);
        let intent = self.dummies[i].intent;
        // Dummies wait until their intended move is legal.
        if Self::judge(intent, &inputs) == Violation::None {
            self.drive(id, intent);
            self.dummies[i].intent = self.random_move();
        }
    }
}

impl<A: PrimaryAgent> Environment for GridEnvironment<A> {
    fn reset(&mut self, testing: bool) {
        self.done = false;
        self.t = 0;

        for light in self.intersections.values_mut() {
            light.reset(&mut self.rng);
        }

        let (start, destination) = self.pick_trip();
        let heading = self.random_heading();
        let deadline = manhattan(start, destination) * self.cfg.deadline_per_block;

        self.dummies.clear();
        for _ in 0..self.cfg.num_dummies {
            let location = self.random_location();
            let heading = self.random_heading();
            let intent = self.random_move();
            self.dummies.push(Car {
                location,
                heading,
                intent,
                deadline: 0,
            });
        }

        self.destination = destination;
        self.primary = Car {
            location: start,
            heading,
            intent: self.planner.next_waypoint(start, heading, destination),
            deadline,
        };

        self.agent.reset(destination, testing);
        self.step_status = None;
        self.trial_data = TrialData::new(
            testing,
            Parameters {
                e: self.agent.epsilon(),
                a: self.agent.alpha(),
            },
            deadline,
        );

        debug!(
            ?start,
            ?destination,
            deadline,
            testing,
            "environment reset"
        );
    }

    fn step(&mut self) {
        if self.done {
            return;
        }

        self.update_primary();
        for i in 0..self.dummies.len() {
            self.update_dummy(i);
        }

        for light in self.intersections.values_mut() {
            light.update(self.t);
        }

        let deadline = self.primary.deadline;
        if !self.done {
            if deadline <= self.cfg.hard_time_limit {
                self.done = true;
                self.last_success = Some(false);
                debug!(limit = self.cfg.hard_time_limit, "primary agent hit hard time limit");
            } else if self.cfg.enforce_deadline && deadline <= 0 {
                self.done = true;
                self.last_success = Some(false);
                debug!("primary agent ran out of time");
            }
        }
        self.primary.deadline = deadline - 1;
        self.t += 1;
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn trial_data(&self) -> &TrialData {
        &self.trial_data
    }

    fn step_status(&self) -> Option<&StepStatus> {
        self.step_status.as_ref()
    }

    fn primary_agent(&self) -> &dyn PrimaryAgent {
        &self.agent
    }

    fn enforce_deadline(&self) -> bool {
        self.cfg.enforce_deadline
    }

    fn last_success(&self) -> Option<bool> {
        self.last_success
    }

    fn scene(&self) -> Scene {
        let mut cars: Vec<CarView> = self
            .dummies
            .iter()
            .map(|c| CarView {
                location: c.location,
                heading: c.heading,
                primary: false,
            })
            .collect();
        cars.push(CarView {
            location: self.primary.location,
            heading: self.primary.heading,
            primary: true,
        });
        Scene {
            bounds: self.bounds,
            lights: self
                .intersections
                .iter()
                .map(|(&loc, light)| (loc, light.ns_open))
                .collect(),
            cars,
            destination: Some(self.destination),
        }
    }
}
