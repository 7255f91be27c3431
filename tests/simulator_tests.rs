// tests/simulator_tests.rs
//
// Trial loop behaviour against a scripted environment:
// - phase switching and trial counts
// - one record per completed trial, avg reward = net / steps
// - quit (flag or display) and pause handling

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use smartcab::agent::{AgentState, PrimaryAgent, QRow};
use smartcab::environment::{Parameters, Scene};
use smartcab::planner::Bounds;
use smartcab::{
    Action, Display, DisplayEvent, Environment, Frame, Inputs, Light, Location, Phase, QuitFlag,
    SimConfig, SimError, Simulator, StepStatus, TrialData, TrialRecord, TrialSink, Violation,
};

/// Agent whose epsilon drops by a fixed amount per training trial.
struct ScriptedAgent {
    learning: bool,
    epsilon: f64,
    step: f64,
}

impl PrimaryAgent for ScriptedAgent {
    fn reset(&mut self, _destination: Location, testing: bool) {
        if testing {
            self.epsilon = 0.0;
        } else if self.learning {
            self.epsilon = (self.epsilon - self.step).max(0.0);
        }
    }

    fn choose_action(&mut self, _inputs: &Inputs, waypoint: Action, _deadline: i32) -> Action {
        waypoint
    }

    fn learn(&mut self, _reward: f64) {}

    fn is_learning(&self) -> bool {
        self.learning
    }

    fn epsilon(&self) -> f64 {
        self.epsilon
    }

    fn alpha(&self) -> f64 {
        if self.learning {
            0.5
        } else {
            0.0
        }
    }

    fn current_state(&self) -> Option<AgentState> {
        None
    }

    fn q_rows(&self) -> Vec<QRow> {
        Vec::new()
    }

    fn coverage(&self) -> f64 {
        0.0
    }
}

/// Environment with fixed trial lengths and a fixed reward pattern
/// (+1.0 on even ticks, -0.5 on odd ticks).
struct ScriptedEnv {
    agent: ScriptedAgent,
    steps_per_trial: usize,
    deadline: i32,
    t: usize,
    done: bool,
    resets: Vec<bool>,
    data: TrialData,
    status: Option<StepStatus>,
    last_success: Option<bool>,
}

impl ScriptedEnv {
    fn new(learning: bool, steps_per_trial: usize, deadline: i32) -> Self {
        Self {
            agent: ScriptedAgent {
                learning,
                epsilon: 1.0,
                step: 0.25,
            },
            steps_per_trial,
            deadline,
            t: 0,
            done: false,
            resets: Vec::new(),
            data: TrialData::new(false, Parameters { e: 1.0, a: 0.5 }, deadline),
            status: None,
            last_success: None,
        }
    }
}

impl Environment for ScriptedEnv {
    fn reset(&mut self, testing: bool) {
        self.agent.reset((1, 1), testing);
        self.resets.push(testing);
        self.t = 0;
        self.done = false;
        self.status = None;
        self.data = TrialData::new(
            testing,
            Parameters {
                e: self.agent.epsilon(),
                a: self.agent.alpha(),
            },
            self.deadline,
        );
    }

    fn step(&mut self) {
        if self.done {
            return;
        }
        let deadline = self.data.final_deadline;
        let (reward, violation) = if self.t % 2 == 0 {
            (1.0, Violation::None)
        } else {
            (-0.5, Violation::Minor)
        };
        self.data.net_reward += reward;
        self.data.actions.record(violation);
        self.data.final_deadline = deadline - 1;
        self.status = Some(StepStatus {
            t: self.t as u64,
            state: None,
            action: Action::Forward,
            reward,
            violation,
            deadline,
            waypoint: Action::Forward,
            inputs: Inputs::clear(Light::Green),
            light: Light::Green,
        });
        self.t += 1;
        if self.t == self.steps_per_trial {
            self.done = true;
            self.data.success = self.data.final_deadline >= 0;
            self.last_success = Some(self.data.success);
        }
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn trial_data(&self) -> &TrialData {
        &self.data
    }

    fn step_status(&self) -> Option<&StepStatus> {
        self.status.as_ref()
    }

    fn primary_agent(&self) -> &dyn PrimaryAgent {
        &self.agent
    }

    fn enforce_deadline(&self) -> bool {
        true
    }

    fn last_success(&self) -> Option<bool> {
        self.last_success
    }

    fn scene(&self) -> Scene {
        Scene {
            bounds: Bounds::for_grid(2, 2),
            lights: Vec::new(),
            cars: Vec::new(),
            destination: None,
        }
    }
}

/// Cloneable in-memory writer for capturing the summary table.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().expect("lock").clone()).expect("utf8")
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Display that replays scripted input and records what it was shown.
#[derive(Clone, Default)]
struct ScriptedDisplay {
    frames: Arc<Mutex<usize>>,
    paused: Arc<Mutex<Vec<bool>>>,
    lines: Arc<Mutex<Vec<String>>>,
    shutdowns: Arc<Mutex<usize>>,
    script: Arc<Mutex<VecDeque<Vec<DisplayEvent>>>>,
}

impl ScriptedDisplay {
    fn with_script(script: Vec<Vec<DisplayEvent>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            ..Self::default()
        }
    }
}

impl Display for ScriptedDisplay {
    fn render(&mut self, _frame: &Frame) -> smartcab::Result<()> {
        *self.frames.lock().expect("lock") += 1;
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<DisplayEvent> {
        self.script.lock().expect("lock").pop_front().unwrap_or_default()
    }

    fn show_paused(&mut self, paused: bool) -> smartcab::Result<()> {
        self.paused.lock().expect("lock").push(paused);
        Ok(())
    }

    fn log_line(&mut self, line: &str) {
        self.lines.lock().expect("lock").push(line.to_string());
    }

    fn shutdown(&mut self) {
        *self.shutdowns.lock().expect("lock") += 1;
    }
}

/// Trial sink that fails on the given trial and records the end-of-run call.
#[derive(Clone, Default)]
struct FailingSink {
    fail_on: u32,
    logged: Arc<Mutex<u32>>,
    finished: Arc<Mutex<Option<Option<String>>>>,
}

impl TrialSink for FailingSink {
    fn log_trial(&mut self, record: &TrialRecord) -> smartcab::Result<()> {
        if record.trial() == self.fail_on {
            return Err(SimError::Io(io::Error::other("disk full")));
        }
        *self.logged.lock().expect("lock") += 1;
        Ok(())
    }

    fn finish(&mut self, q_table: Option<&str>) -> smartcab::Result<()> {
        *self.finished.lock().expect("lock") = Some(q_table.map(str::to_string));
        Ok(())
    }
}

fn sim_config(n_test: u32) -> SimConfig {
    SimConfig {
        update_delay: 0.0,
        display: false,
        n_test,
        min_training_trials: 2,
        color: false,
        ..SimConfig::default()
    }
}

#[test]
fn learning_run_trains_until_epsilon_converges_then_tests() {
    let env = ScriptedEnv::new(true, 3, 10);
    let mut sim = Simulator::new(env, sim_config(3)).with_output(Box::new(io::sink()));
    let outcome = sim.run().expect("run");

    // Epsilon: 0.75, 0.5, 0.25, 0.0 -> converged after four training trials.
    assert_eq!(outcome.training().count(), 4);
    assert_eq!(outcome.testing().count(), 3);
    assert!(!outcome.interrupted);

    let trials: Vec<(Phase, u32)> = outcome
        .records
        .iter()
        .map(|r| (r.phase(), r.trial()))
        .collect();
    assert_eq!(
        trials,
        vec![
            (Phase::Training, 1),
            (Phase::Training, 2),
            (Phase::Training, 3),
            (Phase::Training, 4),
            (Phase::Testing, 1),
            (Phase::Testing, 2),
            (Phase::Testing, 3),
        ]
    );
    assert_eq!(
        sim.env().resets,
        vec![false, false, false, false, true, true, true]
    );
}

#[test]
fn non_learning_run_switches_after_minimum() {
    let env = ScriptedEnv::new(false, 2, 10);
    let mut sim = Simulator::new(env, sim_config(1)).with_output(Box::new(io::sink()));
    let outcome = sim.run().expect("run");
    assert_eq!(outcome.training().count(), 2);
    assert_eq!(outcome.testing().count(), 1);
}

#[test]
fn each_record_matches_its_trial() {
    let env = ScriptedEnv::new(false, 3, 10);
    let mut sim = Simulator::new(env, sim_config(1)).with_output(Box::new(io::sink()));
    let outcome = sim.run().expect("run");

    for r in &outcome.records {
        assert_eq!(r.steps(), 3);
        assert_eq!(r.actions().total(), 3);
        assert_eq!(r.initial_deadline() - r.final_deadline(), 3);
        assert!((r.net_reward() - 1.5).abs() < 1e-12);
        assert!((r.avg_reward() - 0.5).abs() < 1e-12);
        assert_eq!(r.actions().violations(), 1);
        assert!(r.success());
    }
    assert_eq!(outcome.summary.training.trials, 2);
    assert_eq!(outcome.summary.testing.successes, 1);
}

#[test]
fn late_arrival_is_not_a_success() {
    // Deadline 2 but four steps: final deadline is -2.
    let env = ScriptedEnv::new(false, 4, 2);
    let mut sim = Simulator::new(env, sim_config(0)).with_output(Box::new(io::sink()));
    let outcome = sim.run().expect("run");
    assert!(outcome.records.iter().all(|r| !r.success()));
    assert!(outcome.records.iter().all(|r| r.final_deadline() == -2));
}

#[test]
fn summary_table_has_header_and_one_row_per_trial() {
    let buf = SharedBuf::default();
    let env = ScriptedEnv::new(false, 3, 10);
    let mut sim = Simulator::new(env, sim_config(2)).with_output(Box::new(buf.clone()));
    sim.run().expect("run");

    let text = buf.text();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("Type      Trial"));
    assert_eq!(lines[1], "-".repeat(80));
    let rows: Vec<&&str> = lines
        .iter()
        .filter(|l| l.starts_with("Training") || l.starts_with("Testing "))
        .collect();
    assert_eq!(rows.len(), 4);
    assert!(rows[0].contains("0.50"));
    assert!(rows[0].ends_with(" On time"));
    assert!(text.trim_end().ends_with("Simulation ended..."));
    assert!(!text.contains("Q table:"));
}

#[test]
fn quit_flag_set_before_run_records_nothing() {
    let quit = QuitFlag::new();
    quit.trigger();
    let env = ScriptedEnv::new(false, 3, 10);
    let mut sim = Simulator::new(env, sim_config(2))
        .with_output(Box::new(io::sink()))
        .with_quit_flag(quit);
    let outcome = sim.run().expect("run");
    assert!(outcome.interrupted);
    assert!(outcome.records.is_empty());
}

#[test]
fn display_quit_interrupts_mid_trial() {
    let display = ScriptedDisplay::with_script(vec![vec![], vec![], vec![DisplayEvent::Quit]]);
    let env = ScriptedEnv::new(false, 10, 20);
    let mut sim = Simulator::new(env, sim_config(2))
        .with_output(Box::new(io::sink()))
        .with_display(Box::new(display.clone()));
    let outcome = sim.run().expect("run");

    assert!(outcome.interrupted);
    assert!(outcome.records.is_empty());
    assert_eq!(*display.frames.lock().expect("lock"), 2);
}

#[test]
fn pause_waits_for_a_key_then_resumes() {
    let display = ScriptedDisplay::with_script(vec![
        vec![DisplayEvent::Pause],
        vec![],
        vec![],
        vec![DisplayEvent::Key],
    ]);
    let env = ScriptedEnv::new(false, 2, 10);
    let mut sim = Simulator::new(env, sim_config(1))
        .with_output(Box::new(io::sink()))
        .with_display(Box::new(display.clone()));
    let outcome = sim.run().expect("run");

    assert!(!outcome.interrupted);
    assert_eq!(outcome.records.len(), 3);
    assert_eq!(*display.paused.lock().expect("lock"), vec![true, false]);
}

#[test]
fn quit_while_paused_stops_the_run() {
    let display = ScriptedDisplay::with_script(vec![
        vec![DisplayEvent::Pause],
        vec![DisplayEvent::Quit],
    ]);
    let env = ScriptedEnv::new(false, 5, 10);
    let mut sim = Simulator::new(env, sim_config(1))
        .with_output(Box::new(io::sink()))
        .with_display(Box::new(display.clone()));
    let outcome = sim.run().expect("run");
    assert!(outcome.interrupted);
    assert!(outcome.records.is_empty());
}

#[test]
fn negative_update_delay_is_rejected() {
    let env = ScriptedEnv::new(false, 2, 10);
    let cfg = SimConfig {
        update_delay: -1.0,
        ..sim_config(1)
    };
    let mut sim = Simulator::new(env, cfg).with_output(Box::new(io::sink()));
    assert!(sim.run().is_err());
}

#[test]
fn unrepresentable_update_delay_is_rejected_before_any_trial() {
    for bad in [1e20, f64::INFINITY, f64::NAN] {
        let env = ScriptedEnv::new(false, 2, 10);
        let cfg = SimConfig {
            update_delay: bad,
            ..sim_config(1)
        };
        let out = SharedBuf::default();
        let mut sim = Simulator::new(env, cfg).with_output(Box::new(out.clone()));
        assert!(matches!(sim.run(), Err(SimError::InvalidConfig(_))), "update_delay {bad}");
        assert!(out.text().is_empty());
    }
}

#[test]
fn sink_error_still_finishes_the_run() {
    let sink = FailingSink {
        fail_on: 3,
        ..FailingSink::default()
    };
    let display = ScriptedDisplay::default();
    let out = SharedBuf::default();
    let env = ScriptedEnv::new(true, 2, 10);
    let cfg = SimConfig {
        log_metrics: true,
        ..sim_config(1)
    };
    let mut sim = Simulator::new(env, cfg)
        .with_output(Box::new(out.clone()))
        .with_display(Box::new(display.clone()))
        .with_trial_sink(Box::new(sink.clone()));

    let err = sim.run().expect_err("third trial fails");
    assert!(matches!(err, SimError::Io(_)));
    assert_eq!(*sink.logged.lock().expect("lock"), 2);

    let finished = sink.finished.lock().expect("lock").clone();
    assert!(finished.is_some_and(|table| table.is_some_and(|t| t.contains("States"))));
    assert_eq!(*display.shutdowns.lock().expect("lock"), 1);

    let text = out.text();
    assert!(text.contains("Q table:"));
    assert!(text.trim_end().ends_with("Simulation ended..."));
}

#[test]
fn summary_rows_reach_the_display() {
    let display = ScriptedDisplay::default();
    let env = ScriptedEnv::new(false, 2, 10);
    let mut sim = Simulator::new(env, sim_config(1))
        .with_output(Box::new(io::sink()))
        .with_display(Box::new(display.clone()));
    let outcome = sim.run().expect("run");

    let lines = display.lines.lock().expect("lock").clone();
    assert_eq!(lines.len(), outcome.records.len());
    assert!(lines[0].starts_with("Training"));
    assert!(lines[2].starts_with("Testing"));
    assert_eq!(*display.shutdowns.lock().expect("lock"), 1);
}

#[test]
fn trace_lines_reach_the_display() {
    let display = ScriptedDisplay::default();
    let env = ScriptedEnv::new(false, 2, 10);
    let cfg = SimConfig {
        trace_steps: true,
        ..sim_config(0)
    };
    let mut sim = Simulator::new(env, cfg)
        .with_output(Box::new(io::sink()))
        .with_display(Box::new(display.clone()));
    sim.run().expect("run");

    let lines = display.lines.lock().expect("lock").clone();
    // Per trial: banner, two trace lines, summary row.
    assert_eq!(lines.len(), 2 * 4);
    assert!(lines[0].starts_with("Simulating trial..."));
    assert!(lines[1].contains("SUCCESS"));
}
