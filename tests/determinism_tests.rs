// tests/determinism_tests.rs
//
// Seeded runs are reproducible, and attaching a display never changes the
// results.

use std::io;

use smartcab::{
    build_environment, AgentProfile, Config, Display, DisplayEvent, Environment, Frame,
    RunOutcome, Simulator, TrialRecord,
};

/// Display that only counts frames.
struct CountingDisplay {
    frames: usize,
}

impl Display for CountingDisplay {
    fn render(&mut self, frame: &Frame) -> smartcab::Result<()> {
        assert!(frame.scene.cars.iter().filter(|c| c.primary).count() == 1);
        self.frames += 1;
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<DisplayEvent> {
        Vec::new()
    }

    fn show_paused(&mut self, _paused: bool) -> smartcab::Result<()> {
        Ok(())
    }
}

fn config(profile: AgentProfile, seed: u64) -> Config {
    let mut cfg = Config::headless(profile, seed);
    cfg.sim.n_test = 4;
    cfg.sim.max_training_trials = Some(6);
    cfg
}

fn run(cfg: &Config, with_display: bool) -> RunOutcome {
    let mut sim = Simulator::new(build_environment(cfg), cfg.sim.clone())
        .with_output(Box::new(io::sink()));
    if with_display {
        sim = sim.with_display(Box::new(CountingDisplay { frames: 0 }));
    }
    sim.run().expect("run")
}

#[test]
fn same_seed_same_records() {
    let cfg = config(AgentProfile::DefaultLearning, 77);
    let a = run(&cfg, false);
    let b = run(&cfg, false);
    assert_eq!(a.records, b.records);
}

#[test]
fn different_seeds_differ() {
    let a = run(&config(AgentProfile::NoLearning, 1), false);
    let b = run(&config(AgentProfile::NoLearning, 2), false);
    let deadlines = |o: &RunOutcome| -> Vec<i32> {
        o.records.iter().map(TrialRecord::initial_deadline).collect()
    };
    let rewards = |o: &RunOutcome| -> Vec<f64> { o.records.iter().map(TrialRecord::net_reward).collect() };
    assert!(deadlines(&a) != deadlines(&b) || rewards(&a) != rewards(&b));
}

#[test]
fn display_does_not_change_results() {
    for profile in [AgentProfile::NoLearning, AgentProfile::ImprovedLearning] {
        let cfg = config(profile, 5);
        let headless = run(&cfg, false);
        let displayed = run(&cfg, true);
        assert_eq!(headless.records, displayed.records, "profile {}", profile.as_str());
    }
}

#[test]
fn testing_trials_run_with_exploration_off() {
    let cfg = config(AgentProfile::ImprovedLearning, 9);
    let outcome = run(&cfg, false);
    assert_eq!(outcome.testing().count(), 4);
    assert!(outcome.testing().all(|r| r.epsilon() == 0.0 && r.alpha() == 0.0));
    assert!(outcome.training().all(|r| r.epsilon() > 0.0));
}

#[test]
fn every_trial_ends_within_its_deadline_budget() {
    let cfg = config(AgentProfile::NoLearning, 31);
    let outcome = run(&cfg, false);
    for r in &outcome.records {
        assert!(r.steps() >= 1);
        assert!(r.steps() <= r.initial_deadline() + 1);
        assert_eq!(r.actions().total() as i32, r.steps());
    }
}

#[test]
fn coverage_grows_only_for_learning_agents() {
    let learning = run(&config(AgentProfile::DefaultLearning, 3), false);
    assert!(learning.records.last().is_some_and(|r| r.coverage() > 0.0));
    assert!(learning.records.iter().all(|r| r.coverage() <= 1.0));

    let random = run(&config(AgentProfile::NoLearning, 3), false);
    assert!(random.records.iter().all(|r| r.coverage() == 0.0));

    // The environment keeps the agent after the run.
    let cfg = config(AgentProfile::DefaultLearning, 3);
    let mut sim = Simulator::new(build_environment(&cfg), cfg.sim.clone())
        .with_output(Box::new(io::sink()));
    sim.run().expect("run");
    let env = sim.into_env();
    assert!(!env.primary_agent().q_rows().is_empty());
}
